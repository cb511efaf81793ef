//! Normalized relational store: the source of truth.
//!
//! Every list query is built with [`QueryBuilder`] and bound parameters only.
//! The same WHERE clause feeds a `COUNT(*)` (filtered, unpaginated) and the
//! page query, so `total` and `items` always agree. Sort columns come from
//! the allow-list enums in [`crate::query`], never from user input.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{Exercise, ExerciseMuscle, Listing, Muscle, WeekPlan, WeekPlanSet, Workout};
use crate::query::{
    ExerciseFilter, ExerciseQuery, IdSet, MuscleFilter, MuscleQuery, PageRequest, Sort, SortKey,
    WorkoutFilter, WorkoutQuery,
};

// ============ Lists ============

pub async fn list_exercises(
    pool: &SqlitePool,
    query: &ExerciseQuery,
    ids: &IdSet,
) -> Result<Listing<Exercise>> {
    let push_where = |qb: &mut QueryBuilder<'_, Sqlite>| {
        push_ids(qb, "id", ids);
        push_exercise_filter(qb, &query.filter);
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM exercises WHERE 1=1");
    push_where(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new("SELECT * FROM exercises WHERE 1=1");
    push_where(&mut qb);
    push_order(&mut qb, query.sort.map(column_sort));
    push_page(&mut qb, query.page);

    let rows = qb.build().fetch_all(pool).await?;
    let items = rows.iter().map(exercise_from_row).collect::<Result<_>>()?;
    Ok(Listing { items, total })
}

pub async fn list_workouts(
    pool: &SqlitePool,
    query: &WorkoutQuery,
    ids: &IdSet,
) -> Result<Listing<Workout>> {
    let push_where = |qb: &mut QueryBuilder<'_, Sqlite>| {
        push_ids(qb, "id", ids);
        push_workout_filter(qb, &query.filter);
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM workouts WHERE 1=1");
    push_where(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new("SELECT * FROM workouts WHERE 1=1");
    push_where(&mut qb);
    push_order(&mut qb, query.sort.map(column_sort));
    push_page(&mut qb, query.page);

    let rows = qb.build().fetch_all(pool).await?;
    let items = rows.iter().map(workout_from_row).collect::<Result<_>>()?;
    Ok(Listing { items, total })
}

/// Muscles have no includes and are only ever read from here.
pub async fn list_muscles(pool: &SqlitePool, query: &MuscleQuery) -> Result<Listing<Muscle>> {
    let push_where = |qb: &mut QueryBuilder<'_, Sqlite>| {
        push_ids(qb, "id", &query.ids);
        push_muscle_filter(qb, &query.filter);
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM muscles WHERE 1=1");
    push_where(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::new("SELECT * FROM muscles WHERE 1=1");
    push_where(&mut qb);
    push_order(&mut qb, query.sort.map(column_sort));
    push_page(&mut qb, query.page);

    let rows = qb.build().fetch_all(pool).await?;
    let items = rows.iter().map(muscle_from_row).collect::<Result<_>>()?;
    Ok(Listing { items, total })
}

fn push_exercise_filter(qb: &mut QueryBuilder<'_, Sqlite>, f: &ExerciseFilter) {
    push_contains(qb, "name", f.name.clone());
    push_contains(qb, "description", f.description.clone());
    push_contains(qb, "type", f.kind.clone());
    push_eq(qb, "created_date", f.created_date.map(|d| d.timestamp()));
    push_eq(qb, "last_updated", f.last_updated.map(|d| d.timestamp()));
}

fn push_workout_filter(qb: &mut QueryBuilder<'_, Sqlite>, f: &WorkoutFilter) {
    push_eq(qb, "exercise_id", f.exercise_id.map(|id| id.to_string()));
    push_eq(qb, "user_id", f.user_id.map(|id| id.to_string()));
    push_eq(qb, "created_date", f.created_date.map(|d| d.timestamp()));
    push_eq(qb, "last_updated", f.last_updated.map(|d| d.timestamp()));
}

fn push_muscle_filter(qb: &mut QueryBuilder<'_, Sqlite>, f: &MuscleFilter) {
    push_contains(qb, "name", f.name.clone());
    push_eq(qb, "created_date", f.created_date.map(|d| d.timestamp()));
    push_eq(qb, "last_updated", f.last_updated.map(|d| d.timestamp()));
}

fn column_sort<K: SortKey>(sort: Sort<K>) -> (&'static str, crate::query::SortOrder) {
    (sort.key.column(), sort.order)
}

// ============ Clause builders ============
//
// Shared with the SQLite document store, which passes `json_extract(...)`
// expressions instead of plain columns. `expr` is always a static string
// from an allow-list; values are always bound.

pub(crate) fn push_ids(qb: &mut QueryBuilder<'_, Sqlite>, expr: &str, ids: &IdSet) {
    if ids.is_empty() {
        return;
    }
    qb.push(" AND ");
    push_in_json(qb, expr, ids.as_slice());
}

/// `expr IN (...)` over a single bound JSON array, so the number of SQL
/// variables stays constant however many ids are passed.
fn push_in_json(qb: &mut QueryBuilder<'_, Sqlite>, expr: &str, ids: &[Uuid]) {
    let array = serde_json::Value::from(ids.iter().map(Uuid::to_string).collect::<Vec<_>>());
    qb.push(format!("{expr} IN (SELECT value FROM json_each("));
    qb.push_bind(array.to_string());
    qb.push("))");
}

/// Case-sensitive substring match.
pub(crate) fn push_contains(qb: &mut QueryBuilder<'_, Sqlite>, expr: &str, value: Option<String>) {
    if let Some(value) = value {
        qb.push(format!(" AND instr({expr}, "));
        qb.push_bind(value);
        qb.push(") > 0");
    }
}

pub(crate) fn push_eq<'a, T>(qb: &mut QueryBuilder<'a, Sqlite>, expr: &str, value: Option<T>)
where
    T: 'a + sqlx::Encode<'a, Sqlite> + sqlx::Type<Sqlite> + Send,
{
    if let Some(value) = value {
        qb.push(format!(" AND {expr} = "));
        qb.push_bind(value);
    }
}

/// Sorted queries break ties on `tiebreak`; unsorted ones keep insertion order.
pub(crate) fn push_order_by(
    qb: &mut QueryBuilder<'_, Sqlite>,
    sort: Option<(&str, crate::query::SortOrder)>,
    tiebreak: &str,
) {
    match sort {
        Some((expr, order)) => {
            qb.push(format!(" ORDER BY {expr} {}, {tiebreak} ASC", order.sql()));
        }
        None => {
            qb.push(" ORDER BY rowid ASC");
        }
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, sort: Option<(&str, crate::query::SortOrder)>) {
    push_order_by(qb, sort, "id");
}

pub(crate) fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, page: Option<PageRequest>) {
    if let Some(page) = page {
        qb.push(" LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
    }
}

// ============ Batch fetches ============

async fn select_where_in<T>(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    ids: Option<&[Uuid]>,
    decode: fn(&SqliteRow) -> Result<T>,
) -> Result<Vec<T>> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {table}"));
    if let Some(ids) = ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        qb.push(" WHERE ");
        push_in_json(&mut qb, column, ids);
    }
    qb.push(" ORDER BY rowid ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to read {table}"))?;
    rows.iter().map(decode).collect()
}

pub async fn exercise_muscles_for(
    pool: &SqlitePool,
    exercise_ids: &[Uuid],
) -> Result<Vec<ExerciseMuscle>> {
    select_where_in(pool, "exercise_muscles", "exercise_id", Some(exercise_ids), link_from_row).await
}

pub async fn muscles_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Muscle>> {
    select_where_in(pool, "muscles", "id", Some(ids), muscle_from_row).await
}

pub async fn exercises_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Exercise>> {
    select_where_in(pool, "exercises", "id", Some(ids), exercise_from_row).await
}

pub async fn workouts_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Workout>> {
    select_where_in(pool, "workouts", "id", Some(ids), workout_from_row).await
}

pub async fn week_plans_for(pool: &SqlitePool, workout_ids: &[Uuid]) -> Result<Vec<WeekPlan>> {
    select_where_in(pool, "week_plans", "workout_id", Some(workout_ids), week_plan_from_row).await
}

pub async fn week_plan_sets_for(
    pool: &SqlitePool,
    week_plan_ids: &[Uuid],
) -> Result<Vec<WeekPlanSet>> {
    select_where_in(
        pool,
        "week_plan_sets",
        "week_plan_id",
        Some(week_plan_ids),
        week_plan_set_from_row,
    )
    .await
}

// ============ Full-table loaders (sync) ============

pub async fn all_exercises(pool: &SqlitePool) -> Result<Vec<Exercise>> {
    select_where_in(pool, "exercises", "id", None, exercise_from_row).await
}

pub async fn all_muscles(pool: &SqlitePool) -> Result<Vec<Muscle>> {
    select_where_in(pool, "muscles", "id", None, muscle_from_row).await
}

pub async fn all_exercise_muscles(pool: &SqlitePool) -> Result<Vec<ExerciseMuscle>> {
    select_where_in(pool, "exercise_muscles", "id", None, link_from_row).await
}

pub async fn all_workouts(pool: &SqlitePool) -> Result<Vec<Workout>> {
    select_where_in(pool, "workouts", "id", None, workout_from_row).await
}

pub async fn all_week_plans(pool: &SqlitePool) -> Result<Vec<WeekPlan>> {
    select_where_in(pool, "week_plans", "id", None, week_plan_from_row).await
}

pub async fn all_week_plan_sets(pool: &SqlitePool) -> Result<Vec<WeekPlanSet>> {
    select_where_in(pool, "week_plan_sets", "id", None, week_plan_set_from_row).await
}

// ============ Row decoding ============

fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let raw: String = row.try_get(col)?;
    Uuid::parse_str(&raw).with_context(|| format!("invalid uuid in {col}: {raw}"))
}

fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|r| Uuid::parse_str(&r).with_context(|| format!("invalid uuid in {col}: {r}")))
        .transpose()
}

fn ts(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {secs}"))
}

fn ts_col(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    ts(row.try_get(col)?)
}

fn opt_ts_col(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    let secs: Option<i64> = row.try_get(col)?;
    secs.map(ts).transpose()
}

pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn muscle_from_row(row: &SqliteRow) -> Result<Muscle> {
    Ok(Muscle {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        created_date: ts_col(row, "created_date")?,
        created_by_id: uuid_col(row, "created_by_id")?,
        last_updated: opt_ts_col(row, "last_updated")?,
        updated_by_id: opt_uuid_col(row, "updated_by_id")?,
    })
}

fn exercise_from_row(row: &SqliteRow) -> Result<Exercise> {
    Ok(Exercise {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        kind: row.try_get("type")?,
        created_date: ts_col(row, "created_date")?,
        created_by_id: uuid_col(row, "created_by_id")?,
        last_updated: opt_ts_col(row, "last_updated")?,
        updated_by_id: opt_uuid_col(row, "updated_by_id")?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<ExerciseMuscle> {
    Ok(ExerciseMuscle {
        id: uuid_col(row, "id")?,
        exercise_id: uuid_col(row, "exercise_id")?,
        muscle_id: uuid_col(row, "muscle_id")?,
    })
}

fn workout_from_row(row: &SqliteRow) -> Result<Workout> {
    Ok(Workout {
        id: uuid_col(row, "id")?,
        exercise_id: uuid_col(row, "exercise_id")?,
        user_id: uuid_col(row, "user_id")?,
        created_date: ts_col(row, "created_date")?,
        created_by_id: uuid_col(row, "created_by_id")?,
        last_updated: opt_ts_col(row, "last_updated")?,
        updated_by_id: opt_uuid_col(row, "updated_by_id")?,
    })
}

fn week_plan_from_row(row: &SqliteRow) -> Result<WeekPlan> {
    let time: String = row.try_get("time")?;
    Ok(WeekPlan {
        id: uuid_col(row, "id")?,
        workout_id: uuid_col(row, "workout_id")?,
        date_of_week: row.try_get("date_of_week")?,
        time: NaiveTime::parse_from_str(&time, "%H:%M:%S")
            .with_context(|| format!("invalid week plan time: {time}"))?,
        created_date: ts_col(row, "created_date")?,
        created_by_id: uuid_col(row, "created_by_id")?,
        last_updated: opt_ts_col(row, "last_updated")?,
        updated_by_id: opt_uuid_col(row, "updated_by_id")?,
    })
}

fn week_plan_set_from_row(row: &SqliteRow) -> Result<WeekPlanSet> {
    Ok(WeekPlanSet {
        id: uuid_col(row, "id")?,
        week_plan_id: uuid_col(row, "week_plan_id")?,
        value: row.try_get("value")?,
        created_date: ts_col(row, "created_date")?,
        created_by_id: uuid_col(row, "created_by_id")?,
        last_updated: opt_ts_col(row, "last_updated")?,
        updated_by_id: opt_uuid_col(row, "updated_by_id")?,
    })
}
