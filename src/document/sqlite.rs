//! SQLite-backed [`DocumentStore`].
//!
//! Documents are serialized with `serde_json` into a `body` column, one table
//! per collection, in a database file separate from the relational store.
//! Filters and sort keys are evaluated with `json_extract` on the body, and
//! timestamps are compared as RFC 3339 strings (whole seconds, `Z` suffix),
//! which order the same way as the instants they encode.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::DocumentStore;
use crate::models::{ExerciseDocument, Listing, WorkoutDocument};
use crate::query::{
    ExerciseFilter, ExerciseQuery, IdSet, PageRequest, Sort, SortKey, SortOrder, WorkoutFilter,
    WorkoutQuery,
};
use crate::relational::{push_contains, push_eq, push_ids, push_order_by, push_page};

const EXERCISES: &str = "exercise_documents";
const WORKOUTS: &str = "workout_documents";

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find<T: DeserializeOwned>(
        &self,
        table: &str,
        ids: &IdSet,
        filter: impl Fn(&mut QueryBuilder<'_, Sqlite>),
        sort: Option<(&'static str, SortOrder)>,
        page: Option<PageRequest>,
    ) -> Result<Listing<T>> {
        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE 1=1"));
        push_ids(&mut count, "id", ids);
        filter(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new(format!("SELECT body FROM {table} WHERE 1=1"));
        push_ids(&mut qb, "id", ids);
        filter(&mut qb);
        let sort_expr = sort.map(|(path, order)| (json_field(path), order));
        push_order_by(
            &mut qb,
            sort_expr.as_ref().map(|(expr, order)| (expr.as_str(), *order)),
            "id",
        );
        push_page(&mut qb, page);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(|row| {
                let body: String = row.try_get("body")?;
                serde_json::from_str(&body)
                    .with_context(|| format!("malformed document in {table}"))
            })
            .collect::<Result<Vec<T>>>()?;

        Ok(Listing { items, total })
    }

    async fn replace<T: Serialize + Sync>(
        &self,
        table: &str,
        docs: &[T],
        id_of: fn(&T) -> String,
    ) -> Result<u64> {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        for doc in docs {
            let body = serde_json::to_string(doc)?;
            sqlx::query(&format!("INSERT INTO {table} (id, body) VALUES (?, ?)"))
                .bind(id_of(doc))
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(docs.len() as u64)
    }
}

/// `json_extract` over the document body. `path` is always a static
/// allow-listed JSON path.
fn json_field(path: &str) -> String {
    format!("json_extract(body, '{path}')")
}

fn json_ts(d: DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn json_sort<K: SortKey>(sort: Sort<K>) -> (&'static str, SortOrder) {
    (sort.key.json_path(), sort.order)
}

fn push_exercise_filter(qb: &mut QueryBuilder<'_, Sqlite>, f: &ExerciseFilter) {
    push_contains(qb, &json_field("$.name"), f.name.clone());
    push_contains(qb, &json_field("$.description"), f.description.clone());
    push_contains(qb, &json_field("$.type"), f.kind.clone());
    push_eq(qb, &json_field("$.createdDate"), f.created_date.map(json_ts));
    push_eq(qb, &json_field("$.lastUpdated"), f.last_updated.map(json_ts));
}

fn push_workout_filter(qb: &mut QueryBuilder<'_, Sqlite>, f: &WorkoutFilter) {
    push_eq(qb, &json_field("$.exerciseId"), f.exercise_id.map(|id| id.to_string()));
    push_eq(qb, &json_field("$.userId"), f.user_id.map(|id| id.to_string()));
    push_eq(qb, &json_field("$.createdDate"), f.created_date.map(json_ts));
    push_eq(qb, &json_field("$.lastUpdated"), f.last_updated.map(json_ts));
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_exercises(
        &self,
        query: &ExerciseQuery,
        ids: &IdSet,
    ) -> Result<Listing<ExerciseDocument>> {
        self.find(
            EXERCISES,
            ids,
            |qb| push_exercise_filter(qb, &query.filter),
            query.sort.map(json_sort),
            query.page,
        )
        .await
    }

    async fn find_workouts(
        &self,
        query: &WorkoutQuery,
        ids: &IdSet,
    ) -> Result<Listing<WorkoutDocument>> {
        self.find(
            WORKOUTS,
            ids,
            |qb| push_workout_filter(qb, &query.filter),
            query.sort.map(json_sort),
            query.page,
        )
        .await
    }

    async fn replace_exercises(&self, docs: Vec<ExerciseDocument>) -> Result<u64> {
        self.replace(EXERCISES, &docs, |d: &ExerciseDocument| d.exercise.id.to_string())
            .await
    }

    async fn replace_workouts(&self, docs: Vec<WorkoutDocument>) -> Result<u64> {
        self.replace(WORKOUTS, &docs, |d: &WorkoutDocument| d.workout.id.to_string())
            .await
    }
}
