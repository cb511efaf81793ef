//! Mutations against the relational store.
//!
//! Writes never touch the document store or the search index; both stay
//! stale until the next sync. New rows get `last_updated = created_date`.
//! A missing target surfaces as [`JournalError::NotFound`].

use anyhow::Result;
use chrono::NaiveTime;
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::JournalError;
use crate::models::{now, Exercise, Muscle, Workout};
use crate::relational::{self, format_time};

// ============ Payloads ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuscleInput {
    /// Client-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub muscle_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub exercise_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub week_plans: Vec<WeekPlanInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlanInput {
    pub date_of_week: String,
    pub time: NaiveTime,
    #[serde(default)]
    pub week_plan_sets: Vec<WeekPlanSetInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeekPlanSetInput {
    pub value: i32,
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(JournalError::BadRequest("name must not be empty".to_string()).into());
    }
    Ok(())
}

fn not_found(entity: &str, id: Uuid) -> anyhow::Error {
    JournalError::NotFound(format!("{entity} with id {id} does not exist")).into()
}

/// A client-chosen id that is already taken is the caller's mistake.
fn reject_duplicate(entity: &'static str, id: Uuid) -> impl FnOnce(sqlx::Error) -> anyhow::Error {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return JournalError::BadRequest(format!("{entity} with id {id} already exists"))
                    .into();
            }
        }
        err.into()
    }
}

// ============ Muscles ============

pub async fn create_muscle(pool: &SqlitePool, input: MuscleInput, actor: Uuid) -> Result<Muscle> {
    require_name(&input.name)?;
    let ts = now();
    let muscle = Muscle {
        id: input.id.unwrap_or_else(Uuid::new_v4),
        name: input.name,
        created_date: ts,
        created_by_id: actor,
        last_updated: Some(ts),
        updated_by_id: Some(actor),
    };

    sqlx::query(
        "INSERT INTO muscles (id, name, created_date, created_by_id, last_updated, updated_by_id) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(muscle.id.to_string())
    .bind(&muscle.name)
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .execute(pool)
    .await
    .map_err(reject_duplicate("Muscle", muscle.id))?;

    Ok(muscle)
}

pub async fn update_muscle(
    pool: &SqlitePool,
    id: Uuid,
    input: MuscleInput,
    actor: Uuid,
) -> Result<Muscle> {
    require_name(&input.name)?;
    let mut muscle = relational::muscles_by_ids(pool, &[id])
        .await?
        .pop()
        .ok_or_else(|| not_found("Muscle", id))?;

    let ts = now();
    sqlx::query("UPDATE muscles SET name = ?, last_updated = ?, updated_by_id = ? WHERE id = ?")
        .bind(&input.name)
        .bind(ts.timestamp())
        .bind(actor.to_string())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    muscle.name = input.name;
    muscle.last_updated = Some(ts);
    muscle.updated_by_id = Some(actor);
    Ok(muscle)
}

/// Deletes a muscle and its links to exercises.
pub async fn delete_muscle(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM muscles WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(not_found("Muscle", id));
    }
    sqlx::query("DELETE FROM exercise_muscles WHERE muscle_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

// ============ Exercises ============

async fn check_muscles_exist(pool: &SqlitePool, muscle_ids: &[Uuid]) -> Result<()> {
    let found = relational::muscles_by_ids(pool, muscle_ids).await?;
    if let Some(missing) = muscle_ids.iter().find(|id| !found.iter().any(|m| m.id == **id)) {
        return Err(JournalError::BadRequest(format!("unknown muscle id {missing}")).into());
    }
    Ok(())
}

async fn link_muscles(
    tx: &mut Transaction<'_, Sqlite>,
    exercise_id: Uuid,
    muscle_ids: &[Uuid],
) -> Result<()> {
    for muscle_id in muscle_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO exercise_muscles (id, exercise_id, muscle_id) VALUES (?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(exercise_id.to_string())
        .bind(muscle_id.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn create_exercise(
    pool: &SqlitePool,
    input: ExerciseInput,
    actor: Uuid,
) -> Result<Exercise> {
    require_name(&input.name)?;
    check_muscles_exist(pool, &input.muscle_ids).await?;

    let ts = now();
    let exercise = Exercise {
        id: input.id.unwrap_or_else(Uuid::new_v4),
        name: input.name,
        description: input.description,
        kind: input.kind,
        created_date: ts,
        created_by_id: actor,
        last_updated: Some(ts),
        updated_by_id: Some(actor),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO exercises (id, name, description, type, created_date, created_by_id, \
         last_updated, updated_by_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(exercise.id.to_string())
    .bind(&exercise.name)
    .bind(&exercise.description)
    .bind(&exercise.kind)
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .execute(&mut *tx)
    .await
    .map_err(reject_duplicate("Exercise", exercise.id))?;
    link_muscles(&mut tx, exercise.id, &input.muscle_ids).await?;
    tx.commit().await?;

    Ok(exercise)
}

/// Updates scalar fields and replaces the muscle links.
pub async fn update_exercise(
    pool: &SqlitePool,
    id: Uuid,
    input: ExerciseInput,
    actor: Uuid,
) -> Result<Exercise> {
    require_name(&input.name)?;
    let mut exercise = relational::exercises_by_ids(pool, &[id])
        .await?
        .pop()
        .ok_or_else(|| not_found("Exercise", id))?;
    check_muscles_exist(pool, &input.muscle_ids).await?;

    let ts = now();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE exercises SET name = ?, description = ?, type = ?, last_updated = ?, \
         updated_by_id = ? WHERE id = ?",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(&input.kind)
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM exercise_muscles WHERE exercise_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    link_muscles(&mut tx, id, &input.muscle_ids).await?;
    tx.commit().await?;

    exercise.name = input.name;
    exercise.description = input.description;
    exercise.kind = input.kind;
    exercise.last_updated = Some(ts);
    exercise.updated_by_id = Some(actor);
    Ok(exercise)
}

/// Deletes an exercise and its muscle links. With `delete_workouts`, the
/// exercise's workouts (and their week plans and sets) go too; otherwise
/// they are left pointing at a missing exercise.
pub async fn delete_exercise(pool: &SqlitePool, id: Uuid, delete_workouts: bool) -> Result<()> {
    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM exercises WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(not_found("Exercise", id));
    }
    sqlx::query("DELETE FROM exercise_muscles WHERE exercise_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    if delete_workouts {
        sqlx::query(
            "DELETE FROM week_plan_sets WHERE week_plan_id IN (SELECT wp.id FROM week_plans wp \
             JOIN workouts w ON w.id = wp.workout_id WHERE w.exercise_id = ?)",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM week_plans WHERE workout_id IN (SELECT id FROM workouts WHERE exercise_id = ?)",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM workouts WHERE exercise_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

// ============ Workouts ============

async fn require_exercise(pool: &SqlitePool, exercise_id: Uuid) -> Result<()> {
    if relational::exercises_by_ids(pool, &[exercise_id])
        .await?
        .is_empty()
    {
        return Err(not_found("Exercise", exercise_id));
    }
    Ok(())
}

/// Creates a workout with its week plans and sets in one transaction.
pub async fn create_workout(pool: &SqlitePool, input: WorkoutInput, actor: Uuid) -> Result<Workout> {
    require_exercise(pool, input.exercise_id).await?;

    let ts = now();
    let workout = Workout {
        id: input.id.unwrap_or_else(Uuid::new_v4),
        exercise_id: input.exercise_id,
        user_id: input.user_id,
        created_date: ts,
        created_by_id: actor,
        last_updated: Some(ts),
        updated_by_id: Some(actor),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO workouts (id, exercise_id, user_id, created_date, created_by_id, \
         last_updated, updated_by_id) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(workout.id.to_string())
    .bind(workout.exercise_id.to_string())
    .bind(workout.user_id.to_string())
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .execute(&mut *tx)
    .await
    .map_err(reject_duplicate("Workout", workout.id))?;

    for plan in &input.week_plans {
        let plan_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO week_plans (id, workout_id, date_of_week, time, created_date, \
             created_by_id, last_updated, updated_by_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(plan_id.to_string())
        .bind(workout.id.to_string())
        .bind(&plan.date_of_week)
        .bind(format_time(plan.time))
        .bind(ts.timestamp())
        .bind(actor.to_string())
        .bind(ts.timestamp())
        .bind(actor.to_string())
        .execute(&mut *tx)
        .await?;

        for set in &plan.week_plan_sets {
            sqlx::query(
                "INSERT INTO week_plan_sets (id, week_plan_id, value, created_date, \
                 created_by_id, last_updated, updated_by_id) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(plan_id.to_string())
            .bind(set.value)
            .bind(ts.timestamp())
            .bind(actor.to_string())
            .bind(ts.timestamp())
            .bind(actor.to_string())
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(workout)
}

/// Re-points a workout at another exercise or user. Week plans are kept.
pub async fn update_workout(
    pool: &SqlitePool,
    id: Uuid,
    exercise_id: Uuid,
    user_id: Uuid,
    actor: Uuid,
) -> Result<Workout> {
    let mut workout = relational::workouts_by_ids(pool, &[id])
        .await?
        .pop()
        .ok_or_else(|| not_found("Workout", id))?;
    require_exercise(pool, exercise_id).await?;

    let ts = now();
    sqlx::query(
        "UPDATE workouts SET exercise_id = ?, user_id = ?, last_updated = ?, updated_by_id = ? \
         WHERE id = ?",
    )
    .bind(exercise_id.to_string())
    .bind(user_id.to_string())
    .bind(ts.timestamp())
    .bind(actor.to_string())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    workout.exercise_id = exercise_id;
    workout.user_id = user_id;
    workout.last_updated = Some(ts);
    workout.updated_by_id = Some(actor);
    Ok(workout)
}

/// Deletes a workout with its week plans and their sets.
pub async fn delete_workout(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM workouts WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(not_found("Workout", id));
    }
    sqlx::query(
        "DELETE FROM week_plan_sets WHERE week_plan_id IN \
         (SELECT id FROM week_plans WHERE workout_id = ?)",
    )
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM week_plans WHERE workout_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_relational;
    use tempfile::TempDir;

    async fn pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("journal.sqlite")).await.unwrap();
        migrate_relational(&pool).await.unwrap();
        (tmp, pool)
    }

    fn muscle(name: &str) -> MuscleInput {
        MuscleInput {
            id: None,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_exercise_crud_with_muscles() {
        let (_tmp, pool) = pool().await;
        let chest = create_muscle(&pool, muscle("chest"), Uuid::nil()).await.unwrap();

        let bench = create_exercise(
            &pool,
            ExerciseInput {
                id: None,
                name: "Bench Press".into(),
                description: "flat".into(),
                kind: "strength".into(),
                muscle_ids: vec![chest.id],
            },
            Uuid::nil(),
        )
        .await
        .unwrap();

        let links = relational::exercise_muscles_for(&pool, &[bench.id]).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].muscle_id, chest.id);

        delete_exercise(&pool, bench.id, false).await.unwrap();
        assert!(relational::exercise_muscles_for(&pool, &[bench.id])
            .await
            .unwrap()
            .is_empty());

        let err = delete_exercise(&pool, bench.id, false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JournalError>(),
            Some(JournalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_muscle_rejected() {
        let (_tmp, pool) = pool().await;
        let err = create_exercise(
            &pool,
            ExerciseInput {
                id: None,
                name: "Row".into(),
                description: String::new(),
                kind: String::new(),
                muscle_ids: vec![Uuid::new_v4()],
            },
            Uuid::nil(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JournalError>(),
            Some(JournalError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_client_id_rejected() {
        let (_tmp, pool) = pool().await;
        let id = Uuid::new_v4();
        let chest = MuscleInput {
            id: Some(id),
            name: "Chest".into(),
        };
        create_muscle(&pool, chest.clone(), Uuid::nil()).await.unwrap();

        let err = create_muscle(&pool, chest, Uuid::nil()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JournalError>(),
            Some(JournalError::BadRequest(msg)) if msg.contains("already exists")
        ));

        let bench = ExerciseInput {
            id: Some(Uuid::new_v4()),
            name: "Bench Press".into(),
            description: String::new(),
            kind: String::new(),
            muscle_ids: vec![id],
        };
        create_exercise(&pool, bench.clone(), Uuid::nil()).await.unwrap();
        let err = create_exercise(&pool, bench, Uuid::nil()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JournalError>(),
            Some(JournalError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_workout_requires_exercise() {
        let (_tmp, pool) = pool().await;
        let err = create_workout(
            &pool,
            WorkoutInput {
                id: None,
                exercise_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                week_plans: Vec::new(),
            },
            Uuid::nil(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JournalError>(),
            Some(JournalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_workout_cascades() {
        let (_tmp, pool) = pool().await;
        let squat = create_exercise(
            &pool,
            ExerciseInput {
                id: None,
                name: "Squat".into(),
                description: String::new(),
                kind: "strength".into(),
                muscle_ids: Vec::new(),
            },
            Uuid::nil(),
        )
        .await
        .unwrap();
        let workout = create_workout(
            &pool,
            WorkoutInput {
                id: None,
                exercise_id: squat.id,
                user_id: Uuid::new_v4(),
                week_plans: vec![WeekPlanInput {
                    date_of_week: "Monday".into(),
                    time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
                    week_plan_sets: vec![WeekPlanSetInput { value: 5 }, WeekPlanSetInput { value: 5 }],
                }],
            },
            Uuid::nil(),
        )
        .await
        .unwrap();

        let plans = relational::week_plans_for(&pool, &[workout.id]).await.unwrap();
        assert_eq!(plans.len(), 1);
        let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();
        assert_eq!(
            relational::week_plan_sets_for(&pool, &plan_ids).await.unwrap().len(),
            2
        );

        delete_workout(&pool, workout.id).await.unwrap();
        assert!(relational::week_plans_for(&pool, &[workout.id])
            .await
            .unwrap()
            .is_empty());
        assert!(relational::week_plan_sets_for(&pool, &plan_ids)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_muscle_sets_last_updated() {
        let (_tmp, pool) = pool().await;
        let m = create_muscle(&pool, muscle("lats"), Uuid::nil()).await.unwrap();
        let actor = Uuid::new_v4();
        let updated = update_muscle(&pool, m.id, muscle("latissimus"), actor).await.unwrap();
        assert_eq!(updated.name, "latissimus");
        assert_eq!(updated.updated_by_id, Some(actor));

        let stored = relational::muscles_by_ids(&pool, &[m.id]).await.unwrap();
        assert_eq!(stored[0], updated);
    }
}
