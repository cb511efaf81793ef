//! Loading a JSON fixture into the relational store.
//!
//! ```json
//! {
//!   "muscles":   [{ "id": "…", "name": "Chest" }],
//!   "exercises": [{ "id": "…", "name": "Bench Press", "type": "strength", "muscleIds": ["…"] }],
//!   "workouts":  [{ "exerciseId": "…", "userId": "…",
//!                   "weekPlans": [{ "dateOfWeek": "Monday", "time": "07:00:00",
//!                                   "weekPlanSets": [{ "value": 5 }] }] }]
//! }
//! ```
//!
//! A collection whose table already has rows is skipped entirely, so seeding
//! twice is harmless.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::write::{self, ExerciseInput, MuscleInput, WorkoutInput};

#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub muscles: Vec<MuscleInput>,
    #[serde(default)]
    pub exercises: Vec<ExerciseInput>,
    #[serde(default)]
    pub workouts: Vec<WorkoutInput>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SeedReport {
    pub muscles: usize,
    pub exercises: usize,
    pub workouts: usize,
    /// Tables left alone because they already held rows.
    pub skipped: Vec<&'static str>,
}

pub async fn seed_from_file(pool: &SqlitePool, path: &Path) -> Result<SeedReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;
    let fixture: Fixture =
        serde_json::from_str(&content).with_context(|| "Failed to parse fixture file")?;
    seed(pool, fixture).await
}

pub async fn seed(pool: &SqlitePool, fixture: Fixture) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let actor = Uuid::nil();

    if has_rows(pool, "muscles").await? {
        info!("muscles already seeded, skipping");
        report.skipped.push("muscles");
    } else {
        for input in fixture.muscles {
            write::create_muscle(pool, input, actor).await?;
            report.muscles += 1;
        }
    }

    if has_rows(pool, "exercises").await? {
        info!("exercises already seeded, skipping");
        report.skipped.push("exercises");
    } else {
        for input in fixture.exercises {
            let name = input.name.clone();
            write::create_exercise(pool, input, actor)
                .await
                .with_context(|| format!("Failed to seed exercise '{name}'"))?;
            report.exercises += 1;
        }
    }

    if has_rows(pool, "workouts").await? {
        info!("workouts already seeded, skipping");
        report.skipped.push("workouts");
    } else {
        for input in fixture.workouts {
            write::create_workout(pool, input, actor).await?;
            report.workouts += 1;
        }
    }

    Ok(report)
}

async fn has_rows(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {table})"))
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_relational;
    use tempfile::TempDir;

    const FIXTURE: &str = r#"{
        "muscles": [
            { "id": "6f1c1f0e-3a51-4a3e-9d53-1d2b8f7c0a01", "name": "Chest" }
        ],
        "exercises": [
            { "name": "Bench Press", "type": "strength",
              "muscleIds": ["6f1c1f0e-3a51-4a3e-9d53-1d2b8f7c0a01"] }
        ]
    }"#;

    #[tokio::test]
    async fn test_seed_skips_populated_tables() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("journal.sqlite")).await.unwrap();
        migrate_relational(&pool).await.unwrap();
        let path = tmp.path().join("fixture.json");
        std::fs::write(&path, FIXTURE).unwrap();

        let first = seed_from_file(&pool, &path).await.unwrap();
        assert_eq!(first.muscles, 1);
        assert_eq!(first.exercises, 1);
        assert_eq!(first.workouts, 0);
        assert!(first.skipped.is_empty());

        let second = seed_from_file(&pool, &path).await.unwrap();
        assert_eq!(second.muscles, 0);
        assert_eq!(second.skipped, vec!["muscles", "exercises"]);
    }
}
