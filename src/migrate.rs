use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Creates every table in both databases. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_relational(&pool).await?;
    pool.close().await;

    let documents = db::connect_documents(config).await?;
    migrate_documents(&documents).await?;
    documents.close().await;

    Ok(())
}

/// Normalized tables plus the search index.
pub async fn migrate_relational(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS muscles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_date INTEGER NOT NULL,
            created_by_id TEXT NOT NULL,
            last_updated INTEGER,
            updated_by_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exercises (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL DEFAULT '',
            created_date INTEGER NOT NULL,
            created_by_id TEXT NOT NULL,
            last_updated INTEGER,
            updated_by_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exercise_muscles (
            id TEXT PRIMARY KEY,
            exercise_id TEXT NOT NULL,
            muscle_id TEXT NOT NULL,
            UNIQUE(exercise_id, muscle_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workouts (
            id TEXT PRIMARY KEY,
            exercise_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_date INTEGER NOT NULL,
            created_by_id TEXT NOT NULL,
            last_updated INTEGER,
            updated_by_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS week_plans (
            id TEXT PRIMARY KEY,
            workout_id TEXT NOT NULL,
            date_of_week TEXT NOT NULL,
            time TEXT NOT NULL,
            created_date INTEGER NOT NULL,
            created_by_id TEXT NOT NULL,
            last_updated INTEGER,
            updated_by_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS week_plan_sets (
            id TEXT PRIMARY KEY,
            week_plan_id TEXT NOT NULL,
            value INTEGER NOT NULL,
            created_date INTEGER NOT NULL,
            created_by_id TEXT NOT NULL,
            last_updated INTEGER,
            updated_by_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='search_entries'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE search_entries USING fts5(
                kind UNINDEXED,
                entity_id UNINDEXED,
                name,
                description,
                type,
                muscles
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exercise_muscles_exercise ON exercise_muscles(exercise_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workouts_exercise ON workouts(exercise_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_week_plans_workout ON week_plans(workout_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_week_plan_sets_plan ON week_plan_sets(week_plan_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Document collections: one JSON body per row, keyed by entity id.
pub async fn migrate_documents(pool: &SqlitePool) -> Result<()> {
    for table in ["exercise_documents", "workout_documents"] {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (id TEXT PRIMARY KEY, body TEXT NOT NULL)"
        ))
        .execute(pool)
        .await?;
    }
    Ok(())
}
