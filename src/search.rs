//! Search index used to resolve free text into candidate ids.
//!
//! The index is a partial projection (name, description, type, muscle names)
//! and never a source of truth: a query only ever yields ids, which the
//! aggregator feeds into either read path as an id filter. Failures here are
//! never fatal to a read.
//!
//! [`FtsSearchIndex`] keeps entries in an SQLite FTS5 table next to the
//! relational data. Each whitespace-separated term becomes a quoted prefix
//! query (`"squat"*`) and terms are joined with `OR`, so partial words and
//! any-field matches both hit. Results are ranked by bm25.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::models::{ExerciseDocument, WorkoutDocument};

/// Which collection an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Exercises,
    Workouts,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Exercises => "exercises",
            SearchKind::Workouts => "workouts",
        }
    }
}

/// One indexed row. A workout is indexed under its exercise's text.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchEntry {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub muscles: Vec<String>,
}

impl SearchEntry {
    pub fn from_exercise(doc: &ExerciseDocument) -> Self {
        Self {
            id: doc.exercise.id,
            name: doc.exercise.name.clone(),
            description: doc.exercise.description.clone(),
            kind: doc.exercise.kind.clone(),
            muscles: doc.muscles.iter().map(|m| m.name.clone()).collect(),
        }
    }

    /// `None` when the workout's exercise no longer exists.
    pub fn from_workout(doc: &WorkoutDocument) -> Option<Self> {
        doc.exercise.as_ref().map(|exercise| Self {
            id: doc.workout.id,
            ..Self::from_exercise(exercise)
        })
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Ranked ids of entries of `kind` matching `term`, at most `limit`.
    async fn search_ids(&self, kind: SearchKind, term: &str, limit: i64) -> Result<Vec<Uuid>>;

    /// Replaces every entry of `kind`. Returns the number indexed.
    async fn rebuild(&self, kind: SearchKind, entries: Vec<SearchEntry>) -> Result<u64>;
}

// ============ FTS5 ============

pub struct FtsSearchIndex {
    pool: SqlitePool,
}

impl FtsSearchIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Turns free text into an FTS5 MATCH expression. Quotes are stripped so
/// user input can never produce FTS syntax; `None` when nothing remains.
pub fn match_expression(term: &str) -> Option<String> {
    let parts: Vec<String> = term
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\"*"))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" OR "))
    }
}

#[async_trait]
impl SearchIndex for FtsSearchIndex {
    async fn search_ids(&self, kind: SearchKind, term: &str, limit: i64) -> Result<Vec<Uuid>> {
        let Some(expr) = match_expression(term) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT entity_id
            FROM search_entries
            WHERE search_entries MATCH ? AND kind = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(expr)
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // Entries are written by `rebuild` only, so ids always parse.
        Ok(rows
            .iter()
            .filter_map(|row| Uuid::parse_str(row.get::<&str, _>("entity_id")).ok())
            .collect())
    }

    async fn rebuild(&self, kind: SearchKind, entries: Vec<SearchEntry>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM search_entries WHERE kind = ?")
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;

        for entry in &entries {
            sqlx::query(
                "INSERT INTO search_entries (kind, entity_id, name, description, type, muscles) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(kind.as_str())
            .bind(entry.id.to_string())
            .bind(&entry.name)
            .bind(&entry.description)
            .bind(&entry.kind)
            .bind(entry.muscles.join(" "))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(entries.len() as u64)
    }
}

// ============ Disabled ============

/// Stand-in when `[search] enabled = false`. Every call fails, which readers
/// treat as "no candidates".
pub struct DisabledSearchIndex;

#[async_trait]
impl SearchIndex for DisabledSearchIndex {
    async fn search_ids(&self, _kind: SearchKind, _term: &str, _limit: i64) -> Result<Vec<Uuid>> {
        bail!("search index is disabled")
    }

    async fn rebuild(&self, _kind: SearchKind, _entries: Vec<SearchEntry>) -> Result<u64> {
        bail!("search index is disabled")
    }
}

/// Picks the index implementation described by `[search]`.
pub fn open_search_index(config: &SearchConfig, pool: &SqlitePool) -> Arc<dyn SearchIndex> {
    if config.enabled {
        Arc::new(FtsSearchIndex::new(pool.clone()))
    } else {
        Arc::new(DisabledSearchIndex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_relational;
    use tempfile::TempDir;

    fn entry(name: &str, muscles: &[&str]) -> SearchEntry {
        SearchEntry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: format!("{name} for beginners"),
            kind: "strength".to_string(),
            muscles: muscles.iter().map(|m| m.to_string()).collect(),
        }
    }

    async fn index() -> (TempDir, FtsSearchIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("journal.sqlite")).await.unwrap();
        migrate_relational(&pool).await.unwrap();
        (tmp, FtsSearchIndex::new(pool))
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(match_expression("squat"), Some("\"squat\"*".to_string()));
        assert_eq!(
            match_expression("  front \"squat  "),
            Some("\"front\"* OR \"squat\"*".to_string())
        );
        assert_eq!(match_expression("   "), None);
        assert_eq!(match_expression("\"\""), None);
    }

    #[tokio::test]
    async fn test_prefix_and_muscle_match() {
        let (_tmp, index) = index().await;
        let squat = entry("Back Squat", &["quadriceps", "glutes"]);
        let curl = entry("Biceps Curl", &["biceps"]);
        index
            .rebuild(SearchKind::Exercises, vec![squat.clone(), curl.clone()])
            .await
            .unwrap();

        let hits = index
            .search_ids(SearchKind::Exercises, "squ", 10)
            .await
            .unwrap();
        assert_eq!(hits, vec![squat.id]);

        let hits = index
            .search_ids(SearchKind::Exercises, "glutes", 10)
            .await
            .unwrap();
        assert_eq!(hits, vec![squat.id]);

        // Other kinds are isolated.
        let hits = index
            .search_ids(SearchKind::Workouts, "squat", 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_entries() {
        let (_tmp, index) = index().await;
        let squat = entry("Squat", &[]);
        index
            .rebuild(SearchKind::Exercises, vec![squat])
            .await
            .unwrap();
        index.rebuild(SearchKind::Exercises, Vec::new()).await.unwrap();

        let hits = index
            .search_ids(SearchKind::Exercises, "squat", 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_index_errors() {
        let result = DisabledSearchIndex
            .search_ids(SearchKind::Exercises, "squat", 10)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_search_index_follows_config() {
        let (_tmp, fts) = index().await;
        let entries = vec![entry("Back Squat", &["Quadriceps"])];

        let enabled = open_search_index(&SearchConfig::default(), &fts.pool);
        assert_eq!(enabled.rebuild(SearchKind::Exercises, entries.clone()).await.unwrap(), 1);

        let disabled = SearchConfig {
            enabled: false,
            ..SearchConfig::default()
        };
        let index = open_search_index(&disabled, &fts.pool);
        assert!(index.rebuild(SearchKind::Exercises, entries).await.is_err());
    }
}
