//! Rebuilding the derived stores from the relational store.
//!
//! A sync reads whole tables plus two levels of relations, builds the
//! denormalized documents with [`crate::join`], and replaces the target
//! collection wholesale. It is idempotent but not incremental: writes that
//! land while a sync runs may be missed until the next one.
//!
//! Before touching the document store, the sync checks it is reachable with
//! a bounded retry loop; after the last failed attempt it aborts with
//! [`JournalError::Unreachable`].

use anyhow::Result;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::document::DocumentStore;
use crate::error::JournalError;
use crate::join::{exercise_documents, workout_documents};
use crate::models::WorkoutDocument;
use crate::relational;
use crate::search::{SearchEntry, SearchIndex, SearchKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }
}

/// Pings the document store until it answers or the attempts run out.
pub async fn wait_for_document_store(store: &dyn DocumentStore, retry: &RetryPolicy) -> Result<()> {
    for attempt in 1..=retry.max_attempts {
        match tokio::time::timeout(retry.attempt_timeout, store.ping()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => warn!(attempt, error = %e, "document store ping failed"),
            Err(_) => warn!(
                attempt,
                timeout_ms = retry.attempt_timeout.as_millis() as u64,
                "document store ping timed out"
            ),
        }
        if attempt < retry.max_attempts {
            tokio::time::sleep(retry.delay).await;
        }
    }

    Err(JournalError::Unreachable {
        dependency: "document store".to_string(),
        attempts: retry.max_attempts,
    }
    .into())
}

pub async fn sync_exercises_to_documents(
    pool: &SqlitePool,
    store: &dyn DocumentStore,
    retry: &RetryPolicy,
) -> Result<u64> {
    wait_for_document_store(store, retry).await?;

    let exercises = relational::all_exercises(pool).await?;
    let links = relational::all_exercise_muscles(pool).await?;
    let muscles = relational::all_muscles(pool).await?;

    let docs = exercise_documents(exercises, links, muscles);
    let count = store.replace_exercises(docs).await?;
    info!(count, "synced exercises to document store");
    Ok(count)
}

pub async fn sync_workouts_to_documents(
    pool: &SqlitePool,
    store: &dyn DocumentStore,
    retry: &RetryPolicy,
) -> Result<u64> {
    wait_for_document_store(store, retry).await?;

    let docs = load_workout_documents(pool).await?;
    let count = store.replace_workouts(docs).await?;
    info!(count, "synced workouts to document store");
    Ok(count)
}

/// Rebuilds the search entries of one kind from the relational store.
pub async fn sync_search_index(
    pool: &SqlitePool,
    index: &dyn SearchIndex,
    kind: SearchKind,
) -> Result<u64> {
    let entries: Vec<SearchEntry> = match kind {
        SearchKind::Exercises => {
            let exercises = relational::all_exercises(pool).await?;
            let links = relational::all_exercise_muscles(pool).await?;
            let muscles = relational::all_muscles(pool).await?;
            exercise_documents(exercises, links, muscles)
                .iter()
                .map(SearchEntry::from_exercise)
                .collect()
        }
        SearchKind::Workouts => load_workout_documents(pool)
            .await?
            .iter()
            .filter_map(SearchEntry::from_workout)
            .collect(),
    };

    let count = index.rebuild(kind, entries).await?;
    info!(kind = kind.as_str(), count, "rebuilt search entries");
    Ok(count)
}

async fn load_workout_documents(pool: &SqlitePool) -> Result<Vec<WorkoutDocument>> {
    let workouts = relational::all_workouts(pool).await?;
    let exercises = relational::all_exercises(pool).await?;
    let links = relational::all_exercise_muscles(pool).await?;
    let muscles = relational::all_muscles(pool).await?;
    let plans = relational::all_week_plans(pool).await?;
    let sets = relational::all_week_plan_sets(pool).await?;
    Ok(workout_documents(workouts, exercises, links, muscles, plans, sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocumentStore;
    use crate::models::{ExerciseDocument, Listing};
    use crate::query::{ExerciseQuery, IdSet, WorkoutQuery};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` pings, then behaves like the inner store.
    struct FlakyStore {
        inner: InMemoryDocumentStore,
        failures: u32,
        pings: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryDocumentStore::new(),
                failures,
                pings: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn ping(&self) -> Result<()> {
            let n = self.pings.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
        async fn find_exercises(
            &self,
            query: &ExerciseQuery,
            ids: &IdSet,
        ) -> Result<Listing<ExerciseDocument>> {
            self.inner.find_exercises(query, ids).await
        }
        async fn find_workouts(
            &self,
            query: &WorkoutQuery,
            ids: &IdSet,
        ) -> Result<Listing<WorkoutDocument>> {
            self.inner.find_workouts(query, ids).await
        }
        async fn replace_exercises(&self, docs: Vec<ExerciseDocument>) -> Result<u64> {
            self.inner.replace_exercises(docs).await
        }
        async fn replace_workouts(&self, docs: Vec<WorkoutDocument>) -> Result<u64> {
            self.inner.replace_workouts(docs).await
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recovers_within_attempts() {
        let store = FlakyStore::new(2);
        wait_for_document_store(&store, &quick()).await.unwrap();
        assert_eq!(store.pings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_after_attempts() {
        let store = FlakyStore::new(10);
        let err = wait_for_document_store(&store, &quick()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JournalError>(),
            Some(JournalError::Unreachable { attempts: 3, .. })
        ));
        assert_eq!(store.pings.load(Ordering::SeqCst), 3);
    }
}
