//! Denormalized document store.
//!
//! The [`DocumentStore`] trait is the read replica the aggregator tries
//! first. It holds one document per exercise and per workout with the full
//! nested graph embedded, is rebuilt wholesale by synchronization, and may be
//! stale, empty or unreachable at any time.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ExerciseDocument, Listing, WorkoutDocument};
use crate::query::{ExerciseQuery, IdSet, WorkoutQuery};

pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Abstract document store backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](DocumentStore::ping) | Connectivity check used by sync retries |
/// | [`find_exercises`](DocumentStore::find_exercises) | Filtered, sorted, paged exercise documents |
/// | [`find_workouts`](DocumentStore::find_workouts) | Filtered, sorted, paged workout documents |
/// | [`replace_exercises`](DocumentStore::replace_exercises) | Delete all, insert all |
/// | [`replace_workouts`](DocumentStore::replace_workouts) | Delete all, insert all |
///
/// `find_*` take the effective id set separately from the query because the
/// aggregator unions explicit ids with search candidates before calling.
/// `total` in the returned [`Listing`] counts the filtered set before
/// pagination.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_exercises(
        &self,
        query: &ExerciseQuery,
        ids: &IdSet,
    ) -> Result<Listing<ExerciseDocument>>;

    async fn find_workouts(
        &self,
        query: &WorkoutQuery,
        ids: &IdSet,
    ) -> Result<Listing<WorkoutDocument>>;

    /// Replaces the whole exercise collection. The delete and the insert are
    /// not atomic as a pair.
    async fn replace_exercises(&self, docs: Vec<ExerciseDocument>) -> Result<u64>;

    async fn replace_workouts(&self, docs: Vec<WorkoutDocument>) -> Result<u64>;
}
