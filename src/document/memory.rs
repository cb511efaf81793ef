//! In-memory [`DocumentStore`] for tests and embedding.
//!
//! Collections are plain `Vec`s behind `tokio::sync::RwLock`. Filters, sort
//! and pagination are evaluated in Rust with the same semantics as the
//! SQLite store: insertion order when unsorted, ties broken by id.

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use tokio::sync::RwLock;

use super::DocumentStore;
use crate::models::{ExerciseDocument, Listing, WorkoutDocument};
use crate::query::{ExerciseQuery, IdSet, PageRequest, WorkoutQuery};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    exercises: RwLock<Vec<ExerciseDocument>>,
    workouts: RwLock<Vec<WorkoutDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn listing<T>(mut items: Vec<T>, cmp: Option<impl Fn(&T, &T) -> Ordering>, page: Option<PageRequest>) -> Listing<T> {
    if let Some(cmp) = cmp {
        items.sort_by(cmp);
    }
    let total = items.len() as i64;
    Listing {
        items: PageRequest::slice(page, items),
        total,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_exercises(
        &self,
        query: &ExerciseQuery,
        ids: &IdSet,
    ) -> Result<Listing<ExerciseDocument>> {
        let matched: Vec<ExerciseDocument> = self
            .exercises
            .read()
            .await
            .iter()
            .filter(|d| ids.admits(&d.exercise.id) && query.filter.matches(&d.exercise))
            .cloned()
            .collect();
        let cmp = query.sort.map(|sort| {
            move |a: &ExerciseDocument, b: &ExerciseDocument| {
                sort.compare(&a.exercise, &b.exercise)
                    .then(a.exercise.id.cmp(&b.exercise.id))
            }
        });
        Ok(listing(matched, cmp, query.page))
    }

    async fn find_workouts(
        &self,
        query: &WorkoutQuery,
        ids: &IdSet,
    ) -> Result<Listing<WorkoutDocument>> {
        let matched: Vec<WorkoutDocument> = self
            .workouts
            .read()
            .await
            .iter()
            .filter(|d| ids.admits(&d.workout.id) && query.filter.matches(&d.workout))
            .cloned()
            .collect();
        let cmp = query.sort.map(|sort| {
            move |a: &WorkoutDocument, b: &WorkoutDocument| {
                sort.compare(&a.workout, &b.workout)
                    .then(a.workout.id.cmp(&b.workout.id))
            }
        });
        Ok(listing(matched, cmp, query.page))
    }

    async fn replace_exercises(&self, docs: Vec<ExerciseDocument>) -> Result<u64> {
        let count = docs.len() as u64;
        *self.exercises.write().await = docs;
        Ok(count)
    }

    async fn replace_workouts(&self, docs: Vec<WorkoutDocument>) -> Result<u64> {
        let count = docs.len() as u64;
        *self.workouts.write().await = docs;
        Ok(count)
    }
}
