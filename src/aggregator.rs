//! Dual-store read-through aggregation.
//!
//! A list query with includes first tries the document store under a time
//! budget. If it errors or runs out of time, the relational store answers
//! instead and the nested shape is rebuilt with in-memory joins. A query
//! without includes goes straight to the relational store.
//!
//! ```text
//! searchTerm ──▶ SearchIndex ──▶ candidate ids ∪ explicit ids
//!                                       │
//!            include? ──yes──▶ DocumentStore (timeout) ──ok──▶ Fast
//!               │                       │ err / timeout
//!               no                      ▼
//!               └──────────────▶ relational + joins ──▶ Fallback(reason)
//! ```
//!
//! Items and total always come from a single path. The losing document-store
//! future is dropped when the budget elapses, which cancels its query.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::document::DocumentStore;
use crate::join::{exercise_documents, project_exercise, project_workout, workout_documents};
use crate::models::{ExerciseResponse, Listing, WorkoutResponse};
use crate::query::{ExerciseIncludes, ExerciseQuery, IdSet, WorkoutIncludes, WorkoutQuery};
use crate::relational;
use crate::search::{SearchIndex, SearchKind};

/// Why the relational store answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No includes were requested; the document store was not contacted.
    NotRequested,
    Timeout,
    DocumentStore(String),
}

/// Which store produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPath {
    Fast,
    Fallback(FallbackReason),
}

impl ReadPath {
    pub fn is_fast(&self) -> bool {
        matches!(self, ReadPath::Fast)
    }
}

impl fmt::Display for ReadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadPath::Fast => write!(f, "document"),
            ReadPath::Fallback(FallbackReason::NotRequested) => write!(f, "relational"),
            ReadPath::Fallback(FallbackReason::Timeout) => write!(f, "relational (timeout)"),
            ReadPath::Fallback(FallbackReason::DocumentStore(e)) => {
                write!(f, "relational (document store: {e})")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregated<T> {
    pub items: Vec<T>,
    /// Size of the filtered set before pagination.
    pub total: i64,
    pub path: ReadPath,
}

impl<T> Aggregated<T> {
    pub fn into_listing(self) -> Listing<T> {
        Listing {
            items: self.items,
            total: self.total,
        }
    }
}

/// Telemetry hook called once per aggregated read.
pub trait ReadObserver: Send + Sync {
    fn observe(&self, entity: &'static str, path: &ReadPath, elapsed: Duration);
}

/// Default observer: one `tracing` event per read.
pub struct TracingObserver;

impl ReadObserver for TracingObserver {
    fn observe(&self, entity: &'static str, path: &ReadPath, elapsed: Duration) {
        match path {
            ReadPath::Fallback(FallbackReason::Timeout | FallbackReason::DocumentStore(_)) => {
                warn!(entity, path = %path, elapsed_ms = elapsed.as_millis() as u64, "served from fallback")
            }
            _ => debug!(entity, path = %path, elapsed_ms = elapsed.as_millis() as u64, "served"),
        }
    }
}

pub struct Aggregator {
    pool: SqlitePool,
    documents: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchIndex>,
    budget: Duration,
    search_limit: i64,
    observer: Arc<dyn ReadObserver>,
}

impl Aggregator {
    pub fn new(
        pool: SqlitePool,
        documents: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndex>,
        budget: Duration,
    ) -> Self {
        Self {
            pool,
            documents,
            search,
            budget,
            search_limit: 100,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn from_config(
        config: &Config,
        pool: SqlitePool,
        documents: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self::new(pool, documents, search, config.document_store.budget())
            .with_search_limit(config.search.limit)
    }

    pub fn with_search_limit(mut self, limit: i64) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ReadObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn exercises(&self, query: &ExerciseQuery) -> Result<Aggregated<ExerciseResponse>> {
        let started = Instant::now();
        let ids = self
            .candidate_ids(SearchKind::Exercises, query.search_term.as_deref(), &query.ids)
            .await;
        let include = ExerciseIncludes::from(&query.include);

        let reason = if query.include.is_empty() {
            FallbackReason::NotRequested
        } else {
            match self
                .fast(self.documents.find_exercises(query, &ids))
                .await
            {
                Ok(listing) => {
                    let listing =
                        listing.map(|doc| project_exercise(doc, include, query.muscles_sort));
                    return Ok(self.finish("exercises", listing, ReadPath::Fast, started));
                }
                Err(reason) => reason,
            }
        };

        let listing = relational::list_exercises(&self.pool, query, &ids)
            .await
            .context("relational exercise query failed")?;
        let total = listing.total;

        let (links, muscles) = if include.muscles {
            let exercise_ids: Vec<Uuid> = listing.items.iter().map(|e| e.id).collect();
            let links = relational::exercise_muscles_for(&self.pool, &exercise_ids).await?;
            let muscle_ids = distinct(links.iter().map(|l| l.muscle_id));
            let muscles = relational::muscles_by_ids(&self.pool, &muscle_ids).await?;
            (links, muscles)
        } else {
            (Vec::new(), Vec::new())
        };

        let items = exercise_documents(listing.items, links, muscles)
            .into_iter()
            .map(|doc| project_exercise(doc, include, query.muscles_sort))
            .collect();

        Ok(self.finish(
            "exercises",
            Listing { items, total },
            ReadPath::Fallback(reason),
            started,
        ))
    }

    pub async fn workouts(&self, query: &WorkoutQuery) -> Result<Aggregated<WorkoutResponse>> {
        let started = Instant::now();
        let ids = self
            .candidate_ids(SearchKind::Workouts, query.search_term.as_deref(), &query.ids)
            .await;
        let include = WorkoutIncludes::from(&query.include);

        let reason = if query.include.is_empty() {
            FallbackReason::NotRequested
        } else {
            match self.fast(self.documents.find_workouts(query, &ids)).await {
                Ok(listing) => {
                    let listing = listing.map(|doc| project_workout(doc, include));
                    return Ok(self.finish("workouts", listing, ReadPath::Fast, started));
                }
                Err(reason) => reason,
            }
        };

        let listing = relational::list_workouts(&self.pool, query, &ids)
            .await
            .context("relational workout query failed")?;
        let total = listing.total;

        let (exercises, links, muscles) = if include.exercise {
            let exercise_ids = distinct(listing.items.iter().map(|w| w.exercise_id));
            let exercises = relational::exercises_by_ids(&self.pool, &exercise_ids).await?;
            if include.exercise_muscles {
                let links = relational::exercise_muscles_for(&self.pool, &exercise_ids).await?;
                let muscle_ids = distinct(links.iter().map(|l| l.muscle_id));
                let muscles = relational::muscles_by_ids(&self.pool, &muscle_ids).await?;
                (exercises, links, muscles)
            } else {
                (exercises, Vec::new(), Vec::new())
            }
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        let (plans, sets) = if include.week_plans {
            let workout_ids: Vec<Uuid> = listing.items.iter().map(|w| w.id).collect();
            let plans = relational::week_plans_for(&self.pool, &workout_ids).await?;
            let sets = if include.week_plan_sets {
                let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();
                relational::week_plan_sets_for(&self.pool, &plan_ids).await?
            } else {
                Vec::new()
            };
            (plans, sets)
        } else {
            (Vec::new(), Vec::new())
        };

        let items = workout_documents(listing.items, exercises, links, muscles, plans, sets)
            .into_iter()
            .map(|doc| project_workout(doc, include))
            .collect();

        Ok(self.finish(
            "workouts",
            Listing { items, total },
            ReadPath::Fallback(reason),
            started,
        ))
    }

    /// Resolves `term` through the search index and unions the hits with
    /// `explicit`. Search failures are logged and yield no candidates.
    async fn candidate_ids(&self, kind: SearchKind, term: Option<&str>, explicit: &IdSet) -> IdSet {
        let Some(term) = term else {
            return explicit.clone();
        };
        match self.search.search_ids(kind, term, self.search_limit).await {
            Ok(hits) => {
                debug!(kind = kind.as_str(), term, hits = hits.len(), "search candidates");
                explicit.union(&hits)
            }
            Err(e) => {
                warn!(kind = kind.as_str(), term, error = %e, "search index unavailable, ignoring search term");
                explicit.clone()
            }
        }
    }

    /// Runs a document-store read under the budget.
    async fn fast<T>(
        &self,
        read: impl Future<Output = Result<Listing<T>>>,
    ) -> Result<Listing<T>, FallbackReason> {
        match tokio::time::timeout(self.budget, read).await {
            Ok(Ok(listing)) => Ok(listing),
            Ok(Err(e)) => {
                warn!(error = %e, "document store read failed, falling back");
                Err(FallbackReason::DocumentStore(e.to_string()))
            }
            Err(_) => {
                info!(budget_ms = self.budget.as_millis() as u64, "document store read timed out, falling back");
                Err(FallbackReason::Timeout)
            }
        }
    }

    fn finish<T>(
        &self,
        entity: &'static str,
        listing: Listing<T>,
        path: ReadPath,
        started: Instant,
    ) -> Aggregated<T> {
        self.observer.observe(entity, &path, started.elapsed());
        Aggregated {
            items: listing.items,
            total: listing.total,
            path,
        }
    }
}

fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
