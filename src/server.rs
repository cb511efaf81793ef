//! HTTP API.
//!
//! List endpoints accept the query parameters described in [`crate::query`]
//! and answer with the paginated [`Page`] shape. Exercise and workout lists
//! go through the [`Aggregator`]; muscles are read from the relational store
//! directly.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/exercises` | List exercises (`include=muscles`) |
//! | `POST` | `/api/exercises` | Create an exercise |
//! | `PUT` | `/api/exercises/{id}` | Update an exercise and its muscles |
//! | `DELETE` | `/api/exercises/{id}` | Delete (`deleteWorkouts=true` cascades) |
//! | `POST` | `/api/exercises/sync-document-store` | Rebuild exercise documents |
//! | `POST` | `/api/exercises/sync-search` | Rebuild exercise search entries |
//! | `GET` | `/api/workouts` | List workouts (`include=exercise.muscles,weekplans.weekplansets`) |
//! | `POST` | `/api/workouts` | Create a workout with week plans and sets |
//! | `PUT` | `/api/workouts/{id}` | Re-point a workout |
//! | `DELETE` | `/api/workouts/{id}` | Delete a workout and its plans |
//! | `POST` | `/api/workouts/sync-document-store` | Rebuild workout documents |
//! | `POST` | `/api/workouts/sync-search` | Rebuild workout search entries |
//! | `GET` | `/api/muscles` | List muscles |
//! | `POST` | `/api/muscles` | Create a muscle |
//! | `PUT` | `/api/muscles/{id}` | Rename a muscle |
//! | `DELETE` | `/api/muscles/{id}` | Delete a muscle |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Exercise with id … does not exist" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unavailable` (503,
//! a sync could not reach its dependency), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::db;
use crate::document::{DocumentStore, SqliteDocumentStore};
use crate::error::JournalError;
use crate::models::{Exercise, ExerciseResponse, Muscle, Workout, WorkoutResponse};
use crate::query::{ListParams, Page};
use crate::relational;
use crate::search::{open_search_index, SearchIndex, SearchKind};
use crate::sync::{self, RetryPolicy};
use crate::write::{self, ExerciseInput, MuscleInput, WorkoutInput};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    aggregator: Arc<Aggregator>,
    documents: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchIndex>,
    retry: RetryPolicy,
}

impl AppState {
    pub fn new(
        aggregator: Aggregator,
        documents: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndex>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            documents,
            search,
            retry,
        }
    }

    /// Opens both databases and wires the stores described by `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let documents: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(db::connect_documents(config).await?));
        let search = open_search_index(&config.search, &pool);
        let aggregator =
            Aggregator::from_config(config, pool, documents.clone(), search.clone());
        Ok(Self::new(
            aggregator,
            documents,
            search,
            RetryPolicy::from(&config.sync),
        ))
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.aggregator.pool()
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "journal API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/exercises", get(list_exercises).post(create_exercise))
        .route("/api/exercises/{id}", put(update_exercise).delete(delete_exercise))
        .route("/api/exercises/sync-document-store", post(sync_exercise_documents))
        .route("/api/exercises/sync-search", post(sync_exercise_search))
        .route("/api/workouts", get(list_workouts).post(create_workout))
        .route("/api/workouts/{id}", put(update_workout).delete(delete_workout))
        .route("/api/workouts/sync-document-store", post(sync_workout_documents))
        .route("/api/workouts/sync-search", post(sync_workout_search))
        .route("/api/muscles", get(list_muscles).post(create_muscle))
        .route("/api/muscles/{id}", put(update_muscle).delete(delete_muscle))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<JournalError> for AppError {
    fn from(err: JournalError) -> Self {
        let (status, code) = match &err {
            JournalError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            JournalError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            JournalError::Unreachable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

/// Classifies library errors: a [`JournalError`] anywhere in the chain keeps
/// its status, anything else is a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<JournalError>() {
            Ok(journal) => journal.into(),
            Err(other) => {
                error!(error = %format!("{other:#}"), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| bad_request(format!("invalid id: {raw}")))
}

// ============ Lists ============

async fn list_exercises(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<ExerciseResponse>>, AppError> {
    let Query(params) = params?;
    let query = params.exercise_query()?;
    let result = state.aggregator.exercises(&query).await?;
    Ok(Json(Page::new(
        result.into_listing(),
        params.page_index,
        params.page_size,
    )))
}

async fn list_workouts(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<WorkoutResponse>>, AppError> {
    let Query(params) = params?;
    let query = params.workout_query()?;
    let result = state.aggregator.workouts(&query).await?;
    Ok(Json(Page::new(
        result.into_listing(),
        params.page_index,
        params.page_size,
    )))
}

async fn list_muscles(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<Muscle>>, AppError> {
    let Query(params) = params?;
    let query = params.muscle_query()?;
    let listing = relational::list_muscles(state.pool(), &query).await?;
    Ok(Json(Page::new(listing, params.page_index, params.page_size)))
}

// ============ Muscles ============

async fn create_muscle(
    State(state): State<AppState>,
    body: Result<Json<MuscleInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Muscle>), AppError> {
    let Json(input) = body?;
    let muscle = write::create_muscle(state.pool(), input, Uuid::nil()).await?;
    Ok((StatusCode::CREATED, Json(muscle)))
}

async fn update_muscle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MuscleInput>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let Json(input) = body?;
    write::update_muscle(state.pool(), id, input, Uuid::nil()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_muscle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    write::delete_muscle(state.pool(), parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Exercises ============

async fn create_exercise(
    State(state): State<AppState>,
    body: Result<Json<ExerciseInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Exercise>), AppError> {
    let Json(input) = body?;
    let exercise = write::create_exercise(state.pool(), input, Uuid::nil()).await?;
    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn update_exercise(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ExerciseInput>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let Json(input) = body?;
    write::update_exercise(state.pool(), id, input, Uuid::nil()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteExerciseParams {
    #[serde(default)]
    delete_workouts: bool,
}

async fn delete_exercise(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<DeleteExerciseParams>, QueryRejection>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let Query(params) = params?;
    write::delete_exercise(state.pool(), id, params.delete_workouts).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Workouts ============

async fn create_workout(
    State(state): State<AppState>,
    body: Result<Json<WorkoutInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Workout>), AppError> {
    let Json(input) = body?;
    let workout = write::create_workout(state.pool(), input, Uuid::nil()).await?;
    Ok((StatusCode::CREATED, Json(workout)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWorkoutBody {
    exercise_id: Uuid,
    user_id: Uuid,
}

async fn update_workout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateWorkoutBody>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let Json(body) = body?;
    write::update_workout(state.pool(), id, body.exercise_id, body.user_id, Uuid::nil()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_workout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    write::delete_workout(state.pool(), parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Sync ============

#[derive(Serialize)]
struct SyncResponse {
    synced: u64,
}

async fn sync_exercise_documents(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let synced =
        sync::sync_exercises_to_documents(state.pool(), state.documents.as_ref(), &state.retry)
            .await?;
    Ok(Json(SyncResponse { synced }))
}

async fn sync_workout_documents(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let synced =
        sync::sync_workouts_to_documents(state.pool(), state.documents.as_ref(), &state.retry)
            .await?;
    Ok(Json(SyncResponse { synced }))
}

async fn sync_exercise_search(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let synced =
        sync::sync_search_index(state.pool(), state.search.as_ref(), SearchKind::Exercises).await?;
    Ok(Json(SyncResponse { synced }))
}

async fn sync_workout_search(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let synced =
        sync::sync_search_index(state.pool(), state.search.as_ref(), SearchKind::Workouts).await?;
    Ok(Json(SyncResponse { synced }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
