//! Core data models for the journal.
//!
//! Relational rows, nested API responses and denormalized documents share
//! the same scalar structs: a response or a document is a row plus its
//! attached relations (`#[serde(flatten)]`). Timestamps are whole seconds in
//! UTC everywhere so both stores compare and sort them identically.

use chrono::{DateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

// ============ Rows ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Muscle {
    pub id: Uuid,
    pub name: String,
    pub created_date: DateTime<Utc>,
    pub created_by_id: Uuid,
    pub last_updated: Option<DateTime<Utc>>,
    pub updated_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_date: DateTime<Utc>,
    pub created_by_id: Uuid,
    pub last_updated: Option<DateTime<Utc>>,
    pub updated_by_id: Option<Uuid>,
}

/// Join row between an exercise and a muscle.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseMuscle {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub muscle_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: Uuid,
    pub exercise_id: Uuid,
    pub user_id: Uuid,
    pub created_date: DateTime<Utc>,
    pub created_by_id: Uuid,
    pub last_updated: Option<DateTime<Utc>>,
    pub updated_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlan {
    pub id: Uuid,
    pub workout_id: Uuid,
    pub date_of_week: String,
    pub time: NaiveTime,
    pub created_date: DateTime<Utc>,
    pub created_by_id: Uuid,
    pub last_updated: Option<DateTime<Utc>>,
    pub updated_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlanSet {
    pub id: Uuid,
    pub week_plan_id: Uuid,
    pub value: i32,
    pub created_date: DateTime<Utc>,
    pub created_by_id: Uuid,
    pub last_updated: Option<DateTime<Utc>>,
    pub updated_by_id: Option<Uuid>,
}

// ============ Responses ============

/// An exercise as returned to consumers. `muscles` is `null` unless the
/// `muscles` include was requested and the exercise has muscles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseResponse {
    #[serde(flatten)]
    pub exercise: Exercise,
    pub muscles: Option<Vec<Muscle>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlanResponse {
    #[serde(flatten)]
    pub week_plan: WeekPlan,
    pub week_plan_sets: Option<Vec<WeekPlanSet>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutResponse {
    #[serde(flatten)]
    pub workout: Workout,
    pub exercise: Option<ExerciseResponse>,
    pub week_plans: Option<Vec<WeekPlanResponse>>,
}

// ============ Documents ============

/// Denormalized exercise as held by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDocument {
    #[serde(flatten)]
    pub exercise: Exercise,
    #[serde(default)]
    pub muscles: Vec<Muscle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlanDocument {
    #[serde(flatten)]
    pub week_plan: WeekPlan,
    #[serde(default)]
    pub week_plan_sets: Vec<WeekPlanSet>,
}

/// Denormalized workout: embeds its exercise (with muscles) and its week
/// plans (with sets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDocument {
    #[serde(flatten)]
    pub workout: Workout,
    pub exercise: Option<ExerciseDocument>,
    #[serde(default)]
    pub week_plans: Vec<WeekPlanDocument>,
}

/// Rows from a single store query: the requested page plus the size of the
/// filtered set before pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Listing<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Listing<U> {
        Listing {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
