//! Request model for list queries.
//!
//! Raw query-string parameters ([`ListParams`]) are converted into typed
//! per-entity queries. Sort fields are resolved through explicit allow-lists
//! instead of by name at runtime: an unknown `sortBy` resolves to `None` and
//! the query is simply left unsorted.
//!
//! | Parameter | Meaning |
//! |-----------|---------|
//! | `ids` | comma-separated UUIDs, unparseable entries dropped |
//! | `pageIndex`, `pageSize` | pagination; ignored unless both valid |
//! | `sortBy`, `sortOrder` | allow-listed field, `asc` (default) or `desc` |
//! | `include` | comma-separated dotted paths (`muscles`, `exercise.muscles`, `weekplans.weekplansets`) |
//! | `searchTerm` | free text resolved to candidate ids via the search index |

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::JournalError;
use crate::models::{Exercise, Listing, Muscle, Workout};

// ============ Ids ============

/// Ordered, de-duplicated id membership filter. Empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdSet(Vec<Uuid>);

impl IdSet {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let ids: Vec<Uuid> = raw
            .split(',')
            .filter_map(|part| Uuid::parse_str(part.trim()).ok())
            .collect();
        Self::from_ids(ids)
    }

    pub fn from_ids(ids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut seen = HashSet::new();
        Self(ids.into_iter().filter(|id| seen.insert(*id)).collect())
    }

    /// Union with search candidates; search hits come first.
    pub fn union(&self, candidates: &[Uuid]) -> Self {
        Self::from_ids(candidates.iter().chain(self.0.iter()).copied())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Uuid] {
        &self.0
    }

    /// True when `id` passes the filter.
    pub fn admits(&self, id: &Uuid) -> bool {
        self.0.is_empty() || self.0.contains(id)
    }
}

// ============ Pagination ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: i64,
    pub size: i64,
}

impl PageRequest {
    /// Pagination applies only when both values are present and valid.
    pub fn from_params(index: Option<i64>, size: Option<i64>) -> Option<Self> {
        match (index, size) {
            (Some(index), Some(size)) if index >= 0 && size > 0 => Some(Self { index, size }),
            _ => None,
        }
    }

    pub fn offset(&self) -> i64 {
        self.index.saturating_mul(self.size)
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    /// Slice an in-memory, already filtered and sorted collection.
    pub fn slice<T>(page: Option<Self>, items: Vec<T>) -> Vec<T> {
        match page {
            Some(p) => items
                .into_iter()
                .skip(p.offset().max(0) as usize)
                .take(p.limit() as usize)
                .collect(),
            None => items,
        }
    }
}

// ============ Sorting ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// An allow-listed sort field for one entity.
pub trait SortKey: Sized + Copy {
    type Row;

    /// Resolve a field name; `None` for anything not on the allow-list.
    fn parse(name: &str) -> Option<Self>;
    /// Column in the relational table.
    fn column(self) -> &'static str;
    /// JSON path of the field inside a stored document.
    fn json_path(self) -> &'static str;
    fn compare(self, a: &Self::Row, b: &Self::Row) -> Ordering;
}

fn normalize_field(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<K> {
    pub key: K,
    pub order: SortOrder,
}

impl<K: SortKey> Sort<K> {
    pub fn parse(sort_by: Option<&str>, sort_order: Option<&str>) -> Option<Self> {
        let key = K::parse(sort_by?)?;
        Some(Self {
            key,
            order: SortOrder::parse(sort_order),
        })
    }

    pub fn compare(&self, a: &K::Row, b: &K::Row) -> Ordering {
        self.order.apply(self.key.compare(a, b))
    }

    /// Stable in-place sort of `items`; `row` projects each item to the
    /// sortable row.
    pub fn sort_by_row<T>(&self, items: &mut [T], row: impl Fn(&T) -> &K::Row) {
        items.sort_by(|a, b| self.compare(row(a), row(b)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseSortKey {
    Id,
    Name,
    Description,
    Type,
    CreatedDate,
    LastUpdated,
}

impl SortKey for ExerciseSortKey {
    type Row = Exercise;

    fn parse(name: &str) -> Option<Self> {
        match normalize_field(name).as_str() {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "description" => Some(Self::Description),
            "type" => Some(Self::Type),
            "createddate" => Some(Self::CreatedDate),
            "lastupdated" => Some(Self::LastUpdated),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::Type => "type",
            Self::CreatedDate => "created_date",
            Self::LastUpdated => "last_updated",
        }
    }

    fn json_path(self) -> &'static str {
        match self {
            Self::Id => "$.id",
            Self::Name => "$.name",
            Self::Description => "$.description",
            Self::Type => "$.type",
            Self::CreatedDate => "$.createdDate",
            Self::LastUpdated => "$.lastUpdated",
        }
    }

    fn compare(self, a: &Exercise, b: &Exercise) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Name => a.name.cmp(&b.name),
            Self::Description => a.description.cmp(&b.description),
            Self::Type => a.kind.cmp(&b.kind),
            Self::CreatedDate => a.created_date.cmp(&b.created_date),
            Self::LastUpdated => a.last_updated.cmp(&b.last_updated),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutSortKey {
    Id,
    ExerciseId,
    UserId,
    CreatedDate,
    LastUpdated,
}

impl SortKey for WorkoutSortKey {
    type Row = Workout;

    fn parse(name: &str) -> Option<Self> {
        match normalize_field(name).as_str() {
            "id" => Some(Self::Id),
            "exerciseid" => Some(Self::ExerciseId),
            "userid" => Some(Self::UserId),
            "createddate" => Some(Self::CreatedDate),
            "lastupdated" => Some(Self::LastUpdated),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ExerciseId => "exercise_id",
            Self::UserId => "user_id",
            Self::CreatedDate => "created_date",
            Self::LastUpdated => "last_updated",
        }
    }

    fn json_path(self) -> &'static str {
        match self {
            Self::Id => "$.id",
            Self::ExerciseId => "$.exerciseId",
            Self::UserId => "$.userId",
            Self::CreatedDate => "$.createdDate",
            Self::LastUpdated => "$.lastUpdated",
        }
    }

    fn compare(self, a: &Workout, b: &Workout) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::ExerciseId => a.exercise_id.cmp(&b.exercise_id),
            Self::UserId => a.user_id.cmp(&b.user_id),
            Self::CreatedDate => a.created_date.cmp(&b.created_date),
            Self::LastUpdated => a.last_updated.cmp(&b.last_updated),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuscleSortKey {
    Id,
    Name,
    CreatedDate,
    LastUpdated,
}

impl SortKey for MuscleSortKey {
    type Row = Muscle;

    fn parse(name: &str) -> Option<Self> {
        match normalize_field(name).as_str() {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "createddate" => Some(Self::CreatedDate),
            "lastupdated" => Some(Self::LastUpdated),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::CreatedDate => "created_date",
            Self::LastUpdated => "last_updated",
        }
    }

    fn json_path(self) -> &'static str {
        match self {
            Self::Id => "$.id",
            Self::Name => "$.name",
            Self::CreatedDate => "$.createdDate",
            Self::LastUpdated => "$.lastUpdated",
        }
    }

    fn compare(self, a: &Muscle, b: &Muscle) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Name => a.name.cmp(&b.name),
            Self::CreatedDate => a.created_date.cmp(&b.created_date),
            Self::LastUpdated => a.last_updated.cmp(&b.last_updated),
        }
    }
}

// ============ Includes ============

/// Parsed `include` parameter: lowercased dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeSpec {
    paths: Vec<Vec<String>>,
}

impl IncludeSpec {
    pub fn parse(raw: Option<&str>) -> Self {
        let paths = raw
            .unwrap_or_default()
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.split('.')
                    .map(|seg| seg.trim().to_string())
                    .filter(|seg| !seg.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|segments| !segments.is_empty())
            .collect();
        Self { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// True when any path starts at `root`.
    pub fn requests(&self, root: &str) -> bool {
        self.paths.iter().any(|p| p[0] == root)
    }

    /// True when `root.child` is requested.
    pub fn requests_nested(&self, root: &str, child: &str) -> bool {
        self.paths
            .iter()
            .any(|p| p[0] == root && p.get(1).map(String::as_str) == Some(child))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExerciseIncludes {
    pub muscles: bool,
}

impl From<&IncludeSpec> for ExerciseIncludes {
    fn from(spec: &IncludeSpec) -> Self {
        Self {
            muscles: spec.requests("muscles"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkoutIncludes {
    pub exercise: bool,
    pub exercise_muscles: bool,
    pub week_plans: bool,
    pub week_plan_sets: bool,
}

impl From<&IncludeSpec> for WorkoutIncludes {
    fn from(spec: &IncludeSpec) -> Self {
        Self {
            exercise: spec.requests("exercise"),
            exercise_muscles: spec.requests_nested("exercise", "muscles"),
            week_plans: spec.requests("weekplans"),
            week_plan_sets: spec.requests_nested("weekplans", "weekplansets"),
        }
    }
}

// ============ Filters ============

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExerciseFilter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ExerciseFilter {
    pub fn matches(&self, e: &Exercise) -> bool {
        contains(&e.name, &self.name)
            && contains(&e.description, &self.description)
            && contains(&e.kind, &self.kind)
            && self.created_date.map_or(true, |d| e.created_date == d)
            && self.last_updated.map_or(true, |d| e.last_updated == Some(d))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutFilter {
    pub exercise_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl WorkoutFilter {
    pub fn matches(&self, w: &Workout) -> bool {
        self.exercise_id.map_or(true, |id| w.exercise_id == id)
            && self.user_id.map_or(true, |id| w.user_id == id)
            && self.created_date.map_or(true, |d| w.created_date == d)
            && self.last_updated.map_or(true, |d| w.last_updated == Some(d))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MuscleFilter {
    pub name: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl MuscleFilter {
    pub fn matches(&self, m: &Muscle) -> bool {
        contains(&m.name, &self.name)
            && self.created_date.map_or(true, |d| m.created_date == d)
            && self.last_updated.map_or(true, |d| m.last_updated == Some(d))
    }
}

fn contains(value: &str, needle: &Option<String>) -> bool {
    needle.as_deref().map_or(true, |n| value.contains(n))
}

// ============ Typed queries ============

#[derive(Debug, Clone, Default)]
pub struct ExerciseQuery {
    pub ids: IdSet,
    pub filter: ExerciseFilter,
    pub sort: Option<Sort<ExerciseSortKey>>,
    pub page: Option<PageRequest>,
    pub include: IncludeSpec,
    pub search_term: Option<String>,
    /// Ordering applied to nested muscles.
    pub muscles_sort: Option<Sort<MuscleSortKey>>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkoutQuery {
    pub ids: IdSet,
    pub filter: WorkoutFilter,
    pub sort: Option<Sort<WorkoutSortKey>>,
    pub page: Option<PageRequest>,
    pub include: IncludeSpec,
    pub search_term: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MuscleQuery {
    pub ids: IdSet,
    pub filter: MuscleFilter,
    pub sort: Option<Sort<MuscleSortKey>>,
    pub page: Option<PageRequest>,
}

// ============ Raw parameters ============

/// Query-string parameters shared by every list endpoint. Fields that do not
/// apply to an entity are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub ids: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub exercise_id: Option<String>,
    pub user_id: Option<String>,
    pub created_date: Option<String>,
    pub last_updated: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page_index: Option<i64>,
    pub page_size: Option<i64>,
    pub include: Option<String>,
    pub search_term: Option<String>,
    pub muscles_sort_by: Option<String>,
    pub muscles_sort_order: Option<String>,
}

impl ListParams {
    pub fn exercise_query(&self) -> Result<ExerciseQuery, JournalError> {
        Ok(ExerciseQuery {
            ids: IdSet::parse(self.ids.as_deref()),
            filter: ExerciseFilter {
                name: non_empty(&self.name),
                description: non_empty(&self.description),
                kind: non_empty(&self.kind),
                created_date: parse_date("createdDate", &self.created_date)?,
                last_updated: parse_date("lastUpdated", &self.last_updated)?,
            },
            sort: Sort::parse(self.sort_by.as_deref(), self.sort_order.as_deref()),
            page: self.page(),
            include: IncludeSpec::parse(self.include.as_deref()),
            search_term: non_empty(&self.search_term),
            muscles_sort: Sort::parse(
                self.muscles_sort_by.as_deref(),
                self.muscles_sort_order.as_deref(),
            ),
        })
    }

    pub fn workout_query(&self) -> Result<WorkoutQuery, JournalError> {
        Ok(WorkoutQuery {
            ids: IdSet::parse(self.ids.as_deref()),
            filter: WorkoutFilter {
                exercise_id: parse_id("exerciseId", &self.exercise_id)?,
                user_id: parse_id("userId", &self.user_id)?,
                created_date: parse_date("createdDate", &self.created_date)?,
                last_updated: parse_date("lastUpdated", &self.last_updated)?,
            },
            sort: Sort::parse(self.sort_by.as_deref(), self.sort_order.as_deref()),
            page: self.page(),
            include: IncludeSpec::parse(self.include.as_deref()),
            search_term: non_empty(&self.search_term),
        })
    }

    pub fn muscle_query(&self) -> Result<MuscleQuery, JournalError> {
        Ok(MuscleQuery {
            ids: IdSet::parse(self.ids.as_deref()),
            filter: MuscleFilter {
                name: non_empty(&self.name),
                created_date: parse_date("createdDate", &self.created_date)?,
                last_updated: parse_date("lastUpdated", &self.last_updated)?,
            },
            sort: Sort::parse(self.sort_by.as_deref(), self.sort_order.as_deref()),
            page: self.page(),
        })
    }

    fn page(&self) -> Option<PageRequest> {
        PageRequest::from_params(self.page_index, self.page_size)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn parse_date(field: &str, value: &Option<String>) -> Result<Option<DateTime<Utc>>, JournalError> {
    let Some(raw) = value.as_deref().filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|d| Some(d.with_timezone(&Utc).trunc_subsecs(0)))
        .map_err(|e| JournalError::BadRequest(format!("{field}: invalid timestamp '{raw}': {e}")))
}

fn parse_id(field: &str, value: &Option<String>) -> Result<Option<Uuid>, JournalError> {
    let Some(raw) = value.as_deref().filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|_| JournalError::BadRequest(format!("{field}: invalid id '{raw}'")))
}

// ============ Response ============

/// Paginated response shape: `{ all, index, size, total, items }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    /// Size of the filtered set before pagination.
    pub all: i64,
    pub index: Option<i64>,
    pub size: Option<i64>,
    /// Number of items in this page.
    pub total: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(listing: Listing<T>, index: Option<i64>, size: Option<i64>) -> Self {
        Self {
            all: listing.total,
            index,
            size,
            total: listing.items.len(),
            items: listing.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_set_drops_garbage_and_duplicates() {
        let a = Uuid::new_v4();
        let raw = format!("{a}, not-a-uuid,{a},,");
        let ids = IdSet::parse(Some(&raw));
        assert_eq!(ids.as_slice(), &[a]);
    }

    #[test]
    fn test_id_set_union_with_candidates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let explicit = IdSet::from_ids([a]);
        let merged = explicit.union(&[b, a]);
        assert_eq!(merged.as_slice(), &[b, a]);
        assert!(IdSet::default().union(&[]).is_empty());
    }

    #[test]
    fn test_pagination_requires_both_values() {
        assert_eq!(PageRequest::from_params(Some(0), None), None);
        assert_eq!(PageRequest::from_params(None, Some(10)), None);
        assert_eq!(PageRequest::from_params(Some(-1), Some(10)), None);
        assert_eq!(PageRequest::from_params(Some(0), Some(0)), None);
        let page = PageRequest::from_params(Some(2), Some(10)).unwrap();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn test_page_slice() {
        let items: Vec<i32> = (0..25).collect();
        let page = PageRequest::from_params(Some(2), Some(10));
        assert_eq!(PageRequest::slice(page, items.clone()), (20..25).collect::<Vec<_>>());
        assert_eq!(PageRequest::slice(None, items.clone()).len(), 25);
    }

    #[test]
    fn test_sort_keys_are_allow_listed() {
        assert_eq!(ExerciseSortKey::parse("Name"), Some(ExerciseSortKey::Name));
        assert_eq!(
            ExerciseSortKey::parse("created_date"),
            Some(ExerciseSortKey::CreatedDate)
        );
        assert_eq!(ExerciseSortKey::parse("password"), None);
        assert_eq!(WorkoutSortKey::parse("ExerciseId"), Some(WorkoutSortKey::ExerciseId));
        assert!(Sort::<MuscleSortKey>::parse(Some("nope"), Some("desc")).is_none());
    }

    #[test]
    fn test_sort_order_defaults_to_asc() {
        assert_eq!(SortOrder::parse(None), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("DESC")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(Some("sideways")), SortOrder::Asc);
    }

    #[test]
    fn test_include_spec_parsing() {
        let spec = IncludeSpec::parse(Some(" Exercise.Muscles , weekplans.weekplansets,bogus"));
        let inc = WorkoutIncludes::from(&spec);
        assert!(inc.exercise);
        assert!(inc.exercise_muscles);
        assert!(inc.week_plans);
        assert!(inc.week_plan_sets);
        assert!(!ExerciseIncludes::from(&spec).muscles);

        let only_plans = WorkoutIncludes::from(&IncludeSpec::parse(Some("weekplans")));
        assert!(only_plans.week_plans);
        assert!(!only_plans.week_plan_sets);
        assert!(!only_plans.exercise);

        assert!(IncludeSpec::parse(Some(" , ")).is_empty());
        assert!(IncludeSpec::parse(None).is_empty());
    }

    #[test]
    fn test_list_params_rejects_bad_dates() {
        let params = ListParams {
            created_date: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.exercise_query(),
            Err(JournalError::BadRequest(_))
        ));
    }

    #[test]
    fn test_list_params_empty_strings_are_absent() {
        let params = ListParams {
            name: Some(String::new()),
            search_term: Some(String::new()),
            ..Default::default()
        };
        let query = params.exercise_query().unwrap();
        assert_eq!(query.filter, ExerciseFilter::default());
        assert!(query.search_term.is_none());
    }
}
