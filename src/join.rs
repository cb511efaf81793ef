//! In-memory reconstruction of the nested shape.
//!
//! Child rows are grouped by parent key into `HashMap`s and attached to their
//! parents, two levels deep at most. The result is always a full document;
//! consumers then project a document onto the response shape with
//! [`project_exercise`] / [`project_workout`], attaching only what the
//! request included.
//!
//! Both read paths go through the same projection, so a document read from
//! the document store and one rebuilt here from relational rows produce the
//! same response for the same data.

use std::collections::HashMap;
use std::hash::Hash;
use uuid::Uuid;

use crate::models::{
    Exercise, ExerciseDocument, ExerciseMuscle, ExerciseResponse, Muscle, WeekPlan,
    WeekPlanDocument, WeekPlanResponse, WeekPlanSet, Workout, WorkoutDocument, WorkoutResponse,
};
use crate::query::{ExerciseIncludes, MuscleSortKey, Sort, WorkoutIncludes};

/// Groups `items` by `key`, keeping input order within each group.
pub fn group_by<K, T>(items: Vec<T>, key: impl Fn(&T) -> K) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
{
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}

/// `None` for an empty list: an include with no data is absent, not `[]`.
pub fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Exercise → muscles lookup built from join rows.
struct MuscleLookup {
    links: HashMap<Uuid, Vec<ExerciseMuscle>>,
    muscles: HashMap<Uuid, Muscle>,
}

impl MuscleLookup {
    fn new(links: Vec<ExerciseMuscle>, muscles: Vec<Muscle>) -> Self {
        Self {
            links: group_by(links, |l| l.exercise_id),
            muscles: muscles.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    /// Muscles of one exercise in join-row order. Dangling links are skipped.
    fn muscles_of(&self, exercise_id: &Uuid) -> Vec<Muscle> {
        self.links
            .get(exercise_id)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|l| self.muscles.get(&l.muscle_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn document(&self, exercise: Exercise) -> ExerciseDocument {
        let muscles = self.muscles_of(&exercise.id);
        ExerciseDocument { exercise, muscles }
    }
}

// ============ Documents ============

pub fn exercise_documents(
    exercises: Vec<Exercise>,
    links: Vec<ExerciseMuscle>,
    muscles: Vec<Muscle>,
) -> Vec<ExerciseDocument> {
    let lookup = MuscleLookup::new(links, muscles);
    exercises.into_iter().map(|e| lookup.document(e)).collect()
}

/// Builds workout documents. A workout whose exercise is missing from
/// `exercises` gets `exercise: None`.
pub fn workout_documents(
    workouts: Vec<Workout>,
    exercises: Vec<Exercise>,
    links: Vec<ExerciseMuscle>,
    muscles: Vec<Muscle>,
    plans: Vec<WeekPlan>,
    sets: Vec<WeekPlanSet>,
) -> Vec<WorkoutDocument> {
    let lookup = MuscleLookup::new(links, muscles);
    let exercises: HashMap<Uuid, ExerciseDocument> = exercises
        .into_iter()
        .map(|e| (e.id, lookup.document(e)))
        .collect();
    let mut sets = group_by(sets, |s| s.week_plan_id);
    let mut plans = group_by(plans, |p| p.workout_id);

    workouts
        .into_iter()
        .map(|workout| {
            let week_plans = plans
                .remove(&workout.id)
                .unwrap_or_default()
                .into_iter()
                .map(|week_plan| WeekPlanDocument {
                    week_plan_sets: sets.remove(&week_plan.id).unwrap_or_default(),
                    week_plan,
                })
                .collect();
            WorkoutDocument {
                exercise: exercises.get(&workout.exercise_id).cloned(),
                week_plans,
                workout,
            }
        })
        .collect()
}

// ============ Projection ============

pub fn project_exercise(
    doc: ExerciseDocument,
    include: ExerciseIncludes,
    muscles_sort: Option<Sort<MuscleSortKey>>,
) -> ExerciseResponse {
    let muscles = if include.muscles {
        let mut muscles = doc.muscles;
        if let Some(sort) = muscles_sort {
            sort.sort_by_row(&mut muscles, |m| m);
        }
        non_empty(muscles)
    } else {
        None
    };
    ExerciseResponse {
        exercise: doc.exercise,
        muscles,
    }
}

pub fn project_workout(doc: WorkoutDocument, include: WorkoutIncludes) -> WorkoutResponse {
    let exercise = if include.exercise {
        doc.exercise.map(|e| {
            project_exercise(
                e,
                ExerciseIncludes {
                    muscles: include.exercise_muscles,
                },
                None,
            )
        })
    } else {
        None
    };

    let week_plans = if include.week_plans {
        non_empty(
            doc.week_plans
                .into_iter()
                .map(|p| WeekPlanResponse {
                    week_plan: p.week_plan,
                    week_plan_sets: if include.week_plan_sets {
                        non_empty(p.week_plan_sets)
                    } else {
                        None
                    },
                })
                .collect(),
        )
    } else {
        None
    };

    WorkoutResponse {
        workout: doc.workout,
        exercise,
        week_plans,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now;
    use crate::query::{IncludeSpec, SortOrder};
    use chrono::NaiveTime;

    fn muscle(name: &str) -> Muscle {
        Muscle {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_date: now(),
            created_by_id: Uuid::nil(),
            last_updated: None,
            updated_by_id: None,
        }
    }

    fn exercise(name: &str) -> Exercise {
        Exercise {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            kind: "strength".to_string(),
            created_date: now(),
            created_by_id: Uuid::nil(),
            last_updated: None,
            updated_by_id: None,
        }
    }

    fn link(e: &Exercise, m: &Muscle) -> ExerciseMuscle {
        ExerciseMuscle {
            id: Uuid::new_v4(),
            exercise_id: e.id,
            muscle_id: m.id,
        }
    }

    fn workout(exercise_id: Uuid) -> Workout {
        Workout {
            id: Uuid::new_v4(),
            exercise_id,
            user_id: Uuid::new_v4(),
            created_date: now(),
            created_by_id: Uuid::nil(),
            last_updated: None,
            updated_by_id: None,
        }
    }

    fn plan(workout_id: Uuid) -> WeekPlan {
        WeekPlan {
            id: Uuid::new_v4(),
            workout_id,
            date_of_week: "Monday".to_string(),
            time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            created_date: now(),
            created_by_id: Uuid::nil(),
            last_updated: None,
            updated_by_id: None,
        }
    }

    fn set(week_plan_id: Uuid, value: i32) -> WeekPlanSet {
        WeekPlanSet {
            id: Uuid::new_v4(),
            week_plan_id,
            value,
            created_date: now(),
            created_by_id: Uuid::nil(),
            last_updated: None,
            updated_by_id: None,
        }
    }

    #[test]
    fn test_group_by_preserves_order() {
        let groups = group_by(vec![(1, "a"), (2, "b"), (1, "c")], |(k, _)| *k);
        assert_eq!(groups[&1], vec![(1, "a"), (1, "c")]);
        assert_eq!(groups[&2], vec![(2, "b")]);
    }

    #[test]
    fn test_exercise_documents_attach_muscles() {
        let chest = muscle("chest");
        let triceps = muscle("triceps");
        let bench = exercise("bench press");
        let plank = exercise("plank");
        let links = vec![link(&bench, &chest), link(&bench, &triceps)];

        let docs = exercise_documents(
            vec![bench.clone(), plank.clone()],
            links,
            vec![chest.clone(), triceps.clone()],
        );
        assert_eq!(docs[0].muscles, vec![chest, triceps]);
        assert!(docs[1].muscles.is_empty());
    }

    #[test]
    fn test_absent_include_is_none_not_empty() {
        let plank = exercise("plank");
        let doc = ExerciseDocument {
            exercise: plank,
            muscles: Vec::new(),
        };
        let response = project_exercise(doc, ExerciseIncludes { muscles: true }, None);
        assert_eq!(response.muscles, None);
    }

    #[test]
    fn test_unrequested_include_is_dropped() {
        let chest = muscle("chest");
        let bench = exercise("bench press");
        let doc = ExerciseDocument {
            exercise: bench,
            muscles: vec![chest],
        };
        let response = project_exercise(doc, ExerciseIncludes::default(), None);
        assert_eq!(response.muscles, None);
    }

    #[test]
    fn test_muscles_sorted_on_request() {
        let a = muscle("abs");
        let c = muscle("chest");
        let doc = ExerciseDocument {
            exercise: exercise("crunch"),
            muscles: vec![a.clone(), c.clone()],
        };
        let sort = Sort {
            key: MuscleSortKey::Name,
            order: SortOrder::Desc,
        };
        let response = project_exercise(doc, ExerciseIncludes { muscles: true }, Some(sort));
        assert_eq!(response.muscles, Some(vec![c, a]));
    }

    #[test]
    fn test_workout_documents_two_levels() {
        let quads = muscle("quads");
        let squat = exercise("squat");
        let w = workout(squat.id);
        let p = plan(w.id);
        let s1 = set(p.id, 5);
        let s2 = set(p.id, 3);

        let docs = workout_documents(
            vec![w.clone()],
            vec![squat.clone()],
            vec![link(&squat, &quads)],
            vec![quads.clone()],
            vec![p.clone()],
            vec![s1.clone(), s2.clone()],
        );
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.exercise.as_ref().unwrap().muscles, vec![quads]);
        assert_eq!(doc.week_plans[0].week_plan_sets, vec![s1, s2]);
    }

    #[test]
    fn test_workout_projection_only_nested_when_requested() {
        let quads = muscle("quads");
        let squat = exercise("squat");
        let w = workout(squat.id);
        let p = plan(w.id);
        let docs = workout_documents(
            vec![w],
            vec![squat.clone()],
            vec![link(&squat, &quads)],
            vec![quads],
            vec![p],
            Vec::new(),
        );

        let include = WorkoutIncludes::from(&IncludeSpec::parse(Some("exercise,weekplans.weekplansets")));
        let response = project_workout(docs[0].clone(), include);
        let ex = response.exercise.unwrap();
        assert_eq!(ex.exercise, squat);
        assert_eq!(ex.muscles, None);
        let plans = response.week_plans.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].week_plan_sets, None);
    }

    #[test]
    fn test_workout_with_missing_exercise() {
        let w = workout(Uuid::new_v4());
        let docs = workout_documents(vec![w], Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let include = WorkoutIncludes::from(&IncludeSpec::parse(Some("exercise,weekplans")));
        let response = project_workout(docs[0].clone(), include);
        assert!(response.exercise.is_none());
        assert!(response.week_plans.is_none());
    }
}
