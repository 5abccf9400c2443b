use async_trait::async_trait;
use chrono::{DateTime, Utc};
use completion_core::model::{
    Activity, ActivityId, CompletionError, CompletionRecord, Course, CourseId, Learner, Reconciled,
    UserId, name_has_initial,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("write rejected: {0}")]
    Rejected(#[from] CompletionError),
}

/// Result of a progress upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The record now stored, after sticky timestamps were applied.
    Written(CompletionRecord),
    /// A newer record was already stored; nothing changed.
    Stale,
}

/// Ordering of roster listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RosterOrder {
    #[default]
    LastName,
    FirstName,
}

/// Filter and page over a course roster.
///
/// `limit == 0` returns every matching learner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterQuery {
    pub first_initial: Option<String>,
    pub last_initial: Option<String>,
    pub order: RosterOrder,
    pub offset: u32,
    pub limit: u32,
}

impl RosterQuery {
    #[must_use]
    pub fn matches(&self, learner: &Learner) -> bool {
        self.first_initial
            .as_deref()
            .is_none_or(|i| name_has_initial(learner.first_name(), i))
            && self
                .last_initial
                .as_deref()
                .is_none_or(|i| name_has_initial(learner.last_name(), i))
    }

    /// Roster order; ASCII-only case folding, like SQLite's `lower()`.
    fn sort(&self, learners: &mut [Learner]) {
        match self.order {
            RosterOrder::LastName => learners.sort_by_cached_key(|l| {
                (
                    l.last_name().to_ascii_lowercase(),
                    l.first_name().to_ascii_lowercase(),
                    l.id(),
                )
            }),
            RosterOrder::FirstName => learners.sort_by_cached_key(|l| {
                (
                    l.first_name().to_ascii_lowercase(),
                    l.last_name().to_ascii_lowercase(),
                    l.id(),
                )
            }),
        }
    }
}

#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Persist or update a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID. Missing courses are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;
}

/// The activity registry: course activities and their tracking definitions.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Persist or update an activity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown course and
    /// `StorageError::Conflict` when the id already belongs to another
    /// course. Other failures surface as `StorageError`.
    async fn upsert_activity(&self, activity: &Activity) -> Result<(), StorageError>;

    /// Fetch an activity by ID. Missing activities are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_activity(&self, id: ActivityId) -> Result<Option<Activity>, StorageError>;

    /// Tracked activities of a course in registry order (ascending id).
    ///
    /// Excludes `TrackingMode::None`. Empty when completion is disabled for
    /// the course or the course is unknown.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_tracked_activities(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Activity>, StorageError>;

    /// Remove an activity together with its progress records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the activity does not exist.
    async fn delete_activity(&self, id: ActivityId) -> Result<(), StorageError>;
}

/// The progress store: one completion record per (activity, user).
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Fetch a single record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the learner never interacted with
    /// the activity.
    async fn get_record(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<CompletionRecord, StorageError>;

    /// Batched read for one activity. Absent users are simply missing from
    /// the map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_records_for_activity(
        &self,
        activity_id: ActivityId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, CompletionRecord>, StorageError>;

    /// Idempotent write, last writer wins on `time_modified`.
    ///
    /// A stored completion time is never cleared except by an override reset.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Rejected` when the write would regress a
    /// completion, or other storage errors. A failed write leaves the stored
    /// record untouched.
    async fn upsert(&self, record: &CompletionRecord) -> Result<UpsertOutcome, StorageError>;
}

/// Learners and course enrolments.
#[async_trait]
pub trait LearnerRepository: Send + Sync {
    /// Persist or update a learner.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the learner cannot be stored.
    async fn upsert_learner(&self, learner: &Learner) -> Result<(), StorageError>;

    /// Remove a learner with their enrolments and progress records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner does not exist.
    async fn delete_learner(&self, id: UserId) -> Result<(), StorageError>;

    /// Enrol a learner in a course. Re-enrolling keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner or course is unknown.
    async fn enrol(
        &self,
        course_id: CourseId,
        user_id: UserId,
        enrolled_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// One page of enrolled learners.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_enrolled(
        &self,
        course_id: CourseId,
        query: &RosterQuery,
    ) -> Result<Vec<Learner>, StorageError>;

    /// Number of enrolled learners matching the initials filters (paging ignored).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_enrolled(
        &self,
        course_id: CourseId,
        query: &RosterQuery,
    ) -> Result<u32, StorageError>;

    /// The subset of `user_ids` enrolled in the course, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn enrolled_learners(
        &self,
        course_id: CourseId,
        user_ids: &[UserId],
    ) -> Result<Vec<Learner>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    activities: Arc<Mutex<HashMap<ActivityId, Activity>>>,
    records: Arc<Mutex<HashMap<(ActivityId, UserId), CompletionRecord>>>,
    learners: Arc<Mutex<HashMap<UserId, Learner>>>,
    enrolments: Arc<Mutex<HashMap<(CourseId, UserId), DateTime<Utc>>>>,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.courses.lock().map_err(poisoned)?;
        guard.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let guard = self.courses.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl ActivityRepository for InMemoryRepository {
    async fn upsert_activity(&self, activity: &Activity) -> Result<(), StorageError> {
        if !self
            .courses
            .lock()
            .map_err(poisoned)?
            .contains_key(&activity.course_id())
        {
            return Err(StorageError::NotFound);
        }
        let mut guard = self.activities.lock().map_err(poisoned)?;
        if guard
            .get(&activity.id())
            .is_some_and(|existing| existing.course_id() != activity.course_id())
        {
            return Err(StorageError::Conflict);
        }
        guard.insert(activity.id(), activity.clone());
        Ok(())
    }

    async fn get_activity(&self, id: ActivityId) -> Result<Option<Activity>, StorageError> {
        let guard = self.activities.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_tracked_activities(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Activity>, StorageError> {
        let enabled = self
            .courses
            .lock()
            .map_err(poisoned)?
            .get(&course_id)
            .is_some_and(Course::completion_enabled);
        if !enabled {
            return Ok(Vec::new());
        }

        let guard = self.activities.lock().map_err(poisoned)?;
        let mut tracked: Vec<Activity> = guard
            .values()
            .filter(|a| a.course_id() == course_id && a.is_tracked())
            .cloned()
            .collect();
        tracked.sort_by_key(Activity::id);
        Ok(tracked)
    }

    async fn delete_activity(&self, id: ActivityId) -> Result<(), StorageError> {
        let mut activities = self.activities.lock().map_err(poisoned)?;
        let mut records = self.records.lock().map_err(poisoned)?;
        activities.remove(&id).ok_or(StorageError::NotFound)?;
        records.retain(|(activity_id, _), _| *activity_id != id);
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryRepository {
    async fn get_record(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<CompletionRecord, StorageError> {
        let guard = self.records.lock().map_err(poisoned)?;
        guard
            .get(&(activity_id, user_id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_records_for_activity(
        &self,
        activity_id: ActivityId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, CompletionRecord>, StorageError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(user_ids
            .iter()
            .filter_map(|user_id| {
                guard
                    .get(&(activity_id, *user_id))
                    .map(|record| (*user_id, record.clone()))
            })
            .collect())
    }

    async fn upsert(&self, record: &CompletionRecord) -> Result<UpsertOutcome, StorageError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        let key = (record.activity_id(), record.user_id());
        match CompletionRecord::reconcile(guard.get(&key), record.clone())? {
            Reconciled::Write(merged) => {
                guard.insert(key, merged.clone());
                Ok(UpsertOutcome::Written(merged))
            }
            Reconciled::Stale => Ok(UpsertOutcome::Stale),
        }
    }
}

#[async_trait]
impl LearnerRepository for InMemoryRepository {
    async fn upsert_learner(&self, learner: &Learner) -> Result<(), StorageError> {
        let mut guard = self.learners.lock().map_err(poisoned)?;
        guard.insert(learner.id(), learner.clone());
        Ok(())
    }

    async fn delete_learner(&self, id: UserId) -> Result<(), StorageError> {
        let mut learners = self.learners.lock().map_err(poisoned)?;
        let mut enrolments = self.enrolments.lock().map_err(poisoned)?;
        let mut records = self.records.lock().map_err(poisoned)?;
        learners.remove(&id).ok_or(StorageError::NotFound)?;
        enrolments.retain(|(_, user_id), _| *user_id != id);
        records.retain(|(_, user_id), _| *user_id != id);
        Ok(())
    }

    async fn enrol(
        &self,
        course_id: CourseId,
        user_id: UserId,
        enrolled_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if !self.courses.lock().map_err(poisoned)?.contains_key(&course_id)
            || !self.learners.lock().map_err(poisoned)?.contains_key(&user_id)
        {
            return Err(StorageError::NotFound);
        }
        let mut guard = self.enrolments.lock().map_err(poisoned)?;
        guard.entry((course_id, user_id)).or_insert(enrolled_at);
        Ok(())
    }

    async fn list_enrolled(
        &self,
        course_id: CourseId,
        query: &RosterQuery,
    ) -> Result<Vec<Learner>, StorageError> {
        let learners = self.learners.lock().map_err(poisoned)?;
        let enrolments = self.enrolments.lock().map_err(poisoned)?;
        let mut matching: Vec<Learner> = enrolments
            .keys()
            .filter(|(course, _)| *course == course_id)
            .filter_map(|(_, user_id)| learners.get(user_id))
            .filter(|learner| query.matches(learner))
            .cloned()
            .collect();
        query.sort(&mut matching);

        let offset = query.offset as usize;
        let page = matching.into_iter().skip(offset);
        Ok(if query.limit == 0 {
            page.collect()
        } else {
            page.take(query.limit as usize).collect()
        })
    }

    async fn count_enrolled(
        &self,
        course_id: CourseId,
        query: &RosterQuery,
    ) -> Result<u32, StorageError> {
        let learners = self.learners.lock().map_err(poisoned)?;
        let enrolments = self.enrolments.lock().map_err(poisoned)?;
        let count = enrolments
            .keys()
            .filter(|(course, _)| *course == course_id)
            .filter_map(|(_, user_id)| learners.get(user_id))
            .filter(|learner| query.matches(learner))
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("roster count overflow".into()))
    }

    async fn enrolled_learners(
        &self,
        course_id: CourseId,
        user_ids: &[UserId],
    ) -> Result<Vec<Learner>, StorageError> {
        let learners = self.learners.lock().map_err(poisoned)?;
        let enrolments = self.enrolments.lock().map_err(poisoned)?;
        let unique: HashSet<UserId> = user_ids.iter().copied().collect();
        Ok(unique
            .into_iter()
            .filter(|user_id| enrolments.contains_key(&(course_id, *user_id)))
            .filter_map(|user_id| learners.get(&user_id).cloned())
            .collect())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub progress: Arc<dyn ProgressStore>,
    pub learners: Arc<dyn LearnerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            courses: Arc::new(repo.clone()),
            activities: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            learners: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use completion_core::model::{CompletionState, TrackingMode};
    use completion_core::time::fixed_now;

    async fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.upsert_course(&Course::new(CourseId::new(1), "Rust", "R", true).unwrap())
            .await
            .unwrap();
        for (id, mode) in [
            (3, TrackingMode::Manual),
            (1, TrackingMode::Automatic),
            (2, TrackingMode::None),
        ] {
            let activity = Activity::new(
                ActivityId::new(id),
                CourseId::new(1),
                format!("A{id}"),
                "page",
                mode,
            )
            .unwrap();
            repo.upsert_activity(&activity).await.unwrap();
        }
        repo
    }

    fn learner(id: u64, first: &str, last: &str) -> Learner {
        Learner::new(UserId::new(id), first, last, format!("{first}@example.com")).unwrap()
    }

    #[tokio::test]
    async fn activity_cannot_move_to_another_course() {
        let repo = seeded().await;
        repo.upsert_course(&Course::new(CourseId::new(2), "Go", "G", true).unwrap())
            .await
            .unwrap();
        let moved = Activity::new(
            ActivityId::new(3),
            CourseId::new(2),
            "A3",
            "page",
            TrackingMode::Manual,
        )
        .unwrap();
        let err = repo.upsert_activity(&moved).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert_eq!(
            repo.get_activity(ActivityId::new(3))
                .await
                .unwrap()
                .map(|a| a.course_id()),
            Some(CourseId::new(1))
        );

        let renamed = Activity::new(
            ActivityId::new(3),
            CourseId::new(1),
            "Renamed",
            "page",
            TrackingMode::Manual,
        )
        .unwrap();
        repo.upsert_activity(&renamed).await.unwrap();
    }

    #[tokio::test]
    async fn tracked_activities_skip_untracked_and_sort_by_id() {
        let repo = seeded().await;
        let ids: Vec<u64> = repo
            .list_tracked_activities(CourseId::new(1))
            .await
            .unwrap()
            .iter()
            .map(|a| a.id().value())
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn tracked_activities_empty_when_completion_disabled() {
        let repo = seeded().await;
        repo.upsert_course(&Course::new(CourseId::new(1), "Rust", "R", false).unwrap())
            .await
            .unwrap();
        assert!(
            repo.list_tracked_activities(CourseId::new(1))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn get_record_signals_not_found() {
        let repo = seeded().await;
        let err = repo
            .get_record(ActivityId::new(1), UserId::new(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn upsert_keeps_completion_and_rejects_regression() {
        let repo = seeded().await;
        let now = fixed_now();
        let done = CompletionRecord::untouched(ActivityId::new(1), UserId::new(5), now)
            .transition(CompletionState::CompleteGeneric, None, now)
            .unwrap();
        assert!(matches!(
            repo.upsert(&done).await.unwrap(),
            UpsertOutcome::Written(_)
        ));

        let wipe = CompletionRecord::untouched(
            ActivityId::new(1),
            UserId::new(5),
            now + Duration::hours(1),
        );
        assert!(matches!(
            repo.upsert(&wipe).await.unwrap_err(),
            StorageError::Rejected(_)
        ));

        let stored = repo
            .get_record(ActivityId::new(1), UserId::new(5))
            .await
            .unwrap();
        assert_eq!(stored, done);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let repo = seeded().await;
        let now = fixed_now();
        let started = CompletionRecord::untouched(ActivityId::new(1), UserId::new(5), now)
            .transition(CompletionState::InProgress, None, now)
            .unwrap();
        let first = repo.upsert(&started).await.unwrap();
        let second = repo.upsert(&started).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn delete_activity_cascades_records() {
        let repo = seeded().await;
        let now = fixed_now();
        let started = CompletionRecord::untouched(ActivityId::new(1), UserId::new(5), now)
            .transition(CompletionState::InProgress, None, now)
            .unwrap();
        repo.upsert(&started).await.unwrap();
        repo.delete_activity(ActivityId::new(1)).await.unwrap();
        let batch = repo
            .list_records_for_activity(ActivityId::new(1), &[UserId::new(5)])
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn roster_filters_sorts_and_pages() {
        let repo = seeded().await;
        for l in [
            learner(1, "Grace", "Hopper"),
            learner(2, "Ada", "Lovelace"),
            learner(3, "Alan", "Turing"),
            learner(4, "Barbara", "Liskov"),
        ] {
            repo.upsert_learner(&l).await.unwrap();
            repo.enrol(CourseId::new(1), l.id(), fixed_now()).await.unwrap();
        }

        let by_last = repo
            .list_enrolled(CourseId::new(1), &RosterQuery::default())
            .await
            .unwrap();
        let names: Vec<&str> = by_last.iter().map(Learner::last_name).collect();
        assert_eq!(names, vec!["Hopper", "Liskov", "Lovelace", "Turing"]);

        let l_only = RosterQuery {
            last_initial: Some("l".into()),
            limit: 1,
            offset: 1,
            ..RosterQuery::default()
        };
        let page = repo.list_enrolled(CourseId::new(1), &l_only).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].last_name(), "Lovelace");
        assert_eq!(repo.count_enrolled(CourseId::new(1), &l_only).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn roster_initials_fold_ascii_case_only() {
        let repo = seeded().await;
        for l in [
            learner(1, "Émile", "Zola"),
            learner(2, "edith", "Piaf"),
            learner(3, "Eve", "Adams"),
        ] {
            repo.upsert_learner(&l).await.unwrap();
            repo.enrol(CourseId::new(1), l.id(), fixed_now()).await.unwrap();
        }

        let e_first = RosterQuery {
            first_initial: Some("e".into()),
            order: RosterOrder::FirstName,
            ..RosterQuery::default()
        };
        let found = repo.list_enrolled(CourseId::new(1), &e_first).await.unwrap();
        let names: Vec<&str> = found.iter().map(Learner::first_name).collect();
        assert_eq!(names, vec!["edith", "Eve"]);

        let accented = RosterQuery {
            first_initial: Some("é".into()),
            ..RosterQuery::default()
        };
        assert_eq!(repo.count_enrolled(CourseId::new(1), &accented).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enrolled_learners_drops_strangers() {
        let repo = seeded().await;
        let l = learner(1, "Grace", "Hopper");
        repo.upsert_learner(&l).await.unwrap();
        repo.upsert_learner(&learner(2, "Ada", "Lovelace"))
            .await
            .unwrap();
        repo.enrol(CourseId::new(1), l.id(), fixed_now()).await.unwrap();

        let found = repo
            .enrolled_learners(CourseId::new(1), &[UserId::new(1), UserId::new(2), UserId::new(1)])
            .await
            .unwrap();
        assert_eq!(found, vec![l]);
    }
}
