use std::sync::Arc;

use chrono::{DateTime, Utc};
use completion_core::model::{
    Activity, ActivityId, CompletionRecord, CompletionState, TrackingMode, UserId,
};
use storage::repository::{ActivityRepository, ProgressStore, StorageError, UpsertOutcome};

use crate::Clock;
use crate::error::TrackingError;

/// Applies learner and instructor events to stored completion records.
#[derive(Clone)]
pub struct ProgressTrackingService {
    clock: Clock,
    activities: Arc<dyn ActivityRepository>,
    progress: Arc<dyn ProgressStore>,
}

impl ProgressTrackingService {
    #[must_use]
    pub fn new(
        clock: Clock,
        activities: Arc<dyn ActivityRepository>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            clock,
            activities,
            progress,
        }
    }

    /// The learner opened the activity. Moves `NotStarted` to `InProgress`
    /// and leaves any later state alone.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::ActivityNotFound` or `TrackingError::NotTracked`
    /// for unusable activities, `TrackingError::Storage` on backend failures.
    pub async fn mark_viewed(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<CompletionRecord, TrackingError> {
        let activity = self.tracked_activity(activity_id).await?;
        let now = self.clock.now();
        let current = self.current_record(&activity, user_id, now).await?;
        if current.state().is_started() {
            return Ok(current);
        }
        let next = current.transition(CompletionState::InProgress, None, now)?;
        self.persist(next).await
    }

    /// The learner ticked off a manually tracked activity.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::WrongTrackingMode` unless the activity uses
    /// manual tracking.
    pub async fn mark_manual_complete(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<CompletionRecord, TrackingError> {
        let activity = self.activity_in_mode(activity_id, TrackingMode::Manual).await?;
        let now = self.clock.now();
        let current = self.current_record(&activity, user_id, now).await?;
        if current.state() == CompletionState::CompleteGeneric {
            return Ok(current);
        }
        let next = current.transition(CompletionState::CompleteGeneric, None, now)?;
        self.persist(next).await
    }

    /// A grade arrived for an automatically tracked activity.
    ///
    /// With a pass grade configured the record becomes pass or fail;
    /// otherwise any grade completes it. A regrade keeps the first
    /// completion time.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::InvalidGrade` for non-finite grades and
    /// `TrackingError::WrongTrackingMode` unless tracking is automatic.
    pub async fn record_grade(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
        grade: f64,
    ) -> Result<CompletionRecord, TrackingError> {
        if !grade.is_finite() {
            return Err(TrackingError::InvalidGrade(grade));
        }
        let activity = self
            .activity_in_mode(activity_id, TrackingMode::Automatic)
            .await?;
        let now = self.clock.now();
        let current = self.current_record(&activity, user_id, now).await?;
        let next = current.transition(activity.state_for_grade(grade), None, now)?;
        self.persist(next).await
    }

    /// Instructor override: flips between `CompleteGeneric` and `NotStarted`.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::GradedState` when the record holds a pass or
    /// fail outcome, which only grading may change.
    pub async fn toggle_override(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
        actor: UserId,
    ) -> Result<CompletionRecord, TrackingError> {
        let activity = self.tracked_activity(activity_id).await?;
        let now = self.clock.now();
        let current = self.current_record(&activity, user_id, now).await?;
        if current.state().is_graded() {
            return Err(TrackingError::GradedState);
        }
        let next_state = if current.state() == CompletionState::CompleteGeneric {
            CompletionState::NotStarted
        } else {
            CompletionState::CompleteGeneric
        };
        let next = current.transition(next_state, Some(actor), now)?;
        tracing::info!(
            activity_id = %activity_id,
            user_id = %user_id,
            actor = %actor,
            state = %next_state,
            "completion overridden"
        );
        self.persist(next).await
    }

    /// Instructor reset of any state back to `NotStarted`.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::Storage` on backend failures.
    pub async fn reset(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
        actor: UserId,
    ) -> Result<CompletionRecord, TrackingError> {
        let activity = self.tracked_activity(activity_id).await?;
        let now = self.clock.now();
        let current = self.current_record(&activity, user_id, now).await?;
        let next = current.transition(CompletionState::NotStarted, Some(actor), now)?;
        tracing::info!(
            activity_id = %activity_id,
            user_id = %user_id,
            actor = %actor,
            "completion reset"
        );
        self.persist(next).await
    }

    async fn tracked_activity(&self, activity_id: ActivityId) -> Result<Activity, TrackingError> {
        let activity = self
            .activities
            .get_activity(activity_id)
            .await?
            .ok_or(TrackingError::ActivityNotFound(activity_id))?;
        if !activity.is_tracked() {
            return Err(TrackingError::NotTracked(activity_id));
        }
        Ok(activity)
    }

    async fn activity_in_mode(
        &self,
        activity_id: ActivityId,
        expected: TrackingMode,
    ) -> Result<Activity, TrackingError> {
        let activity = self.tracked_activity(activity_id).await?;
        if activity.tracking() != expected {
            return Err(TrackingError::WrongTrackingMode {
                activity: activity_id,
                expected,
            });
        }
        Ok(activity)
    }

    async fn current_record(
        &self,
        activity: &Activity,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CompletionRecord, TrackingError> {
        match self.progress.get_record(activity.id(), user_id).await {
            Ok(record) => Ok(record),
            Err(StorageError::NotFound) => {
                Ok(CompletionRecord::untouched(activity.id(), user_id, now))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, record: CompletionRecord) -> Result<CompletionRecord, TrackingError> {
        match self.progress.upsert(&record).await? {
            UpsertOutcome::Written(stored) => Ok(stored),
            UpsertOutcome::Stale => {
                tracing::warn!(
                    activity_id = %record.activity_id(),
                    user_id = %record.user_id(),
                    "newer completion already stored; keeping it"
                );
                Ok(self
                    .progress
                    .get_record(record.activity_id(), record.user_id())
                    .await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use completion_core::model::{Course, CourseId};
    use completion_core::time::fixed_now;
    use storage::repository::Storage;

    const LEARNER: UserId = UserId::new(7);
    const TEACHER: UserId = UserId::new(1);

    async fn setup(clock: Clock) -> (Storage, ProgressTrackingService) {
        let storage = Storage::in_memory();
        let course = Course::new(CourseId::new(1), "Intro", "INTRO", true).unwrap();
        storage.courses.upsert_course(&course).await.unwrap();
        let quiz = Activity::new(
            ActivityId::new(1),
            course.id(),
            "Quiz",
            "quiz",
            TrackingMode::Automatic,
        )
        .unwrap()
        .with_pass_grade(5.0)
        .unwrap();
        let page = Activity::new(
            ActivityId::new(2),
            course.id(),
            "Page",
            "page",
            TrackingMode::Manual,
        )
        .unwrap();
        let forum = Activity::new(
            ActivityId::new(3),
            course.id(),
            "Forum",
            "forum",
            TrackingMode::None,
        )
        .unwrap();
        for activity in [&quiz, &page, &forum] {
            storage.activities.upsert_activity(activity).await.unwrap();
        }
        let service = ProgressTrackingService::new(
            clock,
            Arc::clone(&storage.activities),
            Arc::clone(&storage.progress),
        );
        (storage, service)
    }

    #[tokio::test]
    async fn view_then_manual_complete() {
        let (_storage, service) = setup(Clock::fixed(fixed_now())).await;
        let viewed = service.mark_viewed(ActivityId::new(2), LEARNER).await.unwrap();
        assert_eq!(viewed.state(), CompletionState::InProgress);
        assert_eq!(viewed.time_started(), Some(fixed_now()));

        let done = service
            .mark_manual_complete(ActivityId::new(2), LEARNER)
            .await
            .unwrap();
        assert_eq!(done.state(), CompletionState::CompleteGeneric);
        assert_eq!(done.time_completed(), Some(fixed_now()));

        let again = service.mark_viewed(ActivityId::new(2), LEARNER).await.unwrap();
        assert_eq!(again.state(), CompletionState::CompleteGeneric);
    }

    #[tokio::test]
    async fn grades_respect_pass_boundary_and_keep_first_completion() {
        let (storage, service) = setup(Clock::fixed(fixed_now())).await;
        let failed = service
            .record_grade(ActivityId::new(1), LEARNER, 3.0)
            .await
            .unwrap();
        assert_eq!(failed.state(), CompletionState::CompleteFail);

        let later = ProgressTrackingService::new(
            Clock::fixed(fixed_now() + Duration::days(1)),
            Arc::clone(&storage.activities),
            Arc::clone(&storage.progress),
        );
        let passed = later
            .record_grade(ActivityId::new(1), LEARNER, 8.0)
            .await
            .unwrap();
        assert_eq!(passed.state(), CompletionState::CompletePass);
        assert_eq!(passed.time_completed(), Some(fixed_now()));

        let err = service
            .record_grade(ActivityId::new(1), LEARNER, f64::NAN)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidGrade(_)));
    }

    #[tokio::test]
    async fn tracking_mode_is_checked() {
        let (_storage, service) = setup(Clock::fixed(fixed_now())).await;
        let err = service
            .mark_manual_complete(ActivityId::new(1), LEARNER)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrackingError::WrongTrackingMode {
                expected: TrackingMode::Manual,
                ..
            }
        ));
        let err = service
            .mark_viewed(ActivityId::new(3), LEARNER)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::NotTracked(_)));
        let err = service
            .mark_viewed(ActivityId::new(99), LEARNER)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::ActivityNotFound(_)));
    }

    #[tokio::test]
    async fn override_toggles_and_refuses_graded_records() {
        let (_storage, service) = setup(Clock::fixed(fixed_now())).await;
        let on = service
            .toggle_override(ActivityId::new(2), LEARNER, TEACHER)
            .await
            .unwrap();
        assert_eq!(on.state(), CompletionState::CompleteGeneric);
        assert_eq!(on.override_by(), Some(TEACHER));

        let off = service
            .toggle_override(ActivityId::new(2), LEARNER, TEACHER)
            .await
            .unwrap();
        assert_eq!(off.state(), CompletionState::NotStarted);
        assert_eq!(off.time_completed(), None);

        service
            .record_grade(ActivityId::new(1), LEARNER, 9.0)
            .await
            .unwrap();
        let err = service
            .toggle_override(ActivityId::new(1), LEARNER, TEACHER)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::GradedState));

        let reset = service
            .reset(ActivityId::new(1), LEARNER, TEACHER)
            .await
            .unwrap();
        assert_eq!(reset.state(), CompletionState::NotStarted);
        assert_eq!(reset.override_by(), Some(TEACHER));
    }
}
