use std::sync::Arc;

use completion_core::model::{
    Activity, ActivityId, Course, CourseId, Learner, TrackingMode, UserId,
};
use storage::repository::{ActivityRepository, CourseRepository, LearnerRepository, StorageError};

use crate::Clock;
use crate::error::CourseServiceError;

/// Orchestrates course, activity and roster administration.
#[derive(Clone)]
pub struct CourseService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    activities: Arc<dyn ActivityRepository>,
    learners: Arc<dyn LearnerRepository>,
}

impl CourseService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        activities: Arc<dyn ActivityRepository>,
        learners: Arc<dyn LearnerRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            activities,
            learners,
        }
    }

    /// Create or replace a course.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Course` for validation failures.
    /// Returns `CourseServiceError::Storage` if persistence fails.
    pub async fn create_course(
        &self,
        id: CourseId,
        full_name: &str,
        short_name: &str,
        completion_enabled: bool,
    ) -> Result<Course, CourseServiceError> {
        let course = Course::new(id, full_name, short_name, completion_enabled)?;
        self.courses.upsert_course(&course).await?;
        tracing::info!(course_id = %id, "course saved");
        Ok(course)
    }

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if repository access fails.
    pub async fn get_course(&self, id: CourseId) -> Result<Option<Course>, CourseServiceError> {
        Ok(self.courses.get_course(id).await?)
    }

    /// Turn completion tracking on or off for the whole course.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::CourseNotFound` for an unknown course.
    pub async fn set_completion_enabled(
        &self,
        id: CourseId,
        enabled: bool,
    ) -> Result<Course, CourseServiceError> {
        let mut course = self.require_course(id).await?;
        course.set_completion_enabled(enabled);
        self.courses.upsert_course(&course).await?;
        Ok(course)
    }

    /// Register an activity in an existing course.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::CourseNotFound` when the course is unknown,
    /// and `CourseServiceError::Storage` with `StorageError::Conflict` when the
    /// activity id is already registered in another course.
    pub async fn add_activity(&self, activity: &Activity) -> Result<(), CourseServiceError> {
        self.require_course(activity.course_id()).await?;
        self.activities.upsert_activity(activity).await?;
        tracing::debug!(
            activity_id = %activity.id(),
            course_id = %activity.course_id(),
            tracking = %activity.tracking(),
            "activity saved"
        );
        Ok(())
    }

    /// Change how completion of an activity is tracked.
    ///
    /// Existing records are kept; switching to `TrackingMode::None` only
    /// hides the activity from reports.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` with `StorageError::NotFound`
    /// for an unknown activity.
    pub async fn set_tracking_mode(
        &self,
        id: ActivityId,
        tracking: TrackingMode,
    ) -> Result<Activity, CourseServiceError> {
        let mut activity = self
            .activities
            .get_activity(id)
            .await?
            .ok_or(StorageError::NotFound)?;
        activity.set_tracking(tracking);
        self.activities.upsert_activity(&activity).await?;
        Ok(activity)
    }

    /// Delete an activity and every completion record for it.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if the activity is unknown or
    /// deletion fails.
    pub async fn remove_activity(&self, id: ActivityId) -> Result<(), CourseServiceError> {
        self.activities.delete_activity(id).await?;
        tracing::info!(activity_id = %id, "activity removed");
        Ok(())
    }

    /// Create or update a learner profile.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Learner` for validation failures.
    pub async fn register_learner(
        &self,
        id: UserId,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Learner, CourseServiceError> {
        let learner = Learner::new(id, first_name, last_name, email)?;
        self.learners.upsert_learner(&learner).await?;
        Ok(learner)
    }

    /// Enrol a registered learner into a course.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` with `StorageError::NotFound`
    /// when the course or learner is unknown.
    pub async fn enrol(&self, course_id: CourseId, user_id: UserId) -> Result<(), CourseServiceError> {
        self.learners
            .enrol(course_id, user_id, self.clock.now())
            .await?;
        Ok(())
    }

    async fn require_course(&self, id: CourseId) -> Result<Course, CourseServiceError> {
        self.courses
            .get_course(id)
            .await?
            .ok_or(CourseServiceError::CourseNotFound(id))
    }
}
