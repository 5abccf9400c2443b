//! Shared error types for the services crate.

use thiserror::Error;

use completion_core::model::{
    ActivityId, ActivityError, CompletionError, CourseError, CourseId, LearnerError, TrackingMode,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `Aggregator` and `ProgressReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AggregationError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressTrackingService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackingError {
    #[error("activity {0} not found")]
    ActivityNotFound(ActivityId),
    #[error("activity {0} does not track completion")]
    NotTracked(ActivityId),
    #[error("activity {activity} expects {expected} tracking")]
    WrongTrackingMode {
        activity: ActivityId,
        expected: TrackingMode,
    },
    #[error("graded completions cannot be overridden")]
    GradedState,
    #[error("grade must be a finite number, got {0}")]
    InvalidGrade(f64),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CourseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServiceError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
