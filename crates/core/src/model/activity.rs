use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::completion::CompletionState;
use crate::model::ids::{ActivityId, CourseId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ActivityError {
    #[error("activity name cannot be empty")]
    EmptyName,

    #[error("activity module name cannot be empty")]
    EmptyModule,

    #[error("pass grade must be a finite, non-negative number, got {0}")]
    InvalidPassGrade(f64),

    #[error("invalid tracking mode: {0}")]
    InvalidTrackingMode(String),
}

//
// ─── TRACKING MODE ─────────────────────────────────────────────────────────────
//

/// How completion of an activity is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Not tracked; invisible to completion reports.
    None,
    /// The learner (or an instructor) ticks the activity off by hand.
    Manual,
    /// System events (viewing, grading) drive the state.
    Automatic,
}

impl TrackingMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingMode::None => "none",
            TrackingMode::Manual => "manual",
            TrackingMode::Automatic => "automatic",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::InvalidTrackingMode` for unknown values.
    pub fn parse(raw: &str) -> Result<Self, ActivityError> {
        match raw {
            "none" => Ok(TrackingMode::None),
            "manual" => Ok(TrackingMode::Manual),
            "automatic" => Ok(TrackingMode::Automatic),
            other => Err(ActivityError::InvalidTrackingMode(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_tracked(self) -> bool {
        !matches!(self, TrackingMode::None)
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ACTIVITY ──────────────────────────────────────────────────────────────────
//

/// One trackable item of a course.
///
/// Only the tracking mode may change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    id: ActivityId,
    course_id: CourseId,
    name: String,
    module: String,
    tracking: TrackingMode,
    expected_by: Option<DateTime<Utc>>,
    pass_grade: Option<f64>,
}

impl Activity {
    /// Creates a validated activity.
    ///
    /// `module` is the activity type (`quiz`, `page`, `assign`, ...).
    ///
    /// # Errors
    ///
    /// Returns `ActivityError` for blank names or an invalid pass grade.
    pub fn new(
        id: ActivityId,
        course_id: CourseId,
        name: impl Into<String>,
        module: impl Into<String>,
        tracking: TrackingMode,
    ) -> Result<Self, ActivityError> {
        let name = name.into().trim().to_owned();
        let module = module.into().trim().to_owned();
        if name.is_empty() {
            return Err(ActivityError::EmptyName);
        }
        if module.is_empty() {
            return Err(ActivityError::EmptyModule);
        }
        Ok(Self {
            id,
            course_id,
            name,
            module,
            tracking,
            expected_by: None,
            pass_grade: None,
        })
    }

    #[must_use]
    pub fn with_expected_by(mut self, expected_by: DateTime<Utc>) -> Self {
        self.expected_by = Some(expected_by);
        self
    }

    /// Attaches a pass/fail grade boundary.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::InvalidPassGrade` for negative or non-finite values.
    pub fn with_pass_grade(mut self, pass_grade: f64) -> Result<Self, ActivityError> {
        if !pass_grade.is_finite() || pass_grade < 0.0 {
            return Err(ActivityError::InvalidPassGrade(pass_grade));
        }
        self.pass_grade = Some(pass_grade);
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> ActivityId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn tracking(&self) -> TrackingMode {
        self.tracking
    }

    #[must_use]
    pub fn expected_by(&self) -> Option<DateTime<Utc>> {
        self.expected_by
    }

    #[must_use]
    pub fn pass_grade(&self) -> Option<f64> {
        self.pass_grade
    }

    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracking.is_tracked()
    }

    /// Course editors may switch the tracking mode at any time.
    pub fn set_tracking(&mut self, tracking: TrackingMode) {
        self.tracking = tracking;
    }

    /// True once the expected-completion date has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expected_by.is_some_and(|at| at <= now)
    }

    /// Completion state earned by a grade.
    ///
    /// With a pass boundary the grade decides pass or fail; without one any
    /// grade completes the activity generically.
    #[must_use]
    pub fn state_for_grade(&self, grade: f64) -> CompletionState {
        match self.pass_grade {
            Some(boundary) if grade >= boundary => CompletionState::CompletePass,
            Some(_) => CompletionState::CompleteFail,
            None => CompletionState::CompleteGeneric,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn quiz() -> Activity {
        Activity::new(
            ActivityId::new(1),
            CourseId::new(1),
            "Quiz 1",
            "quiz",
            TrackingMode::Automatic,
        )
        .unwrap()
    }

    #[test]
    fn tracking_mode_round_trips_through_str() {
        for mode in [TrackingMode::None, TrackingMode::Manual, TrackingMode::Automatic] {
            assert_eq!(TrackingMode::parse(mode.as_str()).unwrap(), mode);
        }
        assert!(TrackingMode::parse("sometimes").is_err());
    }

    #[test]
    fn grade_boundary_decides_pass_or_fail() {
        let activity = quiz().with_pass_grade(5.0).unwrap();
        assert_eq!(activity.state_for_grade(5.0), CompletionState::CompletePass);
        assert_eq!(activity.state_for_grade(4.99), CompletionState::CompleteFail);
    }

    #[test]
    fn grade_without_boundary_completes_generically() {
        assert_eq!(quiz().state_for_grade(0.0), CompletionState::CompleteGeneric);
    }

    #[test]
    fn rejects_negative_pass_grade() {
        assert!(matches!(
            quiz().with_pass_grade(-1.0),
            Err(ActivityError::InvalidPassGrade(_))
        ));
    }

    #[test]
    fn expiry_follows_expected_date() {
        let now = fixed_now();
        let activity = quiz().with_expected_by(now - Duration::days(1));
        assert!(activity.is_expired(now));
        assert!(!quiz().is_expired(now));
    }

    #[test]
    fn untracked_activity_reports_as_such() {
        let mut activity = quiz();
        activity.set_tracking(TrackingMode::None);
        assert!(!activity.is_tracked());
    }
}
