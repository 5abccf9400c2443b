use chrono::{DateTime, Utc};
use serde::Serialize;

use completion_core::model::{ActivityId, CourseId, UserId};

/// Which activities a summary covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityFilter {
    #[default]
    All,
    Single(ActivityId),
}

impl ActivityFilter {
    /// Maps the conventional raw id, where `0` means every activity.
    #[must_use]
    pub fn from_raw(id: u64) -> Self {
        if id == 0 {
            ActivityFilter::All
        } else {
            ActivityFilter::Single(ActivityId::new(id))
        }
    }
}

/// Optional inclusive bounds on a learner's completion time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl CompletionWindow {
    #[must_use]
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Whether a learner with stored progress and this completion time stays
    /// in the report.
    ///
    /// With any bound set, a missing completion time is rejected along with
    /// times outside the bounds.
    #[must_use]
    pub fn admits(&self, completed_at: Option<DateTime<Utc>>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(at) = completed_at else {
            return false;
        };
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    LastName,
    FirstName,
    Email,
    Percentage,
    CompletedCount,
    Status,
    UserId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Input of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub course_id: CourseId,
    pub activity: ActivityFilter,
    pub candidates: Vec<UserId>,
    pub window: CompletionWindow,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl SummaryRequest {
    #[must_use]
    pub fn new(course_id: CourseId, candidates: Vec<UserId>) -> Self {
        Self {
            course_id,
            activity: ActivityFilter::All,
            candidates,
            window: CompletionWindow::default(),
            sort: SortField::default(),
            direction: SortDirection::default(),
        }
    }

    #[must_use]
    pub fn with_activity(mut self, activity: ActivityFilter) -> Self {
        self.activity = activity;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: CompletionWindow) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn sorted_by(mut self, sort: SortField, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }
}
