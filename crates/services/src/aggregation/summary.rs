use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use completion_core::model::{
    Activity, ActivityId, CompletionRecord, CompletionState, Course, CourseId, Learner,
    TrackingMode, UserId, UserStatus,
};

use super::query::{ActivityFilter, SortDirection, SortField};

//
// ─── TALLY ─────────────────────────────────────────────────────────────────────
//

/// Course-level counts of learners per derived status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub notstarted: u32,
    pub inprogress: u32,
    pub completed: u32,
}

impl StatusTally {
    pub fn record(&mut self, status: UserStatus) {
        match status {
            UserStatus::NotStarted => self.notstarted += 1,
            UserStatus::InProgress => self.inprogress += 1,
            UserStatus::Completed => self.completed += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.notstarted + self.inprogress + self.completed
    }
}

//
// ─── COLUMNS AND CELLS ─────────────────────────────────────────────────────────
//

/// A target activity as a report column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityColumn {
    pub id: ActivityId,
    pub name: String,
    pub module: String,
    pub tracking: TrackingMode,
    pub expected_by: Option<DateTime<Utc>>,
    /// The expected-completion date has passed.
    pub expired: bool,
}

impl ActivityColumn {
    #[must_use]
    pub fn from_activity(activity: &Activity, now: DateTime<Utc>) -> Self {
        Self {
            id: activity.id(),
            name: activity.name().to_owned(),
            module: activity.module().to_owned(),
            tracking: activity.tracking(),
            expected_by: activity.expected_by(),
            expired: activity.is_expired(now),
        }
    }
}

/// One learner's state for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityCell {
    pub activity_id: ActivityId,
    pub state: CompletionState,
    pub override_by: Option<UserId>,
    pub time_completed: Option<DateTime<Utc>>,
    pub time_modified: Option<DateTime<Utc>>,
}

impl ActivityCell {
    #[must_use]
    pub fn from_record(record: &CompletionRecord) -> Self {
        Self {
            activity_id: record.activity_id(),
            state: record.state(),
            override_by: record.override_by(),
            time_completed: record.time_completed(),
            time_modified: Some(record.time_modified()),
        }
    }

    /// No stored record: the learner never touched the activity.
    #[must_use]
    pub fn untouched(activity_id: ActivityId) -> Self {
        Self {
            activity_id,
            state: CompletionState::NotStarted,
            override_by: None,
            time_completed: None,
            time_modified: None,
        }
    }
}

//
// ─── ROWS ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProgressRow {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub completed_count: u32,
    pub percentage: f64,
    pub status: UserStatus,
    /// Earliest start over the target activities.
    pub time_started: Option<DateTime<Utc>>,
    /// Latest completion over the target activities.
    pub time_completed: Option<DateTime<Utc>>,
    pub cells: Vec<ActivityCell>,
}

impl UserProgressRow {
    #[must_use]
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (true, _) => self.last_name.clone(),
            (_, true) => self.first_name.clone(),
        }
    }

    pub(crate) fn for_learner(learner: &Learner) -> Self {
        Self {
            user_id: learner.id(),
            first_name: learner.first_name().to_owned(),
            last_name: learner.last_name().to_owned(),
            email: learner.email().to_owned(),
            completed_count: 0,
            percentage: 0.0,
            status: UserStatus::NotStarted,
            time_started: None,
            time_completed: None,
            cells: Vec::new(),
        }
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Derived per-course progress for one page of learners.
///
/// Never persisted; identical inputs produce an identical summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseProgressSummary {
    pub course_id: CourseId,
    pub course_name: String,
    /// False when completion is off for the course or nothing is tracked.
    pub enabled: bool,
    pub activity_filter: ActivityFilter,
    /// Set when the filtered activity no longer exists or is not tracked.
    pub missing_activity: Option<ActivityId>,
    pub tracked_count: u32,
    pub activities: Vec<ActivityColumn>,
    pub rows: Vec<UserProgressRow>,
    pub tally: StatusTally,
}

impl CourseProgressSummary {
    pub(crate) fn empty(course: &Course, activity_filter: ActivityFilter, enabled: bool) -> Self {
        Self {
            course_id: course.id(),
            course_name: course.full_name().to_owned(),
            enabled,
            activity_filter,
            missing_activity: None,
            tracked_count: 0,
            activities: Vec::new(),
            rows: Vec::new(),
            tally: StatusTally::default(),
        }
    }

    /// Serializes the summary for JSON consumers.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Percentage of completed activities, rounded half-up to two decimals.
///
/// Zero tracked activities yield `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn completion_percentage(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = u64::from(total);
    let hundredths = (u64::from(completed) * 20_000 + total) / (2 * total);
    hundredths as f64 / 100.0
}

fn name_key(first: &str, second: &str) -> (String, String) {
    (first.to_lowercase(), second.to_lowercase())
}

fn primary_order(a: &UserProgressRow, b: &UserProgressRow, field: SortField) -> Ordering {
    match field {
        SortField::LastName => {
            name_key(&a.last_name, &a.first_name).cmp(&name_key(&b.last_name, &b.first_name))
        }
        SortField::FirstName => {
            name_key(&a.first_name, &a.last_name).cmp(&name_key(&b.first_name, &b.last_name))
        }
        SortField::Email => a.email.to_lowercase().cmp(&b.email.to_lowercase()),
        SortField::Percentage => a.percentage.total_cmp(&b.percentage),
        SortField::CompletedCount => a.completed_count.cmp(&b.completed_count),
        SortField::Status => a.status.cmp(&b.status),
        SortField::UserId => Ordering::Equal,
    }
}

/// Sorts rows by `field`; ties always fall back to ascending user id.
pub fn sort_rows(rows: &mut [UserProgressRow], field: SortField, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let primary = primary_order(a, b, field);
        let primary = match direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.user_id.cmp(&b.user_id))
    });
}
