use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ActivityId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("invalid completion record: {0}")]
    InvalidRecord(String),

    #[error("cannot move a completion from {from} back to {to}")]
    Regression {
        from: CompletionState,
        to: CompletionState,
    },

    #[error("returning to not-started requires an override actor")]
    OverrideRequired,

    #[error("record belongs to a different activity or user")]
    KeyMismatch,

    #[error("invalid completion state: {0}")]
    InvalidState(String),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Per-activity completion state.
///
/// `NotStarted -> InProgress -> Complete*`; the only way back is an override
/// actor resetting to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    NotStarted,
    InProgress,
    CompletePass,
    CompleteFail,
    CompleteGeneric,
}

impl CompletionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionState::NotStarted => "not_started",
            CompletionState::InProgress => "in_progress",
            CompletionState::CompletePass => "complete_pass",
            CompletionState::CompleteFail => "complete_fail",
            CompletionState::CompleteGeneric => "complete_generic",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::InvalidState` for unknown values.
    pub fn parse(raw: &str) -> Result<Self, CompletionError> {
        match raw {
            "not_started" => Ok(CompletionState::NotStarted),
            "in_progress" => Ok(CompletionState::InProgress),
            "complete_pass" => Ok(CompletionState::CompletePass),
            "complete_fail" => Ok(CompletionState::CompleteFail),
            "complete_generic" => Ok(CompletionState::CompleteGeneric),
            other => Err(CompletionError::InvalidState(other.to_owned())),
        }
    }

    /// Any of the `complete-*` states.
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            CompletionState::CompletePass
                | CompletionState::CompleteFail
                | CompletionState::CompleteGeneric
        )
    }

    #[must_use]
    pub fn is_started(self) -> bool {
        !matches!(self, CompletionState::NotStarted)
    }

    /// Pass/fail outcomes come from grading and cannot be toggled by hand.
    #[must_use]
    pub fn is_graded(self) -> bool {
        matches!(
            self,
            CompletionState::CompletePass | CompletionState::CompleteFail
        )
    }
}

impl std::fmt::Display for CompletionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── COURSE-LEVEL STATUS ───────────────────────────────────────────────────────
//

/// A learner's derived status across all target activities of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl UserStatus {
    /// Derives the status from per-activity tallies.
    ///
    /// All complete is `Completed`; anything started (or completed) short of
    /// that is `InProgress`; otherwise `NotStarted`.
    #[must_use]
    pub fn derive(completed: usize, started: usize, total: usize) -> Self {
        if total > 0 && completed >= total {
            UserStatus::Completed
        } else if started > 0 || completed > 0 {
            UserStatus::InProgress
        } else {
            UserStatus::NotStarted
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::NotStarted => "notstarted",
            UserStatus::InProgress => "inprogress",
            UserStatus::Completed => "completed",
        }
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// One learner's state for one activity.
///
/// Invariants: `time_completed` is set exactly when the state is `complete-*`,
/// and `time_started` is set exactly when the state is not `NotStarted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    user_id: UserId,
    activity_id: ActivityId,
    state: CompletionState,
    override_by: Option<UserId>,
    time_started: Option<DateTime<Utc>>,
    time_completed: Option<DateTime<Utc>>,
    time_modified: DateTime<Utc>,
}

/// What a store should do with an incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Persist this record (possibly adjusted to keep sticky timestamps).
    Write(CompletionRecord),
    /// The stored record is newer; keep it.
    Stale,
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl CompletionRecord {
    /// The implicit record of a learner who never touched the activity.
    #[must_use]
    pub fn untouched(activity_id: ActivityId, user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            activity_id,
            state: CompletionState::NotStarted,
            override_by: None,
            time_started: None,
            time_completed: None,
            time_modified: at,
        }
    }

    /// Rebuilds a record from storage, validating the timestamp invariants.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::InvalidRecord` if timestamps contradict the state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        activity_id: ActivityId,
        user_id: UserId,
        state: CompletionState,
        override_by: Option<UserId>,
        time_started: Option<DateTime<Utc>>,
        time_completed: Option<DateTime<Utc>>,
        time_modified: DateTime<Utc>,
    ) -> Result<Self, CompletionError> {
        if state.is_complete() != time_completed.is_some() {
            return Err(CompletionError::InvalidRecord(format!(
                "state {state} with time_completed {}",
                if time_completed.is_some() { "set" } else { "unset" }
            )));
        }
        if state.is_started() != time_started.is_some() {
            return Err(CompletionError::InvalidRecord(format!(
                "state {state} with time_started {}",
                if time_started.is_some() { "set" } else { "unset" }
            )));
        }
        Ok(Self {
            user_id,
            activity_id,
            state,
            override_by,
            time_started,
            time_completed,
            time_modified,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn activity_id(&self) -> ActivityId {
        self.activity_id
    }

    #[must_use]
    pub fn state(&self) -> CompletionState {
        self.state
    }

    #[must_use]
    pub fn override_by(&self) -> Option<UserId> {
        self.override_by
    }

    #[must_use]
    pub fn time_started(&self) -> Option<DateTime<Utc>> {
        self.time_started
    }

    #[must_use]
    pub fn time_completed(&self) -> Option<DateTime<Utc>> {
        self.time_completed
    }

    #[must_use]
    pub fn time_modified(&self) -> DateTime<Utc> {
        self.time_modified
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Moves the record to `next`, keeping timestamps consistent.
    ///
    /// `actor` marks the change as an override. A completion time, once
    /// recorded, never changes while the record stays complete.
    ///
    /// # Errors
    ///
    /// - `CompletionError::OverrideRequired` when going back to `NotStarted`
    ///   without an actor.
    /// - `CompletionError::Regression` when leaving a `complete-*` state for
    ///   `InProgress`.
    pub fn transition(
        &self,
        next: CompletionState,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<Self, CompletionError> {
        if next == CompletionState::NotStarted {
            if self.state.is_started() && actor.is_none() {
                return Err(CompletionError::OverrideRequired);
            }
            return Ok(Self {
                state: next,
                override_by: actor,
                time_started: None,
                time_completed: None,
                time_modified: at,
                ..self.clone()
            });
        }

        if self.state.is_complete() && !next.is_complete() {
            return Err(CompletionError::Regression {
                from: self.state,
                to: next,
            });
        }

        let time_completed = if next.is_complete() {
            self.time_completed.or(Some(at))
        } else {
            None
        };

        Ok(Self {
            state: next,
            override_by: actor,
            time_started: self.time_started.or(Some(at)),
            time_completed,
            time_modified: at,
            ..self.clone()
        })
    }

    /// Decides how `incoming` lands on top of the stored record.
    ///
    /// Last writer wins on `time_modified`; an older incoming record is
    /// `Stale`. Completion is sticky: a stored completion time survives any
    /// complete-to-complete update, and a complete record only goes back to
    /// `NotStarted` through an override actor.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` when the write would regress the record or
    /// targets a different key.
    pub fn reconcile(
        existing: Option<&CompletionRecord>,
        incoming: CompletionRecord,
    ) -> Result<Reconciled, CompletionError> {
        let Some(current) = existing else {
            return Ok(Reconciled::Write(incoming));
        };

        if current.user_id != incoming.user_id || current.activity_id != incoming.activity_id {
            return Err(CompletionError::KeyMismatch);
        }
        if incoming.time_modified < current.time_modified {
            return Ok(Reconciled::Stale);
        }

        if incoming.state == CompletionState::NotStarted {
            if current.state.is_started() && incoming.override_by.is_none() {
                return Err(if current.state.is_complete() {
                    CompletionError::Regression {
                        from: current.state,
                        to: incoming.state,
                    }
                } else {
                    CompletionError::OverrideRequired
                });
            }
            return Ok(Reconciled::Write(incoming));
        }

        if current.state.is_complete() && !incoming.state.is_complete() {
            return Err(CompletionError::Regression {
                from: current.state,
                to: incoming.state,
            });
        }

        let mut merged = incoming;
        merged.time_started = earliest(current.time_started, merged.time_started);
        if current.state.is_complete() {
            merged.time_completed = current.time_completed;
        }
        Ok(Reconciled::Write(merged))
    }
}
