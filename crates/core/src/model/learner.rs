use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LearnerError {
    #[error("learner must have a first or last name")]
    EmptyName,
}

/// A user as seen by completion reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    id: UserId,
    first_name: String,
    last_name: String,
    email: String,
}

impl Learner {
    /// # Errors
    ///
    /// Returns `LearnerError::EmptyName` when both names are blank.
    pub fn new(
        id: UserId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, LearnerError> {
        let first_name = first_name.into().trim().to_owned();
        let last_name = last_name.into().trim().to_owned();
        if first_name.is_empty() && last_name.is_empty() {
            return Err(LearnerError::EmptyName);
        }
        Ok(Self {
            id,
            first_name,
            last_name,
            email: email.into().trim().to_owned(),
        })
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (true, _) => self.last_name.clone(),
            (_, true) => self.first_name.clone(),
        }
    }
}

/// "Starts with" used by the initials filters.
///
/// Only ASCII letters fold case, matching SQLite's `LIKE`; `É` and `é` are
/// different initials.
#[must_use]
pub fn name_has_initial(name: &str, initial: &str) -> bool {
    let initial = initial.trim();
    name.as_bytes()
        .get(..initial.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(initial.as_bytes()))
}
