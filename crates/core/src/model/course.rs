use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::CourseId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course full name cannot be empty")]
    EmptyFullName,

    #[error("course short name cannot be empty")]
    EmptyShortName,
}

/// A course whose activities may be tracked for completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    id: CourseId,
    full_name: String,
    short_name: String,
    completion_enabled: bool,
}

impl Course {
    /// Creates a validated course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if either name is blank.
    pub fn new(
        id: CourseId,
        full_name: impl Into<String>,
        short_name: impl Into<String>,
        completion_enabled: bool,
    ) -> Result<Self, CourseError> {
        let full_name = full_name.into().trim().to_owned();
        let short_name = short_name.into().trim().to_owned();
        if full_name.is_empty() {
            return Err(CourseError::EmptyFullName);
        }
        if short_name.is_empty() {
            return Err(CourseError::EmptyShortName);
        }
        Ok(Self {
            id,
            full_name,
            short_name,
            completion_enabled,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Whether completion tracking is switched on for this course.
    #[must_use]
    pub fn completion_enabled(&self) -> bool {
        self.completion_enabled
    }

    pub fn set_completion_enabled(&mut self, enabled: bool) {
        self.completion_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_names() {
        let course = Course::new(CourseId::new(1), "  Rust 101 ", " R101", true).unwrap();
        assert_eq!(course.full_name(), "Rust 101");
        assert_eq!(course.short_name(), "R101");
        assert!(course.completion_enabled());
    }

    #[test]
    fn rejects_blank_names() {
        assert_eq!(
            Course::new(CourseId::new(1), " ", "R", true).unwrap_err(),
            CourseError::EmptyFullName
        );
        assert_eq!(
            Course::new(CourseId::new(1), "Rust", "", true).unwrap_err(),
            CourseError::EmptyShortName
        );
    }
}
