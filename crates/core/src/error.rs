use thiserror::Error;

use crate::model::{ActivityError, CompletionError, CourseError, LearnerError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, CourseId, CourseError};

    fn build(full_name: &str) -> Result<Course, Error> {
        Ok(Course::new(CourseId::new(1), full_name, "SHORT", true)?)
    }

    #[test]
    fn model_errors_convert_into_crate_error() {
        let err = build(" ").unwrap_err();
        assert!(matches!(err, Error::Course(CourseError::EmptyFullName)));
        assert_eq!(err.to_string(), CourseError::EmptyFullName.to_string());
    }
}
