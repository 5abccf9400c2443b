mod activity;
mod completion;
mod course;
mod ids;
mod learner;

pub use ids::{ActivityId, CourseId, ParseIdError, UserId};

pub use activity::{Activity, ActivityError, TrackingMode};
pub use completion::{CompletionError, CompletionRecord, CompletionState, Reconciled, UserStatus};
pub use course::{Course, CourseError};
pub use learner::{Learner, LearnerError, name_has_initial};
