//! Course-level progress aggregation.

mod query;
mod service;
mod summary;

pub use query::{ActivityFilter, CompletionWindow, SortDirection, SortField, SummaryRequest};
pub use service::Aggregator;
pub use summary::{
    ActivityCell, ActivityColumn, CourseProgressSummary, StatusTally, UserProgressRow,
    completion_percentage, sort_rows,
};
