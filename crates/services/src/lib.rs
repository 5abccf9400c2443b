#![forbid(unsafe_code)]

pub mod aggregation;
pub mod app_services;
pub mod course_service;
pub mod error;
pub mod report_service;
pub mod tracking_service;

pub use completion_core::Clock;

pub use aggregation::{
    ActivityFilter, Aggregator, CompletionWindow, CourseProgressSummary, SortDirection, SortField,
    SummaryRequest, UserProgressRow,
};
pub use app_services::AppServices;
pub use course_service::CourseService;
pub use error::{AggregationError, AppServicesError, CourseServiceError, TrackingError};
pub use report_service::{DEFAULT_PAGE_SIZE, ProgressReportPage, ProgressReportService, ReportRequest};
pub use tracking_service::ProgressTrackingService;
