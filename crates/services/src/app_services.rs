use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::aggregation::Aggregator;
use crate::course_service::CourseService;
use crate::error::AppServicesError;
use crate::report_service::ProgressReportService;
use crate::tracking_service::ProgressTrackingService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    aggregator: Arc<Aggregator>,
    reports: Arc<ProgressReportService>,
    tracking: Arc<ProgressTrackingService>,
    courses: Arc<CourseService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, applying migrations.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over fresh in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let aggregator = Aggregator::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.activities),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.learners),
        );
        let reports = Arc::new(ProgressReportService::new(
            aggregator.clone(),
            Arc::clone(&storage.learners),
        ));
        let tracking = Arc::new(ProgressTrackingService::new(
            clock,
            Arc::clone(&storage.activities),
            Arc::clone(&storage.progress),
        ));
        let courses = Arc::new(CourseService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.activities),
            Arc::clone(&storage.learners),
        ));

        Self {
            aggregator: Arc::new(aggregator),
            reports,
            tracking,
            courses,
        }
    }

    #[must_use]
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.aggregator)
    }

    #[must_use]
    pub fn reports(&self) -> Arc<ProgressReportService> {
        Arc::clone(&self.reports)
    }

    #[must_use]
    pub fn tracking(&self) -> Arc<ProgressTrackingService> {
        Arc::clone(&self.tracking)
    }

    #[must_use]
    pub fn courses(&self) -> Arc<CourseService> {
        Arc::clone(&self.courses)
    }
}
