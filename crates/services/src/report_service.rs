use std::sync::Arc;

use completion_core::model::{CourseId, UserId};
use storage::repository::{LearnerRepository, RosterOrder, RosterQuery};

use crate::aggregation::{
    ActivityFilter, Aggregator, CompletionWindow, CourseProgressSummary, SortDirection, SortField,
    SummaryRequest,
};
use crate::error::AggregationError;

/// Learners shown per report page unless the caller asks otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Parameters of one report page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub course_id: CourseId,
    pub activity: ActivityFilter,
    pub roster: RosterQuery,
    pub window: CompletionWindow,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl ReportRequest {
    /// First page of every enrolled learner over all tracked activities.
    #[must_use]
    pub fn new(course_id: CourseId) -> Self {
        Self {
            course_id,
            activity: ActivityFilter::All,
            roster: RosterQuery {
                limit: DEFAULT_PAGE_SIZE,
                ..RosterQuery::default()
            },
            window: CompletionWindow::default(),
            sort: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

/// One page of the course progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReportPage {
    pub summary: CourseProgressSummary,
    /// Enrolled learners passing the initials filters.
    pub total_matching: u32,
    /// Every enrolled learner of the course.
    pub grand_total: u32,
    pub offset: u32,
    pub limit: u32,
}

impl ProgressReportPage {
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.limit > 0 && self.offset.saturating_add(self.limit) < self.total_matching
    }

    #[must_use]
    pub fn next_offset(&self) -> Option<u32> {
        self.has_next().then(|| self.offset + self.limit)
    }

    #[must_use]
    pub fn previous_offset(&self) -> Option<u32> {
        (self.limit > 0 && self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }
}

/// Pages through a course roster and aggregates each page.
#[derive(Clone)]
pub struct ProgressReportService {
    aggregator: Aggregator,
    learners: Arc<dyn LearnerRepository>,
}

impl ProgressReportService {
    #[must_use]
    pub fn new(aggregator: Aggregator, learners: Arc<dyn LearnerRepository>) -> Self {
        Self {
            aggregator,
            learners,
        }
    }

    /// Builds one report page.
    ///
    /// The roster is paged in name order; rows within the page then follow
    /// the requested sort.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::CourseNotFound` for an unknown course.
    /// Returns `AggregationError::Storage` if any read fails.
    pub async fn report(
        &self,
        request: &ReportRequest,
    ) -> Result<ProgressReportPage, AggregationError> {
        let mut roster = request.roster.clone();
        roster.order = match request.sort {
            SortField::FirstName => RosterOrder::FirstName,
            _ => RosterOrder::LastName,
        };

        let grand_total = self
            .learners
            .count_enrolled(request.course_id, &RosterQuery::default())
            .await?;
        let total_matching = self
            .learners
            .count_enrolled(request.course_id, &roster)
            .await?;
        let page = self.learners.list_enrolled(request.course_id, &roster).await?;
        let candidates: Vec<UserId> = page.iter().map(|l| l.id()).collect();

        let summary_request = SummaryRequest::new(request.course_id, candidates)
            .with_activity(request.activity)
            .with_window(request.window)
            .sorted_by(request.sort, request.direction);
        let summary = self.aggregator.summarize(&summary_request).await?;

        tracing::info!(
            course_id = %request.course_id,
            offset = roster.offset,
            rows = summary.rows.len(),
            total_matching,
            "built progress report page"
        );
        Ok(ProgressReportPage {
            summary,
            total_matching,
            grand_total,
            offset: roster.offset,
            limit: roster.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use completion_core::model::{Activity, ActivityId, Course, Learner, TrackingMode};
    use completion_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    async fn service() -> ProgressReportService {
        let storage = Storage::in_memory();
        let course = Course::new(CourseId::new(1), "Intro", "INTRO", true).unwrap();
        storage.courses.upsert_course(&course).await.unwrap();
        let reading = Activity::new(
            ActivityId::new(1),
            course.id(),
            "Reading",
            "page",
            TrackingMode::Manual,
        )
        .unwrap();
        storage.activities.upsert_activity(&reading).await.unwrap();
        for (id, first, last) in [(1, "Zoe", "Adams"), (2, "Amy", "Young"), (3, "Ben", "Moss")] {
            let learner = Learner::new(UserId::new(id), first, last, "").unwrap();
            storage.learners.upsert_learner(&learner).await.unwrap();
            storage
                .learners
                .enrol(course.id(), learner.id(), fixed_now())
                .await
                .unwrap();
        }

        let aggregator = Aggregator::new(
            fixed_clock(),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.activities),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.learners),
        );
        ProgressReportService::new(aggregator, Arc::clone(&storage.learners))
    }

    fn page(offset: u32, limit: u32, total: u32) -> ProgressReportPage {
        ProgressReportPage {
            summary: CourseProgressSummary {
                course_id: CourseId::new(1),
                course_name: "Intro".into(),
                enabled: true,
                activity_filter: ActivityFilter::All,
                missing_activity: None,
                tracked_count: 0,
                activities: Vec::new(),
                rows: Vec::new(),
                tally: Default::default(),
            },
            total_matching: total,
            grand_total: total,
            offset,
            limit,
        }
    }

    #[test]
    fn paging_offsets() {
        let first = page(0, 25, 60);
        assert_eq!(first.next_offset(), Some(25));
        assert_eq!(first.previous_offset(), None);

        let last = page(50, 25, 60);
        assert!(!last.has_next());
        assert_eq!(last.previous_offset(), Some(25));

        let unpaged = page(0, 0, 60);
        assert!(!unpaged.has_next());
    }

    #[tokio::test]
    async fn unknown_course_is_reported_as_not_found() {
        let reports = service().await;
        let err = reports
            .report(&ReportRequest::new(CourseId::new(42)))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::CourseNotFound(id) if id == CourseId::new(42)));
    }

    #[tokio::test]
    async fn first_name_sort_pages_the_roster_by_first_name() {
        let reports = service().await;
        let mut request = ReportRequest::new(CourseId::new(1));
        request.roster.limit = 2;

        let by_last = reports.report(&request).await.unwrap();
        let last_names: Vec<&str> = by_last
            .summary
            .rows
            .iter()
            .map(|r| r.last_name.as_str())
            .collect();
        assert_eq!(last_names, vec!["Adams", "Moss"]);

        request.sort = SortField::FirstName;
        let by_first = reports.report(&request).await.unwrap();
        let first_names: Vec<&str> = by_first
            .summary
            .rows
            .iter()
            .map(|r| r.first_name.as_str())
            .collect();
        assert_eq!(first_names, vec!["Amy", "Ben"]);
        assert_eq!(by_first.total_matching, 3);
        assert_eq!(by_first.next_offset(), Some(2));

        request.roster.offset = 2;
        let rest = reports.report(&request).await.unwrap();
        assert_eq!(rest.summary.rows.len(), 1);
        assert_eq!(rest.summary.rows[0].first_name, "Zoe");
        assert!(!rest.has_next());
    }
}
