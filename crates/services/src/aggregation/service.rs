use std::collections::HashMap;
use std::sync::Arc;

use completion_core::model::{Activity, CompletionRecord, Course, UserId, UserStatus};
use storage::repository::{
    ActivityRepository, CourseRepository, LearnerRepository, ProgressStore,
};

use super::query::{ActivityFilter, SummaryRequest};
use super::summary::{
    ActivityCell, ActivityColumn, CourseProgressSummary, UserProgressRow, completion_percentage,
    sort_rows,
};
use crate::Clock;
use crate::error::AggregationError;

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Builds `CourseProgressSummary` values from stored completion state.
///
/// Read-only: aggregation never writes back, so repeated calls over the same
/// stored state return the same summary.
#[derive(Clone)]
pub struct Aggregator {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    activities: Arc<dyn ActivityRepository>,
    progress: Arc<dyn ProgressStore>,
    learners: Arc<dyn LearnerRepository>,
}

impl Aggregator {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        activities: Arc<dyn ActivityRepository>,
        progress: Arc<dyn ProgressStore>,
        learners: Arc<dyn LearnerRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            activities,
            progress,
            learners,
        }
    }

    /// Summarizes progress of the requested candidates in one course.
    ///
    /// Candidates not enrolled in the course are ignored. With an active
    /// completion window, learners with stored progress whose latest
    /// completion falls outside it, or who have none, are left out of both
    /// rows and tally. Learners without any stored record always count as
    /// not started.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError::CourseNotFound` for an unknown course.
    /// Returns `AggregationError::Storage` if any read fails.
    pub async fn summarize(
        &self,
        request: &SummaryRequest,
    ) -> Result<CourseProgressSummary, AggregationError> {
        let course = self
            .courses
            .get_course(request.course_id)
            .await?
            .ok_or(AggregationError::CourseNotFound(request.course_id))?;

        if !course.completion_enabled() {
            tracing::debug!(course_id = %course.id(), "completion disabled for course");
            return Ok(CourseProgressSummary::empty(&course, request.activity, false));
        }

        let tracked = self.activities.list_tracked_activities(course.id()).await?;
        if tracked.is_empty() {
            tracing::debug!(course_id = %course.id(), "course has no tracked activities");
            return Ok(CourseProgressSummary::empty(&course, request.activity, false));
        }

        let targets = match request.activity {
            ActivityFilter::All => tracked,
            ActivityFilter::Single(id) => {
                let Some(activity) = tracked.into_iter().find(|a| a.id() == id) else {
                    tracing::warn!(
                        course_id = %course.id(),
                        activity_id = %id,
                        "filtered activity is missing or untracked"
                    );
                    let mut summary = CourseProgressSummary::empty(&course, request.activity, true);
                    summary.missing_activity = Some(id);
                    return Ok(summary);
                };
                vec![activity]
            }
        };

        self.summarize_targets(&course, &targets, request).await
    }

    async fn summarize_targets(
        &self,
        course: &Course,
        targets: &[Activity],
        request: &SummaryRequest,
    ) -> Result<CourseProgressSummary, AggregationError> {
        let now = self.clock.now();
        let mut summary = CourseProgressSummary::empty(course, request.activity, true);
        summary.tracked_count = to_u32(targets.len());
        summary.activities = targets
            .iter()
            .map(|activity| ActivityColumn::from_activity(activity, now))
            .collect();

        let mut learners = self
            .learners
            .enrolled_learners(course.id(), &request.candidates)
            .await?;
        if learners.is_empty() {
            return Ok(summary);
        }
        learners.sort_by_key(|l| l.id());
        let user_ids: Vec<UserId> = learners.iter().map(|l| l.id()).collect();

        let mut records: Vec<HashMap<UserId, CompletionRecord>> = Vec::with_capacity(targets.len());
        for activity in targets {
            records.push(
                self.progress
                    .list_records_for_activity(activity.id(), &user_ids)
                    .await?,
            );
        }

        for learner in &learners {
            let mut row = UserProgressRow::for_learner(learner);
            let mut completed = 0_usize;
            let mut started = 0_usize;
            let mut has_records = false;

            for (activity, by_user) in targets.iter().zip(&records) {
                let Some(record) = by_user.get(&learner.id()) else {
                    row.cells.push(ActivityCell::untouched(activity.id()));
                    continue;
                };
                has_records = true;
                if record.is_complete() {
                    completed += 1;
                }
                if record.state().is_started() {
                    started += 1;
                }
                row.time_started = match (row.time_started, record.time_started()) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                row.time_completed = row.time_completed.max(record.time_completed());
                row.cells.push(ActivityCell::from_record(record));
            }

            // learners with no stored progress stay in as not started
            if has_records && !request.window.admits(row.time_completed) {
                tracing::debug!(
                    user_id = %learner.id(),
                    "learner outside completion window"
                );
                continue;
            }

            row.completed_count = to_u32(completed);
            row.percentage = completion_percentage(row.completed_count, summary.tracked_count);
            row.status = UserStatus::derive(completed, started, targets.len());
            summary.tally.record(row.status);
            summary.rows.push(row);
        }

        sort_rows(&mut summary.rows, request.sort, request.direction);
        tracing::debug!(
            course_id = %course.id(),
            rows = summary.rows.len(),
            activities = targets.len(),
            "summarized course progress"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use completion_core::model::{
        ActivityId, CompletionState, CourseId, Learner, TrackingMode,
    };
    use completion_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    use crate::aggregation::query::CompletionWindow;

    async fn setup() -> (Storage, Aggregator) {
        let storage = Storage::in_memory();
        let course = Course::new(CourseId::new(1), "Intro", "INTRO", true).unwrap();
        storage.courses.upsert_course(&course).await.unwrap();
        for id in [1, 2] {
            let activity = Activity::new(
                ActivityId::new(id),
                course.id(),
                format!("Task {id}"),
                "assign",
                TrackingMode::Manual,
            )
            .unwrap();
            storage.activities.upsert_activity(&activity).await.unwrap();
        }
        for (id, last) in [(7, "Young"), (8, "Adams")] {
            let learner = Learner::new(UserId::new(id), "Pat", last, "").unwrap();
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
        (storage, aggregator)
    }

    async fn complete(storage: &Storage, activity: u64, user: u64, at: chrono::DateTime<chrono::Utc>) {
        let record = CompletionRecord::untouched(ActivityId::new(activity), UserId::new(user), at)
            .transition(CompletionState::CompleteGeneric, None, at)
            .unwrap();
        storage.progress.upsert(&record).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_course_is_an_error() {
        let (_storage, aggregator) = setup().await;
        let request = SummaryRequest::new(CourseId::new(99), vec![UserId::new(7)]);
        let err = aggregator.summarize(&request).await.unwrap_err();
        assert!(matches!(err, AggregationError::CourseNotFound(id) if id == CourseId::new(99)));
    }

    #[tokio::test]
    async fn strangers_are_ignored_and_rows_sort_by_last_name() {
        let (storage, aggregator) = setup().await;
        complete(&storage, 1, 7, fixed_now()).await;

        let request = SummaryRequest::new(
            CourseId::new(1),
            vec![UserId::new(7), UserId::new(8), UserId::new(404)],
        );
        let summary = aggregator.summarize(&request).await.unwrap();
        let names: Vec<&str> = summary.rows.iter().map(|r| r.last_name.as_str()).collect();
        assert_eq!(names, vec!["Adams", "Young"]);
        assert_eq!(summary.rows[1].percentage, 50.0);
        assert_eq!(summary.rows[1].status, UserStatus::InProgress);
        assert_eq!(summary.rows[0].cells.len(), 2);
        assert_eq!(summary.rows[0].cells[0].time_modified, None);
    }

    #[tokio::test]
    async fn single_activity_mode_uses_one_denominator() {
        let (storage, aggregator) = setup().await;
        complete(&storage, 2, 8, fixed_now()).await;

        let request = SummaryRequest::new(CourseId::new(1), vec![UserId::new(8)])
            .with_activity(ActivityFilter::Single(ActivityId::new(2)));
        let summary = aggregator.summarize(&request).await.unwrap();
        assert_eq!(summary.tracked_count, 1);
        assert_eq!(summary.rows[0].percentage, 100.0);
        assert_eq!(summary.rows[0].status, UserStatus::Completed);

        let missing = SummaryRequest::new(CourseId::new(1), vec![UserId::new(8)])
            .with_activity(ActivityFilter::Single(ActivityId::new(50)));
        let summary = aggregator.summarize(&missing).await.unwrap();
        assert!(summary.enabled);
        assert_eq!(summary.missing_activity, Some(ActivityId::new(50)));
        assert!(summary.rows.is_empty());
    }

    #[tokio::test]
    async fn window_uses_latest_completion_time() {
        let (storage, aggregator) = setup().await;
        let early = fixed_now() - Duration::days(30);
        complete(&storage, 1, 7, early).await;
        complete(&storage, 2, 7, fixed_now()).await;
        complete(&storage, 1, 8, early).await;

        let window = CompletionWindow::new(Some(fixed_now() - Duration::days(1)), None);
        let request = SummaryRequest::new(CourseId::new(1), vec![UserId::new(7), UserId::new(8)])
            .with_window(window);
        let summary = aggregator.summarize(&request).await.unwrap();
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].user_id, UserId::new(7));
        assert_eq!(summary.rows[0].time_completed, Some(fixed_now()));
        assert_eq!(summary.tally.total(), 1);
    }

    #[tokio::test]
    async fn window_keeps_learners_without_records_as_not_started() {
        let (storage, aggregator) = setup().await;
        let started = CompletionRecord::untouched(ActivityId::new(1), UserId::new(7), fixed_now())
            .transition(CompletionState::InProgress, None, fixed_now())
            .unwrap();
        storage.progress.upsert(&started).await.unwrap();

        let window = CompletionWindow::new(Some(fixed_now() - Duration::days(7)), Some(fixed_now()));
        let request = SummaryRequest::new(CourseId::new(1), vec![UserId::new(7), UserId::new(8)])
            .with_window(window);
        let summary = aggregator.summarize(&request).await.unwrap();

        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].user_id, UserId::new(8));
        assert_eq!(summary.rows[0].status, UserStatus::NotStarted);
        assert_eq!(summary.tally.notstarted, 1);
        assert_eq!(summary.tally.total(), 1);
    }
}
