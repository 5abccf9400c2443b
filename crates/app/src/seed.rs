use anyhow::Context;
use chrono::Duration;

use completion_core::model::{Activity, ActivityId, CourseId, TrackingMode, UserId};
use services::{AppServices, Clock};

const COURSE: CourseId = CourseId::new(1);
const QUIZ: ActivityId = ActivityId::new(1);
const READING: ActivityId = ActivityId::new(2);
const ESSAY: ActivityId = ActivityId::new(3);
const NEWS: ActivityId = ActivityId::new(4);

const LEARNERS: [(u64, &str, &str); 6] = [
    (101, "Ada", "Lovelace"),
    (102, "Grace", "Hopper"),
    (103, "Alan", "Turing"),
    (104, "Barbara", "Liskov"),
    (105, "Edsger", "Dijkstra"),
    (106, "Frances", "Allen"),
];

/// Loads a demo course; safe to run more than once.
pub async fn seed(app: &AppServices, clock: Clock) -> anyhow::Result<()> {
    let courses = app.courses();
    let now = clock.now();

    courses
        .create_course(COURSE, "Rust Fundamentals", "RF101", true)
        .await
        .context("failed to create demo course")?;

    let activities = [
        Activity::new(QUIZ, COURSE, "Ownership quiz", "quiz", TrackingMode::Automatic)?
            .with_pass_grade(7.0)?
            .with_expected_by(now - Duration::days(3)),
        Activity::new(READING, COURSE, "The Book, chapter 4", "page", TrackingMode::Manual)?,
        Activity::new(ESSAY, COURSE, "Lifetimes essay", "assign", TrackingMode::Automatic)?
            .with_expected_by(now + Duration::days(14)),
        Activity::new(NEWS, COURSE, "Announcements", "forum", TrackingMode::None)?,
    ];
    for activity in &activities {
        courses.add_activity(activity).await?;
    }

    for (id, first, last) in LEARNERS {
        let email = format!("{}@example.com", first.to_lowercase());
        courses
            .register_learner(UserId::new(id), first, last, &email)
            .await?;
        courses.enrol(COURSE, UserId::new(id)).await?;
    }

    let tracking = app.tracking();
    tracking.record_grade(QUIZ, UserId::new(101), 9.5).await?;
    tracking.mark_manual_complete(READING, UserId::new(101)).await?;
    tracking.record_grade(ESSAY, UserId::new(101), 80.0).await?;

    tracking.record_grade(QUIZ, UserId::new(102), 8.0).await?;
    tracking.mark_manual_complete(READING, UserId::new(102)).await?;

    tracking.record_grade(QUIZ, UserId::new(103), 4.0).await?;
    tracking.mark_viewed(ESSAY, UserId::new(103)).await?;

    tracking.mark_viewed(READING, UserId::new(104)).await?;

    tracing::info!(
        course_id = %COURSE,
        learners = LEARNERS.len(),
        "demo data seeded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use completion_core::model::UserStatus;
    use completion_core::time::fixed_clock;
    use services::SummaryRequest;

    #[tokio::test]
    async fn seeded_course_reports_mixed_progress() {
        let clock = fixed_clock();
        let app = AppServices::in_memory(clock);
        seed(&app, clock).await.unwrap();
        seed(&app, clock).await.unwrap();

        let candidates = LEARNERS.iter().map(|(id, _, _)| UserId::new(*id)).collect();
        let summary = app
            .aggregator()
            .summarize(&SummaryRequest::new(COURSE, candidates))
            .await
            .unwrap();
        assert_eq!(summary.tracked_count, 3);
        assert_eq!(summary.rows.len(), 6);
        assert_eq!(summary.tally.completed, 1);
        assert_eq!(summary.tally.inprogress, 3);
        assert_eq!(summary.tally.notstarted, 2);
        assert!(summary.activities[0].expired);

        let ada = summary
            .rows
            .iter()
            .find(|r| r.user_id == UserId::new(101))
            .unwrap();
        assert_eq!(ada.status, UserStatus::Completed);
        assert_eq!(ada.percentage, 100.0);
    }
}
