use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use completion_core::model::{ActivityId, CourseId, UserId};
use services::{ActivityFilter, CompletionWindow, ReportRequest, SortDirection, SortField};
use storage::repository::RosterQuery;

#[derive(Parser)]
#[command(name = "progress-report")]
#[command(about = "Course completion tracking and progress reports", long_about = None)]
pub struct Cli {
    /// `SQLite` database URL or file path
    #[arg(
        long,
        global = true,
        env = "PROGRESS_DB_URL",
        default_value = "sqlite://progress.sqlite3"
    )]
    pub db: String,

    /// Pin "now" to a fixed instant (RFC3339 or YYYY-MM-DD)
    #[arg(long, global = true, value_parser = parse_instant)]
    pub now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small demo course with learners and progress
    Seed,
    /// Print the completion progress report of a course
    Report(ReportArgs),
    /// Record that a learner opened an activity
    View(LearnerActivity),
    /// Tick off a manually tracked activity
    Complete(LearnerActivity),
    /// Record a grade for an automatically tracked activity
    Grade {
        #[command(flatten)]
        target: LearnerActivity,
        #[arg(long)]
        grade: f64,
    },
    /// Toggle an instructor completion override
    Override {
        #[command(flatten)]
        target: LearnerActivity,
        #[arg(long)]
        actor: u64,
    },
    /// Reset a learner's completion of an activity
    Reset {
        #[command(flatten)]
        target: LearnerActivity,
        #[arg(long)]
        actor: u64,
    },
}

#[derive(Args)]
pub struct LearnerActivity {
    #[arg(long)]
    pub activity: u64,
    #[arg(long)]
    pub user: u64,
}

impl LearnerActivity {
    pub fn ids(&self) -> (ActivityId, UserId) {
        (ActivityId::new(self.activity), UserId::new(self.user))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    LastName,
    FirstName,
    Email,
    Percentage,
    Completed,
    Status,
    UserId,
}

impl From<SortArg> for SortField {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::LastName => SortField::LastName,
            SortArg::FirstName => SortField::FirstName,
            SortArg::Email => SortField::Email,
            SortArg::Percentage => SortField::Percentage,
            SortArg::Completed => SortField::CompletedCount,
            SortArg::Status => SortField::Status,
            SortArg::UserId => SortField::UserId,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Args)]
pub struct ReportArgs {
    #[arg(long)]
    pub course: u64,
    /// Single activity id; 0 reports every tracked activity
    #[arg(long, default_value_t = 0)]
    pub activity: u64,
    #[arg(long)]
    pub first_initial: Option<String>,
    #[arg(long)]
    pub last_initial: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    /// Learners per page; 0 lists everyone
    #[arg(long, default_value_t = services::DEFAULT_PAGE_SIZE)]
    pub limit: u32,
    /// Earliest completion time to include
    #[arg(long, value_parser = parse_instant)]
    pub from: Option<DateTime<Utc>>,
    /// Latest completion time to include; a bare date covers the whole day
    #[arg(long, value_parser = parse_window_end)]
    pub to: Option<DateTime<Utc>>,
    #[arg(long, value_enum, default_value_t = SortArg::LastName)]
    pub sort: SortArg,
    #[arg(long)]
    pub desc: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl ReportArgs {
    pub fn to_request(&self) -> ReportRequest {
        ReportRequest {
            course_id: CourseId::new(self.course),
            activity: ActivityFilter::from_raw(self.activity),
            roster: RosterQuery {
                first_initial: self.first_initial.clone(),
                last_initial: self.last_initial.clone(),
                offset: self.offset,
                limit: self.limit,
                ..RosterQuery::default()
            },
            window: CompletionWindow::new(self.from, self.to),
            sort: self.sort.into(),
            direction: if self.desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            },
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("expected RFC3339 timestamp or YYYY-MM-DD, got {raw}"))
}

/// RFC3339 instant, or midnight UTC of a bare date.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    Ok(parse_date(raw)?.and_time(NaiveTime::MIN).and_utc())
}

/// Like `parse_instant`, but a bare date means the last instant of that day.
pub fn parse_window_end(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let end_of_day =
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).ok_or("invalid end of day")?;
    Ok(parse_date(raw)?.and_time(end_of_day).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_dates_cover_whole_days() {
        let from = parse_instant("2024-03-01").unwrap();
        let to = parse_window_end("2024-03-01").unwrap();
        assert_eq!(from.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2024-03-01T23:59:59.999999999+00:00");
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn bare_end_date_admits_the_final_second_of_the_day() {
        let to = parse_window_end("2024-03-01").unwrap();
        let window = CompletionWindow::new(None, Some(to));
        let last_second = parse_instant("2024-03-01T23:59:59.5Z").unwrap();
        let next_day = parse_instant("2024-03-02").unwrap();
        assert!(window.admits(Some(last_second)));
        assert!(!window.admits(Some(next_day)));
    }

    #[test]
    fn rfc3339_is_normalized_to_utc() {
        let at = parse_instant("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }

    #[test]
    fn report_args_map_to_request() {
        let cli = Cli::try_parse_from([
            "progress-report",
            "report",
            "--course",
            "3",
            "--activity",
            "0",
            "--sort",
            "percentage",
            "--desc",
            "--limit",
            "0",
        ])
        .unwrap();
        let Commands::Report(args) = cli.command else {
            panic!("expected report");
        };
        let request = args.to_request();
        assert_eq!(request.course_id, CourseId::new(3));
        assert_eq!(request.activity, ActivityFilter::All);
        assert_eq!(request.sort, SortField::Percentage);
        assert_eq!(request.direction, SortDirection::Descending);
        assert_eq!(request.roster.limit, 0);
        assert!(!request.window.is_active());
    }
}
