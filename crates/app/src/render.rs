use std::io::Write;

use anyhow::Context;
use completion_core::model::CompletionState;
use services::{CourseProgressSummary, ProgressReportPage};

fn state_label(state: CompletionState) -> &'static str {
    match state {
        CompletionState::NotStarted => "-",
        CompletionState::InProgress => "started",
        CompletionState::CompletePass => "pass",
        CompletionState::CompleteFail => "fail",
        CompletionState::CompleteGeneric => "done",
    }
}

fn report_notice(summary: &CourseProgressSummary) -> Option<String> {
    if let Some(activity) = summary.missing_activity {
        return Some(format!(
            "Activity {activity} is no longer tracked in {}.",
            summary.course_name
        ));
    }
    if !summary.enabled {
        return Some(format!(
            "Completion tracking is not enabled for {}.",
            summary.course_name
        ));
    }
    None
}

/// Human-readable report page.
pub fn write_table(out: &mut impl Write, page: &ProgressReportPage) -> anyhow::Result<()> {
    let summary = &page.summary;
    writeln!(out, "{} (course {})", summary.course_name, summary.course_id)?;
    if let Some(notice) = report_notice(summary) {
        writeln!(out, "{notice}")?;
        return Ok(());
    }

    for (index, column) in summary.activities.iter().enumerate() {
        let due = column
            .expected_by
            .map(|at| format!(" due {}", at.format("%Y-%m-%d")))
            .unwrap_or_default();
        let expired = if column.expired { " (expired)" } else { "" };
        writeln!(
            out,
            "  [{}] {} ({}, {}){due}{expired}",
            index + 1,
            column.name,
            column.module,
            column.tracking
        )?;
    }
    writeln!(out)?;

    writeln!(
        out,
        "{:<28} {:<28} {:>5} {:>7} {:<11} activities",
        "learner", "email", "done", "%", "status"
    )?;
    for row in &summary.rows {
        let cells: Vec<&str> = row.cells.iter().map(|c| state_label(c.state)).collect();
        writeln!(
            out,
            "{:<28} {:<28} {:>5} {:>7.2} {:<11} {}",
            row.full_name(),
            row.email,
            row.completed_count,
            row.percentage,
            row.status.as_str(),
            cells.join(" ")
        )?;
    }
    writeln!(out)?;

    let tally = summary.tally;
    writeln!(
        out,
        "not started: {}  in progress: {}  completed: {}",
        tally.notstarted, tally.inprogress, tally.completed
    )?;
    let shown_to = page.offset + u32::try_from(summary.rows.len()).unwrap_or(u32::MAX);
    writeln!(
        out,
        "learners {}-{} of {} matching ({} enrolled)",
        if summary.rows.is_empty() { page.offset } else { page.offset + 1 },
        shown_to,
        page.total_matching,
        page.grand_total
    )?;
    if let Some(next) = page.next_offset() {
        writeln!(out, "next page: --offset {next}")?;
    }
    Ok(())
}

/// CSV export with a state and a date column per activity.
pub fn write_csv(out: impl Write, page: &ProgressReportPage) -> anyhow::Result<()> {
    let summary = &page.summary;
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec![
        "user_id".to_owned(),
        "first_name".to_owned(),
        "last_name".to_owned(),
        "email".to_owned(),
    ];
    for column in &summary.activities {
        header.push(column.name.clone());
        header.push(format!("{} - completion date", column.name));
    }
    header.extend(["completed".to_owned(), "percentage".to_owned(), "status".to_owned()]);
    writer.write_record(&header)?;

    for row in &summary.rows {
        let mut record = vec![
            row.user_id.to_string(),
            row.first_name.clone(),
            row.last_name.clone(),
            row.email.clone(),
        ];
        for cell in &row.cells {
            record.push(cell.state.as_str().to_owned());
            record.push(cell.time_completed.map(|at| at.to_rfc3339()).unwrap_or_default());
        }
        record.push(row.completed_count.to_string());
        record.push(format!("{:.2}", row.percentage));
        record.push(row.status.as_str().to_owned());
        writer.write_record(&record)?;
    }
    writer.flush().context("failed to flush csv output")?;
    Ok(())
}

/// Pretty-printed JSON of the summary.
pub fn write_json(out: &mut impl Write, page: &ProgressReportPage) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, &page.summary)?;
    writeln!(out)?;
    Ok(())
}
