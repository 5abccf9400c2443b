use completion_core::model::{
    Activity, ActivityId, CompletionRecord, CompletionState, Course, CourseId, Learner,
    TrackingMode, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn user_id(row: &SqliteRow, column: &'static str) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64(column, row.try_get(column).map_err(ser)?)?))
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    let id = CourseId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?);
    let full_name: String = row.try_get("full_name").map_err(ser)?;
    let short_name: String = row.try_get("short_name").map_err(ser)?;
    let enabled: bool = row.try_get("completion_enabled").map_err(ser)?;
    Course::new(id, full_name, short_name, enabled).map_err(ser)
}

pub(crate) fn map_activity_row(row: &SqliteRow) -> Result<Activity, StorageError> {
    let id = ActivityId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?);
    let course_id = CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?);
    let tracking_raw: String = row.try_get("tracking").map_err(ser)?;
    let tracking = TrackingMode::parse(&tracking_raw).map_err(ser)?;

    let mut activity = Activity::new(
        id,
        course_id,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<String, _>("module").map_err(ser)?,
        tracking,
    )
    .map_err(ser)?;

    if let Some(expected_by) = row.try_get("expected_by").map_err(ser)? {
        activity = activity.with_expected_by(expected_by);
    }
    if let Some(pass_grade) = row.try_get::<Option<f64>, _>("pass_grade").map_err(ser)? {
        activity = activity.with_pass_grade(pass_grade).map_err(ser)?;
    }
    Ok(activity)
}

pub(crate) fn map_learner_row(row: &SqliteRow) -> Result<Learner, StorageError> {
    Learner::new(
        user_id(row, "id")?,
        row.try_get::<String, _>("first_name").map_err(ser)?,
        row.try_get::<String, _>("last_name").map_err(ser)?,
        row.try_get::<String, _>("email").map_err(ser)?,
    )
    .map_err(ser)
}

/// Rebuilds a completion record, validating the timestamp invariants at the
/// storage boundary.
pub(crate) fn map_record_row(row: &SqliteRow) -> Result<CompletionRecord, StorageError> {
    let activity_id = ActivityId::new(i64_to_u64(
        "activity_id",
        row.try_get("activity_id").map_err(ser)?,
    )?);
    let state_raw: String = row.try_get("state").map_err(ser)?;
    let override_by = row
        .try_get::<Option<i64>, _>("override_by")
        .map_err(ser)?
        .map(|v| i64_to_u64("override_by", v).map(UserId::new))
        .transpose()?;

    CompletionRecord::from_persisted(
        activity_id,
        user_id(row, "user_id")?,
        CompletionState::parse(&state_raw).map_err(ser)?,
        override_by,
        row.try_get("time_started").map_err(ser)?,
        row.try_get("time_completed").map_err(ser)?,
        row.try_get("time_modified").map_err(ser)?,
    )
    .map_err(ser)
}

/// Ids bound per `IN (...)` query, well below SQLite's host parameter limit.
pub(crate) const IN_BATCH: usize = 500;

/// Numbered placeholders `?first, ?first+1, ...` for an `IN` list.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    let mut out = String::with_capacity(count * 6);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
        out.push_str(&(first + i).to_string());
    }
    out
}

/// Escapes `LIKE` wildcards so an initials filter only matches a prefix.
pub(crate) fn like_prefix(initial: &str) -> String {
    let mut out = String::with_capacity(initial.len() + 1);
    for ch in initial.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("L"), "L%");
        assert_eq!(like_prefix("50%_"), "50\\%\\_%");
    }

    #[test]
    fn placeholders_are_numbered_from_first() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
        assert_eq!(placeholders(1, 0), "");
    }

    #[test]
    fn id_overflow_is_a_serialization_error() {
        assert!(matches!(
            id_to_i64("user_id", u64::MAX),
            Err(StorageError::Serialization(_))
        ));
    }
}
