use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL,
            short_name TEXT NOT NULL,
            completion_enabled INTEGER NOT NULL CHECK (completion_enabled IN (0, 1))
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS activities (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            module TEXT NOT NULL,
            tracking TEXT NOT NULL CHECK (tracking IN ('none', 'manual', 'automatic')),
            expected_by TEXT,
            pass_grade REAL CHECK (pass_grade IS NULL OR pass_grade >= 0),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS learners (
            id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrolments (
            course_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            enrolled_at TEXT NOT NULL,
            PRIMARY KEY (course_id, user_id),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES learners(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS completion_records (
            activity_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            state TEXT NOT NULL CHECK (state IN (
                'not_started', 'in_progress', 'complete_pass', 'complete_fail', 'complete_generic'
            )),
            override_by INTEGER,
            time_started TEXT,
            time_completed TEXT,
            time_modified TEXT NOT NULL,
            PRIMARY KEY (activity_id, user_id),
            CHECK ((state LIKE 'complete%') = (time_completed IS NOT NULL)),
            CHECK ((state <> 'not_started') = (time_started IS NOT NULL)),
            FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_activities_course_tracking
            ON activities (course_id, tracking, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_completion_records_user
            ON completion_records (user_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_learners_names
            ON learners (last_name, first_name);
    ",
];

/// Applies the versioned schema. Each version runs in its own transaction
/// and is recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
        ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;
        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::debug!(version = 1, "applied schema migration");
    }

    Ok(())
}
