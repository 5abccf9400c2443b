use completion_core::model::{Activity, ActivityId, CourseId};

use super::{
    SqliteRepository,
    mapping::{conn, id_to_i64, map_activity_row},
};
use crate::repository::{ActivityRepository, StorageError};

#[async_trait::async_trait]
impl ActivityRepository for SqliteRepository {
    async fn upsert_activity(&self, activity: &Activity) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO activities (
                    id, course_id, name, module, tracking, expected_by, pass_grade
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    module = excluded.module,
                    tracking = excluded.tracking,
                    expected_by = excluded.expected_by,
                    pass_grade = excluded.pass_grade
                WHERE activities.course_id = excluded.course_id
            ",
        )
        .bind(id_to_i64("activity_id", activity.id().value())?)
        .bind(id_to_i64("course_id", activity.course_id().value())?)
        .bind(activity.name())
        .bind(activity.module())
        .bind(activity.tracking().as_str())
        .bind(activity.expected_by())
        .bind(activity.pass_grade())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
            other => conn(other),
        })?;
        // the conflict guard skipped the update: the id belongs to another course
        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn get_activity(&self, id: ActivityId) -> Result<Option<Activity>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, course_id, name, module, tracking, expected_by, pass_grade
                FROM activities
                WHERE id = ?1
            ",
        )
        .bind(id_to_i64("activity_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_activity_row).transpose()
    }

    async fn list_tracked_activities(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Activity>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT a.id, a.course_id, a.name, a.module, a.tracking, a.expected_by, a.pass_grade
                FROM activities a
                JOIN courses c ON c.id = a.course_id
                WHERE a.course_id = ?1
                  AND c.completion_enabled = 1
                  AND a.tracking <> 'none'
                ORDER BY a.id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_activity_row(&row)?);
        }
        Ok(out)
    }

    async fn delete_activity(&self, id: ActivityId) -> Result<(), StorageError> {
        // completion_records cascade through the foreign key
        let res = sqlx::query("DELETE FROM activities WHERE id = ?1")
            .bind(id_to_i64("activity_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
