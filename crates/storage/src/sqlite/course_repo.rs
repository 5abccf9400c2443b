use completion_core::model::{Course, CourseId};

use super::{
    SqliteRepository,
    mapping::{conn, id_to_i64, map_course_row},
};
use crate::repository::{CourseRepository, StorageError};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO courses (id, full_name, short_name, completion_enabled)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    full_name = excluded.full_name,
                    short_name = excluded.short_name,
                    completion_enabled = excluded.completion_enabled
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(course.full_name())
        .bind(course.short_name())
        .bind(course.completion_enabled())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, full_name, short_name, completion_enabled
                FROM courses
                WHERE id = ?1
            ",
        )
        .bind(id_to_i64("course_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_course_row).transpose()
    }
}
