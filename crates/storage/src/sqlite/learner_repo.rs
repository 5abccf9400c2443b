use chrono::{DateTime, Utc};
use completion_core::model::{CourseId, Learner, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{IN_BATCH, conn, id_to_i64, like_prefix, map_learner_row, placeholders, ser},
};
use crate::repository::{LearnerRepository, RosterOrder, RosterQuery, StorageError};

const ROSTER_FILTER: &str = r"
    FROM learners l
    JOIN enrolments e ON e.user_id = l.id
    WHERE e.course_id = ?1
      AND (?2 IS NULL OR l.first_name LIKE ?2 ESCAPE '\')
      AND (?3 IS NULL OR l.last_name LIKE ?3 ESCAPE '\')
";

fn order_clause(order: RosterOrder) -> &'static str {
    match order {
        RosterOrder::LastName => "ORDER BY lower(l.last_name), lower(l.first_name), l.id",
        RosterOrder::FirstName => "ORDER BY lower(l.first_name), lower(l.last_name), l.id",
    }
}

#[async_trait::async_trait]
impl LearnerRepository for SqliteRepository {
    async fn upsert_learner(&self, learner: &Learner) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO learners (id, first_name, last_name, email)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    email = excluded.email
            ",
        )
        .bind(id_to_i64("user_id", learner.id().value())?)
        .bind(learner.first_name())
        .bind(learner.last_name())
        .bind(learner.email())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn delete_learner(&self, id: UserId) -> Result<(), StorageError> {
        let user = id_to_i64("user_id", id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM completion_records WHERE user_id = ?1")
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        // enrolments cascade through the foreign key
        let res = sqlx::query("DELETE FROM learners WHERE id = ?1")
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn enrol(
        &self,
        course_id: CourseId,
        user_id: UserId,
        enrolled_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let course = id_to_i64("course_id", course_id.value())?;
        let user = id_to_i64("user_id", user_id.value())?;

        let known: i64 = sqlx::query(
            r"
                SELECT
                    EXISTS(SELECT 1 FROM courses WHERE id = ?1)
                    AND EXISTS(SELECT 1 FROM learners WHERE id = ?2) AS known
            ",
        )
        .bind(course)
        .bind(user)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?
        .try_get("known")
        .map_err(ser)?;
        if known == 0 {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
                INSERT INTO enrolments (course_id, user_id, enrolled_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(course_id, user_id) DO NOTHING
            ",
        )
        .bind(course)
        .bind(user)
        .bind(enrolled_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn list_enrolled(
        &self,
        course_id: CourseId,
        query: &RosterQuery,
    ) -> Result<Vec<Learner>, StorageError> {
        let sql = format!(
            "SELECT l.id, l.first_name, l.last_name, l.email {ROSTER_FILTER} {} LIMIT ?4 OFFSET ?5",
            order_clause(query.order)
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = if query.limit == 0 {
            -1
        } else {
            i64::from(query.limit)
        };

        let rows = sqlx::query(&sql)
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(query.first_initial.as_deref().map(like_prefix))
            .bind(query.last_initial.as_deref().map(like_prefix))
            .bind(limit)
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_learner_row(&row)?);
        }
        Ok(out)
    }

    async fn count_enrolled(
        &self,
        course_id: CourseId,
        query: &RosterQuery,
    ) -> Result<u32, StorageError> {
        let sql = format!("SELECT COUNT(*) AS total {ROSTER_FILTER}");
        let total: i64 = sqlx::query(&sql)
            .bind(id_to_i64("course_id", course_id.value())?)
            .bind(query.first_initial.as_deref().map(like_prefix))
            .bind(query.last_initial.as_deref().map(like_prefix))
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?
            .try_get("total")
            .map_err(ser)?;
        u32::try_from(total).map_err(|_| StorageError::Serialization(format!("invalid count: {total}")))
    }

    async fn enrolled_learners(
        &self,
        course_id: CourseId,
        user_ids: &[UserId],
    ) -> Result<Vec<Learner>, StorageError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut unique = user_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let course = id_to_i64("course_id", course_id.value())?;
        let mut out = Vec::new();
        for chunk in unique.chunks(IN_BATCH) {
            let sql = format!(
                r"
                    SELECT l.id, l.first_name, l.last_name, l.email
                    FROM learners l
                    JOIN enrolments e ON e.user_id = l.id
                    WHERE e.course_id = ?1 AND l.id IN ({})
                ",
                placeholders(2, chunk.len())
            );
            let mut q = sqlx::query(&sql).bind(course);
            for user_id in chunk {
                q = q.bind(id_to_i64("user_id", user_id.value())?);
            }

            let rows = q.fetch_all(&self.pool).await.map_err(conn)?;
            for row in rows {
                out.push(map_learner_row(&row)?);
            }
        }
        Ok(out)
    }
}
