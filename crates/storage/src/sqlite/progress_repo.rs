use std::collections::HashMap;

use completion_core::model::{ActivityId, CompletionRecord, Reconciled, UserId};

use super::{
    SqliteRepository,
    mapping::{IN_BATCH, conn, id_to_i64, map_record_row, placeholders},
};
use crate::repository::{ProgressStore, StorageError, UpsertOutcome};

const RECORD_COLUMNS: &str = "activity_id, user_id, state, override_by, \
     time_started, time_completed, time_modified";

#[async_trait::async_trait]
impl ProgressStore for SqliteRepository {
    async fn get_record(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<CompletionRecord, StorageError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM completion_records WHERE activity_id = ?1 AND user_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("activity_id", activity_id.value())?)
            .bind(id_to_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_record_row(&row)
    }

    async fn list_records_for_activity(
        &self,
        activity_id: ActivityId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, CompletionRecord>, StorageError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let activity = id_to_i64("activity_id", activity_id.value())?;
        let mut out = HashMap::with_capacity(user_ids.len());
        for chunk in user_ids.chunks(IN_BATCH) {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM completion_records \
                 WHERE activity_id = ?1 AND user_id IN ({})",
                placeholders(2, chunk.len())
            );
            let mut q = sqlx::query(&sql).bind(activity);
            for user_id in chunk {
                q = q.bind(id_to_i64("user_id", user_id.value())?);
            }

            let rows = q.fetch_all(&self.pool).await.map_err(conn)?;
            for row in rows {
                let record = map_record_row(&row)?;
                out.insert(record.user_id(), record);
            }
        }
        Ok(out)
    }

    async fn upsert(&self, record: &CompletionRecord) -> Result<UpsertOutcome, StorageError> {
        let activity = id_to_i64("activity_id", record.activity_id().value())?;
        let user = id_to_i64("user_id", record.user_id().value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM completion_records WHERE activity_id = ?1 AND user_id = ?2"
        );
        let existing = sqlx::query(&sql)
            .bind(activity)
            .bind(user)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .as_ref()
            .map(map_record_row)
            .transpose()?;

        // dropping `tx` on the error paths rolls back, leaving the stored row intact
        let merged = match CompletionRecord::reconcile(existing.as_ref(), record.clone())? {
            Reconciled::Write(merged) => merged,
            Reconciled::Stale => return Ok(UpsertOutcome::Stale),
        };

        sqlx::query(
            r"
                INSERT INTO completion_records (
                    activity_id, user_id, state, override_by,
                    time_started, time_completed, time_modified
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(activity_id, user_id) DO UPDATE SET
                    state = excluded.state,
                    override_by = excluded.override_by,
                    time_started = excluded.time_started,
                    time_completed = excluded.time_completed,
                    time_modified = excluded.time_modified
            ",
        )
        .bind(activity)
        .bind(user)
        .bind(merged.state().as_str())
        .bind(
            merged
                .override_by()
                .map(|actor| id_to_i64("override_by", actor.value()))
                .transpose()?,
        )
        .bind(merged.time_started())
        .bind(merged.time_completed())
        .bind(merged.time_modified())
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
            other => conn(other),
        })?;

        tx.commit().await.map_err(conn)?;
        tracing::debug!(
            activity_id = %merged.activity_id(),
            user_id = %merged.user_id(),
            state = %merged.state(),
            "stored completion record"
        );
        Ok(UpsertOutcome::Written(merged))
    }
}
