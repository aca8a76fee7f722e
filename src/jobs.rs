use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};

use crate::id::JobId;

/// Persisted state of one import run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub file_name: String,
    pub format_name: Option<String>,
    pub accepted_count: i64,
    pub processed_count: i64,
    pub error_count: i64,
    pub error_messages: Vec<String>,
    pub total_estimate: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub finished: bool,
    pub failed: bool,
    pub canceling: bool,
    pub canceled: bool,
}

impl JobRecord {
    pub fn is_terminal(&self) -> bool {
        self.finished || self.failed || self.canceled
    }
}

impl FromRow<'_, SqliteRow> for JobRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let error_messages: String = row.try_get("error_messages")?;
        Ok(Self {
            id: id.parse().map_err(|e| sqlx::Error::ColumnDecode {
                index: "id".to_string(),
                source: Box::new(e),
            })?,
            file_name: row.try_get("file_name")?,
            format_name: row.try_get("format_name")?,
            accepted_count: row.try_get("accepted")?,
            processed_count: row.try_get("processed")?,
            error_count: row.try_get("errors")?,
            error_messages: serde_json::from_str(&error_messages).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "error_messages".to_string(),
                    source: Box::new(e),
                }
            })?,
            total_estimate: row.try_get("total")?,
            created_at: row.try_get("created_at")?,
            finished: row.try_get("finished")?,
            failed: row.try_get("failed")?,
            canceling: row.try_get("canceling")?,
            canceled: row.try_get("canceled")?,
        })
    }
}

// Terminal flags are only ever set on a job that has none yet.
const NOT_TERMINAL: &str = "finished = 0 AND failed = 0 AND canceled = 0";

/// Job bookkeeping. Every write is a single narrow UPDATE so the worker and
/// concurrent pollers never overwrite each other's fields.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, file_name: &str) -> Result<JobRecord, sqlx::Error> {
        let id = JobId::new();
        sqlx::query("INSERT INTO import_jobs (id, file_name, created_at) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(file_name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        self.find(&id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find(&self, id: &JobId) -> Result<Option<JobRecord>, sqlx::Error> {
        sqlx::query_as::<_, JobRecord>("SELECT * FROM import_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn set_format(&self, id: &JobId, format_name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE import_jobs SET format_name = ? WHERE id = ?")
            .bind(format_name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_total(&self, id: &JobId, total: u64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE import_jobs SET total = ? WHERE id = ?")
            .bind(total as i64)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_accepted(&self, id: &JobId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs SET accepted = accepted + 1, processed = processed + 1 WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Counts a rejected record; the message is added once no matter how many
    /// records fail the same way.
    pub async fn record_error(&self, id: &JobId, message: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE import_jobs SET
                errors = errors + 1,
                processed = processed + 1,
                error_messages = CASE
                    WHEN EXISTS (SELECT 1 FROM json_each(import_jobs.error_messages) WHERE json_each.value = ?1)
                    THEN error_messages
                    ELSE json_insert(error_messages, '$[#]', ?1)
                END
            WHERE id = ?2",
        )
        .bind(message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Refused while a cancel is pending, so that request still ends in
    /// `canceled`.
    pub async fn mark_finished(&self, id: &JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&format!(
            "UPDATE import_jobs SET finished = 1 WHERE id = ? AND canceling = 0 AND {NOT_TERMINAL}"
        ))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Failing supersedes a pending cancellation.
    pub async fn mark_failed(&self, id: &JobId) -> Result<bool, sqlx::Error> {
        self.set_terminal(id, "failed = 1, canceling = 0").await
    }

    pub async fn mark_canceled(&self, id: &JobId) -> Result<bool, sqlx::Error> {
        self.set_terminal(id, "canceled = 1, canceling = 0").await
    }

    /// Asks a running job to stop. Jobs already in a terminal state are left alone.
    pub async fn request_cancel(&self, id: &JobId) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "UPDATE import_jobs SET canceling = 1 WHERE id = ? AND {NOT_TERMINAL}"
        ))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_canceling(&self, id: &JobId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT canceling FROM import_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn set_terminal(&self, id: &JobId, assignments: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&format!(
            "UPDATE import_jobs SET {assignments} WHERE id = ? AND {NOT_TERMINAL}"
        ))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
