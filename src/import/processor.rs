use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::error::{ImportError, RecordError, WriteError};
use super::format::ConversionMode;
use super::hooks::ImportHooks;
use super::record::Record;
use crate::id::JobId;
use crate::jobs::JobStore;
use crate::pieces::{Piece, PieceStore};
use crate::schema::Schema;

/// What the processor and hooks know about the running job.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub id: JobId,
    pub format_name: String,
    pub conversion_mode: ConversionMode,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Inserted,
    Updated,
}

#[derive(Debug)]
pub enum Outcome {
    Accepted(WriteKind),
    Rejected(RecordError),
}

/// Turns one record into an inserted or updated piece and counts the result
/// against the job.
pub struct RecordProcessor {
    jobs: JobStore,
    pieces: PieceStore,
    schema: Arc<Schema>,
    hooks: Arc<dyn ImportHooks>,
}

impl RecordProcessor {
    pub fn new(
        jobs: JobStore,
        pieces: PieceStore,
        schema: Arc<Schema>,
        hooks: Arc<dyn ImportHooks>,
    ) -> Self {
        Self {
            jobs,
            pieces,
            schema,
            hooks,
        }
    }

    /// A bad record is counted and reported, never raised. Storage failures,
    /// whether writing the piece or recording the outcome, are returned and
    /// end the job.
    pub async fn process(&self, job: &ImportJob, record: Record) -> Result<Outcome, ImportError> {
        match self.apply(job, &record).await {
            Ok(kind) => {
                self.jobs.record_accepted(&job.id).await?;
                debug!(job = %job.id, ?kind, "record accepted");
                Ok(Outcome::Accepted(kind))
            }
            Err(WriteError::Rejected(e)) => {
                warn!(job = %job.id, "record rejected: {}", e);
                self.jobs.record_error(&job.id, &e.to_string()).await?;
                Ok(Outcome::Rejected(e))
            }
            Err(WriteError::Storage(e)) => Err(ImportError::Storage(e)),
        }
    }

    async fn apply(&self, job: &ImportJob, record: &Record) -> Result<WriteKind, WriteError> {
        let key = record
            .key()
            .and_then(|key| key.lookup_value().map(|value| (key.field, value)));

        match key {
            Some((field, value)) => self.update(job, record, field, &value).await,
            None => self.insert(job, record).await,
        }
    }

    async fn insert(&self, job: &ImportJob, record: &Record) -> Result<WriteKind, WriteError> {
        let mut piece = Piece::new();
        piece.import_job_id = Some(job.id);
        piece.imported_at = Some(job.started_at);

        self.schema.convert(job.conversion_mode, record, &mut piece)?;
        self.hooks
            .before_insert(job, record, &mut piece)
            .await
            .map_err(RecordError::hook)?;
        self.pieces.insert(&mut piece).await?;
        self.hooks
            .after_insert(job, record, &piece)
            .await
            .map_err(RecordError::hook)?;
        Ok(WriteKind::Inserted)
    }

    async fn update(
        &self,
        job: &ImportJob,
        record: &Record,
        field: &str,
        value: &str,
    ) -> Result<WriteKind, WriteError> {
        if self.schema.field(field).is_none() && field != "id" {
            return Err(RecordError::UnknownKeyField(field.to_string()).into());
        }

        // trashed and unpublished pieces count, so an import can revive them
        let mut piece = self
            .pieces
            .find_by_field(field, value)
            .await?
            .ok_or_else(|| RecordError::UpdateTargetNotFound {
                field: field.to_string(),
                value: value.to_string(),
            })?;

        self.schema.convert(job.conversion_mode, record, &mut piece)?;
        self.hooks
            .before_update(job, record, &mut piece)
            .await
            .map_err(RecordError::hook)?;
        self.pieces.update(&mut piece).await?;
        self.hooks
            .after_update(job, record, &piece)
            .await
            .map_err(RecordError::hook)?;
        Ok(WriteKind::Updated)
    }
}
