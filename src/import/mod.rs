//! The import job engine: resolves an upload's format, then streams its
//! records one at a time into pieces while keeping the job record current.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::id::JobId;
use crate::jobs::{JobRecord, JobStore};
use crate::pieces::PieceStore;
use crate::schema::Schema;

mod cancel;
mod driver;
mod error;
mod format;
pub mod formats;
mod hooks;
mod processor;
mod progress;
mod record;
mod registry;

pub use cancel::{CancelCheck, CancellationCoordinator};
pub use driver::{DriveOutcome, DriverState, JobControl, RecordSource, StreamDriver};
pub use error::{ImportError, RecordError, WriteError};
pub use format::{has_extension, ConversionMode, FormatPlugin, Producer, RecordStream};
pub use hooks::{ImportHooks, NoHooks};
pub use processor::{ImportJob, Outcome, RecordProcessor, WriteKind};
pub use progress::{percentage, Progress};
pub use record::{strip_key_marker, KeyColumn, Record, KEY_MARKER};
pub use registry::FormatRegistry;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How often a pending cancellation rechecks for an in-flight write.
    pub cancel_poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cancel_poll_interval: Duration::from_millis(50),
        }
    }
}

/// A file waiting to be imported.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name the client gave the file; used for sniffing.
    pub file_name: String,
    pub path: PathBuf,
    /// Delete `path` once the job is over.
    pub remove_when_done: bool,
}

/// Returned as soon as a job is accepted. Dropping it leaves the job running.
pub struct JobHandle {
    pub id: JobId,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Waits for the job to reach a terminal state.
    pub async fn wait(self) -> Result<(), ImportError> {
        Ok(self.task.await?)
    }
}

#[derive(Clone)]
pub struct ImportEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: FormatRegistry,
    jobs: JobStore,
    pieces: PieceStore,
    processor: RecordProcessor,
    coordinator: CancellationCoordinator,
    hooks: Arc<dyn ImportHooks>,
}

impl ImportEngine {
    pub fn new(
        pool: SqlitePool,
        registry: FormatRegistry,
        schema: Schema,
        hooks: Arc<dyn ImportHooks>,
        options: EngineOptions,
    ) -> Self {
        let jobs = JobStore::new(pool.clone());
        let pieces = PieceStore::new(pool);
        let processor = RecordProcessor::new(
            jobs.clone(),
            pieces.clone(),
            Arc::new(schema),
            hooks.clone(),
        );
        let coordinator = CancellationCoordinator::new(
            jobs.clone(),
            pieces.clone(),
            options.cancel_poll_interval,
        );
        Self {
            inner: Arc::new(EngineInner {
                registry,
                jobs,
                pieces,
                processor,
                coordinator,
                hooks,
            }),
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.inner.jobs
    }

    pub fn pieces(&self) -> &PieceStore {
        &self.inner.pieces
    }

    /// Records a new job and starts importing in the background. Returns once
    /// the job record exists; the import itself is never awaited here.
    pub async fn submit(&self, upload: Upload) -> Result<JobHandle, ImportError> {
        let job = self.inner.jobs.insert(&upload.file_name).await?;
        info!(job = %job.id, file = %upload.file_name, "import accepted");

        let engine = self.clone();
        let id = job.id;
        let task = tokio::spawn(async move {
            engine.run(job, &upload).await;
            if upload.remove_when_done {
                if let Err(e) = tokio::fs::remove_file(&upload.path).await {
                    warn!(job = %id, "failed to remove upload {:?}: {}", upload.path, e);
                }
            }
        });

        Ok(JobHandle { id, task })
    }

    /// Snapshot for pollers, or `None` for an unknown job.
    pub async fn progress(&self, id: &JobId) -> Result<Option<Progress>, ImportError> {
        let Some(job) = self.inner.jobs.find(id).await? else {
            return Ok(None);
        };
        let mut progress = Progress::snapshot(job);
        self.inner.hooks.before_progress(&mut progress);
        Ok(Some(progress))
    }

    /// Flags the job for cancellation; the job's own loop carries it out
    /// before its next record.
    pub async fn cancel(&self, id: &JobId) -> Result<(), ImportError> {
        self.inner.jobs.request_cancel(id).await?;
        info!(job = %id, "cancel requested");
        Ok(())
    }

    async fn run(&self, job: JobRecord, upload: &Upload) {
        match self.drive(&job, upload).await {
            Ok(outcome) => info!(job = %job.id, ?outcome, "import ended"),
            Err(e) => {
                error!(job = %job.id, "import failed: {}", e);
                if let Err(e) = self.inner.jobs.mark_failed(&job.id).await {
                    error!(job = %job.id, "failed to mark import as failed: {}", e);
                }
            }
        }
    }

    async fn drive(&self, job: &JobRecord, upload: &Upload) -> Result<DriveOutcome, ImportError> {
        let inner = &self.inner;

        let format_name = inner
            .registry
            .resolve(&upload.file_name, &upload.path)?
            .to_string();
        let format = inner
            .registry
            .get(&format_name)
            .ok_or_else(|| ImportError::UnknownFormat(format_name.clone()))?;
        inner.jobs.set_format(&job.id, &format_name).await?;

        // open straight after count: a format may hold on to what it parsed
        // while counting until it is opened
        let total = format.count(&upload.path).await?;
        let source = RecordSource::new(format.open(&upload.path).await?);
        inner.jobs.set_total(&job.id, total).await?;
        info!(job = %job.id, format = %format_name, total, "import started");

        let context = ImportJob {
            id: job.id,
            format_name,
            conversion_mode: format.conversion_mode(),
            started_at: job.created_at,
        };
        let control = JobControl::new();

        StreamDriver::new(
            &context,
            source,
            &control,
            &inner.processor,
            &inner.coordinator,
            &inner.jobs,
        )
        .run()
        .await
    }
}
