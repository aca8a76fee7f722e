use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info};

use super::cancel::{CancelCheck, CancellationCoordinator};
use super::error::ImportError;
use super::format::{Producer, RecordStream};
use super::processor::{ImportJob, RecordProcessor};
use super::record::Record;
use crate::jobs::JobStore;

/// Pull interface over either producer shape.
pub struct RecordSource {
    inner: SourceInner,
}

enum SourceInner {
    Stream(RecordStream),
    Batch(std::vec::IntoIter<Record>),
    Stopped,
}

impl RecordSource {
    pub fn new(producer: Producer) -> Self {
        let inner = match producer {
            Producer::Stream(stream) => SourceInner::Stream(stream),
            Producer::Batch(records) => SourceInner::Batch(records.into_iter()),
        };
        Self { inner }
    }

    /// The next record, or `None` once the input is exhausted. Waits when a
    /// streaming source has nothing buffered yet.
    pub async fn next(&mut self) -> Result<Option<Record>, ImportError> {
        match &mut self.inner {
            SourceInner::Stream(stream) => stream.next().await.transpose(),
            SourceInner::Batch(records) => Ok(records.next()),
            SourceInner::Stopped => Ok(None),
        }
    }

    /// Closes the underlying input. Batches are already fully read and are
    /// simply dropped.
    pub fn stop(&mut self) {
        self.inner = SourceInner::Stopped;
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.inner, SourceInner::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Pulling,
    Processing,
}

/// Per-job driver state. All changes go through [`JobControl::transition`],
/// and the cancellation coordinator watches it to know when no write is in
/// flight.
pub struct JobControl {
    state: watch::Sender<DriverState>,
}

impl JobControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DriverState::Idle);
        Self { state }
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Moves `from` -> `to`. Returns false, changing nothing, when the current
    /// state isn't `from`.
    pub fn transition(&self, from: DriverState, to: DriverState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Finished,
    Canceled,
    /// Another driver is already pulling from this job.
    AlreadyRunning,
}

/// Feeds records to the processor one at a time, in input order, checking
/// for cancellation before each one.
pub struct StreamDriver<'a> {
    job: &'a ImportJob,
    source: RecordSource,
    control: &'a JobControl,
    processor: &'a RecordProcessor,
    coordinator: &'a CancellationCoordinator,
    jobs: &'a JobStore,
    canceling: bool,
}

impl<'a> StreamDriver<'a> {
    pub fn new(
        job: &'a ImportJob,
        source: RecordSource,
        control: &'a JobControl,
        processor: &'a RecordProcessor,
        coordinator: &'a CancellationCoordinator,
        jobs: &'a JobStore,
    ) -> Self {
        Self {
            job,
            source,
            control,
            processor,
            coordinator,
            jobs,
            canceling: false,
        }
    }

    pub async fn run(mut self) -> Result<DriveOutcome, ImportError> {
        loop {
            if self.canceling {
                return Ok(DriveOutcome::Canceled);
            }

            if !self.control.transition(DriverState::Idle, DriverState::Pulling) {
                debug!(job = %self.job.id, "already reading");
                return Ok(DriveOutcome::AlreadyRunning);
            }

            let record = match self.source.next().await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.control.transition(DriverState::Pulling, DriverState::Idle);
                    return self.end_of_input().await;
                }
                Err(e) => {
                    self.control.transition(DriverState::Pulling, DriverState::Idle);
                    return Err(e);
                }
            };

            let check = self.check_cancel().await;
            if !matches!(check, Ok(CancelCheck::Proceed)) {
                self.control.transition(DriverState::Pulling, DriverState::Idle);
                self.canceling = check? == CancelCheck::Halted;
                continue;
            }

            self.control.transition(DriverState::Pulling, DriverState::Processing);
            let outcome = self.processor.process(self.job, record).await;
            self.control.transition(DriverState::Processing, DriverState::Idle);
            outcome?;
        }
    }

    async fn check_cancel(&mut self) -> Result<CancelCheck, ImportError> {
        self.coordinator
            .check_and_act(&self.job.id, &mut self.source, self.control)
            .await
    }

    async fn end_of_input(&mut self) -> Result<DriveOutcome, ImportError> {
        if self.check_cancel().await? == CancelCheck::Halted {
            return Ok(DriveOutcome::Canceled);
        }
        // a cancel landing after the check above makes finishing a no-op
        if !self.jobs.mark_finished(&self.job.id).await?
            && self.check_cancel().await? == CancelCheck::Halted
        {
            return Ok(DriveOutcome::Canceled);
        }
        info!(job = %self.job.id, "import finished");
        Ok(DriveOutcome::Finished)
    }
}
