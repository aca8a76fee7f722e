use std::time::Duration;

use tracing::{debug, info};

use super::driver::{DriverState, JobControl, RecordSource};
use super::error::ImportError;
use crate::id::JobId;
use crate::jobs::JobStore;
use crate::pieces::PieceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCheck {
    Proceed,
    Halted,
}

/// Reacts to cancel requests from inside a job's loop. The request itself is
/// only a flag on the stored job, so it is re-read on every check.
pub struct CancellationCoordinator {
    jobs: JobStore,
    pieces: PieceStore,
    poll_interval: Duration,
}

impl CancellationCoordinator {
    pub fn new(jobs: JobStore, pieces: PieceStore, poll_interval: Duration) -> Self {
        Self {
            jobs,
            pieces,
            poll_interval,
        }
    }

    pub async fn check_and_act(
        &self,
        job: &JobId,
        source: &mut RecordSource,
        control: &JobControl,
    ) -> Result<CancelCheck, ImportError> {
        if !self.jobs.is_canceling(job).await? {
            return Ok(CancelCheck::Proceed);
        }

        info!(job = %job, "canceling import");
        source.stop();
        self.wait_for_in_flight(control).await;

        self.jobs.mark_canceled(job).await?;
        let removed = self.pieces.delete_by_job(job).await?;
        info!(job = %job, removed, "import canceled");
        Ok(CancelCheck::Halted)
    }

    /// Returns once no record is mid-write, so nothing written after the
    /// rollback can survive it. A write is never interrupted, however long
    /// it takes.
    async fn wait_for_in_flight(&self, control: &JobControl) {
        let mut state = control.subscribe();
        loop {
            if *state.borrow_and_update() != DriverState::Processing {
                return;
            }
            debug!("waiting for in-flight record");
            // woken early by a state change; the timeout bounds a missed wakeup
            let _ = tokio::time::timeout(self.poll_interval, state.changed()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::import::format::Producer;
    use crate::pieces::Piece;
    use std::sync::Arc;
    use std::time::Instant;

    async fn setup() -> (JobStore, PieceStore, CancellationCoordinator) {
        let pool = connect_in_memory().await.unwrap();
        let jobs = JobStore::new(pool.clone());
        let pieces = PieceStore::new(pool);
        let coordinator =
            CancellationCoordinator::new(jobs.clone(), pieces.clone(), Duration::from_millis(10));
        (jobs, pieces, coordinator)
    }

    #[tokio::test]
    async fn proceeds_without_request() {
        let (jobs, _, coordinator) = setup().await;
        let job = jobs.insert("a.csv").await.unwrap();
        let mut source = RecordSource::new(Producer::Batch(Vec::new()));

        let check = coordinator
            .check_and_act(&job.id, &mut source, &JobControl::new())
            .await
            .unwrap();
        assert_eq!(check, CancelCheck::Proceed);
        assert!(!source.is_stopped());
    }

    #[tokio::test]
    async fn halts_and_rolls_back() {
        let (jobs, pieces, coordinator) = setup().await;
        let job = jobs.insert("a.csv").await.unwrap();

        let mut imported = Piece::new();
        imported.title = "Imported".to_string();
        imported.import_job_id = Some(job.id);
        pieces.insert(&mut imported).await.unwrap();
        let mut existing = Piece::new();
        existing.title = "Existing".to_string();
        pieces.insert(&mut existing).await.unwrap();

        jobs.request_cancel(&job.id).await.unwrap();
        let mut source = RecordSource::new(Producer::Batch(Vec::new()));
        let check = coordinator
            .check_and_act(&job.id, &mut source, &JobControl::new())
            .await
            .unwrap();

        assert_eq!(check, CancelCheck::Halted);
        assert!(source.is_stopped());
        let job = jobs.find(&job.id).await.unwrap().unwrap();
        assert!(job.canceled && !job.canceling);
        assert_eq!(pieces.count_by_job(&job.id).await.unwrap(), 0);
        assert_eq!(pieces.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn waits_for_in_flight_write() {
        let (jobs, _, coordinator) = setup().await;
        let job = jobs.insert("a.csv").await.unwrap();
        jobs.request_cancel(&job.id).await.unwrap();

        let control = Arc::new(JobControl::new());
        control.transition(DriverState::Idle, DriverState::Pulling);
        control.transition(DriverState::Pulling, DriverState::Processing);

        let started = Instant::now();
        let writer = control.clone();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.transition(DriverState::Processing, DriverState::Idle);
        });

        let mut source = RecordSource::new(Producer::Batch(Vec::new()));
        coordinator
            .check_and_act(&job.id, &mut source, &control)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(control.state(), DriverState::Idle);
        release.await.unwrap();
    }
}
