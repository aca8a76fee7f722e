use anyhow::Result;

use super::processor::ImportJob;
use super::progress::Progress;
use super::record::Record;
use crate::pieces::Piece;

/// Points where an application can adjust pieces around each write, or the
/// progress snapshot before it is returned. Every method defaults to a no-op.
///
/// By the time `before_*` runs the record has already been converted onto
/// `piece`; for updates `piece` started out as the stored document.
#[async_trait::async_trait]
pub trait ImportHooks: Send + Sync {
    async fn before_insert(&self, _job: &ImportJob, _record: &Record, _piece: &mut Piece) -> Result<()> {
        Ok(())
    }

    async fn before_update(&self, _job: &ImportJob, _record: &Record, _piece: &mut Piece) -> Result<()> {
        Ok(())
    }

    /// The piece has been stored and has its final id.
    async fn after_insert(&self, _job: &ImportJob, _record: &Record, _piece: &Piece) -> Result<()> {
        Ok(())
    }

    async fn after_update(&self, _job: &ImportJob, _record: &Record, _piece: &Piece) -> Result<()> {
        Ok(())
    }

    fn before_progress(&self, _progress: &mut Progress) {}
}

pub struct NoHooks;

impl ImportHooks for NoHooks {}
