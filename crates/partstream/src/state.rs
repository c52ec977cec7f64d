use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransferError;
use crate::part::PartFailure;
use crate::progress::ProgressSink;

/// Shared per-transfer state, created at the start of one `download()` call
/// and dropped at its end.
///
/// Every concurrently running part task holds an `Arc` to this state. The
/// interruption token is caller-owned: the engine only ever polls it, it
/// never cancels it. The failure slot is a set-if-absent register resolved by
/// earliest-wins, so the error surfaced to the caller is independent of
/// scheduling order.
pub struct TransferState {
    progress: Arc<dyn ProgressSink>,
    interrupt: CancellationToken,
    first_failure: Mutex<Option<PartFailure>>,
}

impl TransferState {
    pub fn new(progress: Arc<dyn ProgressSink>, interrupt: CancellationToken) -> Self {
        Self {
            progress,
            interrupt,
            first_failure: Mutex::new(None),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Fail with [`TransferError::Cancelled`] when the caller has interrupted
    /// the transfer. Polled at phase boundaries.
    pub fn ensure_not_interrupted(&self) -> Result<(), TransferError> {
        if self.is_interrupted() {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }

    /// Fail when the transfer should stop: the caller interrupted it, or a
    /// sibling part already failed. Polled by part tasks between chunks.
    pub fn ensure_active(&self) -> Result<(), TransferError> {
        if self.is_interrupted() || self.has_failure() {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }

    pub fn should_abort(&self) -> bool {
        self.is_interrupted() || self.has_failure()
    }

    /// Record a part failure unless one is already present. Returns whether
    /// this failure became the retained one.
    pub fn record_failure(&self, failure: PartFailure) -> bool {
        let mut slot = self.first_failure.lock();
        if slot.is_some() {
            debug!(
                part = failure.part.part_number,
                error = %failure.error,
                "dropping secondary part failure, an earlier one is already recorded"
            );
            return false;
        }
        *slot = Some(failure);
        true
    }

    pub fn has_failure(&self) -> bool {
        self.first_failure.lock().is_some()
    }

    pub fn take_failure(&self) -> Option<PartFailure> {
        self.first_failure.lock().take()
    }

    pub fn set_expected_len(&self, bytes: u64) {
        self.progress.set_expected_len(bytes);
    }

    pub fn add_transferred(&self, bytes: u64) {
        self.progress.add_transferred(bytes);
    }
}
