use std::sync::atomic::{AtomicU64, Ordering};

/// Receiver for transfer progress.
///
/// `set_expected_len` is called once per transfer before any bytes move;
/// `add_transferred` is called once per received chunk, concurrently from
/// every part task. Implementations must be safe under concurrent increments
/// and must not block.
pub trait ProgressSink: Send + Sync {
    fn set_expected_len(&self, bytes: u64);

    fn add_transferred(&self, bytes: u64);
}

/// Progress sink that discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn set_expected_len(&self, _bytes: u64) {}

    fn add_transferred(&self, _bytes: u64) {}
}

/// Simple atomic byte counter, useful for polling progress from another task
/// and for assertions in tests.
#[derive(Debug, Default)]
pub struct TransferCounter {
    expected: AtomicU64,
    transferred: AtomicU64,
}

impl TransferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected(&self) -> u64 {
        self.expected.load(Ordering::Relaxed)
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }
}

impl ProgressSink for TransferCounter {
    fn set_expected_len(&self, bytes: u64) {
        self.expected.store(bytes, Ordering::Relaxed);
    }

    fn add_transferred(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }
}
