use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::TransferConfig;
use crate::transport::RangeTransport;

/// Immutable configuration and collaborator bundle for one `download()` call.
///
/// Nothing in here is shared across transfers; callers build a fresh context
/// (or clone one, which shares only the transport) per call. The interruption
/// token stays owned by the caller's environment: cancelling it asks the
/// engine to stop at its next poll point.
#[derive(Clone)]
pub struct TransferContext {
    pub config: TransferConfig,
    pub transport: Arc<dyn RangeTransport>,
    pub interrupt: CancellationToken,
}

impl TransferContext {
    pub fn new(
        config: TransferConfig,
        transport: Arc<dyn RangeTransport>,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            config,
            transport,
            interrupt,
        }
    }
}
