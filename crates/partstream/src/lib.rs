//! # Partstream Engine
//!
//! Parallel ranged file transfer: a large remote object is split into
//! byte-range parts, the parts are downloaded concurrently over HTTP, and
//! the result is reassembled into a single local file with all-or-nothing
//! outcome semantics. On success the target holds the complete file; on any
//! failure both the target path and every scratch artifact are removed, so
//! the whole call can simply be retried.
//!
//! The entrypoint is [`download`]. It consumes three collaborator seams:
//! a [`RangeTransport`] issuing ranged GET requests (the reqwest-backed
//! [`HttpTransport`] ships in-crate), a [`ProgressSink`] receiving byte
//! counts, and a caller-owned `CancellationToken` that the engine polls
//! cooperatively and never cancels itself.
//!
//! Two reconstruction modes are available through [`WriteMode`]: writing
//! every part into one sparse scratch file at its own offset, or writing one
//! file per part and merging in part order. Both finish with an atomic
//! rename, so an observer of the target path never sees partial data.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod part;
pub mod progress;
pub mod retry;
pub mod split;
pub mod state;
pub mod transport;
pub mod writer;

pub use config::{DEFAULT_USER_AGENT, HttpConfig, SplitConfig, TransferConfig, WriteMode};
pub use context::TransferContext;
pub use engine::{download, run_download};
pub use error::TransferError;
pub use part::{FilePart, PartFailure};
pub use progress::{NoopProgress, ProgressSink, TransferCounter};
pub use retry::{RetryAction, RetryPolicy, retry_with_backoff};
pub use split::{FileSplitter, Splitability};
pub use state::TransferState;
pub use transport::{BodyStream, HttpTransport, RangeResponse, RangeTransport, create_client};
pub use writer::{
    InPlaceWriter, PartDirProvider, ReassemblyStrategy, SeparatePartsWriter, SiblingPartDir,
    strategy_for,
};
