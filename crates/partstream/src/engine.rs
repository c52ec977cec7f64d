//! The transfer orchestrator.
//!
//! One `download()` call moves through four phases: preparation, concurrent
//! part transfer, post-processing, and (on any failure) cleanup. The phase
//! machine lives here once; the disk-specific behavior is supplied by a
//! [`ReassemblyStrategy`]. Interruption and failures are polled
//! cooperatively, never preempted: every task checks the shared state at its
//! own poll points and stops on its own.

use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::context::TransferContext;
use crate::error::TransferError;
use crate::part::{FilePart, PartFailure};
use crate::progress::ProgressSink;
use crate::split::{FileSplitter, Splitability};
use crate::state::TransferState;
use crate::transport::RangeTransport;
use crate::writer::{ReassemblyStrategy, strategy_for};

/// Download `src_url` into `target` using the reconstruction mode configured
/// in the context.
///
/// On success the target holds exactly `file_size` bytes. On any failure the
/// target path and all scratch artifacts are removed before the error is
/// returned, so the call may simply be retried.
pub async fn download(
    src_url: &str,
    target: &Path,
    file_size: i64,
    progress: Arc<dyn ProgressSink>,
    ctx: &TransferContext,
) -> Result<(), TransferError> {
    let url = src_url
        .parse::<Url>()
        .map_err(|err| TransferError::invalid_url(src_url, err.to_string()))?;
    if file_size <= 0 {
        return Err(TransferError::InvalidFileSize { size: file_size });
    }

    let strategy = strategy_for(target, file_size as u64, ctx);
    run_download(strategy, &url, file_size, progress, ctx).await
}

/// Run the phase machine against an explicit reconstruction strategy.
///
/// This is the single-sourced control flow both built-in modes go through;
/// callers with their own [`ReassemblyStrategy`] can drive it directly.
#[instrument(skip(strategy, progress, ctx), level = "debug")]
pub async fn run_download(
    strategy: Arc<dyn ReassemblyStrategy>,
    url: &Url,
    file_size: i64,
    progress: Arc<dyn ProgressSink>,
    ctx: &TransferContext,
) -> Result<(), TransferError> {
    let state = Arc::new(TransferState::new(progress, ctx.interrupt.clone()));

    info!(url = %url, size = file_size, "starting download");
    match run_phases(&strategy, url, file_size, &state, ctx).await {
        Ok(()) => {
            info!(url = %url, size = file_size, "download complete");
            Ok(())
        }
        Err(err) => {
            // Best effort only: a cleanup problem must never mask the error
            // that caused the cleanup.
            if let Err(cleanup_err) = strategy.cleanup().await {
                warn!(
                    url = %url,
                    error = %cleanup_err,
                    "cleanup after failed download did not complete"
                );
            }
            Err(err)
        }
    }
}

async fn run_phases(
    strategy: &Arc<dyn ReassemblyStrategy>,
    url: &Url,
    file_size: i64,
    state: &Arc<TransferState>,
    ctx: &TransferContext,
) -> Result<(), TransferError> {
    state.ensure_not_interrupted()?;
    match strategy.prepare().await {
        Ok(()) => {}
        Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
        Err(err) => return Err(TransferError::preparation(err)),
    }

    transfer_parts(strategy, url, file_size, state, ctx).await?;

    state.ensure_not_interrupted()?;
    match strategy.finalize().await {
        Ok(()) => Ok(()),
        Err(TransferError::Cancelled) => Err(TransferError::Cancelled),
        Err(err) => Err(TransferError::post_processing(err)),
    }
}

async fn transfer_parts(
    strategy: &Arc<dyn ReassemblyStrategy>,
    url: &Url,
    file_size: i64,
    state: &Arc<TransferState>,
    ctx: &TransferContext,
) -> Result<(), TransferError> {
    let splitter = FileSplitter::new(ctx.config.split.clone());
    let parts = splitter.split(file_size)?;

    if parts.len() == 1
        && let Splitability::Unsplittable { reason } = splitter.splitability(file_size)
    {
        // Not an error: the caller asked for parallelism but the file or the
        // configuration makes a single part the right answer.
        info!(url = %url, reason = %reason, "transferring in a single part");
    }

    state.set_expected_len(file_size as u64);

    let limit = ctx.config.split.max_parts.max(1).min(parts.len());
    debug!(parts = parts.len(), limit, "dispatching part downloads");

    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = JoinSet::new();
    for part in parts {
        if state.should_abort() {
            break;
        }
        let semaphore = Arc::clone(&semaphore);
        let state = Arc::clone(state);
        let strategy = Arc::clone(strategy);
        let transport = Arc::clone(&ctx.transport);
        let url = url.clone();
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            // A part that has not started yet is skipped outright once a
            // sibling failed or the caller interrupted; running parts
            // discover the same condition at their next chunk poll.
            if state.should_abort() {
                return;
            }
            match fetch_part(strategy.as_ref(), transport.as_ref(), &url, part, &state).await {
                Ok(()) => {}
                // Interruption surfaces through the engine's own polls, not
                // as a part failure.
                Err(TransferError::Cancelled) => {}
                Err(error) => {
                    warn!(part = %part, error = %error, "part download failed");
                    state.record_failure(PartFailure::new(part, error));
                }
            }
        });
    }

    let mut join_error = None;
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined
            && join_error.is_none()
        {
            join_error = Some(err);
        }
    }

    if let Some(join_err) = join_error {
        // A panicked task may still have recorded a real part failure first;
        // that failure is the root cause worth surfacing, not the join error.
        if let Some(failure) = state.take_failure() {
            return Err(TransferError::part_transfer(failure.part, failure.error));
        }
        return Err(TransferError::TaskFailure {
            reason: join_err.to_string(),
        });
    }

    if let Some(failure) = state.take_failure() {
        return Err(TransferError::part_transfer(failure.part, failure.error));
    }

    Ok(())
}

async fn fetch_part(
    strategy: &dyn ReassemblyStrategy,
    transport: &dyn RangeTransport,
    url: &Url,
    part: FilePart,
    state: &TransferState,
) -> Result<(), TransferError> {
    state.ensure_active()?;

    let response = transport
        .fetch_range(url, part.start_byte, part.end_byte)
        .await?;
    if response.status != StatusCode::PARTIAL_CONTENT {
        return Err(TransferError::http_status(
            response.status,
            url.as_str(),
            "ranged part download",
        ));
    }

    strategy.write_part(part, response.body, state).await
}
