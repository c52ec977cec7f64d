use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::TransferContext;
use crate::error::TransferError;
use crate::part::FilePart;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::state::TransferState;
use crate::transport::BodyStream;

use super::{ReassemblyStrategy, allocate_sparse, copy_body, remove_if_exists, scratch_path};

/// Reconstruction by writing every part directly into one sparse scratch
/// file at the part's own offset.
///
/// Part ranges are disjoint, so concurrent writers never touch overlapping
/// offsets and the file needs no locking. The scratch file becomes the
/// target through a single rename, so an observer of the target path never
/// sees a partially written file.
pub struct InPlaceWriter {
    target: PathBuf,
    scratch: PathBuf,
    file_size: u64,
    rename_retry: RetryPolicy,
    interrupt: CancellationToken,
}

impl InPlaceWriter {
    pub fn new(target: &Path, file_size: u64, ctx: &TransferContext) -> Self {
        Self {
            target: target.to_path_buf(),
            scratch: scratch_path(target),
            file_size,
            rename_retry: ctx.config.rename_retry.clone(),
            interrupt: ctx.interrupt.clone(),
        }
    }
}

#[async_trait]
impl ReassemblyStrategy for InPlaceWriter {
    async fn prepare(&self) -> Result<(), TransferError> {
        debug!(scratch = %self.scratch.display(), size = self.file_size, "allocating scratch file");
        allocate_sparse(&self.scratch, self.file_size).await?;
        Ok(())
    }

    async fn write_part(
        &self,
        part: FilePart,
        mut body: BodyStream,
        state: &TransferState,
    ) -> Result<(), TransferError> {
        let mut file = OpenOptions::new().write(true).open(&self.scratch).await?;
        file.seek(SeekFrom::Start(part.start_byte)).await?;

        match copy_body(&mut body, &mut file, state).await {
            Ok(written) => {
                file.flush().await?;
                debug!(part = %part, written, "part written in place");
                Ok(())
            }
            Err(err) => {
                // Dropping the body aborts the in-flight request; without
                // this a doomed response would be drained to the end.
                drop(body);
                Err(err)
            }
        }
    }

    async fn finalize(&self) -> Result<(), TransferError> {
        retry_with_backoff(&self.rename_retry, &self.interrupt, |_| async move {
            match fs::rename(&self.scratch, &self.target).await {
                Ok(()) => RetryAction::Success(()),
                Err(err) => RetryAction::Retry(TransferError::from(err)),
            }
        })
        .await
    }

    async fn cleanup(&self) -> Result<(), TransferError> {
        remove_if_exists(&self.scratch).await?;
        remove_if_exists(&self.target).await?;
        Ok(())
    }
}
