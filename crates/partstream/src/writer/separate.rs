use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SplitConfig;
use crate::context::TransferContext;
use crate::error::TransferError;
use crate::part::FilePart;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::split::FileSplitter;
use crate::state::TransferState;
use crate::transport::BodyStream;

use super::{
    PartDirProvider, ReassemblyStrategy, SiblingPartDir, allocate_sparse, copy_body,
    remove_if_exists, scratch_path,
};

/// Reconstruction through one file per part, merged into the scratch file in
/// part order once every part has arrived.
///
/// Each part owns its own file, so writers never seek. The merge replays
/// parts in ascending part number regardless of download completion order,
/// which makes the final file deterministic irrespective of network timing.
pub struct SeparatePartsWriter {
    target: PathBuf,
    scratch: PathBuf,
    parts_dir: PathBuf,
    file_size: u64,
    split: SplitConfig,
    io_buffer_size: usize,
    rename_retry: RetryPolicy,
    interrupt: CancellationToken,
}

impl SeparatePartsWriter {
    pub fn new(target: &Path, file_size: u64, ctx: &TransferContext) -> Self {
        Self::with_provider(target, file_size, ctx, &SiblingPartDir)
    }

    pub fn with_provider(
        target: &Path,
        file_size: u64,
        ctx: &TransferContext,
        provider: &dyn PartDirProvider,
    ) -> Self {
        Self {
            target: target.to_path_buf(),
            scratch: scratch_path(target),
            parts_dir: provider.part_dir(target),
            file_size,
            split: ctx.config.split.clone(),
            io_buffer_size: ctx.config.io_buffer_size,
            rename_retry: ctx.config.rename_retry.clone(),
            interrupt: ctx.interrupt.clone(),
        }
    }

    fn part_path(&self, part_number: usize) -> PathBuf {
        self.parts_dir.join(format!("{part_number:05}.part"))
    }

    /// The part layout is a pure function of size and config, so it can be
    /// recomputed here instead of being threaded through the transfer.
    fn part_layout(&self) -> Vec<FilePart> {
        FileSplitter::new(self.split.clone())
            .split(self.file_size as i64)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReassemblyStrategy for SeparatePartsWriter {
    async fn prepare(&self) -> Result<(), TransferError> {
        debug!(dir = %self.parts_dir.display(), "creating part directory");
        fs::create_dir_all(&self.parts_dir).await?;
        Ok(())
    }

    async fn write_part(
        &self,
        part: FilePart,
        mut body: BodyStream,
        state: &TransferState,
    ) -> Result<(), TransferError> {
        let path = self.part_path(part.part_number);
        let mut file = allocate_sparse(&path, part.size_bytes()).await?;

        match copy_body(&mut body, &mut file, state).await {
            Ok(written) => {
                file.flush().await?;
                debug!(part = %part, written, path = %path.display(), "part file written");
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
        let parts = self.part_layout();
        let mut out = allocate_sparse(&self.scratch, self.file_size).await?;

        let mut total = 0u64;
        for part in &parts {
            let src = File::open(self.part_path(part.part_number)).await?;
            let mut reader = BufReader::with_capacity(self.io_buffer_size, src);
            out.seek(SeekFrom::Start(part.start_byte)).await?;
            let copied = tokio::io::copy_buf(&mut reader, &mut out).await?;
            total += copied;
            trace!(part = %part, copied, total, "merged part file");
        }
        out.flush().await?;
        drop(out);

        if total != self.file_size {
            return Err(TransferError::SizeMismatch {
                expected: self.file_size,
                actual: total,
            });
        }

        retry_with_backoff(&self.rename_retry, &self.interrupt, |_| async move {
            match fs::rename(&self.scratch, &self.target).await {
                Ok(()) => RetryAction::Success(()),
                Err(err) => RetryAction::Retry(TransferError::from(err)),
            }
        })
        .await?;

        for part in &parts {
            remove_if_exists(&self.part_path(part.part_number)).await?;
        }
        // The directory may be owned by an external provider; removing it is
        // best-effort and only succeeds once it is empty.
        let _ = fs::remove_dir(&self.parts_dir).await;

        Ok(())
    }

    async fn cleanup(&self) -> Result<(), TransferError> {
        remove_if_exists(&self.scratch).await?;
        remove_if_exists(&self.target).await?;
        for part in &self.part_layout() {
            remove_if_exists(&self.part_path(part.part_number)).await?;
        }
        let _ = fs::remove_dir(&self.parts_dir).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::transport::RangeTransport;
    use std::sync::Arc;

    fn context() -> TransferContext {
        struct NoTransport;

        #[async_trait]
        impl RangeTransport for NoTransport {
            async fn fetch_range(
                &self,
                _url: &url::Url,
                _start_byte: u64,
                _end_byte: u64,
            ) -> Result<crate::transport::RangeResponse, TransferError> {
                unreachable!("layout tests never fetch")
            }
        }

        TransferContext::new(
            TransferConfig::default(),
            Arc::new(NoTransport),
            CancellationToken::new(),
        )
    }

    #[test]
    fn part_paths_are_zero_padded_and_scoped_to_the_dir() {
        let ctx = context();
        let writer = SeparatePartsWriter::new(Path::new("/data/artifact.zip"), 1024, &ctx);
        assert_eq!(
            writer.part_path(3),
            PathBuf::from("/data/artifact.zip.parts/00003.part")
        );
    }

    #[test]
    fn part_layout_matches_the_splitter() {
        let mut ctx = context();
        ctx.config.split.min_part_size = 100;
        ctx.config.split.min_part_size_floor = 10;
        ctx.config.split.max_parts = 4;
        let writer = SeparatePartsWriter::new(Path::new("/data/artifact.zip"), 1000, &ctx);
        let layout = writer.part_layout();
        assert_eq!(layout.len(), 4);
        assert_eq!(layout[3].end_byte, 999);
    }
}
