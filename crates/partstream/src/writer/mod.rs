//! On-disk reconstruction of the downloaded parts.
//!
//! The engine drives a single transfer through four hook points; the two
//! concrete modes differ only in how bytes reach the target location. Both
//! share the same outcome contract: on success the target holds the complete
//! file, on any failure the target path and all scratch artifacts are gone.

mod in_place;
mod separate;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::WriteMode;
use crate::context::TransferContext;
use crate::error::TransferError;
use crate::part::FilePart;
use crate::state::TransferState;
use crate::transport::BodyStream;

pub use in_place::InPlaceWriter;
pub use separate::SeparatePartsWriter;

/// The disk-specific half of a transfer.
///
/// One instance is created per `download()` call and owns the paths it
/// touches. `write_part` runs concurrently for different parts; every part
/// owns a disjoint byte range (or a file of its own), so implementations need
/// no locking.
#[async_trait]
pub trait ReassemblyStrategy: Send + Sync {
    /// Set up scratch space before any part starts transferring.
    async fn prepare(&self) -> Result<(), TransferError>;

    /// Stream one part's response body into its target location, polling
    /// `state` between chunks and reporting chunk sizes to it.
    async fn write_part(
        &self,
        part: FilePart,
        body: BodyStream,
        state: &TransferState,
    ) -> Result<(), TransferError>;

    /// Turn the scratch space into the final target once every part has
    /// been written.
    async fn finalize(&self) -> Result<(), TransferError>;

    /// Remove the target and all scratch artifacts after a failed transfer.
    /// Missing files are not an error.
    async fn cleanup(&self) -> Result<(), TransferError>;
}

/// Supplies the directory holding per-part files for
/// [`SeparatePartsWriter`]. The directory must be writable and scoped to the
/// current transfer's job.
pub trait PartDirProvider: Send + Sync {
    fn part_dir(&self, target: &Path) -> PathBuf;
}

/// Default provider: a `<target>.parts` directory next to the target file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SiblingPartDir;

impl PartDirProvider for SiblingPartDir {
    fn part_dir(&self, target: &Path) -> PathBuf {
        append_extension(target, ".parts")
    }
}

/// Build the reconstruction strategy configured in the context.
pub fn strategy_for(
    target: &Path,
    file_size: u64,
    ctx: &TransferContext,
) -> Arc<dyn ReassemblyStrategy> {
    match ctx.config.write_mode {
        WriteMode::InPlace => Arc::new(InPlaceWriter::new(target, file_size, ctx)),
        WriteMode::SeparateParts => Arc::new(SeparatePartsWriter::new(target, file_size, ctx)),
    }
}

/// `<target>.unfinished` sibling path used for the scratch file.
pub(crate) fn scratch_path(target: &Path) -> PathBuf {
    append_extension(target, ".unfinished")
}

fn append_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Create `path` with `len` bytes pre-declared but not physically written.
/// Declaring the length up front keeps far-offset writes from blocking on
/// zero-fill, which on large files can stall long enough for the remote
/// connection to time out.
pub(crate) async fn allocate_sparse(path: &Path, len: u64) -> io::Result<File> {
    let file = File::create(path).await?;
    file.set_len(len).await?;
    Ok(file)
}

pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Stream a response body into `dest`, checking for interruption or a
/// sibling failure before every chunk and reporting each chunk's size to the
/// progress sink. Returns the number of bytes written.
pub(crate) async fn copy_body<W>(
    body: &mut BodyStream,
    dest: &mut W,
    state: &TransferState,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(next) = body.next().await {
        state.ensure_active()?;
        let mut chunk = next?;
        let len = chunk.len() as u64;
        dest.write_all_buf(&mut chunk).await?;
        state.add_transferred(len);
        written += len;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_path_appends_unfinished_suffix() {
        let scratch = scratch_path(Path::new("/data/artifact.zip"));
        assert_eq!(scratch, PathBuf::from("/data/artifact.zip.unfinished"));
    }

    #[test]
    fn sibling_part_dir_is_derived_from_target() {
        let dir = SiblingPartDir.part_dir(Path::new("/data/artifact.zip"));
        assert_eq!(dir, PathBuf::from("/data/artifact.zip.parts"));
    }

    #[tokio::test]
    async fn remove_if_exists_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        assert!(remove_if_exists(&path).await.is_ok());
    }
}
