//! Archive handoff: write the reassembled stream to its destination
//!
//! Extraction is staged next to the destination and renamed into place only
//! once it has fully succeeded, so a failed extraction leaves nothing behind.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use chainfs_core::config::ArchiveFormat;
use chainfs_core::{ChainError, ChainResult};

/// Interprets a reconstructed stream and writes its contents to a path.
pub trait Extractor: Send + Sync {
    fn extract(&self, stream: &[u8], destination: &Path) -> Result<()>;
}

/// gzip-compressed tar archive, unpacked into a destination directory
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

/// zstd-compressed tar archive, unpacked into a destination directory
#[derive(Debug, Default, Clone, Copy)]
pub struct TarZstdExtractor;

/// The stream itself, written as a single destination file
#[derive(Debug, Default, Clone, Copy)]
pub struct RawExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, stream: &[u8], destination: &Path) -> Result<()> {
        unpack_staged(destination, |staging| {
            let decoder = flate2::read::GzDecoder::new(stream);
            tar::Archive::new(decoder)
                .unpack(staging)
                .context("unpacking tar.gz stream")
        })
    }
}

impl Extractor for TarZstdExtractor {
    fn extract(&self, stream: &[u8], destination: &Path) -> Result<()> {
        unpack_staged(destination, |staging| {
            let decoder = zstd::stream::read::Decoder::new(stream).context("zstd decoder")?;
            tar::Archive::new(decoder)
                .unpack(staging)
                .context("unpacking tar.zst stream")
        })
    }
}

impl Extractor for RawExtractor {
    fn extract(&self, stream: &[u8], destination: &Path) -> Result<()> {
        let parent = parent_dir(destination);
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("creating dir: {}", parent.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("creating temp file in {}", parent.display()))?;
        tmp.write_all(stream).context("writing reconstructed stream")?;
        tmp.as_file().sync_all().context("syncing reconstructed stream")?;
        tmp.persist(destination)
            .with_context(|| format!("renaming to: {}", destination.display()))?;
        Ok(())
    }
}

/// Extractor for a configured archive format.
pub fn extractor_for(format: ArchiveFormat) -> Arc<dyn Extractor> {
    match format {
        ArchiveFormat::TarGz => Arc::new(TarGzExtractor),
        ArchiveFormat::TarZst => Arc::new(TarZstdExtractor),
        ArchiveFormat::Raw => Arc::new(RawExtractor),
    }
}

/// Run an extractor on a blocking thread, mapping failures to
/// [`ChainError::ExtractionFailed`].
pub async fn hand_off(
    extractor: Arc<dyn Extractor>,
    stream: Vec<u8>,
    destination: PathBuf,
) -> ChainResult<()> {
    let bytes = stream.len();
    let dest = destination.clone();
    tokio::task::spawn_blocking(move || extractor.extract(&stream, &dest))
        .await
        .map_err(|e| ChainError::ExtractionFailed(anyhow::anyhow!("extraction task failed: {e}")))?
        .map_err(ChainError::ExtractionFailed)?;

    info!(destination = %destination.display(), bytes, "extracted");
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Unpack into a temporary sibling directory, then move it to `destination`.
///
/// `destination` must not exist, or be an empty directory.
fn unpack_staged<F>(destination: &Path, unpack: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if destination.exists() {
        let empty_dir = destination.is_dir()
            && std::fs::read_dir(destination)
                .with_context(|| format!("reading {}", destination.display()))?
                .next()
                .is_none();
        if !empty_dir {
            anyhow::bail!(
                "destination already exists and is not an empty directory: {}",
                destination.display()
            );
        }
    }

    let parent = parent_dir(destination);
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("creating dir: {}", parent.display()))?;

    // Dropping the TempDir on any error removes the partial extraction
    let staging = tempfile::Builder::new()
        .prefix(".chainfs-extract-")
        .tempdir_in(&parent)
        .with_context(|| format!("creating staging dir in {}", parent.display()))?;

    unpack(staging.path())?;
    debug!(staging = %staging.path().display(), "archive unpacked");

    if destination.exists() {
        std::fs::remove_dir(destination)
            .with_context(|| format!("replacing empty dir: {}", destination.display()))?;
    }
    let staged = staging.keep();
    if let Err(e) = std::fs::rename(&staged, destination) {
        if let Err(cleanup) = std::fs::remove_dir_all(&staged) {
            warn!(staging = %staged.display(), error = %cleanup, "could not remove staging dir");
        }
        return Err(e).with_context(|| format!("renaming to: {}", destination.display()));
    }
    Ok(())
}
