//! chainfs-assembler: rebuild a file from its encrypted chunk chain
//!
//! # Overview
//! - `walker`: fetch → decrypt → follow `next`/`next_key` from the tail to
//!   the terminal chunk
//! - `reassemble`: infer the nominal chunk size and undo the traversal order
//! - `extract`: hand the finished stream to an archive extractor
//!
//! Pipeline: tail address + key → walk → reassemble → extract → destination

pub mod extract;
pub mod reassemble;
pub mod walker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use chainfs_core::config::ChainfsConfig;
use chainfs_core::{Address, ChainResult};
use chainfs_crypto::{ChunkCipher, ChunkKey, XChaChaCipher};
use chainfs_storage::ChunkStore;

pub use extract::{extractor_for, Extractor, RawExtractor, TarGzExtractor, TarZstdExtractor};
pub use reassemble::reassemble;
pub use walker::{walk, walk_with, ProgressFn, StepInfo, Traversal, WalkOptions};

/// Outcome of a successful reconstruction
#[derive(Debug, Clone)]
pub struct ReconstructReport {
    pub tail: Address,
    pub chunks: u64,
    /// Reconstructed stream length
    pub bytes: u64,
    pub nominal_size: usize,
    pub destination: PathBuf,
}

/// A reassembled stream with the chain facts that produced it
#[derive(Debug)]
pub struct Assembled {
    pub data: Vec<u8>,
    pub chunks: u64,
    pub nominal_size: usize,
}

/// Store + cipher + extractor wired together.
///
/// Safe to share between concurrent reconstructions of different chains;
/// each call owns its own traversal buffer.
pub struct Reconstructor<S, C = XChaChaCipher> {
    store: S,
    cipher: C,
    extractor: Arc<dyn Extractor>,
    opts: WalkOptions,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl<S: ChunkStore> Reconstructor<S> {
    /// XChaCha20-Poly1305 chunks, tar.gz output, default limits.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cipher: XChaChaCipher,
            extractor: Arc::new(TarGzExtractor),
            opts: WalkOptions::default(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Limits and archive format from config.
    pub fn from_config(store: S, config: &ChainfsConfig) -> Self {
        Self::new(store)
            .with_options(WalkOptions::from(&config.assembler))
            .with_extractor(extractor_for(config.extract.format))
    }
}

impl<S: ChunkStore, C: ChunkCipher> Reconstructor<S, C> {
    pub fn with_cipher<C2: ChunkCipher>(self, cipher: C2) -> Reconstructor<S, C2> {
        Reconstructor {
            store: self.store,
            cipher,
            extractor: self.extractor,
            opts: self.opts,
            cancel: self.cancel,
            progress: self.progress,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_options(mut self, opts: WalkOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Token checked between chain steps; cancelling it aborts in-flight walks.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Walk the chain without reordering; payloads stay in traversal order.
    pub async fn walk(&self, tail: Address, tail_key: ChunkKey) -> ChainResult<Traversal> {
        walker::walk(
            &self.store,
            &self.cipher,
            tail,
            tail_key,
            &self.opts,
            &self.cancel,
            self.progress.as_ref(),
        )
        .await
    }

    /// Walk and reassemble into the original byte stream, in memory.
    pub async fn assemble(&self, tail: Address, tail_key: ChunkKey) -> ChainResult<Assembled> {
        let traversal = self.walk(tail, tail_key).await?;
        let chunks = traversal.chunk_count();
        let nominal_size = traversal.nominal_size();
        let data = reassemble(traversal)?;
        Ok(Assembled {
            data,
            chunks,
            nominal_size,
        })
    }

    /// Rebuild the file behind `tail` and extract it to `destination`.
    ///
    /// Nothing is written to `destination` unless the whole chain was
    /// fetched, decrypted and reassembled.
    pub async fn reconstruct(
        &self,
        tail: Address,
        tail_key: ChunkKey,
        destination: &Path,
    ) -> ChainResult<ReconstructReport> {
        let assembled = self.assemble(tail, tail_key).await?;
        let bytes = assembled.data.len() as u64;

        extract::hand_off(
            self.extractor.clone(),
            assembled.data,
            destination.to_path_buf(),
        )
        .await?;

        info!(
            tail = %tail.short(),
            chunks = assembled.chunks,
            bytes,
            destination = %destination.display(),
            "reconstructed"
        );

        Ok(ReconstructReport {
            tail,
            chunks: assembled.chunks,
            bytes,
            nominal_size: assembled.nominal_size,
            destination: destination.to_path_buf(),
        })
    }
}

/// Reconstruct with `cipher` and `options`, extracting a tar.gz archive.
pub async fn reconstruct<S: ChunkStore, C: ChunkCipher>(
    store: &S,
    cipher: C,
    tail: Address,
    tail_key: ChunkKey,
    destination: &Path,
    options: WalkOptions,
) -> ChainResult<ReconstructReport> {
    Reconstructor::new(store)
        .with_cipher(cipher)
        .with_options(options)
        .reconstruct(tail, tail_key, destination)
        .await
}
