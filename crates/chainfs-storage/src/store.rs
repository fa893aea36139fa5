//! Chunk store client: address → encrypted bytes
//!
//! The client is a pure lookup. It does not decrypt, verify or retry; retries
//! belong to the operator's `RetryLayer`, verification to the chain walker.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use opendal::{ErrorKind, Operator};
use tracing::debug;

use chainfs_core::{Address, StoreError};

/// Content-addressed lookup of encrypted chunks.
///
/// Implementations must be safe for concurrent lookups from independent
/// reconstructions.
pub trait ChunkStore: Send + Sync {
    /// Fetch the encrypted bytes stored at `address`.
    ///
    /// Fails with [`StoreError::NotFound`] when nothing is stored there and
    /// [`StoreError::Unavailable`] for every other fault.
    fn fetch(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;
}

impl<S: ChunkStore> ChunkStore for Arc<S> {
    fn fetch(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send {
        (**self).fetch(address)
    }
}

impl<S: ChunkStore> ChunkStore for &S {
    fn fetch(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send {
        (**self).fetch(address)
    }
}

/// Chunk store backed by any OpenDAL operator.
///
/// Objects live at `{prefix}/chunks/{address_hex}`.
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    prefix: String,
}

impl OpendalStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Directory holding all chunk objects, with a trailing `/`.
    pub fn chunk_dir(&self) -> String {
        if self.prefix.is_empty() {
            "chunks/".to_string()
        } else {
            format!("{}/chunks/", self.prefix)
        }
    }

    /// Object path for a chunk address.
    pub fn path_for(&self, address: &Address) -> String {
        format!("{}{address}", self.chunk_dir())
    }

    /// Store encrypted bytes under an explicit address.
    ///
    /// Reconstruction never writes; this is for tooling and tests.
    pub async fn put(&self, address: &Address, encrypted: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(address);
        self.op
            .write(&path, encrypted.to_vec())
            .await
            .with_context(|| format!("writing chunk: {path}"))?;
        Ok(())
    }

    /// Store encrypted bytes under their content address and return it.
    pub async fn put_sealed(&self, encrypted: &[u8]) -> anyhow::Result<Address> {
        let address = Address::of(encrypted);
        self.put(&address, encrypted).await?;
        Ok(address)
    }

    /// Remove a chunk. Missing chunks are not an error.
    pub async fn delete(&self, address: &Address) -> anyhow::Result<()> {
        let path = self.path_for(address);
        self.op
            .delete(&path)
            .await
            .with_context(|| format!("deleting chunk: {path}"))
    }
}

impl ChunkStore for OpendalStore {
    async fn fetch(&self, address: &Address) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(address);
        match self.op.read(&path).await {
            Ok(buf) => {
                debug!(chunk = %address.short(), bytes = buf.len(), "fetched chunk");
                Ok(buf.to_vec())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Unavailable(format!("reading {path}: {e}"))),
        }
    }
}
