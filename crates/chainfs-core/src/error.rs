use thiserror::Error;

use crate::types::Address;

pub type ChainResult<T> = Result<T, ChainError>;

/// Failure of a single store lookup.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chunk not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single chunk decryption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("authentication failed: wrong key or corrupted chunk")]
    AuthenticationFailed,

    #[error("malformed chunk header: {0}")]
    MalformedHeader(String),
}

/// Why a chain reconstruction was aborted.
///
/// Every variant is fatal to the whole reconstruction. Step-scoped variants
/// carry the chunk address and the zero-based traversal step (0 = tail).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chunk {address} not found (step {step})")]
    NotFound { address: Address, step: u64 },

    #[error("store unavailable fetching chunk {address} (step {step}): {reason}")]
    StoreUnavailable {
        address: Address,
        step: u64,
        reason: String,
    },

    #[error("authentication failed for chunk {address} (step {step}): wrong key or corrupted data")]
    AuthenticationFailed { address: Address, step: u64 },

    #[error("malformed header in chunk {address} (step {step}): {reason}")]
    MalformedHeader {
        address: Address,
        step: u64,
        reason: String,
    },

    #[error("chunk bytes do not hash to requested address {address} (step {step}, got {actual})")]
    AddressMismatch {
        address: Address,
        actual: Address,
        step: u64,
    },

    #[error("chunk {address} (step {step}) has {actual} payload bytes, expected {expected}")]
    InconsistentChunkSize {
        address: Address,
        step: u64,
        expected: usize,
        actual: usize,
    },

    #[error("chain revisits chunk {address} at step {step}")]
    CycleDetected { address: Address, step: u64 },

    #[error("chain exceeds {limit} chunks")]
    ChainTooLong { limit: u64 },

    #[error("degenerate chain: nominal chunk size is 0 with {chunks} chunks")]
    DegenerateChain { chunks: u64 },

    #[error("reconstruction cancelled after {steps} chunks")]
    Cancelled { steps: u64 },

    #[error("extraction failed: {0:#}")]
    ExtractionFailed(#[source] anyhow::Error),
}

impl ChainError {
    /// Attach chain position to a store failure.
    pub fn from_store(err: StoreError, address: Address, step: u64) -> Self {
        match err {
            StoreError::NotFound => ChainError::NotFound { address, step },
            StoreError::Unavailable(reason) => ChainError::StoreUnavailable {
                address,
                step,
                reason,
            },
        }
    }

    /// Attach chain position to a cipher failure.
    pub fn from_cipher(err: CipherError, address: Address, step: u64) -> Self {
        match err {
            CipherError::AuthenticationFailed => ChainError::AuthenticationFailed { address, step },
            CipherError::MalformedHeader(reason) => ChainError::MalformedHeader {
                address,
                step,
                reason,
            },
        }
    }
}
