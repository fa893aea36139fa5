//! Per-chunk symmetric keys

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::KEY_SIZE;

/// A 256-bit chunk key. Zeroized on drop.
///
/// Each key unlocks exactly one chunk. The cipher overwrites it with zeros
/// as soon as that chunk has been decrypted (see [`crate::ChunkDecrypt::decrypt`]).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChunkKey {
    bytes: [u8; KEY_SIZE],
}

impl ChunkKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Parse a key from 64 hex chars. Intermediate buffers are wiped.
    pub fn from_hex(hex_str: &str) -> anyhow::Result<Self> {
        let decoded = Zeroizing::new(
            hex::decode(hex_str.trim()).map_err(|e| anyhow::anyhow!("invalid key hex: {e}"))?,
        );
        if decoded.len() != KEY_SIZE {
            anyhow::bail!(
                "key has wrong size: {} bytes (expected {})",
                decoded.len(),
                KEY_SIZE
            );
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// True once the key material has been wiped.
    pub fn is_zeroed(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit chunk key.
pub fn generate_chunk_key() -> ChunkKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key = ChunkKey::from_bytes(bytes);
    bytes.zeroize();
    key
}
