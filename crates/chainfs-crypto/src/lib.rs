//! chainfs-crypto: chunk decryption and the chained header format
//!
//! Every chunk is sealed with XChaCha20-Poly1305 under its own 256-bit key.
//! The decrypted plaintext starts with a fixed header naming the chain
//! neighbor and the key that unlocks it, so one (address, key) pair is enough
//! to walk the whole chain:
//!
//! ```text
//! tail (key k_n) ──next/next_key──► chunk n-1 (k_{n-1}) ──► ... ──► terminal (is_last)
//! ```
//!
//! Encrypted chunk format:
//! ```text
//! [24 bytes: random nonce][ciphertext: header || payload || filler][16 bytes: Poly1305 tag]
//! ```

pub mod cipher;
pub mod header;
pub mod keys;
#[cfg(any(test, feature = "producer"))]
pub mod producer;

pub use cipher::{Chunk, ChunkCipher, ChunkDecrypt, XChaChaCipher};
pub use header::ChunkHeader;
pub use keys::{generate_chunk_key, ChunkKey};

/// Size of a chunk key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
