//! Chunk header: the chain metadata at the front of every decrypted chunk
//!
//! Plaintext layout:
//! ```text
//! offset  size  field
//! 0       1     version (= 1)
//! 1       1     flags (bit 0 = is_last)
//! 2       4     padding (u32 BE): filler bytes after the payload
//! 6       32    self_hash: BLAKE3 of the un-padded payload
//! 38      32    next: address of the chain neighbor
//! 70      32    next_key: key that decrypts the neighbor
//! 102     ..    payload || filler
//! ```
//! `next` and `next_key` are all zero in the terminal chunk.

use chainfs_core::types::{Address, ADDRESS_SIZE};
use chainfs_core::CipherError;

use crate::keys::ChunkKey;
use crate::KEY_SIZE;

pub const HEADER_VERSION: u8 = 1;

/// Encoded header length in bytes
pub const HEADER_SIZE: usize = 1 + 1 + 4 + 32 + ADDRESS_SIZE + KEY_SIZE;

const FLAG_LAST: u8 = 0b0000_0001;

#[derive(Debug, Clone)]
pub struct ChunkHeader {
    /// BLAKE3 of the un-padded payload
    pub self_hash: [u8; 32],
    /// Neighbor address; meaningful only while `is_last` is false
    pub next: Address,
    /// Neighbor key; meaningful only while `is_last` is false
    pub next_key: ChunkKey,
    /// Count of filler bytes after the payload
    pub padding: u32,
    pub is_last: bool,
}

impl ChunkHeader {
    /// Header for the terminal chunk of a chain.
    pub fn terminal(payload: &[u8], padding: u32) -> Self {
        Self {
            self_hash: *blake3::hash(payload).as_bytes(),
            next: Address::ZERO,
            next_key: ChunkKey::from_bytes([0u8; KEY_SIZE]),
            padding,
            is_last: true,
        }
    }

    /// Header for a chunk whose neighbor is `next`, unlocked by `next_key`.
    pub fn linked(payload: &[u8], next: Address, next_key: ChunkKey) -> Self {
        Self {
            self_hash: *blake3::hash(payload).as_bytes(),
            next,
            next_key,
            padding: 0,
            is_last: false,
        }
    }

    /// Append the encoded header to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(HEADER_SIZE);
        out.push(HEADER_VERSION);
        out.push(if self.is_last { FLAG_LAST } else { 0 });
        out.extend_from_slice(&self.padding.to_be_bytes());
        out.extend_from_slice(&self.self_hash);
        out.extend_from_slice(self.next.as_bytes());
        out.extend_from_slice(self.next_key.as_bytes());
    }

    /// Split a plaintext into its header and the remaining body
    /// (payload followed by `padding` filler bytes).
    pub fn decode(plaintext: &[u8]) -> Result<(ChunkHeader, &[u8]), CipherError> {
        if plaintext.len() < HEADER_SIZE {
            return Err(CipherError::MalformedHeader(format!(
                "plaintext too short: {} bytes (minimum {})",
                plaintext.len(),
                HEADER_SIZE
            )));
        }
        let (head, body) = plaintext.split_at(HEADER_SIZE);

        if head[0] != HEADER_VERSION {
            return Err(CipherError::MalformedHeader(format!(
                "unsupported header version {}",
                head[0]
            )));
        }
        let flags = head[1];
        if flags & !FLAG_LAST != 0 {
            return Err(CipherError::MalformedHeader(format!(
                "unknown flag bits {flags:#04x}"
            )));
        }

        let padding = u32::from_be_bytes([head[2], head[3], head[4], head[5]]);
        if padding as usize > body.len() {
            return Err(CipherError::MalformedHeader(format!(
                "padding {} exceeds body of {} bytes",
                padding,
                body.len()
            )));
        }

        let mut self_hash = [0u8; 32];
        self_hash.copy_from_slice(&head[6..38]);
        let mut next = [0u8; ADDRESS_SIZE];
        next.copy_from_slice(&head[38..70]);
        let mut next_key = [0u8; KEY_SIZE];
        next_key.copy_from_slice(&head[70..HEADER_SIZE]);

        let header = ChunkHeader {
            self_hash,
            next: Address::from_bytes(next),
            next_key: ChunkKey::from_bytes(next_key),
            padding,
            is_last: flags & FLAG_LAST != 0,
        };
        zeroize::Zeroize::zeroize(&mut next_key);

        Ok((header, body))
    }

    /// Check the un-padded payload against `self_hash`.
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), CipherError> {
        if blake3::Hash::from(self.self_hash) != blake3::hash(payload) {
            return Err(CipherError::MalformedHeader(
                "payload does not match header self hash".into(),
            ));
        }
        Ok(())
    }
}
