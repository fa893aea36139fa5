//! Per-chunk XChaCha20-Poly1305 decryption
//!
//! Encrypted chunk format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = "chainfs-chunk-v1"
//! ```
//!
//! The AEAD tag is checked before the header is parsed, so a wrong key or a
//! flipped bit is always `AuthenticationFailed`, never a garbled header.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use chainfs_core::CipherError;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::header::ChunkHeader;
use crate::keys::ChunkKey;
use crate::{NONCE_SIZE, TAG_SIZE};

const CHUNK_AAD: &[u8] = b"chainfs-chunk-v1";

/// A decrypted chunk: un-padded payload plus its header.
#[derive(Debug)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn is_last(&self) -> bool {
        self.header.is_last
    }
}

/// Decrypts stored chunk bytes into a [`Chunk`].
pub trait ChunkCipher: Send + Sync {
    /// Authenticate, decrypt and parse `encrypted` with `key`.
    ///
    /// Implementations only borrow the key; wiping it is
    /// [`ChunkDecrypt::decrypt`]'s job.
    fn open(&self, encrypted: &[u8], key: &ChunkKey) -> Result<Chunk, CipherError>;
}

/// Key-consuming decryption, implemented for every [`ChunkCipher`].
///
/// The blanket impl is the only impl, so the wipe below cannot be replaced
/// by a cipher.
pub trait ChunkDecrypt {
    /// Decrypt one chunk, consuming the key material.
    ///
    /// `key` is overwritten with zeros before this returns, on success,
    /// on error, and while unwinding from a panic in `open`.
    fn decrypt(&self, encrypted: &[u8], key: &mut ChunkKey) -> Result<Chunk, CipherError>;
}

impl<C: ChunkCipher + ?Sized> ChunkDecrypt for C {
    fn decrypt(&self, encrypted: &[u8], key: &mut ChunkKey) -> Result<Chunk, CipherError> {
        let key = WipeOnExit(key);
        self.open(encrypted, &*key.0)
    }
}

/// Zeroes the borrowed key when dropped.
struct WipeOnExit<'a>(&'a mut ChunkKey);

impl Drop for WipeOnExit<'_> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// XChaCha20-Poly1305 chunk cipher
#[derive(Debug, Default, Clone, Copy)]
pub struct XChaChaCipher;

impl XChaChaCipher {
    /// Seal a header and payload under `key`, appending `header.padding` zero
    /// filler bytes.
    ///
    /// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
    pub fn seal(
        &self,
        key: &ChunkKey,
        header: &ChunkHeader,
        payload: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

        let mut plaintext = Zeroizing::new(Vec::with_capacity(
            crate::header::HEADER_SIZE + payload.len() + header.padding as usize,
        ));
        header.encode_into(&mut plaintext);
        plaintext.extend_from_slice(payload);
        let padded_len = plaintext.len() + header.padding as usize;
        plaintext.resize(padded_len, 0);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &plaintext,
                    aad: CHUNK_AAD,
                },
            )
            .map_err(|e| anyhow::anyhow!("chunk encryption failed: {e}"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }
}

impl ChunkCipher for XChaChaCipher {
    fn open(&self, encrypted: &[u8], key: &ChunkKey) -> Result<Chunk, CipherError> {
        if encrypted.len() < NONCE_SIZE + TAG_SIZE {
            tracing::debug!(len = encrypted.len(), "encrypted chunk truncated");
            return Err(CipherError::AuthenticationFailed);
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

        // The plaintext holds next_key; keep it in a wiping buffer
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    nonce,
                    Payload {
                        msg: ciphertext,
                        aad: CHUNK_AAD,
                    },
                )
                .map_err(|_| CipherError::AuthenticationFailed)?,
        );

        let (header, body) = ChunkHeader::decode(&plaintext)?;
        let payload = &body[..body.len() - header.padding as usize];
        header.verify_payload(payload)?;

        Ok(Chunk {
            payload: payload.to_vec(),
            header,
        })
    }
}
