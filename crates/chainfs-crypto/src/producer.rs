//! Chain producer for tests and benches.
//!
//! Splits a byte stream into segments and seals them into a chain whose tail
//! is the last segment and whose terminal chunk is the first. By default the
//! first segment is the short one, padded up to the chunk size;
//! [`build_chain_short_tail`] puts the short segment in the tail instead.

use chainfs_core::Address;

use crate::cipher::XChaChaCipher;
use crate::header::ChunkHeader;
use crate::keys::{generate_chunk_key, ChunkKey};

/// A sealed chain ready to be written to a store.
pub struct SealedChain {
    /// Address of the tail chunk (last file segment)
    pub tail: Address,
    /// Key that decrypts the tail chunk
    pub tail_key: ChunkKey,
    /// `(address, encrypted bytes)`, terminal chunk first
    pub chunks: Vec<(Address, Vec<u8>)>,
}

impl SealedChain {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Split `data` into `chunk_size` segments and seal them into a chain.
///
/// The first segment holds `data.len() % chunk_size` bytes (or a full chunk
/// when that is zero) and becomes the padded terminal chunk.
pub fn build_chain(data: &[u8], chunk_size: usize) -> anyhow::Result<SealedChain> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be positive");

    let head_len = match data.len() % chunk_size {
        0 if data.is_empty() => 0,
        0 => chunk_size,
        rem => rem,
    };
    let padding = u32::try_from(chunk_size - head_len)?;

    let mut segments: Vec<&[u8]> = vec![&data[..head_len]];
    segments.extend(data[head_len..].chunks(chunk_size));

    build_from_segments(&segments, padding)
}

/// Split `data` the other way round: full segments first, the short
/// remainder last.
///
/// The terminal chunk is a full, unpadded segment and the tail chunk carries
/// the remainder, padded up to `chunk_size`. Reassembly emits the tail's
/// payload last.
pub fn build_chain_short_tail(data: &[u8], chunk_size: usize) -> anyhow::Result<SealedChain> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be positive");

    if data.len() <= chunk_size {
        let padding = u32::try_from(chunk_size - data.len())?;
        return build_from_segments(&[data], padding);
    }

    let segments: Vec<&[u8]> = data.chunks(chunk_size).collect();
    let tail_len = segments.last().map_or(0, |s| s.len());
    let tail_padding = u32::try_from(chunk_size - tail_len)?;
    seal_segments(&segments, 0, tail_padding)
}

/// Seal explicit segments (in file order) into a chain.
///
/// `segments[0]` becomes the terminal chunk with `terminal_padding` filler
/// bytes; the last segment becomes the tail.
pub fn build_from_segments(
    segments: &[&[u8]],
    terminal_padding: u32,
) -> anyhow::Result<SealedChain> {
    seal_segments(segments, terminal_padding, 0)
}

fn seal_segments(
    segments: &[&[u8]],
    terminal_padding: u32,
    tail_padding: u32,
) -> anyhow::Result<SealedChain> {
    anyhow::ensure!(!segments.is_empty(), "a chain needs at least one segment");

    let cipher = XChaChaCipher;
    let mut chunks = Vec::with_capacity(segments.len());

    let mut key = generate_chunk_key();
    let sealed = cipher.seal(
        &key,
        &ChunkHeader::terminal(segments[0], terminal_padding),
        segments[0],
    )?;
    let mut address = Address::of(&sealed);
    chunks.push((address, sealed));

    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate().skip(1) {
        let this_key = generate_chunk_key();
        let mut header = ChunkHeader::linked(segment, address, key);
        if i == last {
            header.padding = tail_padding;
        }
        let sealed = cipher.seal(&this_key, &header, segment)?;
        address = Address::of(&sealed);
        chunks.push((address, sealed));
        key = this_key;
    }

    Ok(SealedChain {
        tail: address,
        tail_key: key,
        chunks,
    })
}
