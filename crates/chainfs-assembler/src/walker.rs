//! Chain walker: tail → terminal, one fetch + decrypt per step
//!
//! Each step's address and key come out of the previous step's header, so a
//! single chain is strictly sequential. Payloads are appended to one flat
//! buffer in traversal order, which is the reverse of file order.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroize;

use chainfs_core::config::AssemblerConfig;
use chainfs_core::{Address, ChainError, ChainResult};
use chainfs_crypto::{Chunk, ChunkCipher, ChunkDecrypt, ChunkKey};
use chainfs_storage::ChunkStore;

/// Progress callback: (chunks walked, payload bytes so far, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Limits and checks applied while walking.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Chains longer than this are rejected
    pub max_chain_length: u64,
    /// Check that fetched bytes hash to the requested address
    pub verify_addresses: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from(&AssemblerConfig::default())
    }
}

impl From<&AssemblerConfig> for WalkOptions {
    fn from(cfg: &AssemblerConfig) -> Self {
        Self {
            max_chain_length: cfg.max_chain_length,
            verify_addresses: cfg.verify_addresses,
        }
    }
}

/// Payloads accumulated in traversal order.
///
/// Layout of `buffer`: `[P_tail][P_{n-2}]...[P_1][P_0]`, where `P_0` is the
/// terminal payload. The blocks after the tail all share one length. The
/// tail (the lead block) may be shorter when the chain keeps its remainder
/// there instead of in the terminal chunk.
#[derive(Debug, Default)]
pub struct Traversal {
    buffer: Vec<u8>,
    chunks: u64,
    lead: Option<(Address, usize)>,
    block_len: Option<usize>,
    terminal_len: usize,
    terminal_padding: u32,
    terminal: Option<Address>,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a traversal from payloads already in traversal order; the last
    /// one is the terminal payload. Block lengths are checked at reassembly.
    pub fn from_payloads(payloads: &[&[u8]], terminal_padding: u32) -> Self {
        let mut traversal = Self::new();
        if let Some((terminal, blocks)) = payloads.split_last() {
            for block in blocks {
                if traversal.lead.is_none() {
                    traversal.lead = Some((Address::ZERO, block.len()));
                } else {
                    traversal.block_len.get_or_insert(block.len());
                }
                traversal.buffer.extend_from_slice(block);
                traversal.chunks += 1;
            }
            traversal.push_terminal(Address::ZERO, terminal, terminal_padding);
        }
        traversal
    }

    /// Append a non-terminal payload. The first one is the lead block; every
    /// later one must match the others and be at least as long as the lead.
    /// On a mismatch, returns the expected length.
    fn push_block(&mut self, address: Address, payload: &[u8]) -> Result<(), usize> {
        match self.lead {
            None => self.lead = Some((address, payload.len())),
            Some((_, lead_len)) => {
                let expected = *self.block_len.get_or_insert(payload.len());
                if payload.len() != expected {
                    return Err(expected);
                }
                if lead_len > payload.len() {
                    return Err(lead_len);
                }
            }
        }
        self.buffer.extend_from_slice(payload);
        self.chunks += 1;
        Ok(())
    }

    fn push_terminal(&mut self, address: Address, payload: &[u8], padding: u32) {
        self.buffer.extend_from_slice(payload);
        self.chunks += 1;
        self.terminal_len = payload.len();
        self.terminal_padding = padding;
        self.terminal = Some(address);
    }

    /// Accumulated payload bytes, traversal order.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunks
    }

    /// Length of the first non-terminal payload, if the chain has one.
    pub fn lead_len(&self) -> Option<usize> {
        self.lead.map(|(_, len)| len)
    }

    /// Address of the first non-terminal chunk (the tail).
    pub fn lead_address(&self) -> Option<Address> {
        self.lead.map(|(address, _)| address)
    }

    /// Length shared by the non-terminal payloads after the lead, if any.
    pub fn block_len(&self) -> Option<usize> {
        self.block_len
    }

    pub fn terminal_len(&self) -> usize {
        self.terminal_len
    }

    pub fn terminal_padding(&self) -> u32 {
        self.terminal_padding
    }

    /// Address of the terminal chunk, once reached.
    pub fn terminal(&self) -> Option<Address> {
        self.terminal
    }

    /// Inferred nominal chunk size: terminal payload plus its padding.
    pub fn nominal_size(&self) -> usize {
        self.terminal_len + self.terminal_padding as usize
    }

    pub(crate) fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// One decrypted step of a walk, as reported to [`walk_with`] observers.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub step: u64,
    pub address: Address,
    pub payload_len: usize,
    pub padding: u32,
    pub is_last: bool,
}

/// Walk the chain from `(tail, tail_key)` to its terminal chunk.
///
/// Any store or cipher failure aborts the walk; there is no partial result.
/// The tail key is consumed and every key is wiped right after the
/// decryption that used it, whatever the cipher does.
pub async fn walk<S: ChunkStore, C: ChunkCipher>(
    store: &S,
    cipher: &C,
    tail: Address,
    tail_key: ChunkKey,
    opts: &WalkOptions,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> ChainResult<Traversal> {
    walk_with(store, cipher, tail, tail_key, opts, cancel, |info, total| {
        if let Some(cb) = progress {
            cb(
                info.step + 1,
                total,
                &format!("chunk {}", info.address.short()),
            );
        }
    })
    .await
}

/// [`walk`] with a per-step observer receiving each step and the running
/// payload byte count.
pub async fn walk_with<S, C, F>(
    store: &S,
    cipher: &C,
    tail: Address,
    tail_key: ChunkKey,
    opts: &WalkOptions,
    cancel: &CancellationToken,
    mut on_step: F,
) -> ChainResult<Traversal>
where
    S: ChunkStore,
    C: ChunkCipher,
    F: FnMut(&StepInfo, u64),
{
    let mut address = tail;
    let mut key = tail_key;
    let mut visited: HashSet<Address> = HashSet::new();
    let mut traversal = Traversal::new();
    let mut step: u64 = 0;

    debug!(tail = %tail.short(), "walking chain");

    loop {
        if step >= opts.max_chain_length {
            return Err(ChainError::ChainTooLong {
                limit: opts.max_chain_length,
            });
        }
        if !visited.insert(address) {
            return Err(ChainError::CycleDetected { address, step });
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChainError::Cancelled { steps: step }),
            fetched = store.fetch(&address) => fetched,
        };
        let encrypted = fetched.map_err(|e| ChainError::from_store(e, address, step))?;

        if opts.verify_addresses && !address.matches(&encrypted) {
            return Err(ChainError::AddressMismatch {
                address,
                actual: Address::of(&encrypted),
                step,
            });
        }

        let decrypted = cipher.decrypt(&encrypted, &mut key);
        key.zeroize();
        let Chunk { header, payload } =
            decrypted.map_err(|e| ChainError::from_cipher(e, address, step))?;
        drop(encrypted);

        let info = StepInfo {
            step,
            address,
            payload_len: payload.len(),
            padding: header.padding,
            is_last: header.is_last,
        };
        debug!(
            step,
            chunk = %address.short(),
            bytes = payload.len(),
            padding = header.padding,
            last = header.is_last,
            "decrypted chunk"
        );

        if header.is_last {
            traversal.push_terminal(address, &payload, header.padding);
            on_step(&info, traversal.buffer().len() as u64);
            info!(
                tail = %tail.short(),
                chunks = traversal.chunk_count(),
                bytes = traversal.buffer().len(),
                nominal_size = traversal.nominal_size(),
                "chain walked"
            );
            return Ok(traversal);
        }

        if header.padding != 0 {
            debug!(step, chunk = %address.short(), "non-terminal chunk carries padding");
        }

        traversal
            .push_block(address, &payload)
            .map_err(|expected| ChainError::InconsistentChunkSize {
                address,
                step,
                expected,
                actual: payload.len(),
            })?;
        on_step(&info, traversal.buffer().len() as u64);

        address = header.next;
        key = header.next_key;
        step += 1;
    }
}
