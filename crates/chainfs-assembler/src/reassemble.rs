//! Reassembly: turn a traversal-order buffer back into file order
//!
//! The walk visits the last file segment first, so the buffer reads
//! `[P_tail][P_{n-2}]...[P_1][P_0]` with the terminal payload `P_0` at the
//! end. The nominal block size is never stored; it is inferred from the
//! terminal chunk as `len(P_0) + padding`.
//!
//! A chain keeps its short remainder segment in one of two places:
//! - a padded terminal chunk: the output is `P_0` followed by the full blocks
//!   taken from the high end of the buffer toward offset 0;
//! - an unpadded terminal and a short tail: the output is the full blocks
//!   taken from the high end down to the tail, then the tail's payload.
//!
//! Both agree when the file is an exact multiple of the block size.

use chainfs_core::{Address, ChainError, ChainResult};

use crate::walker::Traversal;

/// Reorder a completed traversal into the original byte stream.
pub fn reassemble(traversal: Traversal) -> ChainResult<Vec<u8>> {
    let chunks = traversal.chunk_count();

    // One chunk: nothing to reorder, and its nominal size may be 0
    if chunks <= 1 {
        return Ok(traversal.into_buffer());
    }

    let nominal = traversal.nominal_size();
    if nominal == 0 {
        return Err(ChainError::DegenerateChain { chunks });
    }

    if let Some(block_len) = traversal.block_len() {
        if block_len != nominal {
            return Err(ChainError::InconsistentChunkSize {
                address: traversal.terminal().unwrap_or(Address::ZERO),
                step: chunks - 1,
                expected: nominal,
                actual: block_len,
            });
        }
    }

    let lead_len = traversal.lead_len().unwrap_or(nominal);
    let terminal_padded = traversal.terminal_padding() > 0;
    if lead_len > nominal || (terminal_padded && lead_len != nominal) {
        return Err(ChainError::InconsistentChunkSize {
            address: traversal.lead_address().unwrap_or(Address::ZERO),
            step: 0,
            expected: nominal,
            actual: lead_len,
        });
    }
    let short_tail = lead_len < nominal;

    let terminal_len = traversal.terminal_len();
    let buffer = traversal.into_buffer();
    let mut out = Vec::with_capacity(buffer.len());

    if short_tail {
        // [remainder][P_{n-2}]...[P_0], every block after the remainder full
        let blocks = &buffer[lead_len..];
        debug_assert_eq!(blocks.len(), (chunks as usize - 1) * nominal);
        for block in blocks.rchunks_exact(nominal) {
            out.extend_from_slice(block);
        }
        out.extend_from_slice(&buffer[..lead_len]);
    } else {
        let body_len = buffer.len() - terminal_len;
        debug_assert_eq!(body_len, (chunks as usize - 1) * nominal);
        out.extend_from_slice(&buffer[body_len..]);
        for block in buffer[..body_len].rchunks_exact(nominal) {
            out.extend_from_slice(block);
        }
    }

    Ok(out)
}
