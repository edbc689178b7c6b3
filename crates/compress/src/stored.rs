//! Stored (uncompressed) block emission.
//!
//! Stored blocks are the universal escape hatch: when a compressed rendition
//! would not fit the destination, or when the accelerator reports that its
//! output overflowed, the same input is re-emitted as a run of stored blocks
//! appended after whatever bits are already pending.

use crate::bits::BitWriter;
use crate::header::BlockType;

/// Largest payload a single stored block can carry.
pub const MAX_STORED_BLOCK_LEN: usize = 65_535;

/// Number of stored blocks needed for `len` bytes. An empty input still
/// produces one block so that a final flag can be emitted.
#[must_use]
pub const fn stored_block_count(len: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(MAX_STORED_BLOCK_LEN)
    }
}

/// Exact number of output bytes needed to flush `pending_bits` bits and then
/// store `len` bytes.
///
/// The first block header shares a byte with the pending bits; every later
/// header occupies its own byte before the four length bytes.
#[must_use]
pub const fn calculate_size_needed(len: usize, pending_bits: usize) -> usize {
    let blocks = stored_block_count(len);
    pending_bits / 8 + (pending_bits % 8 + 3).div_ceil(8) + blocks * 4 + len + (blocks - 1)
}

/// Appends `input` to `writer` as stored blocks.
///
/// Only the last block carries `BFINAL` and only when `is_final` is set.
pub fn write_stored_blocks_into(writer: &mut BitWriter, input: &[u8], is_final: bool) {
    let blocks = stored_block_count(input.len());
    let mut chunks = input.chunks(MAX_STORED_BLOCK_LEN);
    for index in 0..blocks {
        let chunk = chunks.next().unwrap_or(&[]);
        let last = index + 1 == blocks;
        writer.write_bits(u32::from(last && is_final), 1);
        writer.write_bits(BlockType::Stored as u32, 2);
        writer.align_to_byte();
        let len = chunk.len() as u16;
        writer.write_aligned_bytes(&len.to_le_bytes());
        writer.write_aligned_bytes(&(!len).to_le_bytes());
        writer.write_aligned_bytes(chunk);
    }
}

/// Writes stored blocks into `out`, continuing after `start_bits` bits that are
/// already present in `out[0]`.
///
/// Returns the number of bytes written (including the byte that held the
/// pending bits), or `None` when `out` is too small. Nothing is modified on
/// failure.
#[must_use]
pub fn write_stored_blocks(
    input: &[u8],
    out: &mut [u8],
    start_bits: u8,
    is_final: bool,
) -> Option<usize> {
    let start_bits = usize::from(start_bits & 7);
    let needed = calculate_size_needed(input.len(), start_bits);
    if needed > out.len() {
        return None;
    }

    let mut writer = BitWriter::with_capacity(needed);
    if start_bits > 0 {
        writer.write_bits(u32::from(out[0]), start_bits as u32);
    }
    write_stored_blocks_into(&mut writer, input, is_final);
    let bytes = writer.into_bytes();
    debug_assert_eq!(bytes.len(), needed);
    out[..bytes.len()].copy_from_slice(&bytes);
    Some(bytes.len())
}
