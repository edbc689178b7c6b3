//! Accelerator configuration/state (AECS) slots and their access policy.
//!
//! # Design
//!
//! Codec state that outlives one submission lives in two alternating slots,
//! held together in an [`AecsPair`]. Exactly one slot is the read slot. A
//! pass described by an [`AecsAccess`] value may load the read slot, store
//! into the other slot, or both; only a pass that stored state moves the
//! read index with [`AecsPair::toggle`]. Slots are reached through the pair's
//! current/other accessors and never by raw offset.
//!
//! The access value carries the read index in its
//! [`TOGGLE`](AecsAccess::TOGGLE) bit, which the descriptor encodes as the
//! AECS select flag.
//!
//! # Invariants
//!
//! - A failed or rejected pass never toggles, so a retried pass selects the
//!   same slots as a first-attempt success would.
//! - The output accumulator never holds more than [`ACCUMULATOR_BITS`] bits.

use bitflags::bitflags;
use compress::{BitWriter, HuffmanCode, HuffmanTables, Inflater};
use thiserror::Error;

use crate::descriptor::OpFlags;

/// Capacity of the compress output accumulator in bits.
pub const ACCUMULATOR_BITS: usize = 256 * 8;

/// Size of the compress AECS wire image.
pub const COMPRESS_AECS_SIZE: usize = 0x620;

/// Size reported for one decompress slot.
pub const DECOMPRESS_AECS_SIZE: usize = 0x1500;

const ACCUM_BITS_OFFSET: usize = 0x1C;
const ACCUM_OFFSET: usize = 0x20;
const LIT_LEN_OFFSET: usize = 0x120;
const DIST_OFFSET: usize = LIT_LEN_OFFSET + 286 * 4;

bitflags! {
    /// How a pass uses the AECS pair.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AecsAccess: u32 {
        /// Read index: set when slot 1 is the read slot.
        const TOGGLE = 0x001;
        /// Load state from the read slot.
        const READ = 0x010;
        /// Store state into the other slot.
        const WRITE = 0x100;
        /// Store state only when output overflowed or the stream is unfinished.
        const MAYBE_WRITE = 0x200;
    }
}

impl AecsAccess {
    /// Descriptor flags expressing this access.
    #[must_use]
    pub fn op_flags(self) -> OpFlags {
        let mut flags = OpFlags::empty();
        if self.contains(Self::READ) {
            flags |= OpFlags::READ_AECS;
        }
        if self.contains(Self::WRITE) {
            flags |= OpFlags::WRITE_AECS;
        } else if self.contains(Self::MAYBE_WRITE) {
            flags |= OpFlags::MAYBE_WRITE_AECS;
        }
        if self.contains(Self::TOGGLE) {
            flags |= OpFlags::AECS_SELECT;
        }
        flags
    }

    /// Whether the pass may store state.
    #[must_use]
    pub fn may_write(self) -> bool {
        self.intersects(Self::WRITE | Self::MAYBE_WRITE)
    }

    /// Whether a pass with this access stored state, given how it ended.
    #[must_use]
    pub fn wrote(self, overflowed: bool, finished: bool) -> bool {
        self.contains(Self::WRITE)
            || (self.contains(Self::MAYBE_WRITE) && (overflowed || !finished))
    }
}

/// Where a chunk sits in its stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ChunkPosition {
    /// Starts the stream, more chunks follow.
    First,
    /// Neither first nor last.
    Middle,
    /// Ends the stream.
    Last,
    /// Both starts and ends the stream.
    Single,
}

impl ChunkPosition {
    /// Position from first/last flags.
    #[must_use]
    pub const fn from_flags(first: bool, last: bool) -> Self {
        match (first, last) {
            (true, true) => Self::Single,
            (true, false) => Self::First,
            (false, true) => Self::Last,
            (false, false) => Self::Middle,
        }
    }

    /// Whether the chunk ends the stream.
    #[must_use]
    pub const fn is_last(self) -> bool {
        matches!(self, Self::Last | Self::Single)
    }

    /// Whether the chunk starts the stream.
    #[must_use]
    pub const fn is_first(self) -> bool {
        matches!(self, Self::First | Self::Single)
    }
}

/// Access for a compress pass.
#[must_use]
pub const fn compress_access(position: ChunkPosition) -> AecsAccess {
    match position {
        ChunkPosition::First | ChunkPosition::Middle => AecsAccess::READ.union(AecsAccess::WRITE),
        ChunkPosition::Last | ChunkPosition::Single => AecsAccess::READ,
    }
}

/// Access for a decompress pass.
///
/// A continuation resumes a chunk whose output overflowed; it reads the saved
/// state and stores it again only if the stream goes on.
#[must_use]
pub const fn decompress_access(position: ChunkPosition, continuation: bool) -> AecsAccess {
    if continuation {
        return match position {
            ChunkPosition::Last | ChunkPosition::Single => {
                AecsAccess::READ.union(AecsAccess::MAYBE_WRITE)
            }
            ChunkPosition::First | ChunkPosition::Middle => {
                AecsAccess::READ.union(AecsAccess::WRITE)
            }
        };
    }
    match position {
        ChunkPosition::First => AecsAccess::WRITE,
        ChunkPosition::Middle => AecsAccess::READ.union(AecsAccess::WRITE),
        ChunkPosition::Last => AecsAccess::READ.union(AecsAccess::MAYBE_WRITE),
        ChunkPosition::Single => AecsAccess::MAYBE_WRITE,
    }
}

/// Access for a verification pass over freshly compressed output.
#[must_use]
pub const fn verify_access(position: ChunkPosition) -> AecsAccess {
    match position {
        ChunkPosition::First => AecsAccess::WRITE,
        ChunkPosition::Middle => AecsAccess::READ.union(AecsAccess::WRITE),
        ChunkPosition::Last => AecsAccess::READ,
        ChunkPosition::Single => AecsAccess::empty(),
    }
}

/// Two state slots and the index of the read slot.
#[derive(Clone, Debug, Default)]
pub struct AecsPair<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> AecsPair<T> {
    /// Creates a pair reading from slot 0.
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    /// Index of the read slot.
    #[must_use]
    pub const fn read_index(&self) -> usize {
        self.read
    }

    /// The read slot.
    #[must_use]
    pub fn current(&self) -> &T {
        &self.slots[self.read]
    }

    /// The read slot, mutably.
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.read]
    }

    /// The slot a writing pass stores into.
    #[must_use]
    pub fn other(&self) -> &T {
        &self.slots[self.read ^ 1]
    }

    /// The write slot, mutably.
    pub fn other_mut(&mut self) -> &mut T {
        &mut self.slots[self.read ^ 1]
    }

    /// Slot chosen by a descriptor's select bit.
    #[must_use]
    pub fn slot(&self, index: usize) -> &T {
        &self.slots[index & 1]
    }

    /// Mutable slot chosen by a descriptor's select bit.
    pub fn slot_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index & 1]
    }

    /// Access value for a pass, with the read index folded in.
    #[must_use]
    pub fn access(&self, policy: AecsAccess) -> AecsAccess {
        let policy = policy.difference(AecsAccess::TOGGLE);
        if self.read == 1 {
            policy | AecsAccess::TOGGLE
        } else {
            policy
        }
    }

    /// Makes the written slot the read slot.
    pub fn toggle(&mut self) {
        self.read ^= 1;
        logging::trace_aecs!(read = self.read, "toggled AECS read slot");
    }

    /// Makes slot 0 the read slot.
    pub fn reset_index(&mut self) {
        self.read = 0;
    }
}

/// Errors handling AECS contents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum AecsError {
    /// More bits were queued than the output accumulator holds.
    #[error("output accumulator overflow: {bits} bits exceed {ACCUMULATOR_BITS}")]
    AccumulatorOverflow {
        /// Bits that were requested.
        bits: usize,
    },
    /// A wire image is shorter than the layout.
    #[error("AECS image is {len} bytes, expected {COMPRESS_AECS_SIZE}")]
    Truncated {
        /// Length that was supplied.
        len: usize,
    },
}

/// Output bits waiting to be emitted ahead of the next compressed data.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputAccumulator {
    bytes: Vec<u8>,
    bits: usize,
}

impl OutputAccumulator {
    /// Captures everything written to `writer`.
    pub fn from_writer(writer: &BitWriter) -> Result<Self, AecsError> {
        let bits = writer.bit_len();
        if bits > ACCUMULATOR_BITS {
            return Err(AecsError::AccumulatorOverflow { bits });
        }
        let mut bytes = writer.whole_bytes().to_vec();
        let partial = writer.partial();
        if !partial.is_empty() {
            bytes.push(partial.value());
        }
        Ok(Self { bytes, bits })
    }

    /// A writer that continues after the accumulated bits.
    #[must_use]
    pub fn writer(&self) -> BitWriter {
        BitWriter::from_bits(&self.bytes, self.bits)
    }

    /// Number of accumulated bits.
    #[must_use]
    pub const fn bits(&self) -> usize {
        self.bits
    }

    /// Accumulated bytes; the last one may be partial.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Keeps only the first `bits` bits.
    pub fn truncate(&mut self, bits: usize) {
        if bits >= self.bits {
            return;
        }
        let writer = BitWriter::from_bits(&self.bytes, bits);
        let mut bytes = writer.whole_bytes().to_vec();
        let partial = writer.partial();
        if !partial.is_empty() {
            bytes.push(partial.value());
        }
        self.bytes = bytes;
        self.bits = bits;
    }

    /// Drops every accumulated bit.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bits = 0;
    }
}

/// Compress state: running checksums, pending output bits and code tables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompressAecs {
    /// Running CRC.
    pub crc: u32,
    /// Running XOR checksum.
    pub xor: u32,
    /// Bits not yet written to any destination.
    pub accumulator: OutputAccumulator,
    lit_len: Vec<HuffmanCode>,
    dist: Vec<HuffmanCode>,
}

impl Default for CompressAecs {
    fn default() -> Self {
        Self {
            crc: 0,
            xor: 0,
            accumulator: OutputAccumulator::default(),
            lit_len: vec![HuffmanCode::default(); 286],
            dist: vec![HuffmanCode::default(); 30],
        }
    }
}

impl CompressAecs {
    /// Installs code tables.
    pub fn set_tables(&mut self, tables: &HuffmanTables) {
        for (slot, code) in self.lit_len.iter_mut().zip(tables.lit_len()) {
            *slot = *code;
        }
        for (slot, code) in self.dist.iter_mut().zip(tables.dist()) {
            *slot = *code;
        }
    }

    /// The installed code tables.
    #[must_use]
    pub fn tables(&self) -> HuffmanTables {
        HuffmanTables::from_codes(self.lit_len.clone(), self.dist.clone())
    }

    /// Whether any literal/length code is installed.
    #[must_use]
    pub fn has_tables(&self) -> bool {
        self.lit_len.iter().any(|code| !code.is_empty())
    }

    /// Appends bits produced by `write` to the accumulator.
    pub fn append_bits(&mut self, write: impl FnOnce(&mut BitWriter)) -> Result<(), AecsError> {
        let mut writer = self.accumulator.writer();
        write(&mut writer);
        self.accumulator = OutputAccumulator::from_writer(&writer)?;
        Ok(())
    }

    /// Clears checksums and pending bits for a new stream.
    pub fn reset_stream(&mut self) {
        self.crc = 0;
        self.xor = 0;
        self.accumulator.clear();
    }

    /// Encodes the accelerator wire image.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; COMPRESS_AECS_SIZE];
        out[0x00..0x04].copy_from_slice(&self.crc.to_le_bytes());
        out[0x04..0x08].copy_from_slice(&self.xor.to_le_bytes());
        out[ACCUM_BITS_OFFSET..ACCUM_OFFSET]
            .copy_from_slice(&(self.accumulator.bits as u32).to_le_bytes());
        let accumulated = self.accumulator.bytes();
        out[ACCUM_OFFSET..ACCUM_OFFSET + accumulated.len()].copy_from_slice(accumulated);
        for (index, code) in self.lit_len.iter().enumerate() {
            let at = LIT_LEN_OFFSET + index * 4;
            out[at..at + 4].copy_from_slice(&code.to_hw().to_le_bytes());
        }
        for (index, code) in self.dist.iter().enumerate() {
            let at = DIST_OFFSET + index * 4;
            out[at..at + 4].copy_from_slice(&code.to_hw().to_le_bytes());
        }
        out
    }

    /// Decodes the accelerator wire image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AecsError> {
        if bytes.len() < COMPRESS_AECS_SIZE {
            return Err(AecsError::Truncated { len: bytes.len() });
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let bits = u32_at(ACCUM_BITS_OFFSET) as usize;
        if bits > ACCUMULATOR_BITS {
            return Err(AecsError::AccumulatorOverflow { bits });
        }
        let accumulator = OutputAccumulator::from_writer(&BitWriter::from_bits(
            &bytes[ACCUM_OFFSET..ACCUM_OFFSET + bits.div_ceil(8)],
            bits,
        ))?;
        Ok(Self {
            crc: u32_at(0x00),
            xor: u32_at(0x04),
            accumulator,
            lit_len: (0..286)
                .map(|index| HuffmanCode::from_hw(u32_at(LIT_LEN_OFFSET + index * 4)))
                .collect(),
            dist: (0..30)
                .map(|index| HuffmanCode::from_hw(u32_at(DIST_OFFSET + index * 4)))
                .collect(),
        })
    }
}

/// Decompress state: running checksums and the resumable decoder.
#[derive(Clone, Debug, Default)]
pub struct DecompressAecs {
    /// Running CRC of decoded output.
    pub crc: u32,
    /// Running XOR checksum of decoded output.
    pub xor: u32,
    /// Decoder position, bit buffer and history window.
    pub inflater: Inflater,
}

impl DecompressAecs {
    /// State whose history starts with a preset dictionary.
    #[must_use]
    pub fn with_dictionary(dictionary: &[u8]) -> Self {
        Self {
            inflater: Inflater::with_dictionary(dictionary),
            ..Self::default()
        }
    }
}
