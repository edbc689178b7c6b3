//! 64-byte work descriptors and their wire codec.
//!
//! # Overview
//!
//! A [`Descriptor`] is built fresh for every submission attempt. The fields
//! shared by every operation live on the struct itself, and the
//! opcode-specific mode bits live in [`Operation`], so a compress descriptor
//! can never be read back as a decompress one.
//!
//! # Wire layout
//!
//! All fields are little-endian.
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0x00 | 4 | trusted fields (PASID), always zero here |
//! | 0x04 | 4 | `opcode << 24` combined with [`OpFlags`] |
//! | 0x08 | 8 | completion record address |
//! | 0x10 | 8 | source address |
//! | 0x18 | 8 | destination address |
//! | 0x20 | 4 | source size |
//! | 0x24 | 2 | interrupt handle |
//! | 0x26 | 2 | operation mode flags |
//! | 0x28 | 8 | AECS pair address |
//! | 0x30 | 4 | maximum destination size |
//! | 0x34 | 4 | size of one AECS slot |
//! | 0x38 | 4 | secondary flags, always zero here |
//! | 0x3C | 4 | reserved |

use bitflags::bitflags;
use thiserror::Error;

/// Size of an encoded descriptor.
pub const DESCRIPTOR_SIZE: usize = 64;

/// Operation selector stored in the top byte of the opcode word.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Inflate a DEFLATE stream.
    Decompress = 0x42,
    /// Produce DEFLATE output or statistics.
    Compress = 0x43,
}

impl Opcode {
    /// Decodes an opcode byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x42 => Some(Self::Decompress),
            0x43 => Some(Self::Compress),
            _ => None,
        }
    }
}

bitflags! {
    /// Operation flags shared by every opcode (low 24 bits of the opcode word).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u32 {
        /// The completion record address is valid.
        const COMPLETION_VALID = 1 << 2;
        /// Request a completion record write.
        const REQUEST_COMPLETION = 1 << 3;
        /// Load state from the selected AECS slot.
        const READ_AECS = 1 << 16;
        /// Always store state into the other AECS slot.
        const WRITE_AECS = 1 << 18;
        /// Store state into the other slot only on overflow or an unfinished stream.
        const MAYBE_WRITE_AECS = 2 << 18;
        /// Use CRC-32C instead of the gzip CRC-32.
        const CRC32C = 1 << 21;
        /// Slot 1 of the AECS pair is the read slot.
        const AECS_SELECT = 1 << 22;
    }
}

bitflags! {
    /// Single-bit compress mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompressFlags: u16 {
        /// Collect symbol statistics instead of writing compressed data.
        const STATS_MODE = 1 << 0;
        /// Write every pending bit to the destination, padded to a byte.
        const FLUSH_OUTPUT = 1 << 1;
        /// Emit Huffman codes in 16-bit big-endian words.
        const HUFFMAN_BE = 1 << 5;
    }
}

bitflags! {
    /// Decompress mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DecompressFlags: u16 {
        /// Enable decompression.
        const ENABLE = 1 << 0;
        /// Write all produced output before completing.
        const FLUSH_OUTPUT = 1 << 1;
        /// Stop after the next end-of-block.
        const STOP_ON_EOB = 1 << 2;
        /// Report whether the stream stopped on an end-of-block.
        const CHECK_FOR_EOB = 1 << 3;
        /// Only the final block's end-of-block counts for the two flags above.
        const SELECT_BFINAL_EOB = 1 << 4;
        /// Input uses 16-bit big-endian Huffman words.
        const HUFFMAN_BE = 1 << 5;
        /// Decode without writing output (verification passes).
        const SUPPRESS_OUTPUT = 1 << 9;
    }
}

const END_PROC_SHIFT: u16 = 2;
const HEADER_GEN_SHIFT: u16 = 12;

/// What the device appends after the last compressed token.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum EndProc {
    /// Leave the block open.
    #[default]
    None = 0,
    /// Append the end-of-block code.
    AppendEob = 1,
    /// Append end-of-block plus an empty final stored block.
    AppendEobFinalStored = 3,
}

impl EndProc {
    const fn from_bits(value: u16) -> Option<Self> {
        match value & 3 {
            0 => Some(Self::None),
            1 => Some(Self::AppendEob),
            3 => Some(Self::AppendEobFinalStored),
            _ => None,
        }
    }
}

/// Hardware header generation mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum HeaderGen {
    /// Use the tables already present in the AECS.
    #[default]
    Off,
    /// Build tables and header from this descriptor's data, then compress it.
    OnePass {
        /// Mark the generated block final.
        is_final: bool,
    },
    /// Build tables and header into the AECS only (statistics phase).
    TwoPass {
        /// Mark the generated block final.
        is_final: bool,
    },
}

impl HeaderGen {
    const fn bits(self) -> u16 {
        match self {
            Self::Off => 0,
            Self::OnePass { is_final } => 2 | is_final as u16,
            Self::TwoPass { is_final } => 6 | is_final as u16,
        }
    }

    const fn from_bits(value: u16) -> Option<Self> {
        match value & 7 {
            0 => Some(Self::Off),
            2 => Some(Self::OnePass { is_final: false }),
            3 => Some(Self::OnePass { is_final: true }),
            6 => Some(Self::TwoPass { is_final: false }),
            7 => Some(Self::TwoPass { is_final: true }),
            _ => None,
        }
    }
}

/// Compress-specific descriptor fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CompressOp {
    /// Single-bit mode flags.
    pub flags: CompressFlags,
    /// Trailer appended after the data.
    pub end_proc: EndProc,
    /// Header generation mode.
    pub header_gen: HeaderGen,
}

/// Decompress-specific descriptor fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DecompressOp {
    /// Mode flags.
    pub flags: DecompressFlags,
}

/// The opcode together with its mode flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Compress or collect statistics.
    Compress(CompressOp),
    /// Decompress or verify.
    Decompress(DecompressOp),
}

impl Operation {
    /// Opcode of this operation.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Compress(_) => Opcode::Compress,
            Self::Decompress(_) => Opcode::Decompress,
        }
    }

    fn mode_bits(&self) -> u16 {
        match self {
            Self::Compress(op) => {
                op.flags.bits()
                    | ((op.end_proc as u16) << END_PROC_SHIFT)
                    | (op.header_gen.bits() << HEADER_GEN_SHIFT)
            }
            Self::Decompress(op) => op.flags.bits(),
        }
    }
}

/// Address and length of a buffer in job memory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Buffer {
    /// Start address.
    pub addr: u64,
    /// Length in bytes.
    pub size: u32,
}

impl Buffer {
    /// Creates a buffer reference.
    #[must_use]
    pub const fn new(addr: u64, size: u32) -> Self {
        Self { addr, size }
    }
}

/// A decoded work descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Descriptor {
    /// Opcode and mode flags.
    pub operation: Operation,
    /// Flags shared by every opcode.
    pub op_flags: OpFlags,
    /// Where the executor writes the completion record.
    pub completion_addr: u64,
    /// Input bytes.
    pub src: Buffer,
    /// Output area; `size` is the maximum destination size.
    pub dst: Buffer,
    /// AECS pair base and the size of one slot.
    pub aecs: Buffer,
    /// Interrupt handle, unused by polling callers.
    pub interrupt_handle: u16,
}

/// Errors decoding a descriptor from its wire form.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DescriptorError {
    /// The opcode byte names no known operation.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// Bits that must be zero are set.
    #[error("reserved bits set at offset {offset:#04x}: {value:#x}")]
    ReservedBits {
        /// Byte offset of the offending field.
        offset: usize,
        /// Raw field value.
        value: u32,
    },
    /// The mode flags hold an encoding with no meaning.
    #[error("invalid mode flags {0:#06x}")]
    InvalidMode(u16),
}

impl Descriptor {
    /// Creates a descriptor with the completion record flags set.
    #[must_use]
    pub fn new(operation: Operation, completion_addr: u64) -> Self {
        Self {
            operation,
            op_flags: OpFlags::COMPLETION_VALID | OpFlags::REQUEST_COMPLETION,
            completion_addr,
            src: Buffer::default(),
            dst: Buffer::default(),
            aecs: Buffer::default(),
            interrupt_handle: 0,
        }
    }

    /// Encodes the descriptor into its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut out = [0u8; DESCRIPTOR_SIZE];
        let opcode_word = (u32::from(self.operation.opcode() as u8) << 24) | self.op_flags.bits();
        out[0x04..0x08].copy_from_slice(&opcode_word.to_le_bytes());
        out[0x08..0x10].copy_from_slice(&self.completion_addr.to_le_bytes());
        out[0x10..0x18].copy_from_slice(&self.src.addr.to_le_bytes());
        out[0x18..0x20].copy_from_slice(&self.dst.addr.to_le_bytes());
        out[0x20..0x24].copy_from_slice(&self.src.size.to_le_bytes());
        out[0x24..0x26].copy_from_slice(&self.interrupt_handle.to_le_bytes());
        out[0x26..0x28].copy_from_slice(&self.operation.mode_bits().to_le_bytes());
        out[0x28..0x30].copy_from_slice(&self.aecs.addr.to_le_bytes());
        out[0x30..0x34].copy_from_slice(&self.dst.size.to_le_bytes());
        out[0x34..0x38].copy_from_slice(&self.aecs.size.to_le_bytes());
        out
    }

    /// Decodes a descriptor from its wire form.
    pub fn from_bytes(bytes: &[u8; DESCRIPTOR_SIZE]) -> Result<Self, DescriptorError> {
        for offset in [0x00, 0x38, 0x3C] {
            let value = read_u32(bytes, offset);
            if value != 0 {
                return Err(DescriptorError::ReservedBits { offset, value });
            }
        }

        let opcode_word = read_u32(bytes, 0x04);
        let opcode_byte = (opcode_word >> 24) as u8;
        let opcode =
            Opcode::from_u8(opcode_byte).ok_or(DescriptorError::UnknownOpcode(opcode_byte))?;
        let raw_flags = opcode_word & 0x00FF_FFFF;
        let op_flags = OpFlags::from_bits(raw_flags).ok_or(DescriptorError::ReservedBits {
            offset: 0x04,
            value: raw_flags & !OpFlags::all().bits(),
        })?;
        if op_flags.contains(OpFlags::WRITE_AECS | OpFlags::MAYBE_WRITE_AECS) {
            return Err(DescriptorError::ReservedBits {
                offset: 0x04,
                value: raw_flags,
            });
        }

        let mode = u16::from_le_bytes([bytes[0x26], bytes[0x27]]);
        let operation = match opcode {
            Opcode::Compress => Operation::Compress(decode_compress_mode(mode)?),
            Opcode::Decompress => Operation::Decompress(DecompressOp {
                flags: DecompressFlags::from_bits(mode).ok_or(DescriptorError::InvalidMode(mode))?,
            }),
        };

        Ok(Self {
            operation,
            op_flags,
            completion_addr: read_u64(bytes, 0x08),
            src: Buffer::new(read_u64(bytes, 0x10), read_u32(bytes, 0x20)),
            dst: Buffer::new(read_u64(bytes, 0x18), read_u32(bytes, 0x30)),
            aecs: Buffer::new(read_u64(bytes, 0x28), read_u32(bytes, 0x34)),
            interrupt_handle: u16::from_le_bytes([bytes[0x24], bytes[0x25]]),
        })
    }

    /// Completion record address, readable even from an undecodable descriptor.
    #[must_use]
    pub fn completion_addr_of(bytes: &[u8; DESCRIPTOR_SIZE]) -> u64 {
        read_u64(bytes, 0x08)
    }
}

fn decode_compress_mode(mode: u16) -> Result<CompressOp, DescriptorError> {
    let single = mode & 0b10_0011;
    let end_proc = EndProc::from_bits(mode >> END_PROC_SHIFT);
    let header_gen = HeaderGen::from_bits(mode >> HEADER_GEN_SHIFT);
    let known = single | (3 << END_PROC_SHIFT) | (7 << HEADER_GEN_SHIFT);
    match (end_proc, header_gen) {
        (Some(end_proc), Some(header_gen)) if mode & !known == 0 => Ok(CompressOp {
            flags: CompressFlags::from_bits_truncate(single),
            end_proc,
            header_gen,
        }),
        _ => Err(DescriptorError::InvalidMode(mode)),
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress_descriptor() -> Descriptor {
        let mut descriptor = Descriptor::new(
            Operation::Compress(CompressOp {
                flags: CompressFlags::FLUSH_OUTPUT,
                end_proc: EndProc::AppendEobFinalStored,
                header_gen: HeaderGen::OnePass { is_final: true },
            }),
            0x3000,
        );
        descriptor.op_flags |= OpFlags::READ_AECS | OpFlags::AECS_SELECT;
        descriptor.src = Buffer::new(0x1000, 1000);
        descriptor.dst = Buffer::new(0x2000, 1500);
        descriptor.aecs = Buffer::new(0x4000, 0x620);
        descriptor
    }

    #[test]
    fn compress_descriptor_layout() {
        let bytes = compress_descriptor().to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(bytes[7], 0x43);
        assert_eq!(read_u32(&bytes, 4) & 0x00FF_FFFF, 0x0041_000C);
        assert_eq!(read_u64(&bytes, 0x08), 0x3000);
        assert_eq!(read_u32(&bytes, 0x20), 1000);
        // FLUSH_OUTPUT | APPEND_EOB_FINAL_SB << 2 | 3 << 12.
        assert_eq!(u16::from_le_bytes([bytes[0x26], bytes[0x27]]), 0x300E);
        assert_eq!(read_u32(&bytes, 0x30), 1500);
        assert_eq!(read_u32(&bytes, 0x34), 0x620);
    }

    #[test]
    fn descriptors_decode_to_the_same_shape() {
        let descriptor = compress_descriptor();
        assert_eq!(Descriptor::from_bytes(&descriptor.to_bytes()), Ok(descriptor));

        let mut decompress = Descriptor::new(
            Operation::Decompress(DecompressOp {
                flags: DecompressFlags::ENABLE | DecompressFlags::SUPPRESS_OUTPUT,
            }),
            0x3000,
        );
        decompress.op_flags |= OpFlags::MAYBE_WRITE_AECS;
        assert_eq!(Descriptor::from_bytes(&decompress.to_bytes()), Ok(decompress));
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        let mut bytes = compress_descriptor().to_bytes();
        bytes[7] = 0x44;
        assert_eq!(
            Descriptor::from_bytes(&bytes),
            Err(DescriptorError::UnknownOpcode(0x44))
        );

        let mut bytes = compress_descriptor().to_bytes();
        bytes[0x3C] = 1;
        assert!(matches!(
            Descriptor::from_bytes(&bytes),
            Err(DescriptorError::ReservedBits { offset: 0x3C, .. })
        ));

        let mut bytes = compress_descriptor().to_bytes();
        // END_PROC value 2 is undefined.
        bytes[0x26] = 0b1000;
        bytes[0x27] = 0;
        assert!(matches!(
            Descriptor::from_bytes(&bytes),
            Err(DescriptorError::InvalidMode(_))
        ));
    }

    #[test]
    fn completion_address_survives_bad_opcode() {
        let mut bytes = compress_descriptor().to_bytes();
        bytes[7] = 0;
        assert_eq!(Descriptor::completion_addr_of(&bytes), 0x3000);
    }
}
