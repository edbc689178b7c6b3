//! Completion records and outcome classification.
//!
//! The executor writes a 64-byte record for every descriptor. Callers poll
//! the status byte until it leaves [`CompletionStatus::InProgress`], then
//! read the result fields. [`Outcome::classify`] reduces a record to the one
//! case the submission protocol has to handle.
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0x00 | 1 | status |
//! | 0x01 | 1 | error code |
//! | 0x02 | 1 | fault info |
//! | 0x04 | 4 | bytes completed |
//! | 0x08 | 8 | fault address |
//! | 0x10 | 4 | invalid flags |
//! | 0x18 | 4 | output size |
//! | 0x1C | 1 | output bits |
//! | 0x1D | 1 | end of stream (decompress) |
//! | 0x1E | 2 | input buffered past the end of stream (decompress) |
//! | 0x20 | 4 | XOR checksum |
//! | 0x24 | 4 | CRC |
//! | 0x28 | 12 | min, max, sum (analytics, zero here) |

use compress::{CodeKind, InflateError};

use crate::descriptor::DescriptorError;

/// Size of an encoded completion record.
pub const COMPLETION_RECORD_SIZE: usize = 64;

/// Error code reported when compressed output did not fit the destination.
pub const ERROR_UNRECOVERABLE_OUTPUT_OVERFLOW: u8 = 21;
/// Error code reported when AECS contents are unusable.
pub const ERROR_AECS: u8 = 22;
/// Error code reported when a Huffman table lacks a code the data needs.
pub const ERROR_INVALID_HUFFMAN_CODE: u8 = 30;

const STATUS_WRITE_FAULT_BIT: u8 = 0x80;

/// Status byte of a completion record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum CompletionStatus {
    /// The executor has not finished.
    #[default]
    InProgress,
    /// The operation completed.
    Success,
    /// A source page was not resident.
    ReadPageFault,
    /// A destination or AECS page was not resident.
    WritePageFault,
    /// The operation failed; see the error code.
    AnalyticsError,
    /// The destination filled before the input was consumed.
    OutputOverflow,
    /// The descriptor could not be decoded.
    UnsupportedOpcode,
    /// A status byte this crate does not know.
    Other(u8),
}

impl CompletionStatus {
    /// Wire value of the status byte.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::InProgress => 0x00,
            Self::Success => 0x01,
            Self::ReadPageFault => 0x03,
            Self::WritePageFault => 0x03 | STATUS_WRITE_FAULT_BIT,
            Self::AnalyticsError => 0x0A,
            Self::OutputOverflow => 0x0B,
            Self::UnsupportedOpcode => 0x10,
            Self::Other(value) => value,
        }
    }

    /// Decodes a status byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::InProgress,
            0x01 => Self::Success,
            0x03 => Self::ReadPageFault,
            0x83 => Self::WritePageFault,
            0x0A => Self::AnalyticsError,
            0x0B => Self::OutputOverflow,
            0x10 => Self::UnsupportedOpcode,
            other => Self::Other(other),
        }
    }
}

/// A decoded completion record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CompletionRecord {
    /// Terminal or in-progress status.
    pub status: CompletionStatus,
    /// Operation error code; zero when none.
    pub error_code: u8,
    /// Extra fault information.
    pub fault_info: u8,
    /// Input bytes consumed.
    pub bytes_completed: u32,
    /// Address of a non-resident page.
    pub fault_addr: u64,
    /// Flags the executor rejected.
    pub invalid_flags: u32,
    /// Output bytes written.
    pub output_size: u32,
    /// Valid bits in the last output byte; zero when byte aligned.
    pub output_bits: u8,
    /// Decompression reached the end of the final block.
    pub end_of_stream: bool,
    /// Input bytes received after the end of the stream, across all
    /// operations of the stream.
    pub trailing_input: u16,
    /// XOR checksum after this operation.
    pub xor: u32,
    /// CRC after this operation.
    pub crc: u32,
}

impl CompletionRecord {
    /// Record for a descriptor that could not be decoded.
    #[must_use]
    pub fn rejected(error: DescriptorError) -> Self {
        let invalid_flags = match error {
            DescriptorError::UnknownOpcode(opcode) => u32::from(opcode) << 24,
            DescriptorError::ReservedBits { value, .. } => value,
            DescriptorError::InvalidMode(mode) => u32::from(mode),
        };
        Self {
            status: CompletionStatus::UnsupportedOpcode,
            invalid_flags,
            ..Self::default()
        }
    }

    /// Encodes the record into its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; COMPLETION_RECORD_SIZE] {
        let mut out = [0u8; COMPLETION_RECORD_SIZE];
        out[0x00] = self.status.to_u8();
        out[0x01] = self.error_code;
        out[0x02] = self.fault_info;
        out[0x04..0x08].copy_from_slice(&self.bytes_completed.to_le_bytes());
        out[0x08..0x10].copy_from_slice(&self.fault_addr.to_le_bytes());
        out[0x10..0x14].copy_from_slice(&self.invalid_flags.to_le_bytes());
        out[0x18..0x1C].copy_from_slice(&self.output_size.to_le_bytes());
        out[0x1C] = self.output_bits;
        out[0x1D] = u8::from(self.end_of_stream);
        out[0x1E..0x20].copy_from_slice(&self.trailing_input.to_le_bytes());
        out[0x20..0x24].copy_from_slice(&self.xor.to_le_bytes());
        out[0x24..0x28].copy_from_slice(&self.crc.to_le_bytes());
        out
    }

    /// Decodes a record. Short input decodes as an in-progress record.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() < COMPLETION_RECORD_SIZE {
            return Self::default();
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&bytes[0x08..0x10]);
        Self {
            status: CompletionStatus::from_u8(bytes[0x00]),
            error_code: bytes[0x01],
            fault_info: bytes[0x02],
            bytes_completed: u32_at(0x04),
            fault_addr: u64::from_le_bytes(addr),
            invalid_flags: u32_at(0x10),
            output_size: u32_at(0x18),
            output_bits: bytes[0x1C],
            end_of_stream: bytes[0x1D] != 0,
            trailing_input: u16::from_le_bytes([bytes[0x1E], bytes[0x1F]]),
            xor: u32_at(0x20),
            crc: u32_at(0x24),
        }
    }
}

/// The single case a completion record falls into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Still running; poll again.
    InProgress,
    /// Completed; results are valid.
    Success,
    /// A page was not resident.
    PageFault {
        /// Faulting address.
        addr: u64,
        /// Whether the faulting access was a write.
        write: bool,
    },
    /// The destination filled up.
    OutputOverflow,
    /// Any other terminal failure.
    Error {
        /// Raw status byte.
        status: u8,
        /// Operation error code.
        error_code: u8,
    },
}

impl Outcome {
    /// Classifies a record.
    #[must_use]
    pub const fn classify(record: &CompletionRecord) -> Self {
        match record.status {
            CompletionStatus::InProgress => Self::InProgress,
            CompletionStatus::Success => Self::Success,
            CompletionStatus::ReadPageFault => Self::PageFault {
                addr: record.fault_addr,
                write: false,
            },
            CompletionStatus::WritePageFault => Self::PageFault {
                addr: record.fault_addr,
                write: true,
            },
            CompletionStatus::OutputOverflow => Self::OutputOverflow,
            status => Self::Error {
                status: status.to_u8(),
                error_code: record.error_code,
            },
        }
    }
}

/// Operation error code the executor reports for a decode failure.
///
/// The caller-facing code is this value plus 200.
#[must_use]
pub const fn inflate_error_code(error: &InflateError) -> u8 {
    match error {
        InflateError::TooManyLengths => 1,
        InflateError::InvalidCode(CodeKind::CodeLength) => 2,
        InflateError::RepeatWithoutPrevious => 3,
        InflateError::MissingEndOfBlock => 5,
        InflateError::TooManyLitLenCodes => 6,
        InflateError::TooManyDistCodes => 7,
        InflateError::Oversubscribed(CodeKind::CodeLength)
        | InflateError::Incomplete(CodeKind::CodeLength) => 8,
        InflateError::Oversubscribed(CodeKind::LitLen)
        | InflateError::Incomplete(CodeKind::LitLen) => 9,
        InflateError::Oversubscribed(CodeKind::Distance)
        | InflateError::Incomplete(CodeKind::Distance) => 10,
        InflateError::InvalidCode(CodeKind::LitLen) => 11,
        InflateError::InvalidCode(CodeKind::Distance) => 12,
        InflateError::InvalidBlockType => 13,
        InflateError::InvalidStoredLength { .. } => 14,
        InflateError::Truncated => 15,
        InflateError::InvalidSymbol {
            kind: CodeKind::Distance,
            ..
        } => 17,
        InflateError::InvalidSymbol { .. } => 16,
        InflateError::DistanceTooFar { .. } => 18,
    }
}
