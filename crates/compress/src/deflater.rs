//! Chunked software DEFLATE encoder.
//!
//! # Design
//!
//! A [`Deflater`] turns a stream delivered in chunks into one DEFLATE bit
//! stream. Trailing bits that do not fill a byte are carried between chunks as
//! a [`PartialByte`].
//!
//! - [`BlockStyle::Dynamic`] writes one self-contained block per chunk and
//!   falls back to stored blocks whenever those are smaller.
//! - [`BlockStyle::Fixed`] keeps a single fixed-code block open across chunks.
//!   The block header is written with the first chunk; the last chunk closes
//!   it with end-of-block and, if the header was not marked final, appends an
//!   empty final stored block.
//!
//! [`Deflater::encode`] does not mutate the encoder. The caller applies a
//! result with [`Deflater::commit`] once the output has been accepted, which
//! keeps retries after an undersized output buffer deterministic.

use crate::bits::{BitWriter, PartialByte};
use crate::block::{EncodeError, encode_tokens, write_end_of_block};
use crate::header::{Histogram, HuffmanTables, write_fixed_header};
use crate::level::CompressionLevel;
use crate::matcher::Matcher;
use crate::stored::{calculate_size_needed, write_stored_blocks_into};
use crate::tables::WINDOW_SIZE;

/// Block layout used for compressed chunks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BlockStyle {
    /// Fixed Huffman codes.
    Fixed,
    /// Per-chunk dynamic Huffman codes.
    #[default]
    Dynamic,
}

/// Parameters for one chunk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChunkRequest {
    /// Whether this chunk ends the stream.
    pub is_final: bool,
    /// Block layout to use.
    pub style: BlockStyle,
    /// Close an open fixed block and start a new one before this chunk.
    pub start_new_block: bool,
}

/// Output of [`Deflater::encode`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EncodedChunk {
    /// Completed bytes, starting with the carried bits of the previous chunk.
    pub bytes: Vec<u8>,
    /// Bits left over for the next chunk; always empty after a final chunk.
    pub carry: PartialByte,
    /// Whether a fixed block remains open after this chunk.
    pub block_open: bool,
    /// Whether the chunk was emitted as stored blocks.
    pub used_stored: bool,
}

/// Chunked DEFLATE encoder.
#[derive(Clone, Debug)]
pub struct Deflater {
    matcher: Matcher,
    carry: PartialByte,
    block_open: bool,
}

impl Deflater {
    /// Creates an encoder using the full 32 KiB window.
    #[must_use]
    pub fn new(level: CompressionLevel) -> Self {
        Self::with_window(level, WINDOW_SIZE)
    }

    /// Creates an encoder with a custom history window.
    #[must_use]
    pub fn with_window(level: CompressionLevel, window: usize) -> Self {
        Self {
            matcher: Matcher::new(level, window),
            carry: PartialByte::default(),
            block_open: false,
        }
    }

    /// Creates an encoder primed with a preset dictionary.
    #[must_use]
    pub fn with_dictionary(level: CompressionLevel, window: usize, dictionary: &[u8]) -> Self {
        Self {
            matcher: Matcher::with_dictionary(level, window, dictionary),
            carry: PartialByte::default(),
            block_open: false,
        }
    }

    /// Bits pending from the previous chunk.
    #[must_use]
    pub const fn carry(&self) -> PartialByte {
        self.carry
    }

    /// Whether a fixed block is open.
    #[must_use]
    pub const fn block_open(&self) -> bool {
        self.block_open
    }

    /// The match finder, including its history.
    #[must_use]
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Encodes one chunk without changing the encoder state.
    pub fn encode(&self, input: &[u8], request: ChunkRequest) -> Result<EncodedChunk, EncodeError> {
        let tokens = self.matcher.tokenize(input);
        let mut writer = BitWriter::from_partial(self.carry);
        let mut used_stored = false;

        let block_open = match request.style {
            BlockStyle::Fixed => {
                let tables = HuffmanTables::fixed();
                let mut open = self.block_open;
                if open && request.start_new_block {
                    write_end_of_block(&mut writer, &tables);
                    open = false;
                }
                if !open {
                    write_fixed_header(&mut writer, request.is_final);
                }
                encode_tokens(&mut writer, &tokens, &tables)?;
                if request.is_final {
                    write_end_of_block(&mut writer, &tables);
                    if open {
                        write_stored_blocks_into(&mut writer, &[], true);
                    }
                    false
                } else {
                    true
                }
            }
            BlockStyle::Dynamic => {
                if self.block_open {
                    write_end_of_block(&mut writer, &HuffmanTables::fixed());
                }
                let tables = HuffmanTables::from_histogram(&Histogram::from_tokens(&tokens));
                let mut trial = writer.clone();
                tables.write_dynamic_header(&mut trial, request.is_final);
                encode_tokens(&mut trial, &tokens, &tables)?;
                write_end_of_block(&mut trial, &tables);

                let stored_bits = (writer.whole_bytes().len()
                    + calculate_size_needed(input.len(), usize::from(writer.partial().bits())))
                    * 8;
                if stored_bits < trial.bit_len() {
                    write_stored_blocks_into(&mut writer, input, request.is_final);
                    used_stored = true;
                } else {
                    writer = trial;
                }
                false
            }
        };

        let (bytes, carry) = if request.is_final {
            (writer.into_bytes(), PartialByte::default())
        } else {
            writer.into_parts()
        };

        logging::trace_job!(
            input = input.len(),
            output = bytes.len(),
            carry_bits = carry.bits(),
            stored = used_stored,
            "software deflate chunk"
        );

        Ok(EncodedChunk {
            bytes,
            carry,
            block_open,
            used_stored,
        })
    }

    /// Applies an accepted chunk to the encoder state.
    pub fn commit(&mut self, input: &[u8], chunk: &EncodedChunk) {
        self.matcher.commit(input);
        self.carry = chunk.carry;
        self.block_open = chunk.block_open;
    }

    /// Encodes and commits one chunk.
    pub fn push(&mut self, input: &[u8], request: ChunkRequest) -> Result<Vec<u8>, EncodeError> {
        let chunk = self.encode(input, request)?;
        self.commit(input, &chunk);
        Ok(chunk.bytes)
    }

    /// Returns the encoder to its initial state, dropping history.
    pub fn reset(&mut self) {
        self.matcher.reset();
        self.carry = PartialByte::default();
        self.block_open = false;
    }
}

/// Compresses `input` as one complete raw DEFLATE stream.
pub fn deflate(
    input: &[u8],
    level: CompressionLevel,
    style: BlockStyle,
) -> Result<Vec<u8>, EncodeError> {
    Deflater::new(level).push(
        input,
        ChunkRequest {
            is_final: true,
            style,
            ..ChunkRequest::default()
        },
    )
}
