//! Resumable DEFLATE decoder.
//!
//! # Design
//!
//! [`Inflater`] accepts input and output in arbitrary slices. Input is
//! buffered internally and decoded symbol by symbol. Every header and symbol is
//! parsed from a checkpoint: when the input runs dry part-way through, the bit
//! position rewinds to the checkpoint and decoding resumes on the next call.
//! A back-reference that does not fit the output is held and finished later,
//! so the decoder always fills the output exactly.
//!
//! The decoder is [`Clone`]; code tables are shared through [`Arc`] so a
//! snapshot taken before a speculative call is cheap.
//!
//! # Errors
//!
//! Malformed streams produce an [`InflateError`] naming the first violation.

use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::tables::{
    CODE_LENGTH_ORDER, DIST_BASE, DIST_EXTRA, DIST_SYMBOLS, END_OF_BLOCK, LENGTH_BASE,
    LENGTH_EXTRA, LIT_LEN_SYMBOLS, MAX_CODE_LEN, WINDOW_SIZE, fixed_dist_lengths,
    fixed_lit_len_lengths,
};

/// Which alphabet a code-table error refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CodeKind {
    /// Code-length alphabet of a dynamic header.
    CodeLength,
    /// Literal/length alphabet.
    LitLen,
    /// Distance alphabet.
    Distance,
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CodeLength => "code-length",
            Self::LitLen => "literal/length",
            Self::Distance => "distance",
        })
    }
}

/// Malformed-stream conditions detected while decoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum InflateError {
    /// Block type `11` is reserved.
    #[error("invalid block type")]
    InvalidBlockType,
    /// `NLEN` is not the complement of `LEN`.
    #[error("stored block length {len:#06x} does not match its complement {nlen:#06x}")]
    InvalidStoredLength {
        /// Declared length.
        len: u16,
        /// Declared complement.
        nlen: u16,
    },
    /// `HLIT` declares more than 286 literal/length codes.
    #[error("too many literal/length codes")]
    TooManyLitLenCodes,
    /// `HDIST` declares more than 30 distance codes.
    #[error("too many distance codes")]
    TooManyDistCodes,
    /// Code-length symbol 16 appeared before any length.
    #[error("repeat code with no previous length")]
    RepeatWithoutPrevious,
    /// A repeat ran past the declared number of lengths.
    #[error("code-length repeat exceeds the declared code count")]
    TooManyLengths,
    /// A code table assigns more codes than its length permits.
    #[error("oversubscribed {0} code")]
    Oversubscribed(CodeKind),
    /// A code table leaves unused codes.
    #[error("incomplete {0} code")]
    Incomplete(CodeKind),
    /// The end-of-block symbol has no code.
    #[error("missing end-of-block code")]
    MissingEndOfBlock,
    /// Bits did not form a valid code.
    #[error("invalid {0} code")]
    InvalidCode(CodeKind),
    /// Literal/length symbol 286 or 287, or distance symbol 30 or 31.
    #[error("invalid {kind} symbol {symbol}")]
    InvalidSymbol {
        /// Alphabet of the symbol.
        kind: CodeKind,
        /// Decoded symbol.
        symbol: u16,
    },
    /// A back-reference points before the start of the available history.
    #[error("distance {distance} exceeds the {available} bytes of history")]
    DistanceTooFar {
        /// Requested distance.
        distance: usize,
        /// Bytes of history available.
        available: usize,
    },
    /// The input ended before the final block.
    #[error("stream ended before the final block")]
    Truncated,
}

/// Result of one [`Inflater::decompress`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InflateProgress {
    /// Input bytes taken from this call's input.
    pub consumed: usize,
    /// Bytes written to the output.
    pub produced: usize,
    /// Whether the final block has been fully decoded.
    pub finished: bool,
}

enum Stall {
    Input,
    Fail(InflateError),
}

impl From<InflateError> for Stall {
    fn from(error: InflateError) -> Self {
        Self::Fail(error)
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    const fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn bits(&mut self, count: u32) -> Result<u32, Stall> {
        if self.pos + count as usize > self.data.len() * 8 {
            return Err(Stall::Input);
        }
        let mut value = 0u32;
        for shift in 0..count {
            let bit = (self.data[self.pos / 8] >> (self.pos % 8)) & 1;
            value |= u32::from(bit) << shift;
            self.pos += 1;
        }
        Ok(value)
    }

    fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }
}

/// Canonical decoding table: per-length counts and symbols in code order.
#[derive(Debug)]
struct Decoder {
    count: [u16; MAX_CODE_LEN as usize + 1],
    symbol: Vec<u16>,
}

impl Decoder {
    /// Builds a table and returns how many codes were left unused; a negative
    /// value means the lengths are oversubscribed.
    fn new(lengths: &[u8]) -> (Self, i32) {
        let mut count = [0u16; MAX_CODE_LEN as usize + 1];
        for &len in lengths {
            count[usize::from(len)] += 1;
        }

        let mut left = 1i32;
        if usize::from(count[0]) != lengths.len() {
            for &used in &count[1..] {
                left = (left << 1) - i32::from(used);
                if left < 0 {
                    break;
                }
            }
        } else {
            left = 0;
        }

        let mut offsets = [0u16; MAX_CODE_LEN as usize + 2];
        for len in 1..=MAX_CODE_LEN as usize {
            offsets[len + 1] = offsets[len] + count[len];
        }
        let mut symbol = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[usize::from(len)];
                symbol[usize::from(*slot)] = sym as u16;
                *slot += 1;
            }
        }
        (Self { count, symbol }, left)
    }

    fn used(&self, total: usize) -> usize {
        total - usize::from(self.count[0])
    }

    fn decode(&self, reader: &mut BitReader<'_>, kind: CodeKind) -> Result<u16, Stall> {
        let (mut code, mut first, mut index) = (0i32, 0i32, 0i32);
        for &count in &self.count[1..] {
            code |= reader.bits(1)? as i32;
            let count = i32::from(count);
            if code - count < first {
                return Ok(self.symbol[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(InflateError::InvalidCode(kind).into())
    }
}

#[derive(Debug)]
struct CodeTables {
    lit_len: Decoder,
    dist: Decoder,
}

fn fixed_tables() -> Arc<CodeTables> {
    static FIXED: OnceLock<Arc<CodeTables>> = OnceLock::new();
    Arc::clone(FIXED.get_or_init(|| {
        Arc::new(CodeTables {
            lit_len: Decoder::new(&fixed_lit_len_lengths()).0,
            dist: Decoder::new(&fixed_dist_lengths()).0,
        })
    }))
}

#[derive(Clone, Debug)]
enum State {
    Header,
    Stored { remaining: usize },
    Codes(Arc<CodeTables>),
    Done,
}

enum Symbol {
    Literal(u8),
    EndOfBlock,
    Copy { length: usize, distance: usize },
}

struct Sink<'o> {
    out: &'o mut [u8],
    produced: usize,
}

impl Sink<'_> {
    fn room(&self) -> usize {
        self.out.len() - self.produced
    }
}

/// Streaming raw DEFLATE decoder.
#[derive(Clone, Debug)]
pub struct Inflater {
    input: Vec<u8>,
    bit_pos: usize,
    state: State,
    last_block: bool,
    window: Vec<u8>,
    copy: Option<(usize, usize)>,
    total_out: u64,
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater {
    /// Creates a decoder positioned at the start of a stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: Vec::new(),
            bit_pos: 0,
            state: State::Header,
            last_block: false,
            window: Vec::new(),
            copy: None,
            total_out: 0,
        }
    }

    /// Creates a decoder whose history starts with a preset dictionary.
    #[must_use]
    pub fn with_dictionary(dictionary: &[u8]) -> Self {
        let mut inflater = Self::new();
        let start = dictionary.len().saturating_sub(WINDOW_SIZE);
        inflater.window.extend_from_slice(&dictionary[start..]);
        inflater
    }

    /// Whether the final block has been decoded and fully written out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done) && self.copy.is_none()
    }

    /// Bytes received after the end of the stream.
    #[must_use]
    pub fn remaining_input(&self) -> &[u8] {
        if self.is_finished() { &self.input } else { &[] }
    }

    /// Total bytes produced since creation.
    #[must_use]
    pub const fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Whether decoding is in the middle of a block.
    #[must_use]
    pub fn inside_block(&self) -> bool {
        !matches!(self.state, State::Header | State::Done)
    }

    /// Decodes as much as possible from `input` into `out`.
    pub fn decompress(
        &mut self,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<InflateProgress, InflateError> {
        if self.is_finished() {
            return Ok(InflateProgress {
                consumed: 0,
                produced: 0,
                finished: true,
            });
        }

        self.input.extend_from_slice(input);
        let buffered = std::mem::take(&mut self.input);
        let mut sink = Sink { out, produced: 0 };
        let result = self.run(&buffered, &mut sink);
        self.input = buffered;
        self.total_out += sink.produced as u64;
        result?;

        let mut consumed = input.len();
        if self.is_finished() {
            let end = self.bit_pos.div_ceil(8).min(self.input.len());
            let leftover = self.input.len() - end;
            consumed -= leftover.min(input.len());
            self.input.drain(..end);
            self.bit_pos = 0;
        } else {
            let whole = self.bit_pos / 8;
            self.input.drain(..whole);
            self.bit_pos -= whole * 8;
        }

        Ok(InflateProgress {
            consumed,
            produced: sink.produced,
            finished: self.is_finished(),
        })
    }

    /// Decodes a complete stream held in memory.
    pub fn decompress_vec(&mut self, input: &[u8]) -> Result<Vec<u8>, InflateError> {
        let mut output = Vec::new();
        let mut scratch = vec![0u8; 64 * 1024];
        let mut pending = input;
        loop {
            let progress = self.decompress(pending, &mut scratch)?;
            pending = &pending[progress.consumed..];
            output.extend_from_slice(&scratch[..progress.produced]);
            if progress.finished {
                return Ok(output);
            }
            if progress.produced == 0 && progress.consumed == 0 {
                return Err(InflateError::Truncated);
            }
        }
    }

    fn run(&mut self, input: &[u8], sink: &mut Sink<'_>) -> Result<(), InflateError> {
        loop {
            if !self.flush_copy(sink) {
                return Ok(());
            }
            match self.state.clone() {
                State::Done => return Ok(()),
                State::Header => {
                    if self.last_block {
                        self.state = State::Done;
                        continue;
                    }
                    let mut reader = BitReader::new(input, self.bit_pos);
                    match read_header(&mut reader) {
                        Ok((next, last)) => {
                            self.bit_pos = reader.pos;
                            self.last_block = last;
                            self.state = next;
                        }
                        Err(Stall::Input) => return Ok(()),
                        Err(Stall::Fail(error)) => return Err(error),
                    }
                }
                State::Stored { remaining } => {
                    if remaining == 0 {
                        self.state = State::Header;
                        continue;
                    }
                    let start = self.bit_pos / 8;
                    let take = remaining
                        .min(input.len().saturating_sub(start))
                        .min(sink.room());
                    if take == 0 {
                        return Ok(());
                    }
                    for &byte in &input[start..start + take] {
                        self.emit(sink, byte);
                    }
                    self.bit_pos += take * 8;
                    self.state = State::Stored {
                        remaining: remaining - take,
                    };
                }
                State::Codes(tables) => {
                    let mut reader = BitReader::new(input, self.bit_pos);
                    let symbol = match read_symbol(&mut reader, &tables) {
                        Ok(symbol) => symbol,
                        Err(Stall::Input) => return Ok(()),
                        Err(Stall::Fail(error)) => return Err(error),
                    };
                    match symbol {
                        Symbol::Literal(byte) => {
                            if sink.room() == 0 {
                                return Ok(());
                            }
                            self.emit(sink, byte);
                        }
                        Symbol::EndOfBlock => self.state = State::Header,
                        Symbol::Copy { length, distance } => {
                            if distance > self.window.len() {
                                return Err(InflateError::DistanceTooFar {
                                    distance,
                                    available: self.window.len(),
                                });
                            }
                            self.copy = Some((length, distance));
                        }
                    }
                    self.bit_pos = reader.pos;
                }
            }
        }
    }

    /// Writes as much of a pending back-reference as fits; `true` once done.
    fn flush_copy(&mut self, sink: &mut Sink<'_>) -> bool {
        let Some((mut remaining, distance)) = self.copy else {
            return true;
        };
        while remaining > 0 && sink.room() > 0 {
            let byte = self.window[self.window.len() - distance];
            self.emit(sink, byte);
            remaining -= 1;
        }
        if remaining == 0 {
            self.copy = None;
            true
        } else {
            self.copy = Some((remaining, distance));
            false
        }
    }

    fn emit(&mut self, sink: &mut Sink<'_>, byte: u8) {
        sink.out[sink.produced] = byte;
        sink.produced += 1;
        if self.window.len() >= 2 * WINDOW_SIZE {
            self.window.drain(..WINDOW_SIZE);
        }
        self.window.push(byte);
    }
}

fn read_header(reader: &mut BitReader<'_>) -> Result<(State, bool), Stall> {
    let last = reader.bits(1)? == 1;
    let state = match reader.bits(2)? {
        0 => {
            reader.align();
            let len = reader.bits(16)? as u16;
            let nlen = reader.bits(16)? as u16;
            if len != !nlen {
                return Err(InflateError::InvalidStoredLength { len, nlen }.into());
            }
            State::Stored {
                remaining: usize::from(len),
            }
        }
        1 => State::Codes(fixed_tables()),
        2 => State::Codes(Arc::new(read_dynamic_tables(reader)?)),
        _ => return Err(InflateError::InvalidBlockType.into()),
    };
    Ok((state, last))
}

fn read_dynamic_tables(reader: &mut BitReader<'_>) -> Result<CodeTables, Stall> {
    let hlit = reader.bits(5)? as usize + 257;
    let hdist = reader.bits(5)? as usize + 1;
    let hclen = reader.bits(4)? as usize + 4;
    if hlit > LIT_LEN_SYMBOLS {
        return Err(InflateError::TooManyLitLenCodes.into());
    }
    if hdist > DIST_SYMBOLS {
        return Err(InflateError::TooManyDistCodes.into());
    }

    let mut cl_lengths = [0u8; CODE_LENGTH_ORDER.len()];
    for &symbol in &CODE_LENGTH_ORDER[..hclen] {
        cl_lengths[symbol] = reader.bits(3)? as u8;
    }
    let (cl_decoder, left) = Decoder::new(&cl_lengths);
    if left < 0 {
        return Err(InflateError::Oversubscribed(CodeKind::CodeLength).into());
    }
    if left > 0 {
        return Err(InflateError::Incomplete(CodeKind::CodeLength).into());
    }

    let total = hlit + hdist;
    let mut lengths = vec![0u8; total];
    let mut index = 0;
    while index < total {
        let symbol = cl_decoder.decode(reader, CodeKind::CodeLength)?;
        if symbol < 16 {
            lengths[index] = symbol as u8;
            index += 1;
            continue;
        }
        let (value, repeat) = match symbol {
            16 => {
                if index == 0 {
                    return Err(InflateError::RepeatWithoutPrevious.into());
                }
                (lengths[index - 1], 3 + reader.bits(2)? as usize)
            }
            17 => (0, 3 + reader.bits(3)? as usize),
            _ => (0, 11 + reader.bits(7)? as usize),
        };
        if index + repeat > total {
            return Err(InflateError::TooManyLengths.into());
        }
        lengths[index..index + repeat].fill(value);
        index += repeat;
    }

    if lengths[END_OF_BLOCK] == 0 {
        return Err(InflateError::MissingEndOfBlock.into());
    }

    let (lit_len, left) = Decoder::new(&lengths[..hlit]);
    if left < 0 {
        return Err(InflateError::Oversubscribed(CodeKind::LitLen).into());
    }
    if left > 0 && lit_len.used(hlit) != 1 {
        return Err(InflateError::Incomplete(CodeKind::LitLen).into());
    }

    let (dist, left) = Decoder::new(&lengths[hlit..]);
    if left < 0 {
        return Err(InflateError::Oversubscribed(CodeKind::Distance).into());
    }
    if left > 0 && dist.used(hdist) != 1 {
        return Err(InflateError::Incomplete(CodeKind::Distance).into());
    }

    Ok(CodeTables { lit_len, dist })
}

fn read_symbol(reader: &mut BitReader<'_>, tables: &CodeTables) -> Result<Symbol, Stall> {
    let symbol = tables.lit_len.decode(reader, CodeKind::LitLen)?;
    let symbol = usize::from(symbol);
    if symbol < END_OF_BLOCK {
        return Ok(Symbol::Literal(symbol as u8));
    }
    if symbol == END_OF_BLOCK {
        return Ok(Symbol::EndOfBlock);
    }

    let index = symbol - END_OF_BLOCK - 1;
    if index >= LENGTH_BASE.len() {
        return Err(InflateError::InvalidSymbol {
            kind: CodeKind::LitLen,
            symbol: symbol as u16,
        }
        .into());
    }
    let length = usize::from(LENGTH_BASE[index])
        + reader.bits(u32::from(LENGTH_EXTRA[index]))? as usize;

    let dist_symbol = usize::from(tables.dist.decode(reader, CodeKind::Distance)?);
    if dist_symbol >= DIST_BASE.len() {
        return Err(InflateError::InvalidSymbol {
            kind: CodeKind::Distance,
            symbol: dist_symbol as u16,
        }
        .into());
    }
    let distance = usize::from(DIST_BASE[dist_symbol])
        + reader.bits(u32::from(DIST_EXTRA[dist_symbol]))? as usize;

    Ok(Symbol::Copy { length, distance })
}
