//! Block headers and the literal/length + distance code pair.

use crate::bits::BitWriter;
use crate::huffman::{self, HuffmanCode};
use crate::matcher::Token;
use crate::tables::{
    CODE_LEN_SYMBOLS, CODE_LENGTH_ORDER, DIST_SYMBOLS, END_OF_BLOCK, LIT_LEN_SYMBOLS,
    MAX_CODE_LEN, MAX_CODE_LEN_CODE_LEN, distance_code, fixed_dist_lengths, fixed_lit_len_lengths,
    length_code,
};

/// DEFLATE block type field values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BlockType {
    /// `00`: uncompressed.
    Stored = 0,
    /// `01`: fixed Huffman codes.
    Fixed = 1,
    /// `10`: dynamic Huffman codes.
    Dynamic = 2,
}

/// Symbol frequencies gathered from a token stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Histogram {
    /// Literal/length symbol counts.
    pub lit_len: [u32; LIT_LEN_SYMBOLS],
    /// Distance symbol counts.
    pub dist: [u32; DIST_SYMBOLS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// Creates an all-zero histogram.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lit_len: [0; LIT_LEN_SYMBOLS],
            dist: [0; DIST_SYMBOLS],
        }
    }

    /// Counts every symbol used by `tokens`, plus one end-of-block.
    #[must_use]
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut histogram = Self::new();
        for token in tokens {
            histogram.add(*token);
        }
        histogram.lit_len[END_OF_BLOCK] = histogram.lit_len[END_OF_BLOCK].saturating_add(1);
        histogram
    }

    /// Counts the symbols of a single token.
    pub fn add(&mut self, token: Token) {
        match token {
            Token::Literal(byte) => self.lit_len[usize::from(byte)] += 1,
            Token::Match { length, distance } => {
                self.lit_len[length_code(usize::from(length)).symbol] += 1;
                self.dist[distance_code(usize::from(distance)).symbol] += 1;
            }
        }
    }

    /// Adds another histogram's counts into this one.
    pub fn merge(&mut self, other: &Self) {
        for (dst, src) in self.lit_len.iter_mut().zip(other.lit_len.iter()) {
            *dst = dst.saturating_add(*src);
        }
        for (dst, src) in self.dist.iter_mut().zip(other.dist.iter()) {
            *dst = dst.saturating_add(*src);
        }
    }

    /// Returns `true` when no symbol has been counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lit_len.iter().chain(self.dist.iter()).all(|&count| count == 0)
    }
}

/// Literal/length and distance codes used to encode one block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HuffmanTables {
    lit_len: Vec<HuffmanCode>,
    dist: Vec<HuffmanCode>,
}

impl HuffmanTables {
    /// The fixed code defined by RFC 1951.
    #[must_use]
    pub fn fixed() -> Self {
        // Codes are assigned over all 288 lengths; symbols 286 and 287 shape
        // the 9-bit codes even though they never appear in a stream.
        let mut lit_len = huffman::assign_codes(&fixed_lit_len_lengths());
        lit_len.truncate(LIT_LEN_SYMBOLS);
        Self {
            lit_len,
            dist: huffman::assign_codes(&fixed_dist_lengths()),
        }
    }

    /// Builds dynamic codes from symbol statistics.
    ///
    /// End-of-block is always given a code, even when `histogram` omits it.
    #[must_use]
    pub fn from_histogram(histogram: &Histogram) -> Self {
        let mut lit_len = histogram.lit_len;
        if lit_len[END_OF_BLOCK] == 0 {
            lit_len[END_OF_BLOCK] = 1;
        }
        Self {
            lit_len: huffman::build(&lit_len, MAX_CODE_LEN),
            dist: huffman::build(&histogram.dist, MAX_CODE_LEN),
        }
    }

    /// Assigns canonical codes to explicit code lengths.
    #[must_use]
    pub fn from_lengths(lit_len: &[u8], dist: &[u8]) -> Self {
        Self {
            lit_len: huffman::assign_codes(lit_len),
            dist: huffman::assign_codes(dist),
        }
    }

    /// Rebuilds tables from already-assigned code entries.
    #[must_use]
    pub fn from_codes(lit_len: Vec<HuffmanCode>, dist: Vec<HuffmanCode>) -> Self {
        Self { lit_len, dist }
    }

    /// Literal/length codes (286 entries).
    #[must_use]
    pub fn lit_len(&self) -> &[HuffmanCode] {
        &self.lit_len
    }

    /// Distance codes (30 entries).
    #[must_use]
    pub fn dist(&self) -> &[HuffmanCode] {
        &self.dist
    }

    /// Code emitted to terminate a block.
    #[must_use]
    pub fn end_of_block(&self) -> HuffmanCode {
        self.lit_len.get(END_OF_BLOCK).copied().unwrap_or_default()
    }

    /// Writes a dynamic block header (`BTYPE = 10`) describing these codes.
    pub fn write_dynamic_header(&self, writer: &mut BitWriter, is_final: bool) {
        let lit_lengths: Vec<u8> = self.lit_len.iter().map(|code| code.len()).collect();
        let dist_lengths: Vec<u8> = self.dist.iter().map(|code| code.len()).collect();

        let hlit = used_prefix(&lit_lengths).max(END_OF_BLOCK + 1);
        let hdist = used_prefix(&dist_lengths).max(1);

        let mut combined = Vec::with_capacity(hlit + hdist);
        combined.extend_from_slice(&lit_lengths[..hlit]);
        combined.extend_from_slice(&dist_lengths[..hdist]);

        let runs = rl_encode(&combined);
        let mut cl_histogram = [0u32; CODE_LEN_SYMBOLS];
        for run in &runs {
            cl_histogram[usize::from(run.symbol)] += 1;
        }
        let cl_codes = huffman::build(&cl_histogram, MAX_CODE_LEN_CODE_LEN);

        let hclen = CODE_LENGTH_ORDER
            .iter()
            .rposition(|&symbol| !cl_codes[symbol].is_empty())
            .map_or(4, |last| (last + 1).max(4));

        writer.write_bits(u32::from(is_final), 1);
        writer.write_bits(BlockType::Dynamic as u32, 2);
        writer.write_bits((hlit - 257) as u32, 5);
        writer.write_bits((hdist - 1) as u32, 5);
        writer.write_bits((hclen - 4) as u32, 4);
        for &symbol in &CODE_LENGTH_ORDER[..hclen] {
            writer.write_bits(u32::from(cl_codes[symbol].len()), 3);
        }
        for run in &runs {
            writer.write_code(cl_codes[usize::from(run.symbol)]);
            match run.symbol {
                16 => writer.write_bits(u32::from(run.extra), 2),
                17 => writer.write_bits(u32::from(run.extra), 3),
                18 => writer.write_bits(u32::from(run.extra), 7),
                _ => {}
            }
        }
    }
}

/// Writes a fixed block header (`BTYPE = 01`).
pub fn write_fixed_header(writer: &mut BitWriter, is_final: bool) {
    writer.write_bits(u32::from(is_final), 1);
    writer.write_bits(BlockType::Fixed as u32, 2);
}

fn used_prefix(lengths: &[u8]) -> usize {
    lengths.iter().rposition(|&len| len != 0).map_or(0, |last| last + 1)
}

/// One code-length alphabet symbol with its repeat payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Run {
    symbol: u8,
    extra: u8,
}

/// Run-length encodes code lengths with symbols 16 (repeat previous),
/// 17 (short zero run) and 18 (long zero run).
fn rl_encode(lengths: &[u8]) -> Vec<Run> {
    let mut runs = Vec::with_capacity(lengths.len());
    let mut i = 0;
    while i < lengths.len() {
        let current = lengths[i];
        let mut run = 1;
        while i + run < lengths.len() && lengths[i + run] == current {
            run += 1;
        }
        i += run;

        if current == 0 {
            let mut left = run;
            while left >= 11 {
                let take = left.min(138);
                runs.push(Run {
                    symbol: 18,
                    extra: (take - 11) as u8,
                });
                left -= take;
            }
            if left >= 3 {
                runs.push(Run {
                    symbol: 17,
                    extra: (left - 3) as u8,
                });
                left = 0;
            }
            runs.extend(std::iter::repeat_n(Run { symbol: 0, extra: 0 }, left));
        } else {
            runs.push(Run {
                symbol: current,
                extra: 0,
            });
            let mut left = run - 1;
            while left >= 3 {
                let take = left.min(6);
                runs.push(Run {
                    symbol: 16,
                    extra: (take - 3) as u8,
                });
                left -= take;
            }
            runs.extend(std::iter::repeat_n(
                Run {
                    symbol: current,
                    extra: 0,
                },
                left,
            ));
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::reverse_bits;

    fn expand(runs: &[Run]) -> Vec<u8> {
        let mut out = Vec::new();
        for run in runs {
            match run.symbol {
                16 => {
                    let prev = *out.last().expect("repeat follows a length");
                    out.extend(std::iter::repeat_n(prev, 3 + usize::from(run.extra)));
                }
                17 => out.extend(std::iter::repeat_n(0, 3 + usize::from(run.extra))),
                18 => out.extend(std::iter::repeat_n(0, 11 + usize::from(run.extra))),
                len => out.push(len),
            }
        }
        out
    }

    #[test]
    fn rl_encode_uses_repeat_symbols() {
        let mut lengths = vec![8u8; 10];
        lengths.extend(vec![0u8; 150]);
        lengths.extend([5, 0, 0, 0, 7, 7]);
        let runs = rl_encode(&lengths);
        assert!(runs.iter().any(|run| run.symbol == 16));
        assert!(runs.iter().any(|run| run.symbol == 17));
        assert!(runs.iter().any(|run| run.symbol == 18));
        assert_eq!(expand(&runs), lengths);
    }

    #[test]
    fn fixed_tables_use_seven_bit_end_of_block() {
        let tables = HuffmanTables::fixed();
        assert_eq!(tables.end_of_block(), HuffmanCode::new(0, 7));
        assert_eq!(tables.lit_len().len(), LIT_LEN_SYMBOLS);
        assert_eq!(tables.dist().len(), DIST_SYMBOLS);
    }

    #[test]
    fn fixed_codes_match_rfc_1951_ranges() {
        let tables = HuffmanTables::fixed();
        let code = |symbol: usize| tables.lit_len()[symbol];
        assert_eq!(code(0), HuffmanCode::new(reverse_bits(0b0011_0000, 8), 8));
        assert_eq!(code(143), HuffmanCode::new(reverse_bits(0b1011_1111, 8), 8));
        assert_eq!(code(144), HuffmanCode::new(reverse_bits(0b1_1001_0000, 9), 9));
        assert_eq!(code(255), HuffmanCode::new(reverse_bits(0b1_1111_1111, 9), 9));
        assert_eq!(code(279), HuffmanCode::new(reverse_bits(0b001_0111, 7), 7));
        assert_eq!(code(280), HuffmanCode::new(reverse_bits(0b1100_0000, 8), 8));
        assert_eq!(code(285), HuffmanCode::new(reverse_bits(0b1100_0101, 8), 8));
        assert_eq!(tables.dist()[29], HuffmanCode::new(reverse_bits(29, 5), 5));
    }

    #[test]
    fn histogram_counts_end_of_block_once() {
        let tokens = [
            Token::Literal(b'a'),
            Token::Match {
                length: 3,
                distance: 1,
            },
        ];
        let histogram = Histogram::from_tokens(&tokens);
        assert_eq!(histogram.lit_len[usize::from(b'a')], 1);
        assert_eq!(histogram.lit_len[257], 1);
        assert_eq!(histogram.dist[0], 1);
        assert_eq!(histogram.lit_len[END_OF_BLOCK], 1);
    }

    #[test]
    fn dynamic_tables_force_end_of_block() {
        let tables = HuffmanTables::from_histogram(&Histogram::new());
        assert!(!tables.end_of_block().is_empty());
    }

    #[test]
    fn dynamic_header_starts_with_block_type() {
        let mut histogram = Histogram::new();
        histogram.lit_len[usize::from(b'x')] = 10;
        let tables = HuffmanTables::from_histogram(&histogram);
        let mut writer = BitWriter::new();
        tables.write_dynamic_header(&mut writer, true);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0] & 0b111, 0b101);
    }

    #[test]
    fn merge_accumulates_counts() {
        let mut a = Histogram::new();
        a.lit_len[1] = 2;
        let mut b = Histogram::new();
        b.lit_len[1] = 3;
        b.dist[4] = 1;
        a.merge(&b);
        assert_eq!(a.lit_len[1], 5);
        assert_eq!(a.dist[4], 1);
        assert!(!a.is_empty());
        assert!(Histogram::new().is_empty());
    }
}
