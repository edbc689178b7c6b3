//! Hash-chain LZ77 match finder.
//!
//! The matcher keeps up to one window of history from previously committed
//! input (or a preset dictionary) so chunked streams can reference bytes from
//! earlier chunks. [`Matcher::tokenize`] is pure: it does not advance the
//! history, which lets callers retry a chunk with different settings and only
//! [`commit`](Matcher::commit) the attempt that was kept.

use crate::level::CompressionLevel;
use crate::tables::{MAX_MATCH, MIN_MATCH, WINDOW_SIZE};

const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const NONE: u32 = u32::MAX;

/// One LZ77 output element.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Token {
    /// A byte copied through unchanged.
    Literal(u8),
    /// A back-reference of `length` bytes starting `distance` bytes back.
    Match {
        /// Match length in `3..=258`.
        length: u16,
        /// Distance in `1..=window`.
        distance: u16,
    },
}

/// LZ77 tokenizer with a bounded sliding window.
#[derive(Clone, Debug)]
pub struct Matcher {
    level: CompressionLevel,
    window: usize,
    history: Vec<u8>,
}

impl Matcher {
    /// Creates a matcher whose back-references stay within `window` bytes.
    ///
    /// The window is clamped to `1..=32768`.
    #[must_use]
    pub fn new(level: CompressionLevel, window: usize) -> Self {
        Self {
            level,
            window: window.clamp(1, WINDOW_SIZE),
            history: Vec::new(),
        }
    }

    /// Creates a matcher primed with a preset dictionary.
    #[must_use]
    pub fn with_dictionary(level: CompressionLevel, window: usize, dictionary: &[u8]) -> Self {
        let mut matcher = Self::new(level, window);
        matcher.commit(dictionary);
        matcher
    }

    /// Selected compression level.
    #[must_use]
    pub const fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Maximum back-reference distance.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Bytes currently available for back-references.
    #[must_use]
    pub fn history(&self) -> &[u8] {
        &self.history
    }

    /// Splits `input` into literals and matches against the current history.
    #[must_use]
    pub fn tokenize(&self, input: &[u8]) -> Vec<Token> {
        let start = self.history.len();
        let mut data = Vec::with_capacity(start + input.len());
        data.extend_from_slice(&self.history);
        data.extend_from_slice(input);

        let mut chains = HashChains::new(data.len());
        for pos in 0..start {
            chains.insert(&data, pos);
        }

        let mut tokens = Vec::with_capacity(input.len() / 2 + 1);
        let mut pos = start;
        while pos < data.len() {
            let found = self.longest_match(&data, &chains, pos);
            chains.insert(&data, pos);

            let Some((length, distance)) = found else {
                tokens.push(Token::Literal(data[pos]));
                pos += 1;
                continue;
            };

            if self.level.lazy() && length < self.level.nice_length() {
                let deferred = self.longest_match(&data, &chains, pos + 1);
                if deferred.is_some_and(|(next, _)| next > length) {
                    tokens.push(Token::Literal(data[pos]));
                    pos += 1;
                    continue;
                }
            }

            tokens.push(Token::Match {
                length: length as u16,
                distance: distance as u16,
            });
            for covered in pos + 1..pos + length {
                chains.insert(&data, covered);
            }
            pos += length;
        }
        tokens
    }

    /// Appends `input` to the history, keeping at most one window.
    pub fn commit(&mut self, input: &[u8]) {
        if input.len() >= self.window {
            self.history.clear();
            self.history
                .extend_from_slice(&input[input.len() - self.window..]);
            return;
        }
        let keep = self.window - input.len();
        if self.history.len() > keep {
            self.history.drain(..self.history.len() - keep);
        }
        self.history.extend_from_slice(input);
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn longest_match(
        &self,
        data: &[u8],
        chains: &HashChains,
        pos: usize,
    ) -> Option<(usize, usize)> {
        if pos + MIN_MATCH > data.len() {
            return None;
        }
        let max_len = MAX_MATCH.min(data.len() - pos);
        let nice = self.level.nice_length().min(max_len);

        let mut best = (0, 0);
        let mut candidate = chains.head[hash(data, pos)];
        let mut steps = 0;
        while candidate != NONE && steps < self.level.chain_limit() {
            let cand = candidate as usize;
            let distance = pos - cand;
            if distance > self.window {
                break;
            }
            if data[cand + best.0.min(max_len - 1)] == data[pos + best.0.min(max_len - 1)] {
                let len = data[cand..]
                    .iter()
                    .zip(&data[pos..pos + max_len])
                    .take_while(|(a, b)| a == b)
                    .count();
                if len > best.0 {
                    best = (len, distance);
                    if len >= nice {
                        break;
                    }
                }
            }
            candidate = chains.prev[cand];
            steps += 1;
        }

        (best.0 >= MIN_MATCH).then_some(best)
    }
}

struct HashChains {
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl HashChains {
    fn new(len: usize) -> Self {
        Self {
            head: vec![NONE; HASH_SIZE],
            prev: vec![NONE; len],
        }
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let slot = hash(data, pos);
        self.prev[pos] = self.head[slot];
        self.head[slot] = pos as u32;
    }
}

fn hash(data: &[u8], pos: usize) -> usize {
    let key = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], 0]);
    (key.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
}

/// Expands a token stream against `history`, returning only the new bytes.
///
/// Returns `None` when a match reaches before the available history.
#[must_use]
pub fn expand_tokens(history: &[u8], tokens: &[Token]) -> Option<Vec<u8>> {
    let mut out = history.to_vec();
    for token in tokens {
        match *token {
            Token::Literal(byte) => out.push(byte),
            Token::Match { length, distance } => {
                let distance = usize::from(distance);
                let from = out.len().checked_sub(distance)?;
                for offset in 0..usize::from(length) {
                    let byte = out[from + offset];
                    out.push(byte);
                }
            }
        }
    }
    Some(out.split_off(history.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog; the quick brown fox again"
            .repeat(20)
    }

    #[test]
    fn repeated_text_produces_matches() {
        let matcher = Matcher::new(CompressionLevel::Default, WINDOW_SIZE);
        let data = sample();
        let tokens = matcher.tokenize(&data);
        assert!(tokens.len() < data.len() / 4);
        assert_eq!(expand_tokens(&[], &tokens).as_deref(), Some(data.as_slice()));
    }

    #[test]
    fn lazy_matching_round_trips() {
        let data = sample();
        let high = Matcher::new(CompressionLevel::High, WINDOW_SIZE).tokenize(&data);
        assert_eq!(expand_tokens(&[], &high).as_deref(), Some(data.as_slice()));
    }

    #[test]
    fn distances_respect_window() {
        let mut data = vec![0u8; 0];
        data.extend(b"abcdefgh");
        data.extend((0..200u32).map(|i| (i * 7 + 13) as u8));
        data.extend(b"abcdefgh");
        let matcher = Matcher::new(CompressionLevel::High, 64);
        for token in matcher.tokenize(&data) {
            if let Token::Match { distance, .. } = token {
                assert!(usize::from(distance) <= 64);
            }
        }
    }

    #[test]
    fn history_enables_cross_chunk_matches() {
        let mut matcher = Matcher::new(CompressionLevel::Default, WINDOW_SIZE);
        let first = b"0123456789abcdefghij".to_vec();
        matcher.commit(&first);
        let tokens = matcher.tokenize(&first);
        assert_eq!(
            tokens,
            vec![Token::Match {
                length: 20,
                distance: 20
            }]
        );
        assert_eq!(expand_tokens(matcher.history(), &tokens), Some(first));
    }

    #[test]
    fn commit_keeps_one_window() {
        let mut matcher = Matcher::new(CompressionLevel::Default, 8);
        matcher.commit(b"abc");
        matcher.commit(b"defghij");
        assert_eq!(matcher.history(), b"cdefghij");
        matcher.commit(b"0123456789");
        assert_eq!(matcher.history(), b"23456789");
        matcher.reset();
        assert!(matcher.history().is_empty());
    }

    #[test]
    fn dictionary_seeds_history() {
        let matcher =
            Matcher::with_dictionary(CompressionLevel::Default, WINDOW_SIZE, b"hello world");
        let tokens = matcher.tokenize(b"hello world");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn short_inputs_are_literals() {
        let matcher = Matcher::new(CompressionLevel::Default, WINDOW_SIZE);
        assert_eq!(
            matcher.tokenize(b"ab"),
            vec![Token::Literal(b'a'), Token::Literal(b'b')]
        );
        assert!(matcher.tokenize(&[]).is_empty());
    }
}
