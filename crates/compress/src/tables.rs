//! DEFLATE alphabet constants and symbol mapping (RFC 1951 section 3.2.5).

/// Number of literal/length symbols that may appear in a dynamic header.
pub const LIT_LEN_SYMBOLS: usize = 286;

/// Number of distance symbols that may appear in a dynamic header.
pub const DIST_SYMBOLS: usize = 30;

/// Number of symbols in the code-length alphabet.
pub const CODE_LEN_SYMBOLS: usize = 19;

/// Literal/length symbol terminating a block.
pub const END_OF_BLOCK: usize = 256;

/// Longest code permitted for literal/length and distance alphabets.
pub const MAX_CODE_LEN: u8 = 15;

/// Longest code permitted for the code-length alphabet.
pub const MAX_CODE_LEN_CODE_LEN: u8 = 7;

/// Shortest back-reference DEFLATE can express.
pub const MIN_MATCH: usize = 3;

/// Longest back-reference DEFLATE can express.
pub const MAX_MATCH: usize = 258;

/// Largest distance DEFLATE can express.
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Transmission order of code-length code lengths in a dynamic header.
pub const CODE_LENGTH_ORDER: [usize; CODE_LEN_SYMBOLS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base match length for literal/length symbols 257..=285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits following literal/length symbols 257..=285.
pub const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distance for distance symbols 0..=29.
pub const DIST_BASE: [u16; DIST_SYMBOLS] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits following distance symbols 0..=29.
pub const DIST_EXTRA: [u8; DIST_SYMBOLS] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Symbol, extra-bit count and extra-bit value encoding one length or distance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SymbolCode {
    /// Alphabet symbol (already offset by 257 for lengths).
    pub symbol: usize,
    /// Number of extra bits following the symbol.
    pub extra_bits: u8,
    /// Value of the extra bits.
    pub extra_value: u16,
}

/// Maps a match length in `3..=258` onto its literal/length symbol.
#[must_use]
pub fn length_code(length: usize) -> SymbolCode {
    let length = length.clamp(MIN_MATCH, MAX_MATCH) as u16;
    let index = LENGTH_BASE
        .iter()
        .rposition(|&base| base <= length)
        .unwrap_or(0);
    SymbolCode {
        symbol: END_OF_BLOCK + 1 + index,
        extra_bits: LENGTH_EXTRA[index],
        extra_value: length - LENGTH_BASE[index],
    }
}

/// Maps a distance in `1..=32768` onto its distance symbol.
#[must_use]
pub fn distance_code(distance: usize) -> SymbolCode {
    let distance = distance.clamp(1, WINDOW_SIZE) as u16;
    let index = DIST_BASE
        .iter()
        .rposition(|&base| base <= distance)
        .unwrap_or(0);
    SymbolCode {
        symbol: index,
        extra_bits: DIST_EXTRA[index],
        extra_value: distance - DIST_BASE[index],
    }
}

/// Code lengths of the fixed literal/length code (all 288 symbols).
#[must_use]
pub fn fixed_lit_len_lengths() -> [u8; 288] {
    let mut lengths = [0u8; 288];
    for (symbol, length) in lengths.iter_mut().enumerate() {
        *length = match symbol {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    lengths
}

/// Code lengths of the fixed distance code.
#[must_use]
pub const fn fixed_dist_lengths() -> [u8; DIST_SYMBOLS] {
    [5; DIST_SYMBOLS]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_boundaries_map_to_expected_symbols() {
        assert_eq!(length_code(3).symbol, 257);
        assert_eq!(length_code(10).symbol, 264);
        let eleven = length_code(11);
        assert_eq!((eleven.symbol, eleven.extra_bits, eleven.extra_value), (265, 1, 0));
        let twelve = length_code(12);
        assert_eq!((twelve.symbol, twelve.extra_value), (265, 1));
        let max = length_code(258);
        assert_eq!((max.symbol, max.extra_bits), (285, 0));
        let below_max = length_code(257);
        assert_eq!((below_max.symbol, below_max.extra_value), (284, 30));
    }

    #[test]
    fn distance_boundaries_map_to_expected_symbols() {
        assert_eq!(distance_code(1).symbol, 0);
        assert_eq!(distance_code(4).symbol, 3);
        let five = distance_code(6);
        assert_eq!((five.symbol, five.extra_bits, five.extra_value), (4, 1, 1));
        let far = distance_code(32_768);
        assert_eq!((far.symbol, far.extra_bits, far.extra_value), (29, 13, 8191));
    }

    #[test]
    fn fixed_code_length_layout() {
        let lengths = fixed_lit_len_lengths();
        assert_eq!(lengths[0], 8);
        assert_eq!(lengths[143], 8);
        assert_eq!(lengths[144], 9);
        assert_eq!(lengths[END_OF_BLOCK], 7);
        assert_eq!(lengths[287], 8);
        assert!(fixed_dist_lengths().iter().all(|&len| len == 5));
    }
}
