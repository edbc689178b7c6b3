//! Generation-1 big-endian Huffman output correction.
//!
//! First-generation devices misreport the size of the final compressed chunk
//! when codes are emitted as 16-bit big-endian words. The output is always a
//! whole number of 16-bit words, but the record can describe an odd byte
//! count or a zero bit count. The correction below restores a consistent
//! word count and must only be applied when [`needs_be16_erratum`] holds.

use crate::completion::CompletionRecord;

/// Whether a completion record needs [`apply_be16_erratum`].
#[must_use]
pub const fn needs_be16_erratum(generation: u8, huffman_be: bool, is_last: bool) -> bool {
    generation < 2 && huffman_be && is_last
}

/// Adjusts `output_size` and `output_bits` of an affected record.
pub fn apply_be16_erratum(record: &mut CompletionRecord) {
    if record.output_size & 1 == 1 {
        if record.output_bits != 0 {
            record.output_bits += 8;
        }
        record.output_size &= !1;
    } else if record.output_bits == 0 {
        record.output_bits = 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size: u32, bits: u8) -> CompletionRecord {
        CompletionRecord {
            output_size: size,
            output_bits: bits,
            ..CompletionRecord::default()
        }
    }

    #[test]
    fn trigger_requires_generation_one_big_endian_last_chunk() {
        assert!(needs_be16_erratum(1, true, true));
        assert!(!needs_be16_erratum(2, true, true));
        assert!(!needs_be16_erratum(1, false, true));
        assert!(!needs_be16_erratum(1, true, false));
    }

    #[test]
    fn odd_sizes_fold_the_last_byte_into_bits() {
        let mut odd = record(11, 3);
        apply_be16_erratum(&mut odd);
        assert_eq!((odd.output_size, odd.output_bits), (10, 11));

        let mut aligned = record(11, 0);
        apply_be16_erratum(&mut aligned);
        assert_eq!((aligned.output_size, aligned.output_bits), (10, 0));
    }

    #[test]
    fn even_sizes_mark_a_full_final_byte() {
        let mut even = record(10, 0);
        apply_be16_erratum(&mut even);
        assert_eq!((even.output_size, even.output_bits), (10, 8));

        let mut partial = record(10, 5);
        apply_be16_erratum(&mut partial);
        assert_eq!((partial.output_size, partial.output_bits), (10, 5));
    }
}
