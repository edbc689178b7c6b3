//! LSB-first bit packing for DEFLATE output.

use crate::huffman::HuffmanCode;

/// Trailing bits that did not fill a whole output byte.
///
/// Chunked streams carry this value from one submission to the next, the
/// same way the accelerator keeps partial bytes in its output accumulator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct PartialByte {
    value: u8,
    bits: u8,
}

impl PartialByte {
    /// Creates a partial byte holding the low `bits` bits of `value`.
    #[must_use]
    pub const fn new(value: u8, bits: u8) -> Self {
        let bits = if bits > 7 { 7 } else { bits };
        let mask = ((1u16 << bits) - 1) as u8;
        Self {
            value: value & mask,
            bits,
        }
    }

    /// Returns the pending bit values, right-aligned.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.value
    }

    /// Returns how many bits are pending (`0..=7`).
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.bits
    }

    /// Returns `true` when no bits are pending.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }
}

/// Accumulates bits LSB-first into a growable byte buffer.
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    acc_bits: u32,
}

impl BitWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            acc: 0,
            acc_bits: 0,
        }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            acc: 0,
            acc_bits: 0,
        }
    }

    /// Creates a writer that continues after a carried partial byte.
    #[must_use]
    pub fn from_partial(partial: PartialByte) -> Self {
        let mut writer = Self::new();
        writer.write_bits(u32::from(partial.value()), u32::from(partial.bits()));
        writer
    }

    /// Creates a writer preloaded with the first `bit_len` bits of `bytes`.
    #[must_use]
    pub fn from_bits(bytes: &[u8], bit_len: usize) -> Self {
        let whole = (bit_len / 8).min(bytes.len());
        let mut writer = Self::with_capacity(whole + 1);
        writer.bytes.extend_from_slice(&bytes[..whole]);
        let rest = (bit_len % 8) as u32;
        if rest > 0 {
            if let Some(&last) = bytes.get(whole) {
                writer.write_bits(u32::from(last), rest);
            }
        }
        writer
    }

    /// Appends the low `count` bits of `value` (`count <= 32`).
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u32) {
        if count == 0 {
            return;
        }
        let mask = if count >= 32 {
            u64::from(u32::MAX)
        } else {
            (1u64 << count) - 1
        };
        self.acc |= (u64::from(value) & mask) << self.acc_bits;
        self.acc_bits += count;
        while self.acc_bits >= 8 {
            self.bytes.push(self.acc as u8);
            self.acc >>= 8;
            self.acc_bits -= 8;
        }
    }

    /// Appends a Huffman code (already bit-reversed).
    #[inline]
    pub fn write_code(&mut self, code: HuffmanCode) {
        self.write_bits(u32::from(code.code()), u32::from(code.len()));
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        if self.acc_bits > 0 {
            self.write_bits(0, 8 - self.acc_bits);
        }
    }

    /// Appends raw bytes; the writer must be byte aligned.
    pub fn write_aligned_bytes(&mut self, data: &[u8]) {
        debug_assert_eq!(self.acc_bits, 0, "raw bytes require byte alignment");
        self.bytes.extend_from_slice(data);
    }

    /// Total number of bits written so far.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.acc_bits as usize
    }

    /// Bytes that are already complete.
    #[must_use]
    pub fn whole_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Trailing bits that do not fill a byte yet.
    #[must_use]
    pub fn partial(&self) -> PartialByte {
        PartialByte::new(self.acc as u8, self.acc_bits as u8)
    }

    /// Consumes the writer, padding the final partial byte with zeros.
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.bytes
    }

    /// Consumes the writer, returning whole bytes and the unfinished tail.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, PartialByte) {
        let partial = self.partial();
        (self.bytes, partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_least_significant_bit_first() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1, 1);
        writer.write_bits(0b01, 2);
        writer.write_bits(0b11111, 5);
        assert_eq!(writer.into_bytes(), vec![0b1111_1011]);
    }

    #[test]
    fn carries_partial_byte_between_writers() {
        let mut first = BitWriter::new();
        first.write_bits(0x3FF, 10);
        let (bytes, partial) = first.into_parts();
        assert_eq!(bytes, vec![0xFF]);
        assert_eq!(partial, PartialByte::new(0b11, 2));

        let mut second = BitWriter::from_partial(partial);
        second.write_bits(0, 6);
        assert_eq!(second.into_bytes(), vec![0b0000_0011]);
    }

    #[test]
    fn from_bits_truncates_to_bit_length() {
        let writer = BitWriter::from_bits(&[0xAB, 0xFF], 12);
        assert_eq!(writer.bit_len(), 12);
        assert_eq!(writer.whole_bytes(), &[0xAB]);
        assert_eq!(writer.partial(), PartialByte::new(0x0F, 4));
    }

    #[test]
    fn align_pads_with_zeros() {
        let mut writer = BitWriter::new();
        writer.write_bits(1, 3);
        writer.align_to_byte();
        writer.write_aligned_bytes(&[0x55]);
        assert_eq!(writer.into_bytes(), vec![0x01, 0x55]);
    }

    #[test]
    fn partial_byte_masks_value() {
        let partial = PartialByte::new(0xFF, 3);
        assert_eq!(partial.value(), 0b111);
        assert!(!partial.is_empty());
        assert!(PartialByte::default().is_empty());
    }
}
