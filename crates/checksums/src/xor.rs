/// Continues the accelerator's XOR checksum from `seed`.
///
/// The checksum XORs the input as little-endian 16-bit words. A trailing odd
/// byte is treated as the low half of a final word.
#[must_use]
pub fn xor_checksum(data: &[u8], seed: u32) -> u32 {
    let mut value = seed & 0xFFFF;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        value ^= u32::from(u16::from_le_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        value ^= u32::from(*last);
    }
    value
}

/// Streaming XOR checksum accumulator.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct XorChecksum {
    value: u32,
}

impl XorChecksum {
    /// Creates an accumulator for a fresh stream.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Folds `data` into the running value.
    pub fn update(&mut self, data: &[u8]) {
        self.value = xor_checksum(data, self.value);
    }

    /// Returns the checksum of everything seen so far.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_little_endian_words() {
        assert_eq!(xor_checksum(&[0x01, 0x02], 0), 0x0201);
        assert_eq!(xor_checksum(&[0x01, 0x02, 0x01, 0x02], 0), 0);
    }

    #[test]
    fn odd_tail_is_zero_extended() {
        assert_eq!(xor_checksum(&[0x01, 0x02, 0xFF], 0), 0x02FE);
    }

    #[test]
    fn seed_is_truncated_to_sixteen_bits() {
        assert_eq!(xor_checksum(&[], 0xABCD_1234), 0x1234);
    }

    #[test]
    fn even_splits_continue_exactly() {
        let data: Vec<u8> = (0..=255).collect();
        let (a, b) = data.split_at(100);
        let mut xor = XorChecksum::new();
        xor.update(a);
        xor.update(b);
        assert_eq!(xor.value(), xor_checksum(&data, 0));
    }
}
