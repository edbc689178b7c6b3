const MOD_ADLER: u32 = 65_521;

/// Largest number of bytes that can be summed before `s2` may overflow `u32`.
const NMAX: usize = 5_552;

/// Seed of a fresh Adler-32 stream.
pub const ADLER32_INITIAL: u32 = 1;

/// Continues an Adler-32 from `seed` (use [`ADLER32_INITIAL`] for a fresh stream).
#[must_use]
pub fn adler32(data: &[u8], seed: u32) -> u32 {
    let mut s1 = seed & 0xFFFF;
    let mut s2 = seed >> 16;

    for block in data.chunks(NMAX) {
        for &byte in block {
            s1 += u32::from(byte);
            s2 += s1;
        }
        s1 %= MOD_ADLER;
        s2 %= MOD_ADLER;
    }

    (s2 << 16) | s1
}

/// Streaming Adler-32 accumulator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Adler32 {
    value: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Adler32 {
    /// Creates an accumulator for a fresh stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: ADLER32_INITIAL,
        }
    }

    /// Creates an accumulator continuing from a previous value.
    #[must_use]
    pub const fn with_seed(seed: u32) -> Self {
        Self { value: seed }
    }

    /// Folds `data` into the running value.
    pub fn update(&mut self, data: &[u8]) {
        self.value = adler32(data, self.value);
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
    fn wikipedia_reference_value() {
        assert_eq!(adler32(b"Wikipedia", ADLER32_INITIAL), 0x11E6_0398);
    }

    #[test]
    fn empty_input_is_initial_value() {
        assert_eq!(adler32(b"", ADLER32_INITIAL), 1);
        assert_eq!(Adler32::new().value(), 1);
    }

    #[test]
    fn long_input_reduces_modulus() {
        let data = vec![0xFFu8; NMAX * 3 + 17];
        let (a, b) = data.split_at(NMAX + 5);
        assert_eq!(
            adler32(b, adler32(a, ADLER32_INITIAL)),
            adler32(&data, ADLER32_INITIAL)
        );
        let value = adler32(&data, ADLER32_INITIAL);
        assert!(value & 0xFFFF < MOD_ADLER);
        assert!(value >> 16 < MOD_ADLER);
    }

    #[test]
    fn streaming_matches_free_function() {
        let mut adler = Adler32::new();
        adler.update(b"Wiki");
        adler.update(b"pedia");
        assert_eq!(adler.value(), 0x11E6_0398);
        assert_eq!(Adler32::with_seed(adler.value()).value(), 0x11E6_0398);
    }
}
