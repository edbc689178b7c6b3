/// Reflected CRC-32 polynomial used by gzip, zlib and Ethernet.
const GZIP_POLY: u32 = 0xEDB8_8320;

/// Reflected CRC-32C (Castagnoli) polynomial used by iSCSI.
const CASTAGNOLI_POLY: u32 = 0x82F6_3B78;

static GZIP_TABLE: [u32; 256] = make_table(GZIP_POLY);
static CASTAGNOLI_TABLE: [u32; 256] = make_table(CASTAGNOLI_POLY);

const fn make_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ poly
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn update(table: &[u32; 256], seed: u32, data: &[u8]) -> u32 {
    let mut crc = !seed;
    for &byte in data {
        crc = table[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Continues a gzip CRC-32 from `seed` (use `0` for a fresh stream).
#[must_use]
pub fn crc32_gzip(data: &[u8], seed: u32) -> u32 {
    update(&GZIP_TABLE, seed, data)
}

/// Continues a CRC-32C from `seed` (use `0` for a fresh stream).
#[must_use]
pub fn crc32c(data: &[u8], seed: u32) -> u32 {
    update(&CASTAGNOLI_TABLE, seed, data)
}

/// Polynomial selection for [`Crc32`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Crc32Kind {
    /// IEEE 802.3 polynomial used by gzip trailers.
    #[default]
    Gzip,
    /// Castagnoli polynomial.
    Castagnoli,
}

impl Crc32Kind {
    /// Continues a checksum of this kind from `seed`.
    #[must_use]
    pub fn checksum(self, data: &[u8], seed: u32) -> u32 {
        match self {
            Self::Gzip => crc32_gzip(data, seed),
            Self::Castagnoli => crc32c(data, seed),
        }
    }
}

/// Streaming CRC-32 accumulator.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Crc32 {
    kind: Crc32Kind,
    value: u32,
}

impl Crc32 {
    /// Creates an accumulator for a fresh stream.
    #[must_use]
    pub const fn new(kind: Crc32Kind) -> Self {
        Self { kind, value: 0 }
    }

    /// Creates an accumulator that continues from a previously reported value.
    #[must_use]
    pub const fn with_seed(kind: Crc32Kind, seed: u32) -> Self {
        Self { kind, value: seed }
    }

    /// Folds `data` into the running value.
    pub fn update(&mut self, data: &[u8]) {
        self.value = self.kind.checksum(data, self.value);
    }

    /// Returns the finalised checksum of everything seen so far.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Returns the polynomial in use.
    #[must_use]
    pub const fn kind(&self) -> Crc32Kind {
        self.kind
    }

    /// Restarts the accumulator.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}
