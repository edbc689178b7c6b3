//! gzip (RFC 1952) and zlib (RFC 1950) wrappers around raw DEFLATE.

use thiserror::Error;

/// Stream wrapper around the DEFLATE payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Framing {
    /// Bare DEFLATE blocks.
    #[default]
    Raw,
    /// gzip member with CRC-32 and size trailer.
    Gzip,
    /// zlib stream with Adler-32 trailer.
    Zlib,
}

/// Minimal gzip header: deflate, no flags, no mtime, unknown OS.
pub const GZIP_HEADER: [u8; 10] = [0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF];

/// zlib header for a 32 KiB window and the fastest-level hint.
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0x01];

const GZIP_FHCRC: u8 = 0x02;
const GZIP_FEXTRA: u8 = 0x04;
const GZIP_FNAME: u8 = 0x08;
const GZIP_FCOMMENT: u8 = 0x10;
const ZLIB_FDICT: u8 = 0x20;

/// Errors found while parsing wrapper bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum FramingError {
    /// The magic bytes do not identify the expected wrapper.
    #[error("bad {0:?} header magic")]
    BadMagic(Framing),
    /// The compression method is not DEFLATE.
    #[error("unsupported compression method {0}")]
    UnsupportedMethod(u8),
    /// The zlib header check bits are wrong.
    #[error("zlib header check failed")]
    BadCheck,
    /// The trailer checksum does not match the decoded data.
    #[error("trailer checksum {expected:#010x} does not match computed {actual:#010x}")]
    ChecksumMismatch {
        /// Value stored in the trailer.
        expected: u32,
        /// Value computed over the decoded data.
        actual: u32,
    },
    /// The gzip size trailer does not match the decoded length.
    #[error("trailer size {expected} does not match decoded size {actual}")]
    LengthMismatch {
        /// Value stored in the trailer.
        expected: u32,
        /// Decoded length modulo 2^32.
        actual: u32,
    },
}

/// zlib header announcing a preset dictionary with the given Adler-32 id.
#[must_use]
pub const fn zlib_dictionary_header(dictionary_id: u32) -> [u8; 6] {
    let id = dictionary_id.to_be_bytes();
    [0x78, ZLIB_FDICT, id[0], id[1], id[2], id[3]]
}

/// Parsed wrapper header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderInfo {
    /// Header length in bytes.
    pub len: usize,
    /// Whether a zlib stream requires a preset dictionary.
    pub needs_dictionary: bool,
}

impl Framing {
    /// Header bytes written before the first DEFLATE block.
    #[must_use]
    pub const fn header(self) -> &'static [u8] {
        match self {
            Self::Raw => &[],
            Self::Gzip => &GZIP_HEADER,
            Self::Zlib => &ZLIB_HEADER,
        }
    }

    /// Trailer size in bytes.
    #[must_use]
    pub const fn trailer_len(self) -> usize {
        match self {
            Self::Raw => 0,
            Self::Gzip => 8,
            Self::Zlib => 4,
        }
    }

    /// Whether the trailer checksum is Adler-32 instead of CRC-32.
    #[must_use]
    pub const fn uses_adler32(self) -> bool {
        matches!(self, Self::Zlib)
    }

    /// Builds the trailer for a stream with the given checksum and length.
    #[must_use]
    pub fn trailer(self, checksum: u32, total_in: u64) -> Vec<u8> {
        match self {
            Self::Raw => Vec::new(),
            Self::Gzip => {
                let mut trailer = Vec::with_capacity(8);
                trailer.extend_from_slice(&checksum.to_le_bytes());
                trailer.extend_from_slice(&(total_in as u32).to_le_bytes());
                trailer
            }
            Self::Zlib => checksum.to_be_bytes().to_vec(),
        }
    }

    /// Parses a header from the start of `data`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn parse_header(self, data: &[u8]) -> Result<Option<HeaderInfo>, FramingError> {
        match self {
            Self::Raw => Ok(Some(HeaderInfo {
                len: 0,
                needs_dictionary: false,
            })),
            Self::Gzip => parse_gzip_header(data),
            Self::Zlib => parse_zlib_header(data),
        }
    }

    /// Checks a trailer against the decoded data's checksum and length.
    ///
    /// `trailer` must hold exactly [`trailer_len`](Self::trailer_len) bytes.
    pub fn check_trailer(
        self,
        trailer: &[u8],
        checksum: u32,
        total_out: u64,
    ) -> Result<(), FramingError> {
        match self {
            Self::Raw => Ok(()),
            Self::Gzip => {
                let expected = read_u32_le(trailer, 0);
                if expected != checksum {
                    return Err(FramingError::ChecksumMismatch {
                        expected,
                        actual: checksum,
                    });
                }
                let size = read_u32_le(trailer, 4);
                if size != total_out as u32 {
                    return Err(FramingError::LengthMismatch {
                        expected: size,
                        actual: total_out as u32,
                    });
                }
                Ok(())
            }
            Self::Zlib => {
                let expected = trailer
                    .get(..4)
                    .map_or(0, |b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
                if expected == checksum {
                    Ok(())
                } else {
                    Err(FramingError::ChecksumMismatch {
                        expected,
                        actual: checksum,
                    })
                }
            }
        }
    }
}

fn read_u32_le(data: &[u8], at: usize) -> u32 {
    data.get(at..at + 4)
        .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn parse_gzip_header(data: &[u8]) -> Result<Option<HeaderInfo>, FramingError> {
    if data.len() < 10 {
        if data.first().is_some_and(|&b| b != 0x1F) || data.get(1).is_some_and(|&b| b != 0x8B) {
            return Err(FramingError::BadMagic(Framing::Gzip));
        }
        return Ok(None);
    }
    if data[0] != 0x1F || data[1] != 0x8B {
        return Err(FramingError::BadMagic(Framing::Gzip));
    }
    if data[2] != 8 {
        return Err(FramingError::UnsupportedMethod(data[2]));
    }
    let flags = data[3];
    let mut pos = 10;

    if flags & GZIP_FEXTRA != 0 {
        let Some(len) = data.get(pos..pos + 2) else {
            return Ok(None);
        };
        pos += 2 + usize::from(u16::from_le_bytes([len[0], len[1]]));
    }
    for flag in [GZIP_FNAME, GZIP_FCOMMENT] {
        if flags & flag != 0 {
            let Some(rest) = data.get(pos..) else {
                return Ok(None);
            };
            let Some(nul) = rest.iter().position(|&b| b == 0) else {
                return Ok(None);
            };
            pos += nul + 1;
        }
    }
    if flags & GZIP_FHCRC != 0 {
        pos += 2;
    }
    if pos > data.len() {
        return Ok(None);
    }
    Ok(Some(HeaderInfo {
        len: pos,
        needs_dictionary: false,
    }))
}

fn parse_zlib_header(data: &[u8]) -> Result<Option<HeaderInfo>, FramingError> {
    let &[cmf, flg, ..] = data else {
        if let Some(&cmf) = data.first() {
            if cmf & 0x0F != 8 {
                return Err(FramingError::UnsupportedMethod(cmf & 0x0F));
            }
        }
        return Ok(None);
    };
    if cmf & 0x0F != 8 {
        return Err(FramingError::UnsupportedMethod(cmf & 0x0F));
    }
    if cmf >> 4 > 7 {
        return Err(FramingError::BadMagic(Framing::Zlib));
    }
    if (u16::from(cmf) << 8 | u16::from(flg)) % 31 != 0 {
        return Err(FramingError::BadCheck);
    }
    let needs_dictionary = flg & ZLIB_FDICT != 0;
    let len = if needs_dictionary { 6 } else { 2 };
    if data.len() < len {
        return Ok(None);
    }
    Ok(Some(HeaderInfo {
        len,
        needs_dictionary,
    }))
}
