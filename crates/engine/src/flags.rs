//! Per-call job flags.

use accel::ChunkPosition;
use bitflags::bitflags;
use checksums::Crc32Kind;
use compress::{BlockStyle, Framing};

use crate::error::{EngineError, EngineResult};
use crate::job::Direction;

bitflags! {
    /// Options for one [`Engine::execute`](crate::Engine::execute) call.
    ///
    /// `FIRST` and `LAST` describe where the call's input sits in the stream;
    /// the remaining flags must stay the same for every chunk of a stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JobFlags: u32 {
        /// The input starts a new stream.
        const FIRST = 1 << 0;
        /// The input ends the stream.
        const LAST = 1 << 1;
        /// Skip decoding compressed output back after each chunk.
        const OMIT_VERIFY = 1 << 2;
        /// Build Huffman codes from the data instead of using the fixed codes.
        const DYNAMIC_HUFFMAN = 1 << 3;
        /// Wrap the stream in a gzip header and trailer.
        const GZIP_MODE = 1 << 4;
        /// Wrap the stream in a zlib header and trailer.
        const ZLIB_MODE = 1 << 5;
        /// Report CRC-32C instead of the gzip CRC-32.
        const CRC32C = 1 << 6;
        /// Emit Huffman codes as big-endian 16-bit words.
        const HUFFMAN_BE = 1 << 7;
        /// Huffman-only stream without block headers.
        const NO_HDRS = 1 << 8;
        /// Close the open fixed block and start a new one.
        const START_NEW_BLOCK = 1 << 9;
        /// Use pre-built canned Huffman tables.
        const CANNED_MODE = 1 << 10;
        /// Skip CRC and XOR computation on the software path.
        const OMIT_CHECKSUMS = 1 << 11;
    }
}

impl JobFlags {
    /// Rejects flag combinations before any work is done.
    pub fn validate(self, direction: Direction, has_dictionary: bool) -> EngineResult<()> {
        if self.contains(Self::HUFFMAN_BE) && !self.contains(Self::NO_HDRS) {
            return Err(EngineError::FlagConflict(
                "big-endian Huffman codes require a headerless stream",
            ));
        }
        if self.contains(Self::NO_HDRS) {
            return Err(EngineError::NotSupportedMode("headerless Huffman-only streams"));
        }
        if self.contains(Self::CANNED_MODE) {
            return Err(EngineError::NotSupportedMode("canned Huffman tables"));
        }
        if self.contains(Self::GZIP_MODE | Self::ZLIB_MODE) {
            return Err(EngineError::FlagConflict("gzip and zlib framing are exclusive"));
        }
        if self.contains(Self::GZIP_MODE) && self.contains(Self::CRC32C) {
            return Err(EngineError::FlagConflict("gzip trailers carry the gzip CRC-32"));
        }
        if self.intersects(Self::GZIP_MODE | Self::ZLIB_MODE)
            && self.contains(Self::OMIT_CHECKSUMS)
        {
            return Err(EngineError::FlagConflict("framed streams need their checksums"));
        }
        if has_dictionary && self.contains(Self::GZIP_MODE) {
            return Err(EngineError::FlagConflict("gzip cannot announce a preset dictionary"));
        }
        if direction == Direction::Decompress && self.contains(Self::START_NEW_BLOCK) {
            return Err(EngineError::FlagConflict("block boundaries only apply to compression"));
        }
        Ok(())
    }

    /// Position of the call's input in its stream.
    #[must_use]
    pub fn position(self) -> ChunkPosition {
        ChunkPosition::from_flags(self.contains(Self::FIRST), self.contains(Self::LAST))
    }

    /// Stream wrapper.
    #[must_use]
    pub fn framing(self) -> Framing {
        if self.contains(Self::GZIP_MODE) {
            Framing::Gzip
        } else if self.contains(Self::ZLIB_MODE) {
            Framing::Zlib
        } else {
            Framing::Raw
        }
    }

    /// Block layout for compression.
    #[must_use]
    pub fn style(self) -> BlockStyle {
        if self.contains(Self::DYNAMIC_HUFFMAN) {
            BlockStyle::Dynamic
        } else {
            BlockStyle::Fixed
        }
    }

    /// CRC polynomial.
    #[must_use]
    pub fn crc_kind(self) -> Crc32Kind {
        if self.contains(Self::CRC32C) {
            Crc32Kind::Castagnoli
        } else {
            Crc32Kind::Gzip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_modes_and_conflicts_are_rejected() {
        let compress = Direction::Compress;
        assert_eq!(
            (JobFlags::NO_HDRS).validate(compress, false).map_err(|e| e.code()),
            Err(52)
        );
        assert_eq!(
            (JobFlags::HUFFMAN_BE).validate(compress, false).map_err(|e| e.code()),
            Err(56)
        );
        assert_eq!(
            (JobFlags::HUFFMAN_BE | JobFlags::NO_HDRS)
                .validate(compress, false)
                .map_err(|e| e.code()),
            Err(52)
        );
        assert_eq!(
            (JobFlags::GZIP_MODE | JobFlags::ZLIB_MODE)
                .validate(compress, false)
                .map_err(|e| e.code()),
            Err(56)
        );
        assert_eq!(
            JobFlags::GZIP_MODE.validate(compress, true).map_err(|e| e.code()),
            Err(56)
        );
        assert!((JobFlags::ZLIB_MODE | JobFlags::FIRST).validate(compress, true).is_ok());
    }

    #[test]
    fn derived_settings() {
        let flags = JobFlags::FIRST | JobFlags::LAST | JobFlags::ZLIB_MODE;
        assert_eq!(flags.position(), ChunkPosition::Single);
        assert_eq!(flags.framing(), Framing::Zlib);
        assert_eq!(flags.style(), BlockStyle::Fixed);
        assert_eq!(JobFlags::CRC32C.crc_kind(), Crc32Kind::Castagnoli);
        assert_eq!(JobFlags::LAST.position(), ChunkPosition::Last);
    }
}
