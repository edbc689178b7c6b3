#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` provides the running checksums that a chunked DEFLATE stream
//! carries from one submission to the next: CRC-32 with the gzip polynomial,
//! CRC-32C (Castagnoli), the 16-bit XOR checksum reported by the accelerator
//! and Adler-32 for zlib framing.
//!
//! # Design
//!
//! Every checksum is *seedable*: the free functions take the value produced
//! by the previous chunk and continue from it, so that
//! `crc32_gzip(b, crc32_gzip(a, 0)) == crc32_gzip(ab, 0)`. The streaming
//! types ([`Crc32`], [`Adler32`], [`XorChecksum`]) wrap the same functions for
//! callers that prefer an accumulator object.
//!
//! # Invariants
//!
//! - CRC seeds are *finalised* values (already inverted), matching the value
//!   stored in completion records and AECS slots.
//! - The XOR checksum folds little-endian 16-bit words; a trailing odd byte is
//!   zero-extended. Continuation is exact only when every chunk but the last
//!   has even length.
//! - Adler-32 seeds start at `1`.
//!
//! # Examples
//!
//! ```
//! use checksums::{crc32_gzip, Crc32, Crc32Kind};
//!
//! let whole = crc32_gzip(b"123456789", 0);
//! assert_eq!(whole, 0xCBF4_3926);
//!
//! let mut running = Crc32::new(Crc32Kind::Gzip);
//! running.update(b"1234");
//! running.update(b"56789");
//! assert_eq!(running.value(), whole);
//! ```
//!
//! # See also
//!
//! - `compress::framing` for the gzip and zlib trailers built from these values.

mod adler32;
mod crc32;
mod xor;

pub use adler32::{ADLER32_INITIAL, Adler32, adler32};
pub use crc32::{Crc32, Crc32Kind, crc32_gzip, crc32c};
pub use xor::{XorChecksum, xor_checksum};
