#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `compress` holds the software half of the DEFLATE offload engine. It is
//! both the complete software execution path and the toolbox the accelerator
//! path borrows from: Huffman tables built here are loaded into hardware
//! state, stored blocks written here replace overflowed hardware output, and
//! the inflater here verifies what the hardware produced.
//!
//! # Design
//!
//! - [`huffman`] builds length-limited canonical codes from histograms.
//! - [`header`] turns code tables into fixed or dynamic block headers.
//! - [`matcher`] finds LZ77 matches over a bounded history window.
//! - [`block`] encodes tokens with a given pair of code tables.
//! - [`stored`] emits stored blocks after an arbitrary bit offset.
//! - [`deflater`] chains the pieces into a chunked encoder.
//! - [`inflate`] is a resumable decoder that fills any output size exactly.
//! - [`framing`] adds and validates gzip and zlib wrappers.
//!
//! # Invariants
//!
//! - Every code set produced by [`huffman::build`] is complete and respects
//!   its length limit.
//! - [`deflater::Deflater::encode`] and [`matcher::Matcher::tokenize`] never
//!   mutate state; a failed attempt can be retried verbatim.
//! - [`stored::write_stored_blocks`] writes nothing when the destination is too
//!   small.
//!
//! # Errors
//!
//! Encoding reports [`EncodeError`] when supplied code tables lack a code the
//! data needs. Decoding reports [`InflateError`] for malformed streams, and
//! wrapper parsing reports [`FramingError`].
//!
//! # Examples
//!
//! ```
//! use compress::{BlockStyle, CompressionLevel, Inflater, deflate};
//!
//! let data = b"offload offload offload offload";
//! let compressed = deflate(data, CompressionLevel::Default, BlockStyle::Dynamic).unwrap();
//! let restored = Inflater::new().decompress_vec(&compressed).unwrap();
//! assert_eq!(restored, data);
//! ```
//!
//! # See also
//!
//! - `accel` for the accelerator model that consumes these primitives.
//! - `engine` for chunked job execution and path selection.

pub mod bits;
pub mod block;
pub mod deflater;
pub mod framing;
pub mod header;
pub mod huffman;
pub mod inflate;
pub mod level;
pub mod matcher;
pub mod stored;
pub mod tables;

pub use bits::{BitWriter, PartialByte};
pub use block::{EncodeError, encode_tokens, write_end_of_block};
pub use deflater::{BlockStyle, ChunkRequest, Deflater, EncodedChunk, deflate};
pub use framing::{Framing, FramingError, HeaderInfo, zlib_dictionary_header};
pub use header::{BlockType, Histogram, HuffmanTables, write_fixed_header};
pub use huffman::HuffmanCode;
pub use inflate::{CodeKind, InflateError, InflateProgress, Inflater};
pub use level::{CompressionLevel, CompressionLevelError};
pub use matcher::{Matcher, Token};
pub use stored::{
    MAX_STORED_BLOCK_LEN, calculate_size_needed, stored_block_count, write_stored_blocks,
    write_stored_blocks_into,
};
