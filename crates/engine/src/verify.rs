//! Decoding compressed output back to check it.
//!
//! Software streams feed every chunk through a [`Verifier`]. Accelerator
//! streams run a decompress pass with output suppressed against a dedicated
//! AECS pair, so the device's own decoder checks the device's own output.
//! Both compare the CRC of the decoded data with the CRC of the source once
//! the stream ends.

use accel::memory::lock;
use accel::{
    ChunkPosition, DecompressFlags, DecompressOp, Operation, SharedMemory, Submitter,
    verify_access,
};
use checksums::Crc32Kind;
use compress::{InflateError, Inflater};
use thiserror::Error;

use crate::error::{EngineError, EngineResult};
use crate::hardware::{self, VERIFY_AECS};

const SCRATCH: usize = 32 * 1024;

/// Why verification rejected compressed output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum VerifyFailure {
    /// Decoded data has a different checksum than the source.
    #[error("decoded CRC {actual:#010x} differs from source CRC {expected:#010x}")]
    ChecksumMismatch {
        /// CRC of the source data.
        expected: u32,
        /// CRC of the decoded data.
        actual: u32,
    },
    /// The output does not decode.
    #[error("compressed output does not decode: {0}")]
    Decode(InflateError),
    /// The accelerator's decoder rejected the output.
    #[error("accelerator rejected compressed output with error {error_code}")]
    Hardware {
        /// Operation error code.
        error_code: u8,
    },
}

/// Incremental decoder that checks a compressed stream chunk by chunk.
///
/// ```
/// use checksums::{Crc32Kind, crc32_gzip};
/// use compress::{BlockStyle, CompressionLevel, deflate};
/// use engine::Verifier;
///
/// let data = b"verify me, verify me";
/// let compressed = deflate(data, CompressionLevel::Default, BlockStyle::Fixed).unwrap();
/// let mut verifier = Verifier::new(Crc32Kind::Gzip, None);
/// verifier.feed(&compressed).unwrap();
/// verifier.finish(crc32_gzip(data, 0)).unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct Verifier {
    inflater: Inflater,
    kind: Crc32Kind,
    crc: u32,
    decoded: u64,
}

impl Verifier {
    /// Creates a verifier; `dictionary` must match the compressor's.
    #[must_use]
    pub fn new(kind: Crc32Kind, dictionary: Option<&[u8]>) -> Self {
        Self {
            inflater: dictionary.map_or_else(Inflater::new, Inflater::with_dictionary),
            kind,
            crc: 0,
            decoded: 0,
        }
    }

    /// Decodes the next piece of compressed output.
    pub fn feed(&mut self, compressed: &[u8]) -> Result<(), VerifyFailure> {
        let mut scratch = vec![0u8; SCRATCH];
        let mut pending = compressed;
        loop {
            let progress = self
                .inflater
                .decompress(pending, &mut scratch)
                .map_err(VerifyFailure::Decode)?;
            self.crc = self.kind.checksum(&scratch[..progress.produced], self.crc);
            self.decoded += progress.produced as u64;
            pending = &pending[progress.consumed..];
            if progress.finished || progress.produced < scratch.len() {
                return Ok(());
            }
        }
    }

    /// Running CRC of everything decoded so far.
    #[must_use]
    pub const fn crc(&self) -> u32 {
        self.crc
    }

    /// Bytes decoded so far.
    #[must_use]
    pub const fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Checks that the stream ended and decoded to data with CRC `expected`.
    pub fn finish(&self, expected: u32) -> Result<(), VerifyFailure> {
        if !self.inflater.is_finished() {
            return Err(VerifyFailure::Decode(InflateError::Truncated));
        }
        if self.crc != expected {
            return Err(VerifyFailure::ChecksumMismatch {
                expected,
                actual: self.crc,
            });
        }
        Ok(())
    }
}

/// Decodes a chunk of device output on the device.
///
/// `expected` is the running source CRC; it is compared on the last chunk.
pub(crate) fn verify_on_device(
    submitter: &Submitter,
    memory: &SharedMemory,
    position: ChunkPosition,
    compressed: &[u8],
    expected: u32,
    crc32c: bool,
) -> EngineResult<()> {
    let access = lock(memory)
        .decompress_aecs_mut(VERIFY_AECS)
        .map_err(hardware::internal)?
        .access(verify_access(position));
    let operation = Operation::Decompress(DecompressOp {
        flags: DecompressFlags::ENABLE | DecompressFlags::SUPPRESS_OUTPUT,
    });
    let descriptor = hardware::descriptor(
        operation,
        access,
        hardware::verify_aecs(),
        compressed.len(),
        0,
        crc32c,
    )?;
    let completed = match hardware::run_pass(submitter, memory, &descriptor, compressed) {
        Ok((completed, _)) => completed,
        Err(EngineError::Hardware { error_code, .. }) => {
            return Err(VerifyFailure::Hardware { error_code }.into());
        }
        Err(error) => return Err(error),
    };
    let record = completed.record;
    if access.wrote(completed.overflowed(), record.end_of_stream) {
        lock(memory)
            .decompress_aecs_mut(VERIFY_AECS)
            .map_err(hardware::internal)?
            .toggle();
    }
    logging::trace_verify!(
        position = ?position,
        decoded_crc = record.crc,
        finished = record.end_of_stream,
        "verified chunk on the accelerator"
    );
    if position.is_last() {
        if !record.end_of_stream {
            return Err(VerifyFailure::Decode(InflateError::Truncated).into());
        }
        if record.crc != expected {
            return Err(VerifyFailure::ChecksumMismatch {
                expected,
                actual: record.crc,
            }
            .into());
        }
    }
    Ok(())
}
