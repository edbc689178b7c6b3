//! Per-stream state and the chunk state machine.
//!
//! A stream moves `Ready -> FirstChunk -> InProgress* -> Ready`, driven by
//! the caller's `FIRST`/`LAST` flags. A chunk that ends the stream returns it
//! to `Ready`; a last chunk that could not finish (output or input ran out)
//! leaves it in `LastChunk` or `SingleChunk` until a later call finishes it.
//! Admission is decided before any pass runs and never changes state;
//! [`StreamContext::commit`] is the only transition.

use accel::ChunkPosition;
use checksums::{ADLER32_INITIAL, adler32};
use compress::{BlockStyle, Framing, zlib_dictionary_header};

use crate::config::ExecutionPath;
use crate::error::{EngineError, EngineResult};
use crate::flags::JobFlags;
use crate::hardware::HardwareStream;
use crate::software::SoftwareStream;
use crate::status::Status;

/// Where a stream stands between calls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ProcessingStep {
    /// No stream is open.
    #[default]
    Ready,
    /// The first chunk was processed.
    FirstChunk,
    /// A middle chunk was processed.
    InProgress,
    /// A last chunk was partly processed.
    LastChunk,
    /// A single-chunk stream was partly processed.
    SingleChunk,
}

/// Block-level progress of a compressed stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ExecutionStep {
    /// The next chunk starts a new block.
    #[default]
    HeaderInserting,
    /// A fixed block is open and the next chunk continues it.
    DataProcessing,
    /// The final block was written.
    Completed,
}

#[derive(Debug, Default)]
pub(crate) enum Backend {
    #[default]
    Idle,
    Software(SoftwareStream),
    Hardware(HardwareStream),
}

#[derive(Debug)]
pub(crate) struct StreamContext {
    pub(crate) step: ProcessingStep,
    pub(crate) execution: ExecutionStep,
    pub(crate) completed: bool,
    pub(crate) poisoned: bool,
    pub(crate) style: BlockStyle,
    pub(crate) verify: bool,
    pub(crate) crc: u32,
    pub(crate) xor: u32,
    pub(crate) adler: u32,
    pub(crate) total_in: u64,
    pub(crate) total_out: u64,
    /// The statistics pass of the pending dynamic block already ran.
    pub(crate) multi_desc_done: bool,
    /// Accumulator bits that precede the block header of the pending chunk.
    pub(crate) saved_bits: usize,
    /// The previous decompress pass overflowed its output.
    pub(crate) continuation: bool,
    /// The DEFLATE data ended; only trailer bytes remain.
    pub(crate) stream_end: bool,
    pub(crate) trailer: Vec<u8>,
    pub(crate) backend: Backend,
}

impl Default for StreamContext {
    fn default() -> Self {
        Self {
            step: ProcessingStep::Ready,
            execution: ExecutionStep::HeaderInserting,
            completed: false,
            poisoned: false,
            style: BlockStyle::Fixed,
            verify: false,
            crc: 0,
            xor: 0,
            adler: ADLER32_INITIAL,
            total_in: 0,
            total_out: 0,
            multi_desc_done: false,
            saved_bits: 0,
            continuation: false,
            stream_end: false,
            trailer: Vec::new(),
            backend: Backend::Idle,
        }
    }
}

impl StreamContext {
    /// Whether a stream is open.
    pub(crate) fn is_active(&self) -> bool {
        self.step != ProcessingStep::Ready
    }

    /// Decides whether a chunk with `flags` may run.
    pub(crate) fn admit(&self, flags: JobFlags) -> EngineResult<ChunkPosition> {
        if self.poisoned {
            return Err(EngineError::NotContinuable("the stream failed; reset the job"));
        }
        let position = flags.position();
        if position.is_first() {
            if self.is_active() {
                return Err(EngineError::NotContinuable(
                    "a stream is already in progress; reset the job first",
                ));
            }
        } else if !self.is_active() {
            return Err(EngineError::NotContinuable(if self.completed {
                "the stream already ended"
            } else {
                "no stream was started"
            }));
        }
        Ok(position)
    }

    /// Opens a stream on `backend`, discarding all previous state.
    pub(crate) fn begin(&mut self, backend: Backend, style: BlockStyle, verify: bool) {
        *self = Self {
            style,
            verify,
            backend,
            ..Self::default()
        };
    }

    /// Records a processed chunk.
    pub(crate) fn commit(&mut self, position: ChunkPosition, complete: bool) {
        if complete {
            self.step = ProcessingStep::Ready;
            self.completed = true;
            self.continuation = false;
            return;
        }
        self.step = match position {
            ChunkPosition::First => ProcessingStep::FirstChunk,
            ChunkPosition::Middle => ProcessingStep::InProgress,
            ChunkPosition::Last => ProcessingStep::LastChunk,
            ChunkPosition::Single => ProcessingStep::SingleChunk,
        };
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    pub(crate) fn path(&self) -> Option<ExecutionPath> {
        match self.backend {
            Backend::Idle => None,
            Backend::Software(_) => Some(ExecutionPath::Software),
            Backend::Hardware(_) => Some(ExecutionPath::Hardware),
        }
    }

    pub(crate) fn hardware_mut(&mut self) -> EngineResult<&mut HardwareStream> {
        match &mut self.backend {
            Backend::Hardware(stream) => Ok(stream),
            _ => Err(EngineError::Internal("stream has no accelerator state".into())),
        }
    }

    pub(crate) fn software_mut(&mut self) -> EngineResult<&mut SoftwareStream> {
        match &mut self.backend {
            Backend::Software(stream) => Ok(stream),
            _ => Err(EngineError::Internal("stream has no software codec".into())),
        }
    }

    /// Takes trailer bytes from the front of `bytes`; returns how many.
    pub(crate) fn absorb_trailer(&mut self, framing: Framing, bytes: &[u8]) -> usize {
        let wanted = framing.trailer_len().saturating_sub(self.trailer.len());
        let taken = wanted.min(bytes.len());
        self.trailer.extend_from_slice(&bytes[..taken]);
        taken
    }

    /// Commits a decompression call and picks its status.
    ///
    /// Checksums and totals must already include the call's output.
    pub(crate) fn finish_decompress(
        &mut self,
        flags: JobFlags,
        finished: bool,
        output_full: bool,
    ) -> EngineResult<Status> {
        let position = flags.position();
        let framing = flags.framing();
        if finished {
            self.stream_end = true;
            if self.trailer.len() == framing.trailer_len() {
                let checksum = if framing.uses_adler32() { self.adler } else { self.crc };
                framing.check_trailer(&self.trailer, checksum, self.total_out)?;
                self.commit(position, true);
                return Ok(Status::Ok);
            }
            self.commit(position, false);
            return Ok(if position.is_last() {
                Status::MoreInputNeeded
            } else {
                Status::Ok
            });
        }
        self.commit(position, false);
        Ok(if output_full {
            Status::MoreOutputNeeded
        } else if position.is_last() {
            Status::MoreInputNeeded
        } else {
            Status::Ok
        })
    }
}

/// Wrapper header written before the first block.
pub(crate) fn stream_header(framing: Framing, dictionary: Option<&[u8]>) -> Vec<u8> {
    match (framing, dictionary) {
        (Framing::Zlib, Some(dictionary)) => {
            zlib_dictionary_header(adler32(dictionary, ADLER32_INITIAL)).to_vec()
        }
        _ => framing.header().to_vec(),
    }
}

/// Parses the wrapper header at the start of a compressed stream.
///
/// `Ok(None)` means the header is incomplete.
pub(crate) fn parse_stream_header(
    framing: Framing,
    has_dictionary: bool,
    input: &[u8],
) -> EngineResult<Option<usize>> {
    match framing.parse_header(input)? {
        None => Ok(None),
        Some(info) if info.needs_dictionary && !has_dictionary => {
            Err(EngineError::DictionaryRequired)
        }
        Some(info) => Ok(Some(info.len)),
    }
}
