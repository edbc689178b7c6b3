//! Jobs: one compressed stream and the caller's per-call flags.

use std::sync::Arc;

use accel::ChunkPosition;
use compress::CompressionLevel;

use crate::config::ExecutionPath;
use crate::context::{ExecutionStep, ProcessingStep, StreamContext};
use crate::flags::JobFlags;

/// Whether a job compresses or decompresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Raw data in, DEFLATE out.
    Compress,
    /// DEFLATE in, raw data out.
    Decompress,
}

/// A stream processed over one or more [`Engine::execute`](crate::Engine::execute) calls.
///
/// Set [`JobFlags::FIRST`] on the call that starts a stream and
/// [`JobFlags::LAST`] on the call whose input ends it. The engine clears
/// `FIRST` once the stream has started, so a caller resubmitting after
/// `MoreOutputNeeded` can reuse the flags as they are.
///
/// ```
/// use engine::{Job, JobFlags, ProcessingStep};
///
/// let mut job = Job::compress().with_flags(JobFlags::FIRST | JobFlags::LAST);
/// assert_eq!(job.step(), ProcessingStep::Ready);
/// job.flags |= JobFlags::GZIP_MODE;
/// assert!(job.flags.contains(JobFlags::GZIP_MODE));
/// ```
#[derive(Debug)]
pub struct Job {
    direction: Direction,
    /// Flags for the next call.
    pub flags: JobFlags,
    path: Option<ExecutionPath>,
    level: Option<CompressionLevel>,
    pub(crate) dictionary: Option<Arc<[u8]>>,
    pub(crate) context: StreamContext,
}

impl Job {
    /// A compression job.
    #[must_use]
    pub fn compress() -> Self {
        Self::new(Direction::Compress)
    }

    /// A decompression job.
    #[must_use]
    pub fn decompress() -> Self {
        Self::new(Direction::Decompress)
    }

    fn new(direction: Direction) -> Self {
        Self {
            direction,
            flags: JobFlags::empty(),
            path: None,
            level: None,
            dictionary: None,
            context: StreamContext::default(),
        }
    }

    /// Sets the flags for the next call.
    #[must_use]
    pub fn with_flags(mut self, flags: JobFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Pins the job to a path instead of the engine default.
    #[must_use]
    pub fn with_path(mut self, path: ExecutionPath) -> Self {
        self.path = Some(path);
        self
    }

    /// Sets the software compression level.
    #[must_use]
    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Primes the stream with a preset dictionary.
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: impl Into<Arc<[u8]>>) -> Self {
        self.dictionary = Some(dictionary.into());
        self
    }

    /// Compress or decompress.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Path requested for this job, if any.
    #[must_use]
    pub const fn requested_path(&self) -> Option<ExecutionPath> {
        self.path
    }

    /// Requested compression level, if any.
    #[must_use]
    pub const fn level(&self) -> Option<CompressionLevel> {
        self.level
    }

    /// The preset dictionary.
    #[must_use]
    pub fn dictionary(&self) -> Option<&[u8]> {
        self.dictionary.as_deref()
    }

    /// Stream position between calls.
    #[must_use]
    pub fn step(&self) -> ProcessingStep {
        self.context.step
    }

    /// Block-level position of a compressed stream.
    #[must_use]
    pub fn execution_step(&self) -> ExecutionStep {
        self.context.execution
    }

    /// Path the current or last stream ran on.
    #[must_use]
    pub fn path_used(&self) -> Option<ExecutionPath> {
        self.context.path()
    }

    /// Running CRC of the uncompressed data.
    #[must_use]
    pub fn crc(&self) -> u32 {
        self.context.crc
    }

    /// Running XOR checksum of the uncompressed data.
    #[must_use]
    pub fn xor(&self) -> u32 {
        self.context.xor
    }

    /// Running Adler-32 of the uncompressed data in zlib streams.
    #[must_use]
    pub fn adler(&self) -> u32 {
        self.context.adler
    }

    /// Input bytes consumed by the stream so far.
    #[must_use]
    pub fn total_in(&self) -> u64 {
        self.context.total_in
    }

    /// Output bytes produced by the stream so far.
    #[must_use]
    pub fn total_out(&self) -> u64 {
        self.context.total_out
    }

    /// Whether the last stream ended successfully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.context.completed
    }

    /// Whether an earlier error left the stream unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.context.poisoned
    }

    /// Drops all stream state; the next call must carry `FIRST`.
    pub fn reset(&mut self) {
        self.context = StreamContext::default();
    }
}

/// Per-call view handed to the codec paths.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Chunk<'a> {
    pub(crate) flags: JobFlags,
    pub(crate) position: ChunkPosition,
    pub(crate) dictionary: Option<&'a [u8]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_jobs_are_ready_with_neutral_checksums() {
        let job = Job::decompress();
        assert_eq!(job.direction(), Direction::Decompress);
        assert_eq!(job.step(), ProcessingStep::Ready);
        assert_eq!(job.adler(), 1);
        assert_eq!(job.crc(), 0);
        assert_eq!(job.path_used(), None);
        assert!(!job.is_complete());
    }

    #[test]
    fn builders_record_choices() {
        let job = Job::compress()
            .with_path(ExecutionPath::Software)
            .with_level(CompressionLevel::High)
            .with_dictionary(b"abc".to_vec());
        assert_eq!(job.requested_path(), Some(ExecutionPath::Software));
        assert_eq!(job.level(), Some(CompressionLevel::High));
        assert_eq!(job.dictionary(), Some(&b"abc"[..]));
    }
}
