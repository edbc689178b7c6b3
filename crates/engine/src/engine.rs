//! The job executor.

use std::sync::Arc;

use accel::{Dispatcher, Opcode, Submitter};

use crate::config::{EngineConfig, ExecutionPath};
use crate::context::Backend;
use crate::error::{EngineError, EngineResult};
use crate::flags::JobFlags;
use crate::hardware::HardwareStream;
use crate::hw_deflate::{self, DeflateSettings};
use crate::hw_inflate;
use crate::job::{Chunk, Direction, Job};
use crate::software::{self, SoftwareStream};
use crate::status::Progress;

const DEFAULT_GENERATION: u8 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Route {
    Software,
    Hardware { fallback: bool },
}

/// Runs jobs on the accelerator, in software, or both.
///
/// An engine holds no per-stream state and can be shared between threads;
/// each [`Job`] carries its own stream.
///
/// ```
/// use engine::{Engine, EngineConfig, Job, JobFlags, Status};
///
/// let engine = Engine::new(EngineConfig::default());
/// let data = b"hello hello hello hello";
/// let mut job = Job::compress().with_flags(JobFlags::FIRST | JobFlags::LAST);
/// let mut compressed = vec![0u8; 128];
/// let progress = engine.execute(&mut job, data, &mut compressed).unwrap();
/// assert_eq!(progress.status, Status::Ok);
/// compressed.truncate(progress.produced);
///
/// let mut job = Job::decompress().with_flags(JobFlags::FIRST | JobFlags::LAST);
/// let mut restored = vec![0u8; 64];
/// let progress = engine.execute(&mut job, &compressed, &mut restored).unwrap();
/// assert_eq!(&restored[..progress.produced], data);
/// ```
#[derive(Clone, Debug)]
pub struct Engine {
    config: EngineConfig,
    submitter: Option<Submitter>,
}

impl Engine {
    /// A software-only engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            submitter: None,
        }
    }

    /// An engine that submits to the queues behind `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(config: EngineConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            submitter: Some(Submitter::new(dispatcher)),
        }
    }

    /// Engine-wide options.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether any queue can run `direction`.
    #[must_use]
    pub fn accelerates(&self, direction: Direction) -> bool {
        self.submitter
            .as_ref()
            .is_some_and(|submitter| submitter.dispatcher().supports(opcode(direction)))
    }

    /// Processes one chunk of `job`'s stream.
    ///
    /// # Errors
    ///
    /// Parameter and backpressure errors leave the job unchanged, except
    /// that a completed statistics pass is kept for the resubmission.
    /// Transient, integrity and internal errors poison it until
    /// [`Job::reset`].
    pub fn execute(
        &self,
        job: &mut Job,
        input: &[u8],
        output: &mut [u8],
    ) -> EngineResult<Progress> {
        let flags = job.flags;
        let direction = job.direction();
        flags.validate(direction, job.dictionary().is_some())?;
        let position = job.context.admit(flags)?;
        if direction == Direction::Compress
            && !position.is_first()
            && job.context.style != flags.style()
        {
            return Err(EngineError::InvalidCompressStyle);
        }

        let result = if position.is_first() {
            self.start(job, input, output)
        } else {
            self.resume(job, input, output)
        };

        match &result {
            Err(error) if error.class().is_fatal() => {
                job.context.poison();
                logging::trace_job!(code = error.code(), %error, "stream failed");
            }
            Err(error) => {
                logging::trace_job!(code = error.code(), %error, "chunk rejected");
            }
            Ok(progress) => {
                if job.context.is_active() {
                    job.flags.remove(JobFlags::FIRST);
                }
                logging::trace_job!(
                    status = progress.status.code(),
                    consumed = progress.consumed,
                    produced = progress.produced,
                    step = ?job.context.step,
                    "chunk processed"
                );
            }
        }
        result
    }

    fn route(&self, job: &Job) -> EngineResult<Route> {
        let requested = job.requested_path().unwrap_or(self.config.default_path());
        let accelerated = self.accelerates(job.direction());
        match requested {
            ExecutionPath::Software => Ok(Route::Software),
            ExecutionPath::Hardware if accelerated => Ok(Route::Hardware { fallback: false }),
            ExecutionPath::Hardware => Err(EngineError::NotSupportedByQueue),
            ExecutionPath::Auto if accelerated => Ok(Route::Hardware { fallback: true }),
            ExecutionPath::Auto => Ok(Route::Software),
        }
    }

    fn start(&self, job: &mut Job, input: &[u8], output: &mut [u8]) -> EngineResult<Progress> {
        match self.route(job)? {
            Route::Software => {
                self.begin_software(job);
                self.run_software(job, input, output)
            }
            Route::Hardware { fallback } => {
                // A first chunk refused after its statistics pass keeps that pass.
                let resubmitted = job.context.multi_desc_done
                    && job.context.path() == Some(ExecutionPath::Hardware);
                if !resubmitted {
                    let stream = match job.direction() {
                        Direction::Compress => HardwareStream::for_compress()?,
                        Direction::Decompress => HardwareStream::for_decompress()?,
                    };
                    let verify = self.verifies(job, true);
                    job.context
                        .begin(Backend::Hardware(stream), job.flags.style(), verify);
                }
                match self.run_hardware(job, input, output) {
                    Err(error) if fallback => {
                        logging::trace_fallback!(
                            code = error.code(),
                            %error,
                            "first chunk failed on the accelerator, continuing in software"
                        );
                        self.begin_software(job);
                        self.run_software(job, input, output)
                    }
                    result => result,
                }
            }
        }
    }

    fn resume(&self, job: &mut Job, input: &[u8], output: &mut [u8]) -> EngineResult<Progress> {
        if job.direction() == Direction::Decompress && job.context.stream_end {
            // Only trailer bytes remain.
            let taken = job.context.absorb_trailer(job.flags.framing(), input);
            job.context.total_in += taken as u64;
            let status = job.context.finish_decompress(job.flags, true, false)?;
            return Ok(Progress::new(status, taken, 0));
        }
        match job.context.path() {
            Some(ExecutionPath::Hardware) => self.run_hardware(job, input, output),
            Some(_) => self.run_software(job, input, output),
            None => Err(EngineError::Internal("open stream without a codec".into())),
        }
    }

    fn verifies(&self, job: &Job, hardware: bool) -> bool {
        job.direction() == Direction::Compress
            && self.config.verifies()
            && !job.flags.contains(JobFlags::OMIT_VERIFY)
            && (hardware || !job.flags.contains(JobFlags::OMIT_CHECKSUMS))
    }

    fn begin_software(&self, job: &mut Job) {
        let verify = self.verifies(job, false);
        let stream = match job.direction() {
            Direction::Compress => SoftwareStream::deflate(
                job.level().unwrap_or(self.config.default_level()),
                job.dictionary(),
                job.flags,
                verify,
            ),
            Direction::Decompress => SoftwareStream::inflate(job.dictionary()),
        };
        job.context
            .begin(Backend::Software(stream), job.flags.style(), verify);
    }

    fn run_software(
        &self,
        job: &mut Job,
        input: &[u8],
        output: &mut [u8],
    ) -> EngineResult<Progress> {
        let dictionary = job.dictionary.clone();
        let chunk = Chunk {
            flags: job.flags,
            position: job.flags.position(),
            dictionary: dictionary.as_deref(),
        };
        match job.direction() {
            Direction::Compress => {
                software::compress_chunk(&mut job.context, &chunk, input, output)
            }
            Direction::Decompress => {
                software::decompress_chunk(&mut job.context, &chunk, input, output)
            }
        }
    }

    fn run_hardware(
        &self,
        job: &mut Job,
        input: &[u8],
        output: &mut [u8],
    ) -> EngineResult<Progress> {
        let submitter = self
            .submitter
            .as_ref()
            .ok_or(EngineError::NotSupportedByQueue)?;
        let dictionary = job.dictionary.clone();
        let chunk = Chunk {
            flags: job.flags,
            position: job.flags.position(),
            dictionary: dictionary.as_deref(),
        };
        match job.direction() {
            Direction::Compress => hw_deflate::compress_chunk(
                submitter,
                self.deflate_settings(submitter),
                &mut job.context,
                &chunk,
                input,
                output,
            ),
            Direction::Decompress => {
                hw_inflate::decompress_chunk(submitter, &mut job.context, &chunk, input, output)
            }
        }
    }

    fn deflate_settings(&self, submitter: &Submitter) -> DeflateSettings {
        let dispatcher = submitter.dispatcher();
        DeflateSettings {
            one_pass_limit: self.config.one_pass_limit(),
            header_generation: dispatcher.header_generation(),
            generation: self
                .config
                .generation_override()
                .or_else(|| dispatcher.generation(Opcode::Compress))
                .unwrap_or(DEFAULT_GENERATION),
        }
    }
}

const fn opcode(direction: Direction) -> Opcode {
    match direction {
        Direction::Compress => Opcode::Compress,
        Direction::Decompress => Opcode::Decompress,
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
