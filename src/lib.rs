#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `deflate-offload` is the single entry point of the workspace. It
//! re-exports the job API of [`engine`] at the top level and the member
//! crates as modules for callers that need the lower layers: building their
//! own [`WorkQueue`](accel::WorkQueue), reading AECS wire images, or using
//! the software codec directly.
//!
//! # Design
//!
//! - [`Engine`] runs [`Job`]s chunk by chunk on the accelerator, in
//!   software, or on the accelerator with a software fallback.
//! - [`accel`] holds the device boundary and an [`EmulatedDevice`] that
//!   behaves like a queue of a real accelerator, fault injection included.
//! - [`compress`] and [`checksums`] are the software codec and the running
//!   checksums both paths report.
//! - [`logging`] installs a subscriber for binaries; the library only emits
//!   events.
//!
//! # Invariants
//!
//! - Every stream either ends with `Status::Ok` on its `LAST` chunk or with
//!   an error that tells, through [`ErrorClass`], whether it can continue.
//! - Output of both paths is standard DEFLATE, optionally wrapped in gzip or
//!   zlib framing.
//!
//! # Errors
//!
//! Job failures are [`EngineError`]s. Their [`code`](EngineError::code)
//! values are stable and grouped by range: processing, parameter, service,
//! operation and hardware.
//!
//! # Examples
//!
//! Compress on an emulated accelerator and decompress in software:
//!
//! ```
//! use std::sync::Arc;
//!
//! use deflate_offload::accel::{DeviceConfig, Dispatcher, EmulatedDevice, WorkQueue};
//! use deflate_offload::{Engine, EngineConfig, ExecutionPath, Job, JobFlags, Status};
//!
//! let queue: Arc<dyn WorkQueue> = Arc::new(EmulatedDevice::new(DeviceConfig::default()));
//! let engine = Engine::with_dispatcher(
//!     EngineConfig::default(),
//!     Arc::new(Dispatcher::new(vec![queue])),
//! );
//!
//! let data = b"offloaded offloaded offloaded offloaded".repeat(32);
//! let flags = JobFlags::FIRST | JobFlags::LAST | JobFlags::GZIP_MODE;
//! let mut job = Job::compress().with_flags(flags | JobFlags::DYNAMIC_HUFFMAN);
//! let mut compressed = vec![0u8; 2048];
//! let progress = engine.execute(&mut job, &data, &mut compressed).unwrap();
//! assert_eq!(job.path_used(), Some(ExecutionPath::Hardware));
//! compressed.truncate(progress.produced);
//!
//! let software = Engine::new(EngineConfig::default().path(ExecutionPath::Software));
//! let mut job = Job::decompress().with_flags(flags);
//! let mut restored = vec![0u8; data.len()];
//! let progress = software.execute(&mut job, &compressed, &mut restored).unwrap();
//! assert_eq!(progress.status, Status::Ok);
//! assert_eq!(restored, data);
//! ```
//!
//! # See also
//!
//! - [`engine::Engine::execute`] for the per-call contract.
//! - [`accel::Submitter`] for the submit, poll and retry protocol.

pub use accel;
pub use checksums;
pub use compress;
pub use engine;
pub use logging;

pub use accel::{DeviceConfig, Dispatcher, EmulatedDevice, FaultPlan, WorkQueue};
pub use compress::CompressionLevel;
pub use engine::{
    DEFAULT_ONE_PASS_THRESHOLD, Direction, Engine, EngineConfig, EngineError, EngineResult,
    ErrorClass, ExecutionPath, ExecutionStep, Job, JobFlags, ProcessingStep, Progress, Status,
    VerifyFailure, Verifier,
};
pub use logging::{Verbosity, init_tracing};
