#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` turns the accelerator protocol of `accel` and the software codec
//! of `compress` into chunked compression and decompression jobs. A [`Job`]
//! is one stream; each [`Engine::execute`] call processes one chunk of it
//! and reports a [`Progress`].
//!
//! # Design
//!
//! - The per-stream state machine lives in the job; the [`Engine`] only holds
//!   configuration and the submitter, so one engine serves many jobs.
//! - The path is chosen on the first chunk. `Auto` streams whose first chunk
//!   fails on the device restart in software; later chunks stay where the
//!   stream started.
//! - Accelerator compression picks one-pass or two-pass header generation
//!   per dynamic block and falls back to stored blocks when the device
//!   overflows its output. Accelerator decompression resumes overflowed
//!   passes from the saved AECS state.
//! - Compressed output is verified by decoding it back, on the device for
//!   device output and in software for software output.
//!
//! # Invariants
//!
//! - A call that returns a parameter or backpressure error changes nothing;
//!   the same call can be repeated.
//! - A compress call either commits the whole chunk or nothing.
//! - `FIRST` on an open stream and chunks without `FIRST` on a closed stream
//!   are rejected before any work is done.
//!
//! # Errors
//!
//! Every failure is an [`EngineError`] with a numeric [`code`](EngineError::code)
//! and an [`ErrorClass`] that tells whether the job must be reset.
//!
//! # Examples
//!
//! ```
//! use engine::{Engine, EngineConfig, Job, JobFlags, Status};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let data = vec![b'z'; 1000];
//! let mut job = Job::compress()
//!     .with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::DYNAMIC_HUFFMAN);
//! let mut out = vec![0u8; 1500];
//! let progress = engine.execute(&mut job, &data, &mut out).unwrap();
//! assert_eq!(progress.status, Status::Ok);
//! assert!(progress.produced < data.len());
//! assert!(job.is_complete());
//! ```
//!
//! # See also
//!
//! - `accel` for descriptors, AECS slots and the emulated device.
//! - `compress` for the software encoder, decoder and stream framing.

mod config;
mod context;
mod engine;
mod error;
mod flags;
mod hardware;
mod hw_deflate;
mod hw_inflate;
mod job;
mod software;
mod status;
mod verify;

pub use config::{DEFAULT_ONE_PASS_THRESHOLD, EngineConfig, ExecutionPath};
pub use context::{ExecutionStep, ProcessingStep};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorClass};
pub use flags::JobFlags;
pub use job::{Direction, Job};
pub use status::{Progress, Status};
pub use verify::{VerifyFailure, Verifier};
