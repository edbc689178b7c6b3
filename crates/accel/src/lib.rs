#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `accel` is the accelerator boundary of the DEFLATE offload engine. It
//! defines what crosses that boundary, namely descriptors, completion records
//! and AECS state slots, and the protocol for getting work through it:
//! dispatch to a work queue, polling, page-fault resubmission and error
//! classification.
//!
//! # Design
//!
//! - [`descriptor`] and [`completion`] are sum types with explicit 64-byte
//!   wire codecs. Nothing is reinterpreted in place.
//! - [`aecs`] holds the two-slot state exchange and the per-position access
//!   policies.
//! - [`memory`] resolves descriptor addresses to job buffers and tracks page
//!   residency.
//! - [`queue`] defines the [`WorkQueue`] seam and the [`Dispatcher`] that owns
//!   the round-robin index.
//! - [`submit`] is the retry protocol; every completion class has one handler.
//! - [`device`] is a software accelerator with scripted fault injection.
//! - [`erratum`] corrects generation-1 big-endian output sizes.
//!
//! # Invariants
//!
//! - A page fault is resolved at most once per submission.
//! - Busy rejections and failed submissions never move the AECS read index.
//! - Compress overflow writes neither output nor AECS state.
//!
//! # Errors
//!
//! Submission failures are [`SubmitError`]; descriptor decoding failures are
//! [`DescriptorError`]; address resolution failures are [`MemoryError`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use accel::{DeviceConfig, Dispatcher, EmulatedDevice, Submitter, WorkQueue};
//!
//! let device: Arc<dyn WorkQueue> = Arc::new(EmulatedDevice::new(DeviceConfig::default()));
//! let submitter = Submitter::new(Arc::new(Dispatcher::new(vec![device])));
//! assert!(submitter.dispatcher().header_generation());
//! ```
//!
//! # See also
//!
//! - `compress` for the software primitives the device executes with.
//! - `engine` for the job state machine that drives submissions.

pub mod aecs;
pub mod completion;
pub mod descriptor;
pub mod device;
pub mod erratum;
pub mod memory;
pub mod queue;
pub mod submit;

pub use aecs::{
    AecsAccess, AecsError, AecsPair, ChunkPosition, CompressAecs, DecompressAecs,
    OutputAccumulator, compress_access, decompress_access, verify_access,
};
pub use completion::{CompletionRecord, CompletionStatus, Outcome, inflate_error_code};
pub use descriptor::{
    Buffer, CompressFlags, CompressOp, DecompressFlags, DecompressOp, Descriptor,
    DescriptorError, EndProc, HeaderGen, OpFlags, Opcode, Operation,
};
pub use device::{DeviceConfig, EmulatedDevice, FaultPlan, histogram_from_bytes};
pub use erratum::{apply_be16_erratum, needs_be16_erratum};
pub use memory::{AecsState, JobMemory, MemoryError, SharedMemory};
pub use queue::{DispatchError, Dispatcher, QueueFull, WorkQueue};
pub use submit::{Completed, InFlight, SubmitError, Submitter};
