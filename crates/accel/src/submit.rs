//! Descriptor submission, completion polling and retry.
//!
//! # Design
//!
//! [`Submitter::submit`] encodes a [`Descriptor`], hands it to the
//! [`Dispatcher`], and returns an [`InFlight`] handle. [`Submitter::poll`]
//! reads the completion record, classifies it with [`Outcome::classify`], and
//! handles each class in one place:
//!
//! - in progress: `Ok(None)`, poll again,
//! - success or output overflow: the record is returned to the caller,
//! - page fault: the faulting address is touched and the same descriptor is
//!   resubmitted once; a second fault ends the submission,
//! - anything else: [`SubmitError::Hardware`].
//!
//! A completion record outside the job's buffers ends the submission with
//! [`SubmitError::RecordUnreadable`] instead of polling forever.
//!
//! Queue-busy rejections surface as [`SubmitError::QueuesBusy`] without any
//! state change, so the caller can back off and resubmit unchanged.
//! [`Submitter::wait`] is the synchronous loop on top of `poll`.

use std::sync::Arc;

use thiserror::Error;

use crate::completion::{COMPLETION_RECORD_SIZE, CompletionRecord, Outcome};
use crate::descriptor::{DESCRIPTOR_SIZE, Descriptor, Opcode};
use crate::memory::{MemoryError, SharedMemory, lock};
use crate::queue::{DispatchError, Dispatcher};

/// Errors ending a submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum SubmitError {
    /// Every supporting queue rejected the descriptor.
    #[error("all work queues are busy")]
    QueuesBusy,
    /// No queue supports the opcode.
    #[error("no work queue supports {0:?}")]
    NotSupported(Opcode),
    /// A page fault persisted after the single permitted touch.
    #[error(
        "page fault at {addr:#x} ({}) could not be resolved",
        if *.write { "write" } else { "read" }
    )]
    RepeatedPageFault {
        /// Faulting address.
        addr: u64,
        /// Whether the access was a write.
        write: bool,
    },
    /// The faulting address lies outside the job's buffers.
    #[error("fault address {addr:#x} is outside the job buffers")]
    TouchOutsideBuffers {
        /// Faulting address.
        addr: u64,
        /// Why the touch failed.
        #[source]
        source: MemoryError,
    },
    /// The completion record cannot be read, so the submission never ends.
    #[error("completion record at {addr:#x} is not readable")]
    RecordUnreadable {
        /// Completion record address.
        addr: u64,
        /// Why the read failed.
        #[source]
        source: MemoryError,
    },
    /// The executor reported a terminal error.
    #[error("accelerator error: status {status:#04x}, error code {error_code}")]
    Hardware {
        /// Raw status byte.
        status: u8,
        /// Operation error code.
        error_code: u8,
        /// The full record.
        record: CompletionRecord,
    },
}

impl From<DispatchError> for SubmitError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::QueuesBusy => Self::QueuesBusy,
            DispatchError::NotSupported(opcode) => Self::NotSupported(opcode),
        }
    }
}

/// A submitted descriptor awaiting completion.
#[derive(Debug)]
pub struct InFlight {
    bytes: [u8; DESCRIPTOR_SIZE],
    opcode: Opcode,
    completion_addr: u64,
    memory: SharedMemory,
    queue: usize,
    faulted: bool,
}

impl InFlight {
    /// Index of the queue holding the descriptor.
    #[must_use]
    pub const fn queue(&self) -> usize {
        self.queue
    }

    /// Whether a page fault was already resolved for this submission.
    #[must_use]
    pub const fn faulted(&self) -> bool {
        self.faulted
    }
}

/// A finished submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Completed {
    /// The completion record.
    pub record: CompletionRecord,
    /// Either [`Outcome::Success`] or [`Outcome::OutputOverflow`].
    pub outcome: Outcome,
    /// Whether a page fault was resolved along the way.
    pub faulted: bool,
}

impl Completed {
    /// Whether the destination overflowed.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.outcome == Outcome::OutputOverflow
    }
}

/// Submits descriptors through a shared dispatcher.
#[derive(Clone, Debug)]
pub struct Submitter {
    dispatcher: Arc<Dispatcher>,
}

impl Submitter {
    /// Creates a submitter over `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher used for every submission.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Enqueues `descriptor` without waiting.
    pub fn submit(
        &self,
        descriptor: &Descriptor,
        memory: &SharedMemory,
    ) -> Result<InFlight, SubmitError> {
        let bytes = descriptor.to_bytes();
        let opcode = descriptor.operation.opcode();
        let queue = self.dispatcher.dispatch(opcode, &bytes, memory)?;
        logging::trace_submit!(
            queue,
            opcode = ?opcode,
            op_flags = descriptor.op_flags.bits(),
            src = descriptor.src.size,
            max_dst = descriptor.dst.size,
            "submitted descriptor"
        );
        Ok(InFlight {
            bytes,
            opcode,
            completion_addr: descriptor.completion_addr,
            memory: SharedMemory::clone(memory),
            queue,
            faulted: false,
        })
    }

    /// Checks a submission once.
    ///
    /// Returns `Ok(None)` while the record is in progress, including right
    /// after a page-fault resubmission.
    pub fn poll(&self, flight: &mut InFlight) -> Result<Option<Completed>, SubmitError> {
        if let Some(queue) = self.dispatcher.queue(flight.queue) {
            queue.progress();
        }
        let addr = flight.completion_addr;
        let record = lock(&flight.memory)
            .read(addr, COMPLETION_RECORD_SIZE as u64)
            .map(CompletionRecord::from_bytes)
            .map_err(|source| SubmitError::RecordUnreadable { addr, source })?;

        match Outcome::classify(&record) {
            Outcome::InProgress => Ok(None),
            outcome @ (Outcome::Success | Outcome::OutputOverflow) => Ok(Some(Completed {
                record,
                outcome,
                faulted: flight.faulted,
            })),
            Outcome::PageFault { addr, write } => {
                if flight.faulted || addr == 0 {
                    return Err(SubmitError::RepeatedPageFault { addr, write });
                }
                lock(&flight.memory)
                    .touch(addr)
                    .map_err(|source| SubmitError::TouchOutsideBuffers { addr, source })?;
                logging::trace_submit!(
                    addr,
                    write,
                    "touched faulting page, resubmitting"
                );
                flight.faulted = true;
                flight.queue = self
                    .dispatcher
                    .dispatch(flight.opcode, &flight.bytes, &flight.memory)?;
                Ok(None)
            }
            Outcome::Error { status, error_code } => Err(SubmitError::Hardware {
                status,
                error_code,
                record,
            }),
        }
    }

    /// Polls until the submission finishes.
    pub fn wait(&self, mut flight: InFlight) -> Result<Completed, SubmitError> {
        loop {
            if let Some(completed) = self.poll(&mut flight)? {
                return Ok(completed);
            }
            std::hint::spin_loop();
        }
    }

    /// Submits and waits.
    pub fn submit_and_wait(
        &self,
        descriptor: &Descriptor,
        memory: &SharedMemory,
    ) -> Result<Completed, SubmitError> {
        let flight = self.submit(descriptor, memory)?;
        self.wait(flight)
    }
}
