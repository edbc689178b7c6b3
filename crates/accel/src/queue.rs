//! Work queues and round-robin dispatch.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::descriptor::{DESCRIPTOR_SIZE, Opcode};
use crate::memory::SharedMemory;

/// A queue refused a descriptor because it is full.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Error)]
#[error("work queue is full")]
pub struct QueueFull;

/// A submission endpoint of an accelerator.
///
/// Executors write the completion record named by the descriptor once the
/// work is done. Implementations that complete asynchronously advance their
/// pending work in [`progress`](Self::progress).
pub trait WorkQueue: Send + Sync + fmt::Debug {
    /// Whether this queue accepts `opcode`.
    fn supports(&self, opcode: Opcode) -> bool;

    /// Enqueues an encoded descriptor.
    fn submit(
        &self,
        descriptor: &[u8; DESCRIPTOR_SIZE],
        memory: &SharedMemory,
    ) -> Result<(), QueueFull>;

    /// Advances pending work by one poll.
    fn progress(&self) {}

    /// Hardware generation of the device behind this queue.
    fn generation(&self) -> u8;

    /// Whether the device builds Huffman headers itself.
    fn header_generation(&self) -> bool;
}

/// Why dispatch failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DispatchError {
    /// Every queue that supports the opcode refused the descriptor.
    #[error("all work queues are busy")]
    QueuesBusy,
    /// No queue supports the opcode.
    #[error("no work queue supports {0:?}")]
    NotSupported(Opcode),
}

/// Owns the queues and the rotation index shared by all submissions.
#[derive(Debug, Default)]
pub struct Dispatcher {
    queues: Vec<Arc<dyn WorkQueue>>,
    next: AtomicUsize,
}

impl Dispatcher {
    /// Creates a dispatcher over `queues`.
    #[must_use]
    pub fn new(queues: Vec<Arc<dyn WorkQueue>>) -> Self {
        Self {
            queues,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Whether there are no queues.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queue at `index`.
    #[must_use]
    pub fn queue(&self, index: usize) -> Option<&Arc<dyn WorkQueue>> {
        self.queues.get(index)
    }

    /// Whether any queue supports `opcode`.
    #[must_use]
    pub fn supports(&self, opcode: Opcode) -> bool {
        self.queues.iter().any(|queue| queue.supports(opcode))
    }

    /// Highest device generation among queues supporting `opcode`.
    #[must_use]
    pub fn generation(&self, opcode: Opcode) -> Option<u8> {
        self.queues
            .iter()
            .filter(|queue| queue.supports(opcode))
            .map(|queue| queue.generation())
            .max()
    }

    /// Whether every queue supporting compression generates headers itself.
    #[must_use]
    pub fn header_generation(&self) -> bool {
        let mut compressors = self
            .queues
            .iter()
            .filter(|queue| queue.supports(Opcode::Compress))
            .peekable();
        compressors.peek().is_some() && compressors.all(|queue| queue.header_generation())
    }

    /// Submits to the next queue in rotation that supports the opcode.
    ///
    /// Returns the index of the queue that accepted the descriptor.
    pub fn dispatch(
        &self,
        opcode: Opcode,
        descriptor: &[u8; DESCRIPTOR_SIZE],
        memory: &SharedMemory,
    ) -> Result<usize, DispatchError> {
        let count = self.queues.len();
        if count == 0 {
            return Err(DispatchError::NotSupported(opcode));
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed) % count;
        let mut supported = false;
        for offset in 0..count {
            let index = (start + offset) % count;
            let queue = &self.queues[index];
            if !queue.supports(opcode) {
                continue;
            }
            supported = true;
            match queue.submit(descriptor, memory) {
                Ok(()) => {
                    logging::trace_submit!(queue = index, opcode = ?opcode, "descriptor accepted");
                    return Ok(index);
                }
                Err(QueueFull) => {
                    logging::trace_submit!(queue = index, "queue busy, rotating");
                }
            }
        }
        if supported {
            Err(DispatchError::QueuesBusy)
        } else {
            Err(DispatchError::NotSupported(opcode))
        }
    }
}
