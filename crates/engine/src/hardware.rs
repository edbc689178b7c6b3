//! Job memory layout and descriptor plumbing shared by the accelerator paths.

use accel::aecs::{COMPRESS_AECS_SIZE, DECOMPRESS_AECS_SIZE};
use accel::memory::{self, lock};
use accel::{
    AecsAccess, AecsPair, AecsState, Buffer, Completed, Descriptor, MemoryError, OpFlags,
    Operation, SharedMemory, Submitter,
};

use crate::error::{EngineError, EngineResult};

pub(crate) const SRC: u64 = 0x1_0000_0000;
pub(crate) const DST: u64 = 0x2_0000_0000;
pub(crate) const RECORD: u64 = 0x3_0000_0000;
pub(crate) const COMPRESS_AECS: u64 = 0x4_0000_0000;
pub(crate) const VERIFY_AECS: u64 = 0x4_0001_0000;
pub(crate) const DECOMPRESS_AECS: u64 = 0x4_0002_0000;

const RECORD_SIZE: usize = 64;

/// Post-stream bytes can only come from this much earlier input.
const TAIL_WINDOW: usize = u16::MAX as usize;

/// Accelerator-side state of one stream.
#[derive(Debug)]
pub(crate) struct HardwareStream {
    memory: SharedMemory,
    tail: Vec<u8>,
}

impl HardwareStream {
    pub(crate) fn for_compress() -> EngineResult<Self> {
        let memory = memory::shared();
        {
            let mut job = lock(&memory);
            job.map(RECORD, vec![0; RECORD_SIZE]).map_err(internal)?;
            job.map_aecs(
                COMPRESS_AECS,
                COMPRESS_AECS_SIZE as u64,
                AecsState::Compress(AecsPair::default()),
            )
            .map_err(internal)?;
            job.map_aecs(
                VERIFY_AECS,
                DECOMPRESS_AECS_SIZE as u64,
                AecsState::Decompress(AecsPair::default()),
            )
            .map_err(internal)?;
        }
        Ok(Self {
            memory,
            tail: Vec::new(),
        })
    }

    pub(crate) fn for_decompress() -> EngineResult<Self> {
        let memory = memory::shared();
        {
            let mut job = lock(&memory);
            job.map(RECORD, vec![0; RECORD_SIZE]).map_err(internal)?;
            job.map_aecs(
                DECOMPRESS_AECS,
                DECOMPRESS_AECS_SIZE as u64,
                AecsState::Decompress(AecsPair::default()),
            )
            .map_err(internal)?;
        }
        Ok(Self {
            memory,
            tail: Vec::new(),
        })
    }

    pub(crate) fn memory(&self) -> SharedMemory {
        SharedMemory::clone(&self.memory)
    }

    /// Remembers the end of the input fed to the device.
    pub(crate) fn remember(&mut self, fed: &[u8]) {
        self.tail.extend_from_slice(fed);
        if self.tail.len() > TAIL_WINDOW {
            let excess = self.tail.len() - TAIL_WINDOW;
            self.tail.drain(..excess);
        }
    }

    /// The last `len` bytes fed in earlier calls.
    pub(crate) fn recent(&self, len: usize) -> &[u8] {
        &self.tail[self.tail.len().saturating_sub(len)..]
    }
}

pub(crate) fn internal(error: MemoryError) -> EngineError {
    EngineError::Internal(error.to_string())
}

fn length(len: usize) -> EngineResult<u32> {
    u32::try_from(len).map_err(|_| EngineError::Size("buffers are limited to 4 GiB per descriptor"))
}

/// Builds a descriptor reading `src_len` bytes and writing up to `dst_len`.
pub(crate) fn descriptor(
    operation: Operation,
    access: AecsAccess,
    aecs: Buffer,
    src_len: usize,
    dst_len: usize,
    crc32c: bool,
) -> EngineResult<Descriptor> {
    let mut descriptor = Descriptor::new(operation, RECORD);
    descriptor.src = Buffer::new(SRC, length(src_len)?);
    descriptor.dst = Buffer::new(DST, length(dst_len)?);
    descriptor.aecs = aecs;
    descriptor.op_flags |= access.op_flags();
    if crc32c {
        descriptor.op_flags |= OpFlags::CRC32C;
    }
    Ok(descriptor)
}

pub(crate) const fn compress_aecs() -> Buffer {
    Buffer::new(COMPRESS_AECS, COMPRESS_AECS_SIZE as u32)
}

pub(crate) const fn verify_aecs() -> Buffer {
    Buffer::new(VERIFY_AECS, DECOMPRESS_AECS_SIZE as u32)
}

pub(crate) const fn decompress_aecs() -> Buffer {
    Buffer::new(DECOMPRESS_AECS, DECOMPRESS_AECS_SIZE as u32)
}

/// Maps the pass buffers, submits and collects the written output.
///
/// The memory lock is released before submission so the device can take it.
pub(crate) fn run_pass(
    submitter: &Submitter,
    memory: &SharedMemory,
    descriptor: &Descriptor,
    src: &[u8],
) -> EngineResult<(Completed, Vec<u8>)> {
    {
        let mut job = lock(memory);
        job.map(SRC, src.to_vec()).map_err(internal)?;
        job.map(DST, vec![0; descriptor.dst.size as usize])
            .map_err(internal)?;
    }
    let completed = submitter.submit_and_wait(descriptor, memory)?;
    let job = lock(memory);
    let written = job.region(DST).unwrap_or_default();
    let len = (completed.record.output_size as usize).min(written.len());
    Ok((completed, written[..len].to_vec()))
}
