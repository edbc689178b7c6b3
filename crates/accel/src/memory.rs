//! Job memory shared between the submitter and the executor.
//!
//! Descriptors carry addresses, not references. [`JobMemory`] resolves those
//! addresses to byte regions and typed AECS pairs, and tracks which 4 KiB
//! pages are resident so page faults can be raised and cured.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::aecs::{AecsPair, CompressAecs, DecompressAecs};

/// Page granularity for residency tracking.
pub const PAGE_SIZE: u64 = 4096;

/// Memory handle passed along with every descriptor.
pub type SharedMemory = Arc<Mutex<JobMemory>>;

/// Creates an empty shared memory.
#[must_use]
pub fn shared() -> SharedMemory {
    Arc::new(Mutex::new(JobMemory::new()))
}

/// Locks shared memory, recovering from a poisoned lock.
pub fn lock(memory: &SharedMemory) -> MutexGuard<'_, JobMemory> {
    memory.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors resolving addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum MemoryError {
    /// No region covers the range.
    #[error("address range {addr:#x}+{len} is not mapped")]
    Unmapped {
        /// Start address.
        addr: u64,
        /// Length in bytes.
        len: u64,
    },
    /// A new region would overlap an existing one.
    #[error("region at {base:#x} overlaps an existing mapping")]
    Overlap {
        /// Base of the rejected region.
        base: u64,
    },
    /// The AECS at this address holds the other codec's state.
    #[error("AECS at {addr:#x} has the wrong kind")]
    WrongAecsKind {
        /// Base of the AECS pair.
        addr: u64,
    },
}

/// Typed state behind an AECS address.
#[derive(Clone, Debug)]
pub enum AecsState {
    /// Compress slots.
    Compress(AecsPair<CompressAecs>),
    /// Decompress or verify slots.
    Decompress(AecsPair<DecompressAecs>),
}

#[derive(Debug)]
struct Region {
    base: u64,
    bytes: Vec<u8>,
}

impl Region {
    fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }
}

#[derive(Debug)]
struct AecsRegion {
    base: u64,
    span: u64,
    state: AecsState,
}

/// Address space of one job.
#[derive(Debug, Default)]
pub struct JobMemory {
    regions: Vec<Region>,
    aecs: Vec<AecsRegion>,
    evicted: BTreeSet<u64>,
}

impl JobMemory {
    /// Creates an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `bytes` at `base`, replacing any region with the same base.
    pub fn map(&mut self, base: u64, bytes: Vec<u8>) -> Result<(), MemoryError> {
        let end = base + bytes.len() as u64;
        self.regions.retain(|region| region.base != base);
        if self.overlaps(base, end) {
            return Err(MemoryError::Overlap { base });
        }
        self.regions.push(Region { base, bytes });
        Ok(())
    }

    /// Maps an AECS pair whose slots are `slot_size` bytes each.
    pub fn map_aecs(
        &mut self,
        base: u64,
        slot_size: u64,
        state: AecsState,
    ) -> Result<(), MemoryError> {
        let span = slot_size * 2;
        self.aecs.retain(|region| region.base != base);
        if self.overlaps(base, base + span) {
            return Err(MemoryError::Overlap { base });
        }
        self.aecs.push(AecsRegion { base, span, state });
        Ok(())
    }

    fn overlaps(&self, start: u64, end: u64) -> bool {
        let regions = self.regions.iter().map(|r| (r.base, r.end()));
        let aecs = self.aecs.iter().map(|r| (r.base, r.base + r.span));
        regions
            .chain(aecs)
            .any(|(base, stop)| start < stop && base < end)
    }

    /// Bytes of the region mapped at exactly `base`.
    #[must_use]
    pub fn region(&self, base: u64) -> Option<&[u8]> {
        self.regions
            .iter()
            .find(|region| region.base == base)
            .map(|region| region.bytes.as_slice())
    }

    /// Reads `len` bytes at `addr`.
    pub fn read(&self, addr: u64, len: u64) -> Result<&[u8], MemoryError> {
        let region = self
            .regions
            .iter()
            .find(|region| region.base <= addr && addr + len <= region.end())
            .ok_or(MemoryError::Unmapped { addr, len })?;
        let start = (addr - region.base) as usize;
        Ok(&region.bytes[start..start + len as usize])
    }

    /// Writable view of `len` bytes at `addr`.
    pub fn slice_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8], MemoryError> {
        let region = self
            .regions
            .iter_mut()
            .find(|region| {
                region.base <= addr && addr + len <= region.base + region.bytes.len() as u64
            })
            .ok_or(MemoryError::Unmapped { addr, len })?;
        let start = (addr - region.base) as usize;
        Ok(&mut region.bytes[start..start + len as usize])
    }

    /// Copies `data` to `addr`.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.slice_mut(addr, data.len() as u64)?.copy_from_slice(data);
        Ok(())
    }

    /// Typed state of the AECS pair at `addr`.
    pub fn aecs_mut(&mut self, addr: u64) -> Result<&mut AecsState, MemoryError> {
        self.aecs
            .iter_mut()
            .find(|region| region.base == addr)
            .map(|region| &mut region.state)
            .ok_or(MemoryError::Unmapped { addr, len: 0 })
    }

    /// Compress slots at `addr`.
    pub fn compress_aecs_mut(
        &mut self,
        addr: u64,
    ) -> Result<&mut AecsPair<CompressAecs>, MemoryError> {
        match self.aecs_mut(addr)? {
            AecsState::Compress(pair) => Ok(pair),
            AecsState::Decompress(_) => Err(MemoryError::WrongAecsKind { addr }),
        }
    }

    /// Decompress slots at `addr`.
    pub fn decompress_aecs_mut(
        &mut self,
        addr: u64,
    ) -> Result<&mut AecsPair<DecompressAecs>, MemoryError> {
        match self.aecs_mut(addr)? {
            AecsState::Decompress(pair) => Ok(pair),
            AecsState::Compress(_) => Err(MemoryError::WrongAecsKind { addr }),
        }
    }

    fn is_mapped(&self, addr: u64) -> bool {
        self.regions
            .iter()
            .any(|region| region.base <= addr && addr < region.end())
            || self
                .aecs
                .iter()
                .any(|region| region.base <= addr && addr < region.base + region.span)
    }

    /// Marks the page holding `addr` as not resident.
    pub fn evict(&mut self, addr: u64) -> Result<(), MemoryError> {
        if !self.is_mapped(addr) {
            return Err(MemoryError::Unmapped { addr, len: 1 });
        }
        self.evicted.insert(addr / PAGE_SIZE);
        Ok(())
    }

    /// Touches `addr`, making its page resident.
    pub fn touch(&mut self, addr: u64) -> Result<(), MemoryError> {
        if !self.is_mapped(addr) {
            return Err(MemoryError::Unmapped { addr, len: 1 });
        }
        self.evicted.remove(&(addr / PAGE_SIZE));
        Ok(())
    }

    /// First non-resident address in `addr..addr + len`, if any.
    #[must_use]
    pub fn first_fault(&self, addr: u64, len: u64) -> Option<u64> {
        if len == 0 {
            return None;
        }
        let first = addr / PAGE_SIZE;
        let last = (addr + len - 1) / PAGE_SIZE;
        self.evicted
            .range(first..=last)
            .next()
            .map(|&page| (page * PAGE_SIZE).max(addr))
    }
}
