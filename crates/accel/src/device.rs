//! Software emulation of a DEFLATE accelerator.
//!
//! # Overview
//!
//! [`EmulatedDevice`] implements [`WorkQueue`] by decoding each descriptor,
//! executing it against [`JobMemory`] with the software primitives from
//! `compress`, and writing a completion record. It follows the accelerator's
//! contract closely enough that the submission protocol cannot tell the two
//! apart:
//!
//! - state moves only through the AECS slots named by the descriptor,
//! - compressed output that does not fit is reported as an unrecoverable
//!   overflow with nothing written,
//! - non-resident pages are reported as faults before any work is done,
//! - the device keeps at most a 4 KiB match history and no history between
//!   descriptors.
//!
//! # Fault injection
//!
//! A [`FaultPlan`] makes the device misbehave a fixed number of times:
//! reject submissions as busy, evict source or destination pages, force an
//! output overflow, or corrupt compressed output. Each injected fault
//! decrements its counter, so tests can script exact retry sequences.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use checksums::{Crc32Kind, xor_checksum};
use compress::{
    BitWriter, CompressionLevel, Histogram, HuffmanTables, Matcher, encode_tokens,
    write_end_of_block, write_stored_blocks_into,
};

use crate::aecs::{AecsAccess, OutputAccumulator};
use crate::completion::{
    CompletionRecord, CompletionStatus, ERROR_AECS, ERROR_INVALID_HUFFMAN_CODE,
    ERROR_UNRECOVERABLE_OUTPUT_OVERFLOW, inflate_error_code,
};
use crate::descriptor::{
    CompressFlags, CompressOp, DESCRIPTOR_SIZE, DecompressFlags, DecompressOp, Descriptor,
    EndProc, HeaderGen, OpFlags, Opcode, Operation,
};
use crate::memory::{JobMemory, SharedMemory, lock};
use crate::queue::{QueueFull, WorkQueue};

/// Match history the device keeps within one descriptor.
pub const DEVICE_HISTORY: usize = 4096;

/// Bytes written by a statistics pass: literal/length then distance counts.
pub const STATS_SIZE: usize = (286 + 30) * 4;

/// Decodes the histogram written by a statistics pass.
#[must_use]
pub fn histogram_from_bytes(bytes: &[u8]) -> Option<Histogram> {
    if bytes.len() < STATS_SIZE {
        return None;
    }
    let mut histogram = Histogram::new();
    let counts = bytes
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
    for (slot, count) in histogram
        .lit_len
        .iter_mut()
        .chain(histogram.dist.iter_mut())
        .zip(counts)
    {
        *slot = count;
    }
    Some(histogram)
}

fn histogram_to_bytes(histogram: &Histogram) -> Vec<u8> {
    histogram
        .lit_len
        .iter()
        .chain(histogram.dist.iter())
        .flat_map(|count| count.to_le_bytes())
        .collect()
}

/// Static capabilities of the emulated device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    /// Hardware generation; generation 1 carries the BE16 erratum.
    pub generation: u8,
    /// Whether the device builds Huffman headers itself.
    pub header_generation: bool,
    /// Opcodes the queue accepts.
    pub opcodes: Vec<Opcode>,
    /// Polls before a submitted descriptor completes.
    pub latency_polls: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            generation: 2,
            header_generation: true,
            opcodes: vec![Opcode::Compress, Opcode::Decompress],
            latency_polls: 0,
        }
    }
}

impl DeviceConfig {
    /// Sets the hardware generation.
    #[must_use]
    pub fn generation(mut self, generation: u8) -> Self {
        self.generation = generation;
        self
    }

    /// Enables or disables hardware header generation.
    #[must_use]
    pub fn header_generation(mut self, enabled: bool) -> Self {
        self.header_generation = enabled;
        self
    }

    /// Restricts the accepted opcodes.
    #[must_use]
    pub fn opcodes(mut self, opcodes: Vec<Opcode>) -> Self {
        self.opcodes = opcodes;
        self
    }

    /// Sets the completion latency in polls.
    #[must_use]
    pub fn latency_polls(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }
}

/// Faults the device injects, each counter consumed one event at a time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FaultPlan {
    /// Submissions to reject as busy.
    pub busy_rejections: u32,
    /// Executions that find the first source page evicted.
    pub read_faults: u32,
    /// Executions that find the first destination page evicted.
    pub write_faults: u32,
    /// Compress executions that overflow regardless of space.
    pub forced_overflows: u32,
    /// Compress executions whose output gets one byte flipped.
    pub corrupt_outputs: u32,
}

impl FaultPlan {
    fn take(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Pending {
    descriptor: [u8; DESCRIPTOR_SIZE],
    memory: SharedMemory,
    remaining: u32,
}

/// A work queue backed by software execution.
#[derive(Debug, Default)]
pub struct EmulatedDevice {
    config: DeviceConfig,
    plan: Mutex<FaultPlan>,
    pending: Mutex<VecDeque<Pending>>,
    accepted: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EmulatedDevice {
    /// Creates a device with the given capabilities.
    #[must_use]
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Creates a device that injects `plan`.
    #[must_use]
    pub fn with_faults(config: DeviceConfig, plan: FaultPlan) -> Self {
        Self {
            config,
            plan: Mutex::new(plan),
            ..Self::default()
        }
    }

    /// Device capabilities.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Replaces the fault plan.
    pub fn set_faults(&self, plan: FaultPlan) {
        *guard(&self.plan) = plan;
    }

    /// Faults not yet injected.
    #[must_use]
    pub fn remaining_faults(&self) -> FaultPlan {
        *guard(&self.plan)
    }

    /// Descriptors accepted so far, resubmissions included.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    fn execute(&self, bytes: &[u8; DESCRIPTOR_SIZE], memory: &SharedMemory) {
        let mut memory = lock(memory);
        let completion_addr = Descriptor::completion_addr_of(bytes);
        let record = match Descriptor::from_bytes(bytes) {
            Ok(descriptor) => self.run(&descriptor, &mut memory),
            Err(error) => CompletionRecord::rejected(error),
        };
        // Without a mapped record there is nobody to report to.
        let _ = memory.write(completion_addr, &record.to_bytes());
    }

    fn run(&self, descriptor: &Descriptor, memory: &mut JobMemory) -> CompletionRecord {
        {
            let mut plan = guard(&self.plan);
            if FaultPlan::take(&mut plan.read_faults) {
                let _ = memory.evict(descriptor.src.addr);
            }
            if FaultPlan::take(&mut plan.write_faults) {
                let _ = memory.evict(descriptor.dst.addr);
            }
        }
        let src = descriptor.src;
        if let Some(addr) = memory.first_fault(src.addr, u64::from(src.size)) {
            return page_fault(addr, false);
        }
        let dst = descriptor.dst;
        if let Some(addr) = memory.first_fault(dst.addr, u64::from(dst.size)) {
            return page_fault(addr, true);
        }

        match descriptor.operation {
            Operation::Compress(op) => self.compress(descriptor, op, memory),
            Operation::Decompress(op) => decompress(descriptor, op, memory),
        }
    }

    fn compress(
        &self,
        descriptor: &Descriptor,
        op: CompressOp,
        memory: &mut JobMemory,
    ) -> CompletionRecord {
        if op.flags.contains(CompressFlags::HUFFMAN_BE) {
            return CompletionRecord {
                status: CompletionStatus::UnsupportedOpcode,
                invalid_flags: u32::from(CompressFlags::HUFFMAN_BE.bits()),
                ..CompletionRecord::default()
            };
        }
        let src = match memory.read(descriptor.src.addr, u64::from(descriptor.src.size)) {
            Ok(bytes) => bytes.to_vec(),
            Err(_) => return page_fault(descriptor.src.addr, false),
        };
        let flags = descriptor.op_flags;
        let select = usize::from(flags.contains(OpFlags::AECS_SELECT));
        let reads = flags.contains(OpFlags::READ_AECS);
        let writes = flags.contains(OpFlags::WRITE_AECS);

        let state = if reads {
            match memory.compress_aecs_mut(descriptor.aecs.addr) {
                Ok(pair) => pair.slot(select).clone(),
                Err(_) => return aecs_error(),
            }
        } else {
            Default::default()
        };

        let tokens = Matcher::new(CompressionLevel::Default, DEVICE_HISTORY).tokenize(&src);
        let histogram = Histogram::from_tokens(&tokens);

        if op.flags.contains(CompressFlags::STATS_MODE) {
            return match op.header_gen {
                HeaderGen::TwoPass { is_final } if self.config.header_generation => {
                    let tables = HuffmanTables::from_histogram(&histogram);
                    let mut next = state.clone();
                    next.set_tables(&tables);
                    if next
                        .append_bits(|writer| tables.write_dynamic_header(writer, is_final))
                        .is_err()
                    {
                        return aecs_error();
                    }
                    if writes {
                        match memory.compress_aecs_mut(descriptor.aecs.addr) {
                            Ok(pair) => *pair.slot_mut(select ^ 1) = next,
                            Err(_) => return aecs_error(),
                        }
                    }
                    CompletionRecord {
                        status: CompletionStatus::Success,
                        bytes_completed: descriptor.src.size,
                        crc: state.crc,
                        xor: state.xor,
                        ..CompletionRecord::default()
                    }
                }
                HeaderGen::Off => {
                    let stats = histogram_to_bytes(&histogram);
                    if (descriptor.dst.size as usize) < stats.len() {
                        return overflow();
                    }
                    if memory.write(descriptor.dst.addr, &stats).is_err() {
                        return page_fault(descriptor.dst.addr, true);
                    }
                    CompletionRecord {
                        status: CompletionStatus::Success,
                        bytes_completed: descriptor.src.size,
                        output_size: stats.len() as u32,
                        crc: state.crc,
                        xor: state.xor,
                        ..CompletionRecord::default()
                    }
                }
                _ => invalid_mode(descriptor),
            };
        }

        let mut writer = state.accumulator.writer();
        let tables = match op.header_gen {
            HeaderGen::OnePass { is_final } if self.config.header_generation => {
                let tables = HuffmanTables::from_histogram(&histogram);
                tables.write_dynamic_header(&mut writer, is_final);
                tables
            }
            HeaderGen::Off if state.has_tables() => state.tables(),
            HeaderGen::Off => return aecs_error(),
            _ => return invalid_mode(descriptor),
        };
        if encode_tokens(&mut writer, &tokens, &tables).is_err() {
            return CompletionRecord {
                status: CompletionStatus::AnalyticsError,
                error_code: ERROR_INVALID_HUFFMAN_CODE,
                ..CompletionRecord::default()
            };
        }
        match op.end_proc {
            EndProc::None => {}
            EndProc::AppendEob => write_end_of_block(&mut writer, &tables),
            EndProc::AppendEobFinalStored => {
                write_end_of_block(&mut writer, &tables);
                write_stored_blocks_into(&mut writer, &[], true);
            }
        }

        let flush = op.flags.contains(CompressFlags::FLUSH_OUTPUT) || !writes;
        let bit_len = writer.bit_len();
        let (mut output, leftover) = if flush {
            (writer.into_bytes(), BitWriter::new())
        } else {
            let (bytes, partial) = writer.into_parts();
            (bytes, BitWriter::from_partial(partial))
        };

        let forced = FaultPlan::take(&mut guard(&self.plan).forced_overflows);
        if forced || output.len() > descriptor.dst.size as usize {
            return overflow();
        }
        if !output.is_empty() && FaultPlan::take(&mut guard(&self.plan).corrupt_outputs) {
            let middle = output.len() / 2;
            output[middle] ^= 0x01;
        }
        if memory.write(descriptor.dst.addr, &output).is_err() {
            return page_fault(descriptor.dst.addr, true);
        }

        let kind = crc_kind(flags);
        let crc = kind.checksum(&src, state.crc);
        let xor = xor_checksum(&src, state.xor);
        if writes {
            let Ok(accumulator) = OutputAccumulator::from_writer(&leftover) else {
                return aecs_error();
            };
            let mut next = state;
            next.crc = crc;
            next.xor = xor;
            next.accumulator = accumulator;
            next.set_tables(&tables);
            match memory.compress_aecs_mut(descriptor.aecs.addr) {
                Ok(pair) => *pair.slot_mut(select ^ 1) = next,
                Err(_) => return aecs_error(),
            }
        }

        CompletionRecord {
            status: CompletionStatus::Success,
            bytes_completed: descriptor.src.size,
            output_size: output.len() as u32,
            output_bits: if flush { (bit_len % 8) as u8 } else { 0 },
            crc,
            xor,
            ..CompletionRecord::default()
        }
    }
}

fn decompress(
    descriptor: &Descriptor,
    op: DecompressOp,
    memory: &mut JobMemory,
) -> CompletionRecord {
    if op.flags.contains(DecompressFlags::HUFFMAN_BE)
        || !op.flags.contains(DecompressFlags::ENABLE)
    {
        return invalid_mode(descriptor);
    }
    let src = match memory.read(descriptor.src.addr, u64::from(descriptor.src.size)) {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return page_fault(descriptor.src.addr, false),
    };
    let flags = descriptor.op_flags;
    let select = usize::from(flags.contains(OpFlags::AECS_SELECT));
    let mut access = AecsAccess::empty();
    if flags.contains(OpFlags::READ_AECS) {
        access |= AecsAccess::READ;
    }
    if flags.contains(OpFlags::WRITE_AECS) {
        access |= AecsAccess::WRITE;
    }
    if flags.contains(OpFlags::MAYBE_WRITE_AECS) {
        access |= AecsAccess::MAYBE_WRITE;
    }

    let mut state = if access.contains(AecsAccess::READ) {
        match memory.decompress_aecs_mut(descriptor.aecs.addr) {
            Ok(pair) => pair.slot(select).clone(),
            Err(_) => return aecs_error(),
        }
    } else {
        Default::default()
    };

    let kind = crc_kind(flags);
    let suppress = op.flags.contains(DecompressFlags::SUPPRESS_OUTPUT);
    let (consumed, produced, finished, overflowed) = if suppress {
        // Verification decodes everything and keeps only the checksums.
        let mut scratch = vec![0u8; 64 * 1024];
        let mut pending = src.as_slice();
        let mut produced = 0usize;
        loop {
            let progress = match state.inflater.decompress(pending, &mut scratch) {
                Ok(progress) => progress,
                Err(error) => return decode_error(&error),
            };
            let out = &scratch[..progress.produced];
            state.crc = kind.checksum(out, state.crc);
            state.xor = xor_checksum(out, state.xor);
            produced += progress.produced;
            pending = &pending[progress.consumed..];
            if progress.finished || (progress.produced == 0 && progress.consumed == 0) {
                break (src.len() - pending.len(), produced, progress.finished, false);
            }
        }
    } else {
        let mut out = vec![0u8; descriptor.dst.size as usize];
        let progress = match state.inflater.decompress(&src, &mut out) {
            Ok(progress) => progress,
            Err(error) => return decode_error(&error),
        };
        let written = &out[..progress.produced];
        if memory.write(descriptor.dst.addr, written).is_err() {
            return page_fault(descriptor.dst.addr, true);
        }
        state.crc = kind.checksum(written, state.crc);
        state.xor = xor_checksum(written, state.xor);
        let overflowed = !progress.finished && progress.produced == out.len();
        (progress.consumed, progress.produced, progress.finished, overflowed)
    };

    let crc = state.crc;
    let xor = state.xor;
    let trailing_input = u16::try_from(state.inflater.remaining_input().len()).unwrap_or(u16::MAX);
    if access.wrote(overflowed, finished) {
        match memory.decompress_aecs_mut(descriptor.aecs.addr) {
            Ok(pair) => *pair.slot_mut(select ^ 1) = state,
            Err(_) => return aecs_error(),
        }
    }

    CompletionRecord {
        status: if overflowed {
            CompletionStatus::OutputOverflow
        } else {
            CompletionStatus::Success
        },
        bytes_completed: consumed as u32,
        output_size: if suppress { 0 } else { produced as u32 },
        end_of_stream: finished,
        trailing_input,
        crc,
        xor,
        ..CompletionRecord::default()
    }
}

fn crc_kind(flags: OpFlags) -> Crc32Kind {
    if flags.contains(OpFlags::CRC32C) {
        Crc32Kind::Castagnoli
    } else {
        Crc32Kind::Gzip
    }
}

fn page_fault(addr: u64, write: bool) -> CompletionRecord {
    CompletionRecord {
        status: if write {
            CompletionStatus::WritePageFault
        } else {
            CompletionStatus::ReadPageFault
        },
        fault_addr: addr,
        ..CompletionRecord::default()
    }
}

fn overflow() -> CompletionRecord {
    CompletionRecord {
        status: CompletionStatus::OutputOverflow,
        error_code: ERROR_UNRECOVERABLE_OUTPUT_OVERFLOW,
        ..CompletionRecord::default()
    }
}

fn aecs_error() -> CompletionRecord {
    CompletionRecord {
        status: CompletionStatus::AnalyticsError,
        error_code: ERROR_AECS,
        ..CompletionRecord::default()
    }
}

fn decode_error(error: &compress::InflateError) -> CompletionRecord {
    CompletionRecord {
        status: CompletionStatus::AnalyticsError,
        error_code: inflate_error_code(error),
        ..CompletionRecord::default()
    }
}

fn invalid_mode(descriptor: &Descriptor) -> CompletionRecord {
    let mode = match descriptor.operation {
        Operation::Compress(op) => u32::from(op.flags.bits()),
        Operation::Decompress(op) => u32::from(op.flags.bits()),
    };
    CompletionRecord {
        status: CompletionStatus::UnsupportedOpcode,
        invalid_flags: mode,
        ..CompletionRecord::default()
    }
}

impl WorkQueue for EmulatedDevice {
    fn supports(&self, opcode: Opcode) -> bool {
        self.config.opcodes.contains(&opcode)
    }

    fn submit(
        &self,
        descriptor: &[u8; DESCRIPTOR_SIZE],
        memory: &SharedMemory,
    ) -> Result<(), QueueFull> {
        if FaultPlan::take(&mut guard(&self.plan).busy_rejections) {
            return Err(QueueFull);
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        {
            let mut job = lock(memory);
            let _ = job.write(
                Descriptor::completion_addr_of(descriptor),
                &CompletionRecord::default().to_bytes(),
            );
        }
        if self.config.latency_polls == 0 {
            self.execute(descriptor, memory);
        } else {
            guard(&self.pending).push_back(Pending {
                descriptor: *descriptor,
                memory: SharedMemory::clone(memory),
                remaining: self.config.latency_polls,
            });
        }
        Ok(())
    }

    fn progress(&self) {
        let due: VecDeque<Pending> = {
            let mut pending = guard(&self.pending);
            for item in pending.iter_mut() {
                item.remaining = item.remaining.saturating_sub(1);
            }
            let (due, waiting): (VecDeque<Pending>, VecDeque<Pending>) =
                pending.drain(..).partition(|item| item.remaining == 0);
            *pending = waiting;
            due
        };
        for item in due {
            self.execute(&item.descriptor, &item.memory);
        }
    }

    fn generation(&self) -> u8 {
        self.config.generation
    }

    fn header_generation(&self) -> bool {
        self.config.header_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aecs::{AecsPair, COMPRESS_AECS_SIZE, DECOMPRESS_AECS_SIZE, DecompressAecs};
    use crate::descriptor::Buffer;
    use crate::memory::{AecsState, shared};
    use compress::Inflater;

    const SRC: u64 = 0x10_0000;
    const DST: u64 = 0x20_0000;
    const RECORD: u64 = 0x30_0000;
    const AECS: u64 = 0x40_0000;

    fn setup(input: &[u8], dst: usize) -> SharedMemory {
        let memory = shared();
        {
            let mut job = lock(&memory);
            job.map(SRC, input.to_vec()).unwrap();
            job.map(DST, vec![0; dst]).unwrap();
            job.map(RECORD, vec![0; 64]).unwrap();
            job.map_aecs(
                AECS,
                COMPRESS_AECS_SIZE as u64,
                AecsState::Compress(AecsPair::default()),
            )
            .unwrap();
        }
        memory
    }

    fn compress_descriptor(
        op: CompressOp,
        access: AecsAccess,
        input: usize,
        dst: usize,
    ) -> Descriptor {
        let mut descriptor = Descriptor::new(Operation::Compress(op), RECORD);
        descriptor.op_flags |= access.op_flags();
        descriptor.src = Buffer::new(SRC, input as u32);
        descriptor.dst = Buffer::new(DST, dst as u32);
        descriptor.aecs = Buffer::new(AECS, COMPRESS_AECS_SIZE as u32);
        descriptor
    }

    fn record(memory: &SharedMemory) -> CompletionRecord {
        CompletionRecord::from_bytes(lock(memory).region(RECORD).unwrap())
    }

    fn output(memory: &SharedMemory, record: &CompletionRecord) -> Vec<u8> {
        lock(memory).region(DST).unwrap()[..record.output_size as usize].to_vec()
    }

    #[test]
    fn one_pass_header_generation_produces_a_stream() {
        let input = b"accelerated deflate, accelerated deflate".repeat(20);
        let memory = setup(&input, 4096);
        let device = EmulatedDevice::new(DeviceConfig::default());
        let op = CompressOp {
            flags: CompressFlags::FLUSH_OUTPUT,
            end_proc: EndProc::AppendEob,
            header_gen: HeaderGen::OnePass { is_final: true },
        };
        let descriptor = compress_descriptor(op, AecsAccess::READ, input.len(), 4096);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        let record = record(&memory);
        assert_eq!(record.status, CompletionStatus::Success);
        assert_eq!(record.crc, checksums::crc32_gzip(&input, 0));
        let bytes = output(&memory, &record);
        assert_eq!(Inflater::new().decompress_vec(&bytes).unwrap(), input);
    }

    #[test]
    fn overflow_writes_nothing() {
        let input: Vec<u8> = (0..3000u32).map(|i| (i * 7919 % 251) as u8).collect();
        let memory = setup(&input, 16);
        let device = EmulatedDevice::new(DeviceConfig::default());
        let op = CompressOp {
            flags: CompressFlags::FLUSH_OUTPUT,
            end_proc: EndProc::AppendEob,
            header_gen: HeaderGen::OnePass { is_final: true },
        };
        let descriptor = compress_descriptor(op, AecsAccess::READ, input.len(), 16);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        let record = record(&memory);
        assert_eq!(record.status, CompletionStatus::OutputOverflow);
        assert_eq!(record.error_code, ERROR_UNRECOVERABLE_OUTPUT_OVERFLOW);
        assert_eq!(lock(&memory).region(DST), Some(&[0u8; 16][..]));
    }

    #[test]
    fn two_pass_statistics_fill_the_write_slot() {
        let input = b"statistics first, data second".repeat(8);
        let memory = setup(&input, 4096);
        let device = EmulatedDevice::new(DeviceConfig::default());
        let stats = CompressOp {
            flags: CompressFlags::STATS_MODE,
            end_proc: EndProc::None,
            header_gen: HeaderGen::TwoPass { is_final: true },
        };
        let access = AecsAccess::READ | AecsAccess::WRITE;
        let descriptor = compress_descriptor(stats, access, input.len(), 4096);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        assert_eq!(record(&memory).status, CompletionStatus::Success);

        {
            let mut job = lock(&memory);
            let pair = job.compress_aecs_mut(AECS).unwrap();
            assert!(pair.other().has_tables());
            assert!(pair.other().accumulator.bits() > 3);
            pair.toggle();
        }

        let data = CompressOp {
            flags: CompressFlags::FLUSH_OUTPUT,
            end_proc: EndProc::AppendEob,
            header_gen: HeaderGen::Off,
        };
        let descriptor =
            compress_descriptor(data, AecsAccess::READ | AecsAccess::TOGGLE, input.len(), 4096);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        let record = record(&memory);
        assert_eq!(record.status, CompletionStatus::Success);
        let bytes = output(&memory, &record);
        assert_eq!(Inflater::new().decompress_vec(&bytes).unwrap(), input);
    }

    #[test]
    fn statistics_without_header_generation_write_a_histogram() {
        let input = b"aaaaabbbc";
        let memory = setup(input, STATS_SIZE);
        let device = EmulatedDevice::new(DeviceConfig::default().header_generation(false));
        let stats = CompressOp {
            flags: CompressFlags::STATS_MODE,
            ..CompressOp::default()
        };
        let descriptor = compress_descriptor(stats, AecsAccess::empty(), input.len(), STATS_SIZE);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        let record = record(&memory);
        assert_eq!(record.output_size as usize, STATS_SIZE);
        let histogram = histogram_from_bytes(&output(&memory, &record)).unwrap();
        assert_eq!(histogram.lit_len[256], 1);
        assert!(histogram.lit_len[usize::from(b'c')] >= 1);
    }

    #[test]
    fn evicted_source_page_faults_once() {
        let input = b"fault me";
        let memory = setup(input, 64);
        let plan = FaultPlan {
            read_faults: 1,
            ..FaultPlan::default()
        };
        let device = EmulatedDevice::with_faults(DeviceConfig::default(), plan);
        let op = CompressOp {
            flags: CompressFlags::FLUSH_OUTPUT,
            end_proc: EndProc::AppendEob,
            header_gen: HeaderGen::OnePass { is_final: true },
        };
        let bytes = compress_descriptor(op, AecsAccess::READ, input.len(), 64).to_bytes();
        device.submit(&bytes, &memory).unwrap();
        let first = record(&memory);
        assert_eq!(first.status, CompletionStatus::ReadPageFault);
        assert_eq!(first.fault_addr, SRC);
        lock(&memory).touch(first.fault_addr).unwrap();
        device.submit(&bytes, &memory).unwrap();
        assert_eq!(record(&memory).status, CompletionStatus::Success);
        assert_eq!(device.accepted(), 2);
    }

    #[test]
    fn busy_rejections_and_latency() {
        let input = b"slow";
        let memory = setup(input, 64);
        let plan = FaultPlan {
            busy_rejections: 1,
            ..FaultPlan::default()
        };
        let device = EmulatedDevice::with_faults(DeviceConfig::default().latency_polls(2), plan);
        let op = CompressOp {
            flags: CompressFlags::FLUSH_OUTPUT,
            end_proc: EndProc::AppendEob,
            header_gen: HeaderGen::OnePass { is_final: true },
        };
        let bytes = compress_descriptor(op, AecsAccess::READ, input.len(), 64).to_bytes();
        assert_eq!(device.submit(&bytes, &memory), Err(QueueFull));
        device.submit(&bytes, &memory).unwrap();
        assert_eq!(record(&memory).status, CompletionStatus::InProgress);
        device.progress();
        assert_eq!(record(&memory).status, CompletionStatus::InProgress);
        device.progress();
        assert_eq!(record(&memory).status, CompletionStatus::Success);
    }

    #[test]
    fn staggered_descriptors_complete_after_their_own_latency() {
        let earlier = setup(b"first in", 64);
        let later = setup(b"second in", 64);
        let device = EmulatedDevice::new(DeviceConfig::default().latency_polls(2));
        let op = CompressOp {
            flags: CompressFlags::FLUSH_OUTPUT,
            end_proc: EndProc::AppendEob,
            header_gen: HeaderGen::OnePass { is_final: true },
        };
        device
            .submit(&compress_descriptor(op, AecsAccess::READ, 8, 64).to_bytes(), &earlier)
            .unwrap();
        device.progress();
        device
            .submit(&compress_descriptor(op, AecsAccess::READ, 9, 64).to_bytes(), &later)
            .unwrap();
        device.progress();
        assert_eq!(record(&earlier).status, CompletionStatus::Success);
        assert_eq!(record(&later).status, CompletionStatus::InProgress);
        device.progress();
        assert_eq!(record(&later).status, CompletionStatus::Success);
        assert_eq!(device.accepted(), 2);
    }

    #[test]
    fn decompress_overflow_keeps_state_in_the_other_slot() {
        let input = b"resumable inflate output ".repeat(40);
        let compressed = compress::deflate(
            &input,
            CompressionLevel::Default,
            compress::BlockStyle::Dynamic,
        )
        .unwrap();
        let memory = shared();
        {
            let mut job = lock(&memory);
            job.map(SRC, compressed.clone()).unwrap();
            job.map(DST, vec![0; 100]).unwrap();
            job.map(RECORD, vec![0; 64]).unwrap();
            job.map_aecs(
                AECS,
                DECOMPRESS_AECS_SIZE as u64,
                AecsState::Decompress(AecsPair::<DecompressAecs>::default()),
            )
            .unwrap();
        }
        let device = EmulatedDevice::new(DeviceConfig::default());
        let mut descriptor = Descriptor::new(
            Operation::Decompress(DecompressOp {
                flags: DecompressFlags::ENABLE | DecompressFlags::FLUSH_OUTPUT,
            }),
            RECORD,
        );
        descriptor.op_flags |= AecsAccess::MAYBE_WRITE.op_flags();
        descriptor.src = Buffer::new(SRC, compressed.len() as u32);
        descriptor.dst = Buffer::new(DST, 100);
        descriptor.aecs = Buffer::new(AECS, DECOMPRESS_AECS_SIZE as u32);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        let record = record(&memory);
        assert_eq!(record.status, CompletionStatus::OutputOverflow);
        assert_eq!(record.output_size, 100);
        let mut job = lock(&memory);
        let pair = job.decompress_aecs_mut(AECS).unwrap();
        assert_eq!(pair.other().inflater.total_out(), 100);
        assert_eq!(pair.current().inflater.total_out(), 0);
    }

    #[test]
    fn corrupted_stream_reports_decode_error() {
        let memory = setup(&[0xFF, 0xFF, 0xFF], 64);
        let device = EmulatedDevice::new(DeviceConfig::default());
        let mut descriptor = Descriptor::new(
            Operation::Decompress(DecompressOp {
                flags: DecompressFlags::ENABLE,
            }),
            RECORD,
        );
        descriptor.src = Buffer::new(SRC, 3);
        descriptor.dst = Buffer::new(DST, 64);
        device.submit(&descriptor.to_bytes(), &memory).unwrap();
        let record = record(&memory);
        assert_eq!(record.status, CompletionStatus::AnalyticsError);
        // 0xFF starts a final block of reserved type 11.
        assert_eq!(record.error_code, 13);
    }
}
