//! Compression on the accelerator.
//!
//! # Design
//!
//! Each chunk becomes one data pass, preceded for dynamic blocks by a
//! statistics pass unless one-pass header generation applies:
//!
//! - **One-pass**: the device builds the tables and header from the chunk
//!   itself. Used when it can generate headers and the chunk is small.
//! - **Two-pass**: a statistics pass writes the header and tables into the
//!   next AECS slot, then the data pass reads them.
//! - **Software header**: the statistics pass only returns a histogram; the
//!   tables and header are built here and placed in the read slot.
//!
//! Fixed blocks span chunks until the stream ends or `START_NEW_BLOCK`
//! closes them.
//!
//! # Invariants
//!
//! The compress pair is snapshotted before the data pass and restored on
//! every outcome that does not commit the chunk, so a retried call sees the
//! state it saw the first time. A statistics pass that completed is not
//! repeated on retry, on the first chunk of a stream included.
//!
//! # Errors
//!
//! An overflow with error 21 falls back to stored blocks over the chunk. If
//! those do not fit either, the call reports `MoreOutputNeeded` and the
//! stream is unchanged.

use accel::completion::ERROR_UNRECOVERABLE_OUTPUT_OVERFLOW;
use accel::device::STATS_SIZE;
use accel::memory::lock;
use accel::{
    AecsAccess, AecsPair, CompressAecs, CompressFlags, CompressOp, EndProc, HeaderGen, Operation,
    SharedMemory, Submitter, apply_be16_erratum, compress_access, histogram_from_bytes,
    needs_be16_erratum,
};
use checksums::{Crc32Kind, xor_checksum};
use compress::{
    HuffmanTables, calculate_size_needed, write_end_of_block, write_fixed_header,
    write_stored_blocks_into,
};

use crate::context::{ExecutionStep, StreamContext, stream_header};
use crate::error::{EngineError, EngineResult};
use crate::flags::JobFlags;
use crate::hardware::{self, COMPRESS_AECS, VERIFY_AECS};
use crate::job::Chunk;
use crate::status::{Progress, Status};
use crate::verify::verify_on_device;

/// Device capabilities and thresholds for one call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DeflateSettings {
    pub(crate) one_pass_limit: usize,
    pub(crate) header_generation: bool,
    pub(crate) generation: u8,
}

struct PassOutput {
    bytes: Vec<u8>,
    crc: u32,
    xor: u32,
    /// Slot to install as the next read slot after a stored fallback.
    replacement: Option<CompressAecs>,
    toggle: bool,
}

fn aecs_failure(error: impl std::fmt::Display) -> EngineError {
    EngineError::Internal(format!("compress state: {error}"))
}

fn with_pair<T>(
    memory: &SharedMemory,
    f: impl FnOnce(&mut AecsPair<CompressAecs>) -> EngineResult<T>,
) -> EngineResult<T> {
    let mut job = lock(memory);
    let pair = job
        .compress_aecs_mut(COMPRESS_AECS)
        .map_err(hardware::internal)?;
    f(pair)
}

fn restore(memory: &SharedMemory, snapshot: AecsPair<CompressAecs>) {
    // A pair that cannot be found has nothing to restore.
    let _ = with_pair(memory, |pair| {
        *pair = snapshot;
        Ok(())
    });
}

pub(crate) fn compress_chunk(
    submitter: &Submitter,
    settings: DeflateSettings,
    context: &mut StreamContext,
    chunk: &Chunk<'_>,
    input: &[u8],
    output: &mut [u8],
) -> EngineResult<Progress> {
    let flags = chunk.flags;
    let position = chunk.position;
    let last = position.is_last();
    let framing = flags.framing();
    let crc32c = flags.contains(JobFlags::CRC32C);
    let dynamic = flags.contains(JobFlags::DYNAMIC_HUFFMAN);
    let memory = context.hardware_mut()?.memory();

    let header = if position.is_first() {
        stream_header(framing, chunk.dictionary)
    } else {
        Vec::new()
    };
    let reserved = header.len() + if last { framing.trailer_len() } else { 0 };
    let Some(avail_out) = output.len().checked_sub(reserved) else {
        return Err(EngineError::DestinationTooShort);
    };

    if position.is_first() && !context.multi_desc_done {
        with_pair(&memory, |pair| {
            pair.reset_index();
            pair.current_mut().reset_stream();
            Ok(())
        })?;
        *lock(&memory)
            .decompress_aecs_mut(VERIFY_AECS)
            .map_err(hardware::internal)? = AecsPair::default();
        context.execution = ExecutionStep::HeaderInserting;
    }

    let one_pass = dynamic
        && settings.header_generation
        && input.len() <= settings.one_pass_limit
        && chunk.dictionary.is_none();
    if dynamic && !one_pass && !context.multi_desc_done {
        context.saved_bits = with_pair(&memory, |pair| Ok(pair.current().accumulator.bits()))?;
        collect_statistics(submitter, settings, &memory, input, last, crc32c)?;
        context.multi_desc_done = true;
    }

    let (snapshot, access, inserting) = with_pair(&memory, |pair| {
        let snapshot = pair.clone();
        let mut inserting = dynamic || context.execution == ExecutionStep::HeaderInserting;
        if dynamic {
            if one_pass {
                context.saved_bits = pair.current().accumulator.bits();
            }
        } else {
            let tables = HuffmanTables::fixed();
            let slot = pair.current_mut();
            slot.set_tables(&tables);
            if !inserting && flags.contains(JobFlags::START_NEW_BLOCK) {
                slot.append_bits(|writer| write_end_of_block(writer, &tables))
                    .map_err(aecs_failure)?;
                inserting = true;
            }
            if inserting {
                context.saved_bits = slot.accumulator.bits();
                slot.append_bits(|writer| write_fixed_header(writer, last))
                    .map_err(aecs_failure)?;
            }
        }
        Ok((snapshot, pair.access(compress_access(position)), inserting))
    })?;

    let end_proc = if dynamic {
        EndProc::AppendEob
    } else if !last {
        EndProc::None
    } else if inserting {
        EndProc::AppendEob
    } else {
        EndProc::AppendEobFinalStored
    };
    let operation = Operation::Compress(CompressOp {
        flags: if last {
            CompressFlags::FLUSH_OUTPUT
        } else {
            CompressFlags::empty()
        },
        end_proc,
        header_gen: if one_pass {
            HeaderGen::OnePass { is_final: last }
        } else {
            HeaderGen::Off
        },
    });

    let pass = match data_pass(
        submitter,
        settings,
        &memory,
        operation,
        access,
        input,
        avail_out,
        flags,
        last,
    ) {
        Ok(pass) => pass,
        Err(error) => {
            restore(&memory, snapshot);
            return Err(error);
        }
    };
    let pass = match pass {
        Some(pass) => pass,
        None => {
            let fallback = with_pair(&memory, |pair| {
                Ok(stored_fallback(
                    pair.current(),
                    context.saved_bits,
                    inserting,
                    input,
                    last,
                    flags.crc_kind(),
                    avail_out,
                ))
            });
            match fallback {
                Ok(Some(pass)) => pass,
                Ok(None) => {
                    restore(&memory, snapshot);
                    return Ok(Progress::more_output());
                }
                Err(error) => {
                    restore(&memory, snapshot);
                    return Err(error);
                }
            }
        }
    };

    if context.verify {
        let verified =
            verify_on_device(submitter, &memory, position, &pass.bytes, pass.crc, crc32c);
        if let Err(error) = verified {
            if !error.class().is_fatal() {
                restore(&memory, snapshot);
            }
            return Err(error);
        }
    }

    let stored = pass.replacement.is_some();
    with_pair(&memory, |pair| {
        if let Some(next) = pass.replacement {
            *pair.other_mut() = next;
            pair.toggle();
        } else if pass.toggle {
            pair.toggle();
        }
        logging::trace_aecs!(read_index = pair.read_index(), stored, "committed compress state");
        Ok(())
    })?;

    let body = header.len() + pass.bytes.len();
    output[..header.len()].copy_from_slice(&header);
    output[header.len()..body].copy_from_slice(&pass.bytes);

    context.crc = pass.crc;
    context.xor = pass.xor;
    if framing.uses_adler32() {
        context.adler = checksums::adler32(input, context.adler);
    }
    context.total_in += input.len() as u64;
    let mut produced = body;
    if last {
        let checksum = if framing.uses_adler32() {
            context.adler
        } else {
            context.crc
        };
        let trailer = framing.trailer(checksum, context.total_in);
        output[body..body + trailer.len()].copy_from_slice(&trailer);
        produced += trailer.len();
    }
    context.total_out += produced as u64;
    context.multi_desc_done = false;
    context.execution = if last {
        ExecutionStep::Completed
    } else if dynamic || stored {
        ExecutionStep::HeaderInserting
    } else {
        ExecutionStep::DataProcessing
    };
    context.commit(position, last);
    Ok(Progress::new(Status::Ok, input.len(), produced))
}

/// Runs the statistics pass of a dynamic block.
fn collect_statistics(
    submitter: &Submitter,
    settings: DeflateSettings,
    memory: &SharedMemory,
    input: &[u8],
    last: bool,
    crc32c: bool,
) -> EngineResult<()> {
    if settings.header_generation {
        let access = with_pair(memory, |pair| {
            Ok(pair.access(AecsAccess::READ | AecsAccess::WRITE))
        })?;
        let operation = Operation::Compress(CompressOp {
            flags: CompressFlags::STATS_MODE,
            end_proc: EndProc::None,
            header_gen: HeaderGen::TwoPass { is_final: last },
        });
        let descriptor = hardware::descriptor(
            operation,
            access,
            hardware::compress_aecs(),
            input.len(),
            0,
            crc32c,
        )?;
        hardware::run_pass(submitter, memory, &descriptor, input)?;
        with_pair(memory, |pair| {
            pair.toggle();
            Ok(())
        })?;
        logging::trace_huffman!(len = input.len(), "device built the block header");
        return Ok(());
    }

    let operation = Operation::Compress(CompressOp {
        flags: CompressFlags::STATS_MODE,
        end_proc: EndProc::None,
        header_gen: HeaderGen::Off,
    });
    let descriptor = hardware::descriptor(
        operation,
        AecsAccess::empty(),
        hardware::compress_aecs(),
        input.len(),
        STATS_SIZE,
        crc32c,
    )?;
    let (_, stats) = hardware::run_pass(submitter, memory, &descriptor, input)?;
    let histogram = histogram_from_bytes(&stats)
        .ok_or_else(|| EngineError::Internal("statistics record is truncated".into()))?;
    let tables = HuffmanTables::from_histogram(&histogram);
    with_pair(memory, |pair| {
        let slot = pair.current_mut();
        slot.set_tables(&tables);
        slot.append_bits(|writer| tables.write_dynamic_header(writer, last))
            .map_err(aecs_failure)
    })?;
    logging::trace_huffman!(len = input.len(), "built the block header from device statistics");
    Ok(())
}

/// Submits the data pass; `Ok(None)` reports an unrecoverable overflow.
#[allow(clippy::too_many_arguments)]
fn data_pass(
    submitter: &Submitter,
    settings: DeflateSettings,
    memory: &SharedMemory,
    operation: Operation,
    access: AecsAccess,
    input: &[u8],
    avail_out: usize,
    flags: JobFlags,
    last: bool,
) -> EngineResult<Option<PassOutput>> {
    let descriptor = hardware::descriptor(
        operation,
        access,
        hardware::compress_aecs(),
        input.len(),
        avail_out,
        flags.contains(JobFlags::CRC32C),
    )?;
    let (completed, mut bytes) = hardware::run_pass(submitter, memory, &descriptor, input)?;
    let mut record = completed.record;
    if completed.overflowed() {
        if record.error_code == ERROR_UNRECOVERABLE_OUTPUT_OVERFLOW {
            return Ok(None);
        }
        return Err(EngineError::Internal(format!(
            "compress overflow with error {}",
            record.error_code
        )));
    }
    if needs_be16_erratum(settings.generation, flags.contains(JobFlags::HUFFMAN_BE), last) {
        apply_be16_erratum(&mut record);
        bytes.truncate(record.output_size as usize);
    }
    Ok(Some(PassOutput {
        bytes,
        crc: record.crc,
        xor: record.xor,
        replacement: None,
        toggle: access.contains(AecsAccess::WRITE),
    }))
}

/// Re-encodes the chunk as stored blocks after the device overflowed.
///
/// Returns `None` when the stored form does not fit either.
fn stored_fallback(
    current: &CompressAecs,
    saved_bits: usize,
    inserting: bool,
    input: &[u8],
    last: bool,
    kind: Crc32Kind,
    avail_out: usize,
) -> Option<PassOutput> {
    let mut slot = current.clone();
    if inserting {
        slot.accumulator.truncate(saved_bits);
    }
    let mut writer = slot.accumulator.writer();
    if !inserting {
        write_end_of_block(&mut writer, &slot.tables());
    }
    if calculate_size_needed(input.len(), writer.bit_len()) > avail_out {
        return None;
    }
    write_stored_blocks_into(&mut writer, input, last);
    let crc = kind.checksum(input, current.crc);
    let xor = xor_checksum(input, current.xor);
    slot.crc = crc;
    slot.xor = xor;
    slot.accumulator.clear();
    logging::trace_fallback!(
        len = input.len(),
        closed_block = !inserting,
        "accelerator output overflowed, storing the chunk"
    );
    Some(PassOutput {
        bytes: writer.into_bytes(),
        crc,
        xor,
        replacement: Some(slot),
        toggle: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compress::Inflater;

    #[test]
    fn stored_fallback_drops_the_unused_header() {
        let mut slot = CompressAecs::default();
        slot.set_tables(&HuffmanTables::fixed());
        slot.append_bits(|writer| write_fixed_header(writer, true)).unwrap();
        let input = b"stored fallback payload";
        let pass = stored_fallback(&slot, 0, true, input, true, Crc32Kind::Gzip, 64).unwrap();
        let mut inflater = Inflater::new();
        assert_eq!(inflater.decompress_vec(&pass.bytes).unwrap(), input);
        assert_eq!(pass.crc, checksums::crc32_gzip(input, 0));
        let next = pass.replacement.unwrap();
        assert_eq!(next.accumulator.bits(), 0);
    }

    #[test]
    fn stored_fallback_closes_an_open_fixed_block() {
        // An open fixed block holding "ab", left unterminated in the accumulator.
        let mut slot = CompressAecs::default();
        slot.set_tables(&HuffmanTables::fixed());
        slot.append_bits(|writer| {
            write_fixed_header(writer, false);
            for &byte in b"ab" {
                writer.write_code(HuffmanTables::fixed().lit_len()[usize::from(byte)]);
            }
        })
        .unwrap();
        slot.crc = checksums::crc32_gzip(b"ab", 0);
        let pass = stored_fallback(&slot, 0, false, b"cd", true, Crc32Kind::Gzip, 64).unwrap();
        let mut inflater = Inflater::new();
        assert_eq!(inflater.decompress_vec(&pass.bytes).unwrap(), b"abcd");
        assert_eq!(pass.crc, checksums::crc32_gzip(b"abcd", 0));
    }

    #[test]
    fn stored_fallback_respects_the_output_limit() {
        let slot = CompressAecs::default();
        assert!(stored_fallback(&slot, 0, true, &[0; 100], true, Crc32Kind::Gzip, 104).is_none());
        assert!(stored_fallback(&slot, 0, true, &[0; 100], true, Crc32Kind::Gzip, 105).is_some());
    }
}
