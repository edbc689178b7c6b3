//! Decompression on the accelerator.
//!
//! The decoder state lives in the decompress AECS pair. A pass whose output
//! overflowed is resumed by a continuation pass that reads the saved state;
//! the engine never re-feeds input the device already took.

use accel::memory::lock;
use accel::{
    AecsPair, DecompressFlags, DecompressOp, Operation, Submitter, decompress_access,
};

use crate::context::{StreamContext, parse_stream_header};
use crate::error::{EngineError, EngineResult};
use crate::flags::JobFlags;
use crate::hardware::{self, DECOMPRESS_AECS};
use crate::job::Chunk;
use crate::status::{Progress, Status};

pub(crate) fn decompress_chunk(
    submitter: &Submitter,
    context: &mut StreamContext,
    chunk: &Chunk<'_>,
    input: &[u8],
    output: &mut [u8],
) -> EngineResult<Progress> {
    if chunk.dictionary.is_some() {
        return Err(EngineError::NotSupportedMode(
            "preset dictionaries on the accelerator decompress path",
        ));
    }
    let flags = chunk.flags;
    let position = chunk.position;
    let framing = flags.framing();

    let header_len = if position.is_first() {
        match parse_stream_header(framing, false, input)? {
            Some(len) => len,
            None => return Ok(Progress::new(Status::MoreInputNeeded, 0, 0)),
        }
    } else {
        0
    };
    let src = &input[header_len..];
    let memory = context.hardware_mut()?.memory();

    let access = {
        let mut job = lock(&memory);
        let pair = job
            .decompress_aecs_mut(DECOMPRESS_AECS)
            .map_err(hardware::internal)?;
        if position.is_first() {
            *pair = AecsPair::default();
        }
        pair.access(decompress_access(position, context.continuation))
    };
    let mut mode = DecompressFlags::ENABLE | DecompressFlags::CHECK_FOR_EOB;
    if position.is_last() {
        mode |= DecompressFlags::FLUSH_OUTPUT | DecompressFlags::STOP_ON_EOB;
    }
    let descriptor = hardware::descriptor(
        Operation::Decompress(DecompressOp { flags: mode }),
        access,
        hardware::decompress_aecs(),
        src.len(),
        output.len(),
        flags.contains(JobFlags::CRC32C),
    )?;
    let (completed, bytes) = hardware::run_pass(submitter, &memory, &descriptor, src)?;
    let record = completed.record;
    let overflowed = completed.overflowed();
    if overflowed && bytes.is_empty() {
        return Err(EngineError::DestinationTooShort);
    }
    let finished = record.end_of_stream;
    if access.wrote(overflowed, finished) {
        lock(&memory)
            .decompress_aecs_mut(DECOMPRESS_AECS)
            .map_err(hardware::internal)?
            .toggle();
    }
    logging::trace_aecs!(
        access = access.bits(),
        overflowed,
        finished,
        "decompress pass completed"
    );

    output[..bytes.len()].copy_from_slice(&bytes);
    context.crc = record.crc;
    context.xor = record.xor;
    if framing.uses_adler32() {
        context.adler = checksums::adler32(&bytes, context.adler);
    }
    context.total_out += bytes.len() as u64;
    context.continuation = overflowed;

    let taken_now = (record.bytes_completed as usize).min(src.len());
    let mut consumed = header_len + taken_now;
    let stream = context.hardware_mut()?;
    let post_stream = if finished {
        let leftover = &src[taken_now..];
        // Trailer bytes may already sit in the device's input buffer.
        let earlier = usize::from(record.trailing_input).saturating_sub(leftover.len());
        let mut post = stream.recent(earlier).to_vec();
        post.extend_from_slice(leftover);
        Some((post, earlier))
    } else {
        stream.remember(src);
        None
    };
    if let Some((post, earlier)) = post_stream {
        let taken = context.absorb_trailer(framing, &post);
        consumed += taken.saturating_sub(earlier);
    }
    context.total_in += consumed as u64;

    let output_full = bytes.len() == output.len();
    let status = context.finish_decompress(flags, finished, output_full)?;
    Ok(Progress::new(status, consumed, bytes.len()))
}
