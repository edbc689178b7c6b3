//! Software compression and decompression.
//!
//! Used when no accelerator is configured, when the job asks for it, and when
//! the first chunk of an `Auto` stream fails on the device. Every call is
//! all-or-nothing on the compress side: a chunk whose output does not fit
//! leaves the stream untouched and reports `MoreOutputNeeded`.

use checksums::xor_checksum;
use compress::tables::WINDOW_SIZE;
use compress::{ChunkRequest, CompressionLevel, Deflater, Inflater};

use crate::context::{ExecutionStep, StreamContext, parse_stream_header, stream_header};
use crate::error::{EngineError, EngineResult};
use crate::flags::JobFlags;
use crate::job::Chunk;
use crate::status::{Progress, Status};
use crate::verify::Verifier;

/// Software codec state of one stream.
#[derive(Debug)]
pub(crate) enum SoftwareStream {
    Deflate {
        deflater: Deflater,
        verifier: Option<Verifier>,
    },
    Inflate {
        inflater: Inflater,
    },
}

impl SoftwareStream {
    pub(crate) fn deflate(
        level: CompressionLevel,
        dictionary: Option<&[u8]>,
        flags: JobFlags,
        verify: bool,
    ) -> Self {
        let deflater = match dictionary {
            Some(dictionary) => Deflater::with_dictionary(level, WINDOW_SIZE, dictionary),
            None => Deflater::new(level),
        };
        Self::Deflate {
            deflater,
            verifier: verify.then(|| Verifier::new(flags.crc_kind(), dictionary)),
        }
    }

    pub(crate) fn inflate(dictionary: Option<&[u8]>) -> Self {
        Self::Inflate {
            inflater: dictionary.map_or_else(Inflater::new, Inflater::with_dictionary),
        }
    }
}

fn wrong_codec() -> EngineError {
    EngineError::Internal("software stream holds the other codec".into())
}

pub(crate) fn compress_chunk(
    context: &mut StreamContext,
    chunk: &Chunk<'_>,
    input: &[u8],
    output: &mut [u8],
) -> EngineResult<Progress> {
    let flags = chunk.flags;
    let position = chunk.position;
    let last = position.is_last();
    let framing = flags.framing();
    let kind = flags.crc_kind();
    let checksums = !flags.contains(JobFlags::OMIT_CHECKSUMS);

    let header = if position.is_first() {
        stream_header(framing, chunk.dictionary)
    } else {
        Vec::new()
    };
    let crc = if checksums { kind.checksum(input, context.crc) } else { context.crc };
    let xor = if checksums { xor_checksum(input, context.xor) } else { context.xor };
    let adler = if framing.uses_adler32() {
        checksums::adler32(input, context.adler)
    } else {
        context.adler
    };
    let total_in = context.total_in + input.len() as u64;
    let trailer = if last {
        framing.trailer(if framing.uses_adler32() { adler } else { crc }, total_in)
    } else {
        Vec::new()
    };

    let SoftwareStream::Deflate { deflater, verifier } = context.software_mut()? else {
        return Err(wrong_codec());
    };
    let encoded = deflater.encode(
        input,
        ChunkRequest {
            is_final: last,
            style: flags.style(),
            start_new_block: flags.contains(JobFlags::START_NEW_BLOCK),
        },
    )?;

    let fixed = header.len() + trailer.len();
    if fixed > output.len() {
        return Err(EngineError::DestinationTooShort);
    }
    let produced = fixed + encoded.bytes.len();
    if produced > output.len() {
        return Ok(Progress::more_output());
    }

    if let Some(verifier) = verifier {
        let mut trial = verifier.clone();
        trial.feed(&encoded.bytes)?;
        if last {
            trial.finish(crc)?;
        }
        logging::trace_verify!(decoded = trial.decoded(), "verified software chunk");
        *verifier = trial;
    }
    deflater.commit(input, &encoded);

    let body = header.len() + encoded.bytes.len();
    output[..header.len()].copy_from_slice(&header);
    output[header.len()..body].copy_from_slice(&encoded.bytes);
    output[body..produced].copy_from_slice(&trailer);
    if encoded.used_stored {
        logging::trace_fallback!(
            len = input.len(),
            "stored blocks are smaller than the compressed chunk"
        );
    }

    context.crc = crc;
    context.xor = xor;
    context.adler = adler;
    context.total_in = total_in;
    context.total_out += produced as u64;
    context.execution = if last {
        ExecutionStep::Completed
    } else if encoded.block_open {
        ExecutionStep::DataProcessing
    } else {
        ExecutionStep::HeaderInserting
    };
    context.commit(position, last);
    Ok(Progress::new(Status::Ok, input.len(), produced))
}

pub(crate) fn decompress_chunk(
    context: &mut StreamContext,
    chunk: &Chunk<'_>,
    input: &[u8],
    output: &mut [u8],
) -> EngineResult<Progress> {
    let flags = chunk.flags;
    let framing = flags.framing();
    let kind = flags.crc_kind();

    let header_len = if chunk.position.is_first() {
        match parse_stream_header(framing, chunk.dictionary.is_some(), input)? {
            Some(len) => len,
            None => return Ok(Progress::new(Status::MoreInputNeeded, 0, 0)),
        }
    } else {
        0
    };
    let src = &input[header_len..];

    let SoftwareStream::Inflate { inflater } = context.software_mut()? else {
        return Err(wrong_codec());
    };
    let progress = inflater.decompress(src, output)?;
    let post_stream = if progress.finished {
        inflater.remaining_input().to_vec()
    } else {
        Vec::new()
    };
    // Post-stream bytes buffered by earlier calls were already reported.
    let earlier = post_stream
        .len()
        .saturating_sub(src.len() - progress.consumed);

    let decoded = &output[..progress.produced];
    if !flags.contains(JobFlags::OMIT_CHECKSUMS) {
        context.crc = kind.checksum(decoded, context.crc);
        context.xor = xor_checksum(decoded, context.xor);
    }
    if framing.uses_adler32() {
        context.adler = checksums::adler32(decoded, context.adler);
    }
    context.total_out += progress.produced as u64;

    let mut consumed = header_len + progress.consumed;
    if progress.finished {
        let taken = context.absorb_trailer(framing, &post_stream);
        consumed += taken.saturating_sub(earlier);
    }
    context.total_in += consumed as u64;

    let output_full = progress.produced == output.len();
    let status = context.finish_decompress(flags, progress.finished, output_full)?;
    Ok(Progress::new(status, consumed, progress.produced))
}
