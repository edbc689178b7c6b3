//! End-to-end behaviour of the software path.

use std::io::{Read, Write};

use checksums::{crc32_gzip, crc32c};
use engine::{
    Engine, EngineConfig, ErrorClass, ExecutionPath, ExecutionStep, Job, JobFlags,
    ProcessingStep, Status,
};
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;
use proptest::prelude::*;

fn sample(len: usize) -> Vec<u8> {
    const WORDS: [&str; 8] = [
        "offload", "deflate", "huffman", "stored", "block", "queue", "record", "window",
    ];
    let mut out = Vec::with_capacity(len + 8);
    let mut state = 0x2545_f491_u32;
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        out.extend_from_slice(WORDS[(state % 8) as usize].as_bytes());
        out.push(if state & 0x30 == 0 { b'\n' } else { b' ' });
    }
    out.truncate(len);
    out
}

/// Accented text and every byte value, so fixed blocks need 9-bit literals.
fn full_range(len: usize) -> Vec<u8> {
    let seed: Vec<u8> = (0..=255u8)
        .chain("crème brûlée, naïve façade, Ωμέγα, 日本語 ".bytes())
        .collect();
    seed.iter().cycle().take(len).copied().collect()
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default().path(ExecutionPath::Software))
}

fn compress_chunks(
    engine: &Engine,
    flags: JobFlags,
    data: &[u8],
    chunk: usize,
) -> (Vec<u8>, Job) {
    let mut job = Job::compress().with_flags(flags | JobFlags::FIRST);
    let mut pieces: Vec<&[u8]> = data.chunks(chunk.max(1)).collect();
    if pieces.is_empty() {
        pieces.push(&[]);
    }
    let mut compressed = Vec::new();
    for (index, piece) in pieces.iter().enumerate() {
        if index + 1 == pieces.len() {
            job.flags |= JobFlags::LAST;
        }
        let mut out = vec![0u8; piece.len() * 2 + 1024];
        let progress = engine
            .execute(&mut job, piece, &mut out)
            .expect("chunk compresses");
        assert_eq!(progress.status, Status::Ok);
        assert_eq!(progress.consumed, piece.len());
        compressed.extend_from_slice(&out[..progress.produced]);
    }
    (compressed, job)
}

fn decompress_windowed(
    engine: &Engine,
    flags: JobFlags,
    compressed: &[u8],
    window: usize,
) -> (Vec<u8>, Job) {
    let mut job = Job::decompress().with_flags(flags | JobFlags::FIRST | JobFlags::LAST);
    let mut input = compressed;
    let mut restored = Vec::new();
    loop {
        let mut out = vec![0u8; window];
        let progress = engine
            .execute(&mut job, input, &mut out)
            .expect("stream decodes");
        restored.extend_from_slice(&out[..progress.produced]);
        input = &input[progress.consumed..];
        match progress.status {
            Status::Ok => return (restored, job),
            Status::MoreOutputNeeded => {}
            Status::MoreInputNeeded => panic!("stream is complete but more input was requested"),
        }
    }
}

fn inflate_raw(compressed: &[u8]) -> Vec<u8> {
    let mut restored = Vec::new();
    DeflateDecoder::new(compressed)
        .read_to_end(&mut restored)
        .expect("flate2 decodes the stream");
    restored
}

#[test]
fn thousand_byte_dynamic_chunk_round_trips() {
    let engine = engine();
    let data = sample(1000);
    let mut job = Job::compress()
        .with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::DYNAMIC_HUFFMAN);
    let mut out = vec![0u8; 1500];
    let progress = engine.execute(&mut job, &data, &mut out).expect("compresses");

    assert_eq!(progress.status, Status::Ok);
    assert_eq!(progress.consumed, 1000);
    assert!(job.total_out() < 1000);
    assert_eq!(job.total_out(), progress.produced as u64);
    assert_eq!(job.crc(), crc32_gzip(&data, 0));
    assert_eq!(job.step(), ProcessingStep::Ready);
    assert!(job.is_complete());

    let compressed = &out[..progress.produced];
    let (restored, decoded) = decompress_windowed(&engine, JobFlags::empty(), compressed, 4096);
    assert_eq!(restored, data);
    assert_eq!(decoded.crc(), crc32_gzip(&data, 0));
}

#[test]
fn wrapping_byte_ramp_compresses_below_its_length() {
    let engine = engine();
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    let mut job = Job::compress()
        .with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::DYNAMIC_HUFFMAN);
    let mut out = vec![0u8; 1500];
    let progress = engine.execute(&mut job, &data, &mut out).expect("compresses");

    assert_eq!(progress.status, Status::Ok);
    assert!(job.total_out() < 1000);

    let compressed = &out[..progress.produced];
    let (restored, decoded) = decompress_windowed(&engine, JobFlags::empty(), compressed, 1000);
    assert_eq!(restored, data);
    assert_eq!(decoded.crc(), crc32_gzip(&data, 0));
}

#[test]
fn gzip_stream_interoperates_with_flate2() {
    let engine = engine();
    let data = sample(50_000);
    let flags = JobFlags::GZIP_MODE | JobFlags::DYNAMIC_HUFFMAN;
    let (compressed, job) = compress_chunks(&engine, flags, &data, 7_000);
    assert_eq!(job.total_in(), data.len() as u64);

    let mut restored = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut restored)
        .expect("flate2 accepts the gzip stream");
    assert_eq!(restored, data);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&data).unwrap();
    let foreign = encoder.finish().unwrap();
    let (restored, job) = decompress_windowed(&engine, JobFlags::GZIP_MODE, &foreign, 3_000);
    assert_eq!(restored, data);
    assert!(job.is_complete());
}

#[test]
fn zlib_stream_carries_adler32() {
    let engine = engine();
    let data = sample(9_000);
    let (compressed, job) = compress_chunks(&engine, JobFlags::ZLIB_MODE, &data, 4_000);
    assert_eq!(job.adler(), checksums::adler32(&data, 1));

    let mut restored = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut restored)
        .expect("flate2 accepts the zlib stream");
    assert_eq!(restored, data);
}

#[test]
fn fixed_blocks_encode_every_byte_value() {
    let engine = engine();
    let text = "café naïve coöperation, Ωμέγα über straße ".repeat(40).into_bytes();
    for data in [vec![0xe9], full_range(9_000), text] {
        let (compressed, job) = compress_chunks(&engine, JobFlags::empty(), &data, 2_000);
        // BTYPE 01 in the first block header.
        assert_eq!(compressed[0] & 0b110, 0b010);
        assert_eq!(job.crc(), crc32_gzip(&data, 0));
        assert_eq!(inflate_raw(&compressed), data);
        let (restored, _) = decompress_windowed(&engine, JobFlags::empty(), &compressed, 512);
        assert_eq!(restored, data);

        let (gzip, _) = compress_chunks(&engine, JobFlags::GZIP_MODE, &data, 2_000);
        let mut restored = Vec::new();
        GzDecoder::new(gzip.as_slice()).read_to_end(&mut restored).unwrap();
        assert_eq!(restored, data);
    }
}

#[test]
fn fixed_blocks_span_chunks_until_a_new_block_is_requested() {
    let engine = engine();
    let data = sample(6_000);
    let mut job = Job::compress().with_flags(JobFlags::FIRST);
    let mut compressed = Vec::new();
    let mut out = vec![0u8; 8192];
    for (index, piece) in data.chunks(2_000).enumerate() {
        match index {
            0 => {}
            1 => job.flags |= JobFlags::START_NEW_BLOCK,
            _ => job.flags = JobFlags::LAST,
        }
        let progress = engine.execute(&mut job, piece, &mut out).unwrap();
        compressed.extend_from_slice(&out[..progress.produced]);
        if index == 0 {
            assert_eq!(job.step(), ProcessingStep::FirstChunk);
        }
    }
    assert!(job.is_complete());
    assert_eq!(inflate_raw(&compressed), data);
}

#[test]
fn crc32c_is_reported_when_requested() {
    let engine = engine();
    let data = sample(3_000);
    let (compressed, job) = compress_chunks(&engine, JobFlags::CRC32C, &data, 1_000);
    assert_eq!(job.crc(), crc32c(&data, 0));
    let (restored, decoded) = decompress_windowed(&engine, JobFlags::CRC32C, &compressed, 1 << 16);
    assert_eq!(restored, data);
    assert_eq!(decoded.crc(), crc32c(&data, 0));
}

#[test]
fn omitted_checksums_stay_zero() {
    let engine = engine();
    let data = sample(2_000);
    let (compressed, job) = compress_chunks(&engine, JobFlags::OMIT_CHECKSUMS, &data, 2_000);
    assert_eq!(job.crc(), 0);
    assert_eq!(job.xor(), 0);
    assert_eq!(inflate_raw(&compressed), data);
}

#[test]
fn small_output_windows_decode_the_whole_stream() {
    let engine = engine();
    let data = sample(20_000);
    let flags = JobFlags::GZIP_MODE | JobFlags::DYNAMIC_HUFFMAN;
    let (compressed, _) = compress_chunks(&engine, flags, &data, 20_000);
    let (restored, job) = decompress_windowed(&engine, JobFlags::GZIP_MODE, &compressed, 7);
    assert_eq!(restored, data);
    assert!(job.is_complete());
    assert_eq!(job.total_in(), compressed.len() as u64);
}

#[test]
fn input_split_inside_the_header_and_trailer() {
    let engine = engine();
    let data = sample(4_000);
    let (compressed, _) = compress_chunks(&engine, JobFlags::GZIP_MODE, &data, 4_000);

    let mut job = Job::decompress().with_flags(JobFlags::GZIP_MODE | JobFlags::FIRST);
    let mut pending = Vec::new();
    let mut restored = Vec::new();
    let mut out = vec![0u8; 1 << 16];
    let pieces: Vec<&[u8]> = compressed.chunks(5).collect();
    let mut status = Status::Ok;
    for (index, piece) in pieces.iter().enumerate() {
        if index + 1 == pieces.len() {
            job.flags |= JobFlags::LAST;
        }
        pending.extend_from_slice(piece);
        let progress = engine.execute(&mut job, &pending, &mut out).unwrap();
        restored.extend_from_slice(&out[..progress.produced]);
        pending.drain(..progress.consumed);
        status = progress.status;
    }
    assert_eq!(status, Status::Ok);
    assert!(pending.is_empty());
    assert!(job.is_complete());
    assert_eq!(restored, data);
}

#[test]
fn short_output_leaves_the_stream_untouched() {
    let engine = engine();
    let data = sample(1_000);
    let mut job = Job::compress().with_flags(JobFlags::FIRST | JobFlags::LAST);

    let progress = engine.execute(&mut job, &data, &mut [0u8; 10]).unwrap();
    assert_eq!(progress.status, Status::MoreOutputNeeded);
    assert_eq!((progress.consumed, progress.produced), (0, 0));
    assert_eq!(job.step(), ProcessingStep::Ready);
    assert!(job.flags.contains(JobFlags::FIRST));

    let mut out = vec![0u8; 2_000];
    let progress = engine.execute(&mut job, &data, &mut out).unwrap();
    assert_eq!(progress.status, Status::Ok);
    assert_eq!(inflate_raw(&out[..progress.produced]), data);
}

#[test]
fn gzip_header_must_fit_the_destination() {
    let engine = engine();
    let mut job =
        Job::compress().with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::GZIP_MODE);
    let error = engine.execute(&mut job, b"abc", &mut [0u8; 12]).unwrap_err();
    assert_eq!(error.code(), 225);
    assert_eq!(error.class(), ErrorClass::Backpressure);
    assert!(!job.is_poisoned());
}

#[test]
fn preset_dictionary_round_trips_through_zlib() {
    let engine = engine();
    let dictionary: Vec<u8> = sample(2_000);
    let data = sample(3_000);
    let mut job = Job::compress()
        .with_dictionary(dictionary.clone())
        .with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::ZLIB_MODE);
    let mut out = vec![0u8; 4_096];
    let progress = engine.execute(&mut job, &data, &mut out).unwrap();
    let compressed = &out[..progress.produced];
    assert_eq!(compressed[1] & 0x20, 0x20, "FDICT is set");

    let mut without =
        Job::decompress().with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::ZLIB_MODE);
    let error = engine.execute(&mut without, compressed, &mut [0u8; 4_096]).unwrap_err();
    assert_eq!(error.code(), 84);

    let mut with = Job::decompress()
        .with_dictionary(dictionary)
        .with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::ZLIB_MODE);
    let mut restored = vec![0u8; 4_096];
    let progress = engine.execute(&mut with, compressed, &mut restored).unwrap();
    assert_eq!(progress.status, Status::Ok);
    assert_eq!(&restored[..progress.produced], data.as_slice());
}

#[test]
fn conflicting_flags_are_rejected_before_any_work() {
    let engine = engine();
    let cases = [
        (JobFlags::GZIP_MODE | JobFlags::ZLIB_MODE, 56),
        (JobFlags::NO_HDRS, 52),
        (JobFlags::CANNED_MODE, 52),
        (JobFlags::HUFFMAN_BE, 56),
        (JobFlags::GZIP_MODE | JobFlags::CRC32C, 56),
        (JobFlags::ZLIB_MODE | JobFlags::OMIT_CHECKSUMS, 56),
    ];
    for (flags, code) in cases {
        let mut job = Job::compress().with_flags(flags | JobFlags::FIRST | JobFlags::LAST);
        let error = engine.execute(&mut job, b"data", &mut [0u8; 64]).unwrap_err();
        assert_eq!(error.code(), code, "{flags:?}");
        assert_eq!(job.step(), ProcessingStep::Ready);
    }

    let mut job = Job::decompress().with_flags(JobFlags::FIRST | JobFlags::START_NEW_BLOCK);
    assert_eq!(engine.execute(&mut job, &[], &mut [0u8; 8]).unwrap_err().code(), 56);
}

#[test]
fn chunks_out_of_order_are_not_continuable() {
    let engine = engine();
    let mut job = Job::compress().with_flags(JobFlags::LAST);
    assert_eq!(engine.execute(&mut job, b"a", &mut [0u8; 64]).unwrap_err().code(), 4);

    job.flags = JobFlags::FIRST;
    engine.execute(&mut job, b"a", &mut [0u8; 64]).unwrap();
    job.flags = JobFlags::FIRST;
    assert_eq!(engine.execute(&mut job, b"b", &mut [0u8; 64]).unwrap_err().code(), 4);
    assert_eq!(job.step(), ProcessingStep::FirstChunk);

    job.flags = JobFlags::LAST;
    engine.execute(&mut job, b"c", &mut [0u8; 64]).unwrap();
    assert_eq!(job.execution_step(), ExecutionStep::Completed);
    assert_eq!(engine.execute(&mut job, b"d", &mut [0u8; 64]).unwrap_err().code(), 4);

    job.reset();
    job.flags = JobFlags::FIRST | JobFlags::LAST;
    engine.execute(&mut job, b"e", &mut [0u8; 64]).unwrap();
    assert!(job.is_complete());
}

#[test]
fn corrupt_input_poisons_the_job() {
    let engine = engine();
    let mut job = Job::decompress().with_flags(JobFlags::FIRST | JobFlags::LAST);
    let error = engine.execute(&mut job, &[0xFF; 16], &mut [0u8; 64]).unwrap_err();
    assert_eq!(error.class(), ErrorClass::Integrity);
    assert!(job.is_poisoned());
    job.flags = JobFlags::FIRST | JobFlags::LAST;
    assert_eq!(engine.execute(&mut job, &[0x03, 0x00], &mut [0u8; 64]).unwrap_err().code(), 4);
    job.reset();
    let progress = engine.execute(&mut job, &[0x03, 0x00], &mut [0u8; 64]).unwrap();
    assert_eq!((progress.status, progress.produced), (Status::Ok, 0));
}

#[test]
fn gzip_trailer_mismatch_is_detected() {
    let engine = engine();
    let data = sample(500);
    let (mut compressed, _) = compress_chunks(&engine, JobFlags::GZIP_MODE, &data, 500);
    let at = compressed.len() - 8;
    compressed[at] ^= 0xFF;
    let mut job =
        Job::decompress().with_flags(JobFlags::FIRST | JobFlags::LAST | JobFlags::GZIP_MODE);
    let error = engine.execute(&mut job, &compressed, &mut [0u8; 1024]).unwrap_err();
    assert_eq!(error.code(), 104);
    assert!(job.is_poisoned());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn chunked_streams_decode_with_flate2(
        len in 0usize..20_000,
        chunk in 1usize..6_000,
        dynamic in any::<bool>(),
    ) {
        let engine = engine();
        let data = sample(len);
        let flags = if dynamic { JobFlags::DYNAMIC_HUFFMAN } else { JobFlags::empty() };
        let (compressed, job) = compress_chunks(&engine, flags, &data, chunk);
        prop_assert!(job.is_complete());
        prop_assert_eq!(inflate_raw(&compressed), data);
    }
}
