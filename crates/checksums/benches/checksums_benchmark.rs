//! crates/checksums/benches/checksums_benchmark.rs
//!
//! Benchmarks for the running checksums folded into every chunk.
//!
//! Run with: `cargo bench -p checksums`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::Rng;

use checksums::{ADLER32_INITIAL, adler32, crc32_gzip, crc32c, xor_checksum};

/// Generate random data of the specified size.
fn generate_random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}

fn bench_checksums(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_checksums");

    for size in [4096, 65536, 1 << 20] {
        let data = generate_random_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("crc32_gzip", size), &data, |b, data| {
            b.iter(|| black_box(crc32_gzip(black_box(data), 0)));
        });
        group.bench_with_input(BenchmarkId::new("crc32c", size), &data, |b, data| {
            b.iter(|| black_box(crc32c(black_box(data), 0)));
        });
        group.bench_with_input(BenchmarkId::new("adler32", size), &data, |b, data| {
            b.iter(|| black_box(adler32(black_box(data), ADLER32_INITIAL)));
        });
        group.bench_with_input(BenchmarkId::new("xor", size), &data, |b, data| {
            b.iter(|| black_box(xor_checksum(black_box(data), 0)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_checksums);
criterion_main!(benches);
