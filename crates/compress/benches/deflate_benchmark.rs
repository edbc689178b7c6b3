//! crates/compress/benches/deflate_benchmark.rs
//!
//! Benchmarks for Huffman construction and software DEFLATE.
//!
//! Run with: `cargo bench -p compress`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::Rng;

use compress::huffman::build;
use compress::{BlockStyle, CompressionLevel, Inflater, deflate};

fn text(size: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .cycle()
        .take(size)
        .copied()
        .collect()
}

fn bench_huffman(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let histogram: Vec<u32> = (0..286).map(|_| rng.gen_range(0..10_000)).collect();
    c.bench_function("huffman_build_286", |b| {
        b.iter(|| black_box(build(black_box(&histogram), 15)));
    });
}

fn bench_deflate(c: &mut Criterion) {
    let mut group = c.benchmark_group("software_deflate");
    for size in [4096, 65536] {
        let data = text(size);
        group.throughput(Throughput::Bytes(size as u64));
        for level in [CompressionLevel::Default, CompressionLevel::High] {
            group.bench_with_input(
                BenchmarkId::new(format!("{level:?}"), size),
                &data,
                |b, data| {
                    b.iter(|| deflate(black_box(data), level, BlockStyle::Dynamic));
                },
            );
        }
        let compressed = deflate(&data, CompressionLevel::Default, BlockStyle::Dynamic)
            .expect("benchmark input encodes");
        group.bench_with_input(BenchmarkId::new("inflate", size), &compressed, |b, data| {
            b.iter(|| Inflater::new().decompress_vec(black_box(data)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_huffman, bench_deflate);
criterion_main!(benches);
