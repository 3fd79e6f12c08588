use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gitlake::chunker::chunk_blob;

fn generate_text_blob(lines: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for n in 0..lines {
        data.extend_from_slice(format!("line {n} of a generated file with some padding\n").as_bytes());
    }
    data
}

fn generate_binary_blob(bytes: usize) -> Vec<u8> {
    (0..bytes).map(|i| (i % 251) as u8).collect()
}

fn bench_text_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunker/text");
    for lines in [1_000, 10_000, 50_000].iter() {
        let data = generate_text_blob(*lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, _| {
            b.iter(|| chunk_blob(black_box(&data)));
        });
    }
    group.finish();
}

fn bench_binary_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunker/binary");
    for bytes in [65_536, 1_048_576, 8_388_608].iter() {
        let data = generate_binary_blob(*bytes);
        group.bench_with_input(BenchmarkId::from_parameter(bytes), bytes, |b, _| {
            b.iter(|| chunk_blob(black_box(&data)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_text_chunking, bench_binary_chunking);
criterion_main!(benches);
