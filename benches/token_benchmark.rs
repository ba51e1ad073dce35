//! Criterion benchmarks for token recording and emission.
//!
//! Tracks performance across:
//! - Recording strategies (count while recording, count then emit)
//! - Level densities (sparse, typical, dense)
//! - The emission pass alone

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use webp_entropy::{
    encode_partition, find_last, record_coeff_tokens, BitWriter, MacroblockLevels, ProbaStats,
    RecordingStrategy, TokenBuffer, TokenConfig, COEFF_PROBS,
};

const MB_WIDTH: u32 = 32;
const MB_HEIGHT: u32 = 32;

fn random_block(rng: &mut StdRng, density: f64, scale: i16) -> [i16; 16] {
    let mut b = [0i16; 16];
    for (i, v) in b.iter_mut().enumerate() {
        if rng.gen_bool(density / (1.0 + i as f64 / 3.0)) {
            *v = rng.gen_range(-scale..=scale);
        }
    }
    b
}

fn frame(density: f64) -> Vec<MacroblockLevels> {
    let mut rng = StdRng::seed_from_u64(0xbe4c);
    (0..MB_WIDTH * MB_HEIGHT)
        .map(|_| {
            let chroma = std::array::from_fn(|_| random_block(&mut rng, density, 6));
            let blocks = std::array::from_fn(|_| random_block(&mut rng, density, 40));
            MacroblockLevels::i4(blocks, chroma)
        })
        .collect()
}

/// Density label and fraction of positions carrying a level.
const DENSITIES: &[(&str, f64)] = &[("sparse", 0.1), ("typical", 0.4), ("dense", 0.9)];

fn bench_encode_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_partition");
    group.throughput(Throughput::Elements(u64::from(MB_WIDTH * MB_HEIGHT)));

    for &(name, density) in DENSITIES {
        let mbs = frame(density);
        for (label, strategy) in [
            ("count_while_recording", RecordingStrategy::CountWhileRecording),
            ("count_then_emit", RecordingStrategy::CountThenEmit),
        ] {
            let config = TokenConfig::new().with_strategy(strategy);
            group.bench_with_input(BenchmarkId::new(label, name), &mbs, |b, mbs| {
                b.iter(|| encode_partition(MB_WIDTH, MB_HEIGHT, black_box(mbs), &config))
            });
        }
    }
    group.finish();
}

fn bench_record_block(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(17);
    let blocks: Vec<_> = (0..4096).map(|_| random_block(&mut rng, 0.5, 30)).collect();

    let mut group = c.benchmark_group("record_block");
    group.throughput(Throughput::Elements(blocks.len() as u64));
    group.bench_function("stats_only", |b| {
        b.iter(|| {
            let mut stats = ProbaStats::new();
            for coeffs in &blocks {
                record_coeff_tokens(&mut stats, 0, 3, 0, find_last(coeffs, 0), coeffs);
            }
            stats
        })
    });
    group.bench_function("buffer_and_stats", |b| {
        b.iter(|| {
            let mut pair = (TokenBuffer::new(0), ProbaStats::new());
            for coeffs in &blocks {
                record_coeff_tokens(&mut pair, 0, 3, 0, find_last(coeffs, 0), coeffs);
            }
            pair
        })
    });
    group.finish();
}

fn bench_emit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(23);
    let mut buffer = TokenBuffer::new(0);
    for _ in 0..8192 {
        let coeffs = random_block(&mut rng, 0.5, 30);
        record_coeff_tokens(&mut buffer, 0, 3, 0, find_last(&coeffs, 0), &coeffs);
    }

    let mut group = c.benchmark_group("emit");
    group.throughput(Throughput::Elements(buffer.len() as u64));
    group.bench_function("emit_tokens", |b| {
        b.iter(|| {
            let mut writer = BitWriter::new(buffer.len() / 4);
            buffer.emit_tokens(&mut writer, black_box(&COEFF_PROBS));
            writer.finish()
        })
    });
    group.bench_function("estimate_size", |b| {
        b.iter(|| buffer.estimate_size(black_box(&COEFF_PROBS)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode_partition, bench_record_block, bench_emit);
criterion_main!(benches);
