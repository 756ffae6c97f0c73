//! Planning benchmarks: classification, weight normalization and trade sizing.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use detf::fixed::pow10;
use detf::{
    Address, Asset, Category, Position, SlippageTolerance, TargetAllocation, TradeSizer,
    VaultSnapshot, Weight, U256, classify, total_target_percentage,
};

fn addr(i: usize) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..20].copy_from_slice(&(i as u64 + 1).to_be_bytes());
    Address::from(bytes)
}

/// Build a snapshot with `n_owned` holdings and `n_targets` targets.
///
/// Half the targets overlap the holdings so every category is populated.
/// Balances drift with a deterministic xorshift32 so shares differ per asset.
fn generate_snapshot(n_owned: usize, n_targets: usize) -> VaultSnapshot {
    let one = pow10(18).unwrap_or(U256::from(1));
    let mut rng_state: u32 = 42;

    let holdings: Vec<Position> = (0..n_owned)
        .filter_map(|i| {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 17;
            rng_state ^= rng_state << 5;
            let balance = U256::from(1 + rng_state % 1_000) * one;
            Position::new(Asset::new(addr(i), one, 18), balance)
        })
        .collect();

    let start = n_owned / 2;
    let weight = 100_000_000 / n_targets as u64;
    let targets: Vec<TargetAllocation> = (start..start + n_targets)
        .map(|i| TargetAllocation {
            asset: Asset::new(addr(i), one, 18),
            weight: Weight(weight),
        })
        .collect();

    VaultSnapshot::from_parts(
        Address::repeat_byte(0xee),
        Address::repeat_byte(0xbb),
        U256::from(10_000) * one,
        holdings,
        targets,
    )
    .unwrap_or_else(|| panic!("snapshot overflow"))
}

/// Benchmark: classification alone at various vault sizes
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("sizing/classify");

    for n in [8, 32, 128] {
        let snap = generate_snapshot(n, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &snap, |b, snap| {
            b.iter(|| black_box(classify(snap)));
        });
    }

    group.finish();
}

/// Benchmark: full plan (classify, normalize, size every category)
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sizing/plan");
    let sizer = TradeSizer::new(
        Address::repeat_byte(0xbb),
        SlippageTolerance::from_bps(50).unwrap_or_default(),
    );

    for n in [8, 32, 128] {
        let snap = generate_snapshot(n, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &snap, |b, snap| {
            b.iter(|| {
                let Ok(c) = classify(snap) else { return 0 };
                let Ok(ttp) = total_target_percentage(&c) else {
                    return 0;
                };
                let mut legs = 0;
                legs += sizer.size_sell(&c.sell).map_or(0, |v| v.len());
                legs += sizer
                    .size_adjust_to_sell(&c.adjust_to_sell, c.total_value)
                    .map_or(0, |v| v.len());
                for category in [Category::AdjustToBuy, Category::Buy] {
                    legs += sizer
                        .size_buy_side(category, c.list(category), snap.base_balance, ttp)
                        .map_or(0, |v| v.len());
                }
                black_box(legs)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_plan);
criterion_main!(benches);
