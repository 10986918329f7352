extern crate criterion;
extern crate miner;
extern crate num_bigint;

use criterion::{criterion_group, criterion_main, Criterion};
use miner::{CombinedSieve, PrimeTable, SegmentedSieve, COMBINED_SIEVE_BATCH, SEGMENT_SIZE_BITS};
use num_bigint::BigUint;
use num_traits::One;
use std::sync::Arc;

fn base() -> BigUint {
	BigUint::one() << 270usize
}

fn bench_segment_sieving(c: &mut Criterion) {
	let primes = Arc::new(PrimeTable::new(250_000));
	let mut sieve = SegmentedSieve::new(primes, 8 * SEGMENT_SIZE_BITS);
	let base = base();

	c.bench_function("bench_segment_sieving", |b| {
		b.iter(|| {
			sieve.init(&base);
			while sieve.next_segment() {}
		})
	});
}

fn bench_combined_sieving(c: &mut Criterion) {
	let primes = Arc::new(PrimeTable::new(250_000));
	let mut sieve = CombinedSieve::new(primes, 8 * SEGMENT_SIZE_BITS);
	let bases: Vec<BigUint> = (0..COMBINED_SIEVE_BATCH)
		.map(|k| base() + BigUint::from(k as u64 * (1u64 << 32)))
		.collect();

	c.bench_function("bench_combined_sieving", |b| {
		b.iter(|| {
			sieve.reset_segments();
			for (k, base) in bases.iter().enumerate() {
				sieve.init_interval(k, base);
			}
			while sieve.next_segment() {}
		})
	});
}

fn bench_candidate_emission(c: &mut Criterion) {
	let primes = Arc::new(PrimeTable::new(250_000));
	let mut sieve = SegmentedSieve::new(primes, SEGMENT_SIZE_BITS);
	sieve.init(&base());
	assert!(sieve.next_segment());

	let mut out = Vec::new();
	c.bench_function("bench_candidate_emission", |b| b.iter(|| sieve.candidates(&mut out)));
}

criterion_group!(benches, bench_segment_sieving, bench_combined_sieving, bench_candidate_emission);
criterion_main!(benches);
