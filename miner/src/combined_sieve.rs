//! Combined sieve: several nonce intervals sieved through one prime-table
//! walk per segment.
//!
//! When K intervals are sieved together, the small-prime loop iterates the
//! table once and applies each prime to all K segment arrays before moving
//! on. The prime stays register-resident while only the segment arrays are
//! touched, cutting prime-table reads from N*K to N per segment round.
//! Semantics are identical to running K independent sieves.

use crate::presieve::Presieve;
use crate::prime_table::PrimeTable;
use crate::sieve::SEGMENT_SIZE_BITS;
use crate::wheel::is_coprime_2310;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::sync::Arc;

/// Intervals sieved simultaneously. Four 32 KiB segments fill 128 KiB,
/// comfortable in L2 while each segment still fits L1.
pub const COMBINED_SIEVE_BATCH: usize = 4;

const SEGMENT_SIZE_BYTES: usize = SEGMENT_SIZE_BITS / 8;
const FIRST_MARKED_PRIME: usize = 38;

struct Interval {
	segment: Vec<u8>,
	small_starts: Vec<u32>,
	presieve: Presieve,
	base_mod: u64,
	active: bool,
}

#[derive(Debug, Clone, Copy)]
struct BucketEntry {
	prime_ix: u32,
	next_hit: u32,
	interval: u8,
}

pub struct CombinedSieve {
	primes: Arc<PrimeTable>,
	intervals: Vec<Interval>,
	buckets: Vec<Vec<BucketEntry>>,
	bucket_base: usize,
	current_segment: usize,
	total_segments: usize,
	small_prime_limit: usize,
}

impl CombinedSieve {
	pub fn new(primes: Arc<PrimeTable>, total_bits: usize) -> Self {
		let total_bits = (total_bits + SEGMENT_SIZE_BITS - 1) / SEGMENT_SIZE_BITS * SEGMENT_SIZE_BITS;
		let total_segments = total_bits / SEGMENT_SIZE_BITS;

		let small_prime_limit = primes
			.as_slice()
			.iter()
			.position(|p| *p as usize > SEGMENT_SIZE_BITS)
			.unwrap_or_else(|| primes.len());

		let ring_len = primes.largest() as usize / SEGMENT_SIZE_BITS + 2;

		let intervals = (0..COMBINED_SIEVE_BATCH)
			.map(|_| Interval {
				segment: vec![0; SEGMENT_SIZE_BYTES],
				small_starts: vec![0; small_prime_limit],
				presieve: Presieve::new(),
				base_mod: 0,
				active: false,
			})
			.collect();

		CombinedSieve {
			primes,
			intervals,
			buckets: (0..ring_len).map(|_| Vec::new()).collect(),
			bucket_base: 0,
			current_segment: 0,
			total_segments,
			small_prime_limit,
		}
	}

	/// Rewinds to segment 0 and drops all bucket state. Call before
	/// re-initializing intervals for a new batch of nonces.
	pub fn reset_segments(&mut self) {
		self.current_segment = 0;
		self.bucket_base = 0;
		for bucket in &mut self.buckets {
			bucket.clear();
		}
		for interval in &mut self.intervals {
			interval.active = false;
		}
	}

	/// Prepares slot `k` for the interval starting at `base`. Must happen
	/// after `reset_segments` and before the first `next_segment`.
	pub fn init_interval(&mut self, k: usize, base: &BigUint) {
		debug_assert!(k < COMBINED_SIEVE_BATCH);
		debug_assert_eq!(self.current_segment, 0);

		let ring_len = self.buckets.len();
		let interval = &mut self.intervals[k];
		interval.base_mod = (base % 2310u32).to_u64().expect("residue fits");
		interval.presieve.set_base_offsets(base);
		interval.active = true;

		for i in 1..self.primes.len() {
			let p = u64::from(self.primes.get(i));
			let rem = (base % p).to_u64().expect("residue fits");
			let mut offset = (p - rem) % p;
			if offset & 1 == 0 {
				offset += p;
			}
			let bit = (offset / 2) as usize;

			if i < self.small_prime_limit {
				interval.small_starts[i] = bit as u32;
			} else {
				let slot = bit / SEGMENT_SIZE_BITS;
				if slot < self.total_segments {
					self.buckets[slot % ring_len].push(BucketEntry {
						prime_ix: i as u32,
						next_hit: (bit % SEGMENT_SIZE_BITS) as u32,
						interval: k as u8,
					});
				}
			}
		}
	}

	pub fn deactivate_interval(&mut self, k: usize) {
		if k < COMBINED_SIEVE_BATCH {
			self.intervals[k].active = false;
		}
	}

	pub fn active_count(&self) -> usize {
		self.intervals.iter().filter(|interval| interval.active).count()
	}

	#[inline]
	fn mark(segment: &mut [u8], bit: usize) {
		segment[bit >> 3] |= 1 << (bit & 7);
	}

	/// Sieves the next segment of every active interval.
	pub fn next_segment(&mut self) -> bool {
		if self.current_segment >= self.total_segments || self.active_count() == 0 {
			return false;
		}

		let seg_low_bytes = self.current_segment * SEGMENT_SIZE_BYTES;

		// phase 1: presieve each active interval
		for interval in &mut self.intervals {
			if interval.active {
				interval.presieve.full(&mut interval.segment, seg_low_bytes);
			}
		}

		// phase 2: combined small prime marking, primes outer so each prime
		// value is loaded once for all K intervals
		for i in FIRST_MARKED_PRIME..self.small_prime_limit {
			let p = self.primes.get(i) as usize;

			for interval in &mut self.intervals {
				if !interval.active {
					continue;
				}

				let mut pos = interval.small_starts[i] as usize;
				while pos < SEGMENT_SIZE_BITS {
					Self::mark(&mut interval.segment, pos);
					pos += p;
				}
				interval.small_starts[i] = (pos - SEGMENT_SIZE_BITS) as u32;
			}
		}

		// phase 3: drain the tagged bucket of this segment
		let slot = self.bucket_base;
		let entries = std::mem::replace(&mut self.buckets[slot], Vec::new());
		let ring_len = self.buckets.len();
		for entry in &entries {
			let interval = &mut self.intervals[entry.interval as usize];
			if interval.active {
				Self::mark(&mut interval.segment, entry.next_hit as usize);
			}

			let next = entry.next_hit as usize + self.primes.get(entry.prime_ix as usize) as usize;
			let skip = next / SEGMENT_SIZE_BITS;
			if self.current_segment + skip < self.total_segments {
				self.buckets[(slot + skip) % ring_len].push(BucketEntry {
					prime_ix: entry.prime_ix,
					next_hit: (next % SEGMENT_SIZE_BITS) as u32,
					interval: entry.interval,
				});
			}
		}
		let mut reuse = entries;
		reuse.clear();
		self.buckets[slot] = reuse;

		self.bucket_base = (slot + 1) % ring_len;
		self.current_segment += 1;
		true
	}

	/// Offset of the most recently sieved segment in bits.
	pub fn segment_offset(&self) -> usize {
		self.current_segment.saturating_sub(1) * SEGMENT_SIZE_BITS
	}

	/// Surviving candidates of interval `k` for the current segment, as
	/// odd integer offsets from that interval's base.
	pub fn candidates(&self, k: usize, out: &mut Vec<u64>) {
		out.clear();
		let interval = &self.intervals[k];
		if !interval.active {
			return;
		}

		let seg_start = self.segment_offset();
		for (byte_ix, byte) in interval.segment.iter().enumerate() {
			if *byte == 0xff {
				continue;
			}
			let mut remaining = !*byte;
			while remaining != 0 {
				let bit = byte_ix * 8 + remaining.trailing_zeros() as usize;
				remaining &= remaining - 1;

				let offset = 2 * (seg_start + bit) as u64 + 1;
				if is_coprime_2310((interval.base_mod + offset) % 2310) {
					out.push(offset);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::{CombinedSieve, COMBINED_SIEVE_BATCH};
	use crate::prime_table::PrimeTable;
	use crate::sieve::{SegmentedSieve, SEGMENT_SIZE_BITS};
	use num_bigint::BigUint;
	use num_traits::One;
	use std::sync::Arc;

	fn table() -> Arc<PrimeTable> {
		Arc::new(PrimeTable::new(5_000))
	}

	#[test]
	fn test_matches_independent_sieves() {
		let primes = table();
		let total = 2 * SEGMENT_SIZE_BITS;

		let bases: Vec<BigUint> = (0..COMBINED_SIEVE_BATCH)
			.map(|k| (BigUint::one() << 270usize) + BigUint::from(k as u64 * (1u64 << 32)))
			.collect();

		let mut combined = CombinedSieve::new(primes.clone(), total);
		combined.reset_segments();
		for (k, base) in bases.iter().enumerate() {
			combined.init_interval(k, base);
		}

		let mut independent: Vec<SegmentedSieve> = bases
			.iter()
			.map(|base| {
				let mut sieve = SegmentedSieve::new(primes.clone(), total);
				sieve.init(base);
				sieve
			})
			.collect();

		let mut combined_out = Vec::new();
		let mut single_out = Vec::new();
		while combined.next_segment() {
			for (k, sieve) in independent.iter_mut().enumerate() {
				assert!(sieve.next_segment());
				combined.candidates(k, &mut combined_out);
				sieve.candidates(&mut single_out);
				assert_eq!(combined_out, single_out, "interval {} diverged at segment {}", k, combined.segment_offset());
			}
		}
	}

	#[test]
	fn test_deactivation() {
		let primes = table();
		let mut combined = CombinedSieve::new(primes, SEGMENT_SIZE_BITS);
		combined.reset_segments();
		combined.init_interval(0, &(BigUint::one() << 270usize));
		combined.init_interval(1, &(BigUint::one() << 271usize));
		assert_eq!(combined.active_count(), 2);

		combined.deactivate_interval(1);
		assert_eq!(combined.active_count(), 1);
		assert!(combined.next_segment());

		let mut out = Vec::new();
		combined.candidates(1, &mut out);
		assert!(out.is_empty());

		combined.candidates(0, &mut out);
		assert!(!out.is_empty());
	}

	#[test]
	fn test_exhaustion_stops() {
		let primes = table();
		let mut combined = CombinedSieve::new(primes, SEGMENT_SIZE_BITS);
		combined.reset_segments();
		assert!(!combined.next_segment(), "no active intervals");

		combined.init_interval(0, &(BigUint::one() << 270usize));
		assert!(combined.next_segment());
		assert!(!combined.next_segment(), "single-segment range is exhausted");
	}
}
