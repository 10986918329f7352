//! L1-sized segmented sieve over one search interval.
//!
//! The sieve walks the odd numbers above `base = hash << shift` in
//! segments sized to the L1 data cache. Bit `i` of segment `s` stands for
//! the odd number `base + 2 (s * SEGMENT_SIZE_BITS + i) + 1`; a set bit is
//! a proven composite, a clear bit proves nothing and is always confirmed
//! by a primality test downstream.
//!
//! Small primes (stride within a segment) are marked directly with a
//! stored per-segment residual. Large primes hit a segment at most once
//! and go through a ring of buckets indexed by the segment of their next
//! multiple, so each segment only touches the primes that actually land
//! in it.

use crate::presieve::Presieve;
use crate::prime_table::PrimeTable;
use crate::wheel::is_coprime_2310;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::sync::Arc;

/// Bits per segment: 32 KiB of L1 data cache.
pub const SEGMENT_SIZE_BITS: usize = 32 * 1024 * 8;

const SEGMENT_SIZE_BYTES: usize = SEGMENT_SIZE_BITS / 8;

/// Pre-sieve tables cover primes up to 163 (index 37); the wheel filter
/// covers 3, 5, 7, 11 at candidate emission. Direct marking starts here.
const FIRST_MARKED_PRIME: usize = 38;

#[derive(Debug, Clone, Copy)]
struct BucketEntry {
	prime_ix: u32,
	/// Bit position inside the segment this entry is bucketed for.
	next_hit: u32,
}

pub struct SegmentedSieve {
	primes: Arc<PrimeTable>,
	presieve: Presieve,
	segment: Vec<u8>,
	current_segment: usize,
	total_segments: usize,
	/// First prime index whose bit stride exceeds a segment.
	small_prime_limit: usize,
	/// Next start bit per small prime, relative to the upcoming segment.
	small_starts: Vec<u32>,
	/// Ring of buckets, one slot per upcoming segment.
	buckets: Vec<Vec<BucketEntry>>,
	bucket_base: usize,
	base_mod: u64,
	initialized: bool,
}

impl SegmentedSieve {
	/// A sieve over `total_bits` odd numbers per interval. The prime table
	/// is shared; per-instance memory is one segment plus the start/bucket
	/// bookkeeping.
	pub fn new(primes: Arc<PrimeTable>, total_bits: usize) -> Self {
		let total_bits = (total_bits + SEGMENT_SIZE_BITS - 1) / SEGMENT_SIZE_BITS * SEGMENT_SIZE_BITS;
		let total_segments = total_bits / SEGMENT_SIZE_BITS;

		let small_prime_limit = primes
			.as_slice()
			.iter()
			.position(|p| *p as usize > SEGMENT_SIZE_BITS)
			.unwrap_or_else(|| primes.len());

		// a large prime skips at most largest/SEGMENT_SIZE_BITS segments
		let ring_len = primes.largest() as usize / SEGMENT_SIZE_BITS + 2;

		SegmentedSieve {
			small_starts: vec![0; small_prime_limit],
			buckets: (0..ring_len).map(|_| Vec::new()).collect(),
			bucket_base: 0,
			primes,
			presieve: Presieve::new(),
			segment: vec![0; SEGMENT_SIZE_BYTES],
			current_segment: 0,
			total_segments,
			small_prime_limit,
			base_mod: 0,
			initialized: false,
		}
	}

	/// Prepares the sieve for a new interval starting at `base`
	/// (`hash << shift`, always even).
	pub fn init(&mut self, base: &BigUint) {
		self.current_segment = 0;
		self.bucket_base = 0;
		self.base_mod = (base % 2310u32).to_u64().expect("residue fits");
		self.presieve.set_base_offsets(base);
		for bucket in &mut self.buckets {
			bucket.clear();
		}

		// first multiple of every prime as an odd-only bit position
		for i in 1..self.primes.len() {
			let p = u64::from(self.primes.get(i));
			let rem = (base % p).to_u64().expect("residue fits");
			let mut offset = (p - rem) % p;
			if offset & 1 == 0 {
				// base is even: even offsets land on even multiples
				offset += p;
			}
			let bit = (offset / 2) as usize;

			if i < self.small_prime_limit {
				self.small_starts[i] = bit as u32;
			} else {
				let slot = bit / SEGMENT_SIZE_BITS;
				if slot < self.total_segments {
					let bucket_count = self.buckets.len();
					self.buckets[slot % bucket_count].push(BucketEntry {
						prime_ix: i as u32,
						next_hit: (bit % SEGMENT_SIZE_BITS) as u32,
					});
				}
			}
		}

		self.initialized = true;
	}

	#[inline]
	fn mark(segment: &mut [u8], bit: usize) {
		segment[bit >> 3] |= 1 << (bit & 7);
	}

	#[inline]
	fn is_set(&self, bit: usize) -> bool {
		self.segment[bit >> 3] & (1 << (bit & 7)) != 0
	}

	/// Sieves the next segment. Returns false once the interval is
	/// exhausted (candidates of the last sieved segment stay readable).
	pub fn next_segment(&mut self) -> bool {
		if !self.initialized || self.current_segment >= self.total_segments {
			return false;
		}

		// phase 1+2: seed with the pre-sieve patterns
		self.presieve.full(&mut self.segment, self.current_segment * SEGMENT_SIZE_BYTES);

		// phase 3: direct marking of the remaining small primes
		for i in FIRST_MARKED_PRIME..self.small_prime_limit {
			let p = self.primes.get(i) as usize;
			let mut pos = self.small_starts[i] as usize;
			while pos < SEGMENT_SIZE_BITS {
				Self::mark(&mut self.segment, pos);
				pos += p;
			}
			self.small_starts[i] = (pos - SEGMENT_SIZE_BITS) as u32;
		}

		// phase 4: drain this segment's bucket, rebucket for the next hit
		let slot = self.bucket_base;
		let entries = std::mem::replace(&mut self.buckets[slot], Vec::new());
		let ring_len = self.buckets.len();
		for entry in &entries {
			Self::mark(&mut self.segment, entry.next_hit as usize);

			let next = entry.next_hit as usize + self.primes.get(entry.prime_ix as usize) as usize;
			let skip = next / SEGMENT_SIZE_BITS;
			debug_assert!(skip >= 1 && skip < ring_len);
			if self.current_segment + skip < self.total_segments {
				self.buckets[(slot + skip) % ring_len].push(BucketEntry {
					prime_ix: entry.prime_ix,
					next_hit: (next % SEGMENT_SIZE_BITS) as u32,
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

	/// Whether `bit` of the current segment is a proven composite.
	pub fn is_composite(&self, bit: usize) -> bool {
		self.is_set(bit)
	}

	/// Collects surviving candidates of the current segment as odd integer
	/// offsets from the base, wheel-filtered.
	pub fn candidates(&self, out: &mut Vec<u64>) {
		out.clear();
		let seg_start = self.segment_offset();

		for (byte_ix, byte) in self.segment.iter().enumerate() {
			if *byte == 0xff {
				continue;
			}
			let mut remaining = !*byte;
			while remaining != 0 {
				let bit = byte_ix * 8 + remaining.trailing_zeros() as usize;
				remaining &= remaining - 1;

				let offset = 2 * (seg_start + bit) as u64 + 1;
				if is_coprime_2310((self.base_mod + offset) % 2310) {
					out.push(offset);
				}
			}
		}
	}

	pub fn total_bits(&self) -> usize {
		self.total_segments * SEGMENT_SIZE_BITS
	}
}

#[cfg(test)]
mod tests {
	use super::{SegmentedSieve, SEGMENT_SIZE_BITS};
	use crate::prime_table::PrimeTable;
	use num_bigint::BigUint;
	use num_traits::{One, Zero};
	use pow::primality;
	use std::collections::HashSet;
	use std::sync::Arc;

	fn table() -> Arc<PrimeTable> {
		Arc::new(PrimeTable::new(2_000))
	}

	#[test]
	fn test_no_prime_is_marked_composite() {
		let mut sieve = SegmentedSieve::new(table(), SEGMENT_SIZE_BITS);
		// small numeric base keeps BPSW cheap
		let base = BigUint::from(1_000_000u64);
		sieve.init(&base);
		assert!(sieve.next_segment());

		let mut candidates = Vec::new();
		sieve.candidates(&mut candidates);
		let candidates: HashSet<u64> = candidates.into_iter().collect();

		// every actual prime in the sampled window must survive the sieve
		// and the wheel filter
		let mut found = 0;
		for offset in (1u64..30_000).step_by(2) {
			let n = &base + offset;
			if primality::bpsw(&n) {
				assert!(candidates.contains(&offset), "prime at offset {} was sieved away", offset);
				found += 1;
			}
		}
		assert!(found > 1_000, "expected plenty of primes in the window, found {}", found);
	}

	#[test]
	fn test_candidates_survive_rate() {
		let mut sieve = SegmentedSieve::new(table(), SEGMENT_SIZE_BITS);
		let base = BigUint::one() << 270usize;
		sieve.init(&base);
		assert!(sieve.next_segment());

		let mut candidates = Vec::new();
		sieve.candidates(&mut candidates);

		// the wheel alone keeps ~20.8%; sieving 2000 primes pushes the
		// survivor rate well below that
		assert!(!candidates.is_empty());
		assert!(candidates.len() < SEGMENT_SIZE_BITS / 5, "sieve left {} candidates", candidates.len());

		// all candidates are odd offsets in range
		for offset in &candidates {
			assert_eq!(offset & 1, 1);
			assert!(*offset < 2 * SEGMENT_SIZE_BITS as u64 + 1);
		}
	}

	#[test]
	fn test_segments_advance_and_terminate() {
		let mut sieve = SegmentedSieve::new(table(), 3 * SEGMENT_SIZE_BITS);
		let base = BigUint::one() << 270usize;
		sieve.init(&base);

		let mut segments = 0;
		while sieve.next_segment() {
			segments += 1;
		}
		assert_eq!(segments, 3);
		assert_eq!(sieve.segment_offset(), 2 * SEGMENT_SIZE_BITS);
	}

	#[test]
	fn test_reinit_resets_state() {
		let mut sieve = SegmentedSieve::new(table(), SEGMENT_SIZE_BITS);
		let base = BigUint::one() << 270usize;

		sieve.init(&base);
		assert!(sieve.next_segment());
		let mut first = Vec::new();
		sieve.candidates(&mut first);

		sieve.init(&base);
		assert!(sieve.next_segment());
		let mut second = Vec::new();
		sieve.candidates(&mut second);

		assert_eq!(first, second);
	}

	#[test]
	fn test_large_prime_buckets_mark_composites() {
		// with a table this large most primes take the bucket path; verify
		// against a brute-force composite check on a sample of offsets
		let primes = Arc::new(PrimeTable::new(50_000));
		let largest = primes.largest();
		let mut sieve = SegmentedSieve::new(primes.clone(), SEGMENT_SIZE_BITS);

		let base = BigUint::one() << 270usize;
		sieve.init(&base);
		assert!(sieve.next_segment());

		let mut candidates = Vec::new();
		sieve.candidates(&mut candidates);

		// no surviving candidate may be divisible by any table prime
		assert!(!candidates.is_empty());
		for offset in candidates.iter().step_by(candidates.len() / 50 + 1) {
			let n = &base + *offset;
			for i in (1..primes.len()).step_by(97) {
				let p = primes.get(i);
				assert!(!(&n % p).is_zero(), "candidate {} divisible by {}", offset, p);
			}
		}
		assert!(largest as usize > SEGMENT_SIZE_BITS, "test requires bucket-path primes");
	}
}
