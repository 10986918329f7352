//! Pre-sieving with cyclic composite patterns.
//!
//! Sixteen byte tables cover the primes 7..=163; the segment is seeded by
//! OR-ing tables 0-3 (init) and refined by OR-ing tables 4-15 (apply),
//! replacing one marking pass per covered prime with straight pattern
//! copies. Each table holds the combined pattern of two or three primes
//! with a period equal to their product, in odd-only bit positions.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::sync::Arc;

/// Largest prime covered by the pre-sieve tables.
pub const PRESIEVE_MAX_PRIME: u32 = 163;

/// Number of pattern tables.
pub const PRESIEVE_NUM_TABLES: usize = 16;

struct TableInfo {
	period: u32,
	primes: &'static [u32],
}

/// Prime groups chosen so each table's period stays below 10K bits and the
/// group products are mutually close, keeping the working set in L1.
const TABLE_INFO: [TableInfo; PRESIEVE_NUM_TABLES] = [
	TableInfo { period: 5957, primes: &[7, 23, 37] },
	TableInfo { period: 6479, primes: &[11, 19, 31] },
	TableInfo { period: 6409, primes: &[13, 17, 29] },
	TableInfo { period: 6683, primes: &[41, 163] },
	TableInfo { period: 6751, primes: &[43, 157] },
	TableInfo { period: 7097, primes: &[47, 151] },
	TableInfo { period: 7897, primes: &[53, 149] },
	TableInfo { period: 8201, primes: &[59, 139] },
	TableInfo { period: 8357, primes: &[61, 137] },
	TableInfo { period: 8777, primes: &[67, 131] },
	TableInfo { period: 9017, primes: &[71, 127] },
	TableInfo { period: 8249, primes: &[73, 113] },
	TableInfo { period: 8611, primes: &[79, 109] },
	TableInfo { period: 8881, primes: &[83, 107] },
	TableInfo { period: 9167, primes: &[89, 103] },
	TableInfo { period: 9797, primes: &[97, 101] },
];

/// The generated patterns, shared read-only between all sieves.
pub struct PresieveTables {
	tables: Vec<Vec<u8>>,
}

impl PresieveTables {
	pub fn generate() -> Self {
		let tables = TABLE_INFO
			.iter()
			.map(|info| {
				// `period` bytes hold eight full bit-periods, so advancing the
				// cyclic cursor one byte at a time never slips phase
				let byte_size = info.period as usize;
				let total_bits = byte_size as u32 * 8;
				let mut table = vec![0u8; byte_size];
				for prime in info.primes {
					// bit b covers the odd number base + 2b + 1; the first odd
					// multiple of p past p itself sits at bit (3p - 1) / 2
					let start_bit = (3 * prime - 1) / 2;
					let mut pos = start_bit;
					while pos < total_bits {
						table[(pos / 8) as usize] |= 1 << (pos % 8);
						pos += prime;
					}
				}
				table
			})
			.collect();

		PresieveTables { tables }
	}

	fn byte_size(&self, table: usize) -> usize {
		self.tables[table].len()
	}
}

lazy_static! {
	static ref SHARED_TABLES: Arc<PresieveTables> = Arc::new(PresieveTables::generate());
}

/// Per-sieve pre-sieve state: the shared tables plus the per-hash byte
/// offsets aligning each pattern with the sieve base.
pub struct Presieve {
	tables: Arc<PresieveTables>,
	base_offsets: [usize; PRESIEVE_NUM_TABLES],
	wide: bool,
}

impl Default for Presieve {
	fn default() -> Self {
		Presieve::new()
	}
}

impl Presieve {
	pub fn new() -> Self {
		Presieve {
			tables: SHARED_TABLES.clone(),
			base_offsets: [0; PRESIEVE_NUM_TABLES],
			wide: wide_stride_available(),
		}
	}

	/// Aligns every table with a new sieve base. Must be called before
	/// `init`/`apply` whenever the base changes. Bases are byte-aligned in
	/// odd-only bit space (divisible by 16), which every `hash << shift`
	/// with a consensus shift is.
	pub fn set_base_offsets(&mut self, base: &BigUint) {
		debug_assert!((base % 16u32).to_u64() == Some(0));
		for (i, _) in TABLE_INFO.iter().enumerate() {
			let bits = self.tables.byte_size(i) as u64 * 8;
			// (base / 2) positions the odd-only bit stream, then byte-align
			let offset = ((base >> 1u8) % bits).to_u64().expect("residue fits") / 8;
			self.base_offsets[i] = offset as usize;
		}
	}

	fn position(&self, table: usize, segment_low_bytes: usize) -> usize {
		(self.base_offsets[table] + segment_low_bytes) % self.tables.byte_size(table)
	}

	/// Phase 1: overwrite the segment with the OR of tables 0-3.
	pub fn init(&self, segment: &mut [u8], segment_low_bytes: usize) {
		self.combine(segment, segment_low_bytes, 0, false);
	}

	/// Phase 2: OR tables 4-15 into the segment.
	pub fn apply(&self, segment: &mut [u8], segment_low_bytes: usize) {
		for group in 1..4 {
			self.combine(segment, segment_low_bytes, group * 4, true);
		}
	}

	/// Both phases.
	pub fn full(&self, segment: &mut [u8], segment_low_bytes: usize) {
		self.init(segment, segment_low_bytes);
		self.apply(segment, segment_low_bytes);
	}

	/// ORs one group of four tables over the segment, either overwriting or
	/// accumulating. The stride is 64 bytes when the platform prefers wide
	/// vectors, 8 bytes otherwise.
	fn combine(&self, segment: &mut [u8], segment_low_bytes: usize, base: usize, accumulate: bool) {
		let mut pos = [0usize; 4];
		let mut size = [0usize; 4];
		for k in 0..4 {
			pos[k] = self.position(base + k, segment_low_bytes);
			size[k] = self.tables.byte_size(base + k);
		}
		let tables = &self.tables.tables;

		let stride = if self.wide { 64 } else { 8 };
		let mut i = 0;
		while i + stride <= segment.len() {
			for j in i..i + stride {
				let mut value = tables[base][pos[0]] | tables[base + 1][pos[1]] | tables[base + 2][pos[2]] | tables[base + 3][pos[3]];
				if accumulate {
					value |= segment[j];
				}
				segment[j] = value;
				for k in 0..4 {
					pos[k] += 1;
					if pos[k] == size[k] {
						pos[k] = 0;
					}
				}
			}
			i += stride;
		}

		for j in i..segment.len() {
			let mut value = tables[base][pos[0]] | tables[base + 1][pos[1]] | tables[base + 2][pos[2]] | tables[base + 3][pos[3]];
			if accumulate {
				value |= segment[j];
			}
			segment[j] = value;
			for k in 0..4 {
				pos[k] += 1;
				if pos[k] == size[k] {
					pos[k] = 0;
				}
			}
		}
	}
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn wide_stride_available() -> bool {
	is_x86_feature_detected!("avx2")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn wide_stride_available() -> bool {
	false
}
