//! Fixed-point merit and difficulty arithmetic.
//!
//! Everything here is consensus-critical and therefore integer-only: the
//! same inputs must produce bit-identical outputs on every platform.
//!
//! Key formulas:
//!   merit      = gap_size / ln(start) = gap_size * log2(e) / log2(start)
//!   difficulty = merit + (rand(start, end) % min_step(start))
//!   next       = current + log(target_spacing / actual_spacing), damped

use crate::{MIN_DIFFICULTY, TWO_POW48};
use bitcrypto::dhash256;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

lazy_static! {
	/// log2(e) * 2^112
	static ref LOG2E_112: BigUint = BigUint::parse_bytes(b"171547652b82fe1777d0ffda0d23a", 16).expect("const hex is valid");
	/// log2(e) * 2^64
	static ref LOG2E_64: BigUint = BigUint::parse_bytes(b"171547652b82fe177", 16).expect("const hex is valid");
}

/// Target block spacing in seconds.
const TARGET_SPACING: i64 = 150;

/// ln(150) * 2^48
const LOG_150_48: u64 = 0x502b8fea053a6;

/// `floor(log2(src) * 2^accuracy)` for `src >= 1`.
///
/// The integer part is `bit_length - 1`. Fractional bits come from
/// repeatedly squaring the normalized residue and recording how often the
/// square exceeds two, one output bit per squaring chain.
pub fn log2_q(src: &BigUint, accuracy: u32) -> BigUint {
	debug_assert!(!src.is_zero());

	let int_log2 = src.bits() - 1;
	let shift = (accuracy as u64 + int_log2) as usize;

	let mut result = BigUint::from(int_log2) << accuracy as usize;
	let mut n = src.clone() << accuracy as usize;
	let mut bits = 0u32;
	let two = BigUint::from(2u32);

	loop {
		let mut tmp = &n >> shift;

		// while n / 2^shift < 2, square n
		while tmp < two && bits <= accuracy {
			n = &n * &n;
			n >>= shift;
			tmp = &n >> shift;
			bits += 1;
		}

		if bits > accuracy {
			break;
		}

		result += BigUint::one() << (accuracy - bits) as usize;
		n >>= 1usize;
	}

	result
}

/// Merit of the gap `[start, end]` in Q48, truncated to 64 bits.
pub fn merit(start: &BigUint, end: &BigUint) -> u64 {
	debug_assert!(end > start);

	// gap_len * log2(e) * 2^(64 + 48) / (log2(start) * 2^64)
	let m = (end - start) * &*LOG2E_112 / log2_q(start, 64);
	m.to_u64().unwrap_or(0)
}

/// Deterministic tie-breaker derived from the gap endpoints: the four
/// 64-bit lanes of SHA256d(le(start) || le(end)) XOR-folded together.
///
/// This keeps achieved difficulty a strictly monotone function of the gap
/// itself, not merely of its size.
pub fn rand(start: &BigUint, end: &BigUint) -> u64 {
	let mut data = start.to_bytes_le();
	data.extend_from_slice(&end.to_bytes_le());

	let hash = dhash256(&data);
	let mut folded = 0u64;
	for lane in hash.chunks(8) {
		let mut word = [0u8; 8];
		word.copy_from_slice(lane);
		folded ^= u64::from_le_bytes(word);
	}
	folded
}

/// Q48 distance between the merits of two gaps at `start` whose sizes
/// differ by the minimal amount (2). Bounds the `rand` contribution.
pub fn min_step(start: &BigUint) -> u64 {
	let step = BigUint::from(2u32) * &*LOG2E_112 / log2_q(start, 64);
	step.to_u64().unwrap_or(1).max(1)
}

/// Achieved difficulty of the gap `[start, end]` in Q48.
///
/// The random component provides sub-integer-merit precision.
pub fn difficulty(start: &BigUint, end: &BigUint) -> u64 {
	merit(start, end) + rand(start, end) % min_step(start)
}

/// Minimum gap length at `start` that reaches `difficulty`.
pub fn target_size(start: &BigUint, difficulty: u64) -> u64 {
	let size = log2_q(start, 64) * BigUint::from(difficulty) / &*LOG2E_112;
	size.to_u64().unwrap_or(0)
}

/// Expected number of primality tests to find a gap of `difficulty`,
/// approximately e^(difficulty / 2^48).
pub fn target_work(difficulty: u64) -> BigUint {
	// 2^floor(d * log2(e)), with d in merit units
	let shifted = BigUint::from(difficulty) * &*LOG2E_112 >> (48usize + 64usize);
	BigUint::one() << shifted.to_u64().unwrap_or(0) as usize
}

/// Next target difficulty after a block that took `actual_timespan`
/// seconds.
///
/// Logarithmic adjustment with asymmetric damping: increases at 1/256,
/// decreases at 1/64 so a sudden hash rate loss recovers quickly. The
/// change is clamped to one merit per block.
pub fn next_difficulty(difficulty: u64, actual_timespan: u64) -> u64 {
	let actual = BigUint::from(actual_timespan.max(1));

	// log(actual) * 2^48 = log2(actual) * 2^(64 + 48) / (log2(e) * 2^64)
	let log_actual = (log2_q(&actual, 64 + 48) / &*LOG2E_64).to_u64().unwrap_or(u64::max_value());
	let log_target = LOG_150_48;

	let mut next = difficulty;
	let shift = if log_actual > log_target { 6 } else { 8 };

	if log_target >= log_actual {
		next += (log_target - log_actual) >> shift;
	} else {
		let delta = (log_actual - log_target) >> shift;
		next = if difficulty >= delta { next - delta } else { MIN_DIFFICULTY };
	}

	// at most one merit up or down per block
	if next > difficulty + TWO_POW48 {
		next = difficulty + TWO_POW48;
	}
	if difficulty >= TWO_POW48 && next < difficulty - TWO_POW48 {
		next = difficulty - TWO_POW48;
	}

	next.max(MIN_DIFFICULTY)
}

/// Largest difficulty drop possible over `time` seconds of stalled chain.
/// Difficulty decreases at most one merit per ~174 blocks (factor e).
pub fn max_difficulty_decrease(mut difficulty: u64, mut time: i64) -> u64 {
	while time > 0 && difficulty > MIN_DIFFICULTY {
		if difficulty >= TWO_POW48 {
			difficulty -= TWO_POW48;
		}
		time -= 174 * TARGET_SPACING;
	}

	difficulty.max(MIN_DIFFICULTY)
}

/// Q48 difficulty as a floating point number, display only.
pub fn readable_difficulty(difficulty: u64) -> f64 {
	difficulty as f64 / TWO_POW48 as f64
}

/// Expected gaps (blocks) per day at `pps` primality tests per second.
pub fn gaps_per_day(pps: f64, difficulty: u64) -> f64 {
	let work = readable_difficulty(difficulty).exp();
	(60.0 * 60.0 * 24.0) / (work / pps)
}
