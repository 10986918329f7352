use crate::{math, primality, MAX_SHIFT, MIN_SHIFT};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::fmt;

/// A prime gap proof of work.
///
/// The gap is anchored at `start = hash * 2^shift + adder`, which must be
/// prime; its end is the next prime. The proof is valid when the achieved
/// difficulty of that gap reaches the target carried by the header.
#[derive(Debug, Clone)]
pub struct Proof {
	hash: BigUint,
	nonce: u32,
	shift: u16,
	adder: BigUint,
	target_difficulty: u64,
}

impl Proof {
	pub fn new(hash: BigUint, shift: u16, adder: BigUint, target_difficulty: u64, nonce: u32) -> Self {
		Proof {
			hash,
			nonce,
			shift,
			adder,
			target_difficulty,
		}
	}

	/// Builds a proof from header-format byte strings (little-endian).
	pub fn from_bytes(hash: &[u8], shift: u16, adder: &[u8], target_difficulty: u64, nonce: u32) -> Self {
		Proof {
			hash: BigUint::from_bytes_le(hash),
			nonce,
			shift,
			adder: BigUint::from_bytes_le(adder),
			target_difficulty,
		}
	}

	/// The gap endpoints, or None when the proof is structurally invalid:
	/// shift out of range, hash not 256 bits, adder too wide for the shift,
	/// or a composite starting point.
	pub fn end_points(&self) -> Option<(BigUint, BigUint)> {
		if self.shift < MIN_SHIFT || self.shift > MAX_SHIFT {
			return None;
		}

		if self.hash.bits() != 256 {
			return None;
		}

		// adder must stay below 2^shift
		if self.adder.bits() > u64::from(self.shift) {
			return None;
		}

		let start = (&self.hash << self.shift as usize) + &self.adder;
		if !primality::bpsw(&start) {
			return None;
		}

		let end = primality::next_prime(&start);
		Some((start, end))
	}

	/// Achieved Q48 difficulty, 0 for a structurally invalid proof.
	pub fn difficulty(&self) -> u64 {
		self.end_points().map(|(start, end)| math::difficulty(&start, &end)).unwrap_or(0)
	}

	/// Achieved Q48 merit, 0 for a structurally invalid proof.
	pub fn merit(&self) -> u64 {
		self.end_points().map(|(start, end)| math::merit(&start, &end)).unwrap_or(0)
	}

	/// Gap length, 0 for a structurally invalid proof.
	pub fn gap_len(&self) -> u64 {
		self.end_points()
			.and_then(|(start, end)| (end - start).to_u64())
			.unwrap_or(0)
	}

	pub fn valid(&self) -> bool {
		self.difficulty() >= self.target_difficulty
	}

	/// Minimum gap size at `start` for this proof's target difficulty.
	pub fn target_size(&self, start: &BigUint) -> u64 {
		math::target_size(start, self.target_difficulty)
	}

	pub fn hash(&self) -> &BigUint {
		&self.hash
	}

	pub fn shift(&self) -> u16 {
		self.shift
	}

	pub fn nonce(&self) -> u32 {
		self.nonce
	}

	pub fn adder(&self) -> &BigUint {
		&self.adder
	}

	/// Adder as little-endian bytes for the header's proof partition.
	pub fn adder_bytes(&self) -> Vec<u8> {
		self.adder.to_bytes_le()
	}

	pub fn target(&self) -> u64 {
		self.target_difficulty
	}

	pub fn set_adder(&mut self, adder: BigUint) {
		self.adder = adder;
	}
}

impl fmt::Display for Proof {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"Proof {{ nonce: {}, shift: {}, hash: {:x}, adder: {:x}, target: {:.6}, gap: {} }}",
			self.nonce,
			self.shift,
			self.hash,
			self.adder,
			math::readable_difficulty(self.target_difficulty),
			self.gap_len(),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::Proof;
	use crate::{math, primality, MIN_SHIFT, TWO_POW48};
	use num_bigint::BigUint;
	use num_traits::One;

	fn hash_256bit() -> BigUint {
		(BigUint::one() << 255usize) + BigUint::from(12345u32)
	}

	// shifts the interesting structure of hash_256bit() into a known gap:
	// find the first prime at or after hash << shift and the one after it
	fn known_gap(shift: u16) -> (BigUint, BigUint, BigUint) {
		let hash = hash_256bit();
		let base = &hash << shift as usize;
		let start = primality::next_prime(&base);
		let end = primality::next_prime(&start);
		(hash, start, end)
	}

	#[test]
	fn test_shift_bounds_rejected() {
		let hash = hash_256bit();

		let proof = Proof::new(hash.clone(), MIN_SHIFT - 1, BigUint::one(), TWO_POW48, 0);
		assert!(proof.end_points().is_none());
		assert!(!proof.valid());
		assert_eq!(proof.difficulty(), 0);

		let proof = Proof::new(hash, 257, BigUint::one(), TWO_POW48, 0);
		assert!(proof.end_points().is_none());
	}

	#[test]
	fn test_short_hash_rejected() {
		let proof = Proof::new(BigUint::one() << 254usize, 20, BigUint::one(), TWO_POW48, 0);
		assert!(proof.end_points().is_none());
	}

	#[test]
	fn test_wide_adder_rejected() {
		let hash = hash_256bit();
		let adder = BigUint::one() << 20usize; // 21 bits, shift is 20
		let proof = Proof::new(hash, 20, adder, TWO_POW48, 0);
		assert!(proof.end_points().is_none());
	}

	#[test]
	fn test_composite_start_rejected() {
		let hash = hash_256bit();
		// hash << shift is even, never prime
		let proof = Proof::new(hash, 20, BigUint::from(0u32), TWO_POW48, 0);
		assert!(proof.end_points().is_none());
	}

	#[test]
	fn test_valid_gap_found_and_measured() {
		let (hash, start, end) = known_gap(20);
		let adder = &start - (&hash << 20usize);

		let proof = Proof::new(hash, 20, adder, 0, 0);
		let (s, e) = proof.end_points().expect("structurally valid");
		assert_eq!(s, start);
		assert_eq!(e, end);

		assert_eq!(proof.difficulty(), math::difficulty(&start, &end));
		assert_eq!(proof.merit(), math::merit(&start, &end));
		// any gap beats a zero target
		assert!(proof.valid());
	}

	#[test]
	fn test_unreachable_target_invalid() {
		let (hash, start, _) = known_gap(20);
		let adder = &start - (&hash << 20usize);

		let proof = Proof::new(hash, 20, adder, 1000 * TWO_POW48, 0);
		assert!(proof.end_points().is_some());
		assert!(!proof.valid());
	}

	#[test]
	fn test_from_bytes_round_trip() {
		let (hash, start, _) = known_gap(20);
		let adder = &start - (&hash << 20usize);

		let direct = Proof::new(hash.clone(), 20, adder.clone(), TWO_POW48, 7);
		let from_bytes = Proof::from_bytes(&hash.to_bytes_le(), 20, &adder.to_bytes_le(), TWO_POW48, 7);

		assert_eq!(from_bytes.hash(), direct.hash());
		assert_eq!(from_bytes.adder(), direct.adder());
		assert_eq!(from_bytes.nonce(), 7);
		assert_eq!(from_bytes.difficulty(), direct.difficulty());
	}
}
