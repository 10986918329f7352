//! Deterministic probable-prime testing: Baillie-PSW with a separately
//! exposed Fermat pre-filter for batched back-ends.
//!
//! BPSW has no known counterexample and is proven exact below 2^64, which
//! makes it the consensus arbiter of primality here: a gap is only a gap
//! if both endpoints pass and nothing in between does.

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::{Integer, Roots};
use num_traits::{One, ToPrimitive, Zero};

/// Trial division set, the first 24 odd primes.
const SMALL_PRIMES: [u32; 24] = [
	3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Candidates packed for a batched primality back-end.
///
/// Each candidate occupies `(bits + 31) / 32` little-endian u32 limbs,
/// zero-padded at the top. `indices` carries the originating sieve offsets
/// so results can be folded back into the gap accumulator.
#[derive(Debug, Default, Clone)]
pub struct CandidateBatch {
	pub candidates: Vec<u32>,
	pub indices: Vec<u64>,
	pub bits: u32,
	pub count: usize,
}

/// Baillie-PSW probable prime test.
pub fn bpsw(n: &BigUint) -> bool {
	let two = BigUint::from(2u32);
	if *n < two {
		return false;
	}
	if *n == two {
		return true;
	}
	if n.is_even() {
		return false;
	}

	for p in &SMALL_PRIMES {
		let p = BigUint::from(*p);
		if *n == p {
			return true;
		}
		if (n % p).is_zero() {
			return false;
		}
	}

	miller_rabin(n, 2) && strong_lucas_selfridge(n)
}

/// Miller-Rabin strong probable prime test to the given base.
pub fn miller_rabin(n: &BigUint, base: u32) -> bool {
	let n_minus_1 = n - 1u32;

	// n - 1 = d * 2^s with d odd
	let s = n_minus_1.trailing_zeros().unwrap_or(0);
	let d = &n_minus_1 >> s as usize;

	let mut x = BigUint::from(base).modpow(&d, n);
	if x.is_one() || x == n_minus_1 {
		return true;
	}

	for _ in 1..s {
		x = x.modpow(&BigUint::from(2u32), n);
		if x == n_minus_1 {
			return true;
		}
		if x.is_one() {
			return false;
		}
	}

	false
}

/// Jacobi symbol (a/n) for odd n.
pub fn jacobi(a: &BigInt, n: &BigUint) -> i32 {
	debug_assert!(n.is_odd());

	let n_int = BigInt::from_biguint(Sign::Plus, n.clone());
	let mut a = a.mod_floor(&n_int).to_biguint().expect("mod_floor of positive modulus is non-negative");
	let mut n = n.clone();
	let mut result = 1;

	while !a.is_zero() {
		while a.is_even() {
			a >>= 1usize;
			let r = (&n % 8u32).to_u32().expect("residue fits");
			if r == 3 || r == 5 {
				result = -result;
			}
		}
		std::mem::swap(&mut a, &mut n);
		if (&a % 4u32).to_u32() == Some(3) && (&n % 4u32).to_u32() == Some(3) {
			result = -result;
		}
		a %= &n;
	}

	if n.is_one() {
		result
	} else {
		0
	}
}

/// First D in 5, -7, 9, -11, ... with jacobi(D, n) = -1, or None when n is
/// proven composite (or pathologically divides every trial D).
fn find_selfridge_d(n: &BigUint) -> Option<i64> {
	let mut d: i64 = 5;
	let mut sign = 1i64;

	loop {
		match jacobi(&BigInt::from(d), n) {
			-1 => return Some(d),
			0 => {
				// jacobi = 0 means gcd(D, n) > 1: composite unless n = |D|
				if *n != BigUint::from(d.unsigned_abs()) {
					return None;
				}
			}
			_ => {}
		}

		sign = -sign;
		d = sign * (d.abs() + 2);

		if d.abs() > 1_000_000 {
			return None;
		}
	}
}

/// (x / 2) mod n for even-after-adjustment x: odd values borrow n first.
fn half_mod(mut x: BigInt, n: &BigInt) -> BigInt {
	if x.is_odd() {
		x += n;
	}
	(x >> 1usize).mod_floor(n)
}

/// Strong Lucas probable prime test with Selfridge parameters.
pub fn strong_lucas_selfridge(n: &BigUint) -> bool {
	// perfect squares never satisfy jacobi(D, n) = -1; reject them up front
	let root = n.sqrt();
	if &root * &root == *n {
		return false;
	}

	let d_param = match find_selfridge_d(n) {
		Some(d) => d,
		None => return false,
	};

	// P = 1, Q = (1 - D) / 4
	let p_param = 1i64;
	let q_param = (1 - d_param) / 4;

	// n + 1 = d * 2^s with d odd
	let n_plus_1 = n + 1u32;
	let s = n_plus_1.trailing_zeros().unwrap_or(0);
	let d = &n_plus_1 >> s as usize;

	let n_int = BigInt::from_biguint(Sign::Plus, n.clone());
	let mut u_k = BigInt::one();
	let mut v_k = BigInt::from(p_param);
	let mut q_k = BigInt::from(q_param);

	let d_bits = d.bits();
	for i in (0..d_bits - 1).rev() {
		// double: U_2k = U_k * V_k, V_2k = V_k^2 - 2 Q^k
		u_k = (&u_k * &v_k).mod_floor(&n_int);
		v_k = (&v_k * &v_k - &q_k * 2i64).mod_floor(&n_int);
		q_k = (&q_k * &q_k).mod_floor(&n_int);

		if d.bit(i) {
			// increment: U_{k+1} = (P U_k + V_k) / 2, V_{k+1} = (D U_k + P V_k) / 2
			let u_next = half_mod(&u_k * p_param + &v_k, &n_int);
			let v_next = half_mod(&u_k * d_param + &v_k * p_param, &n_int);
			u_k = u_next;
			v_k = v_next;
			q_k = (&q_k * q_param).mod_floor(&n_int);
		}
	}

	// U_d = 0 (mod n)?
	if u_k.is_zero() || v_k.is_zero() {
		return true;
	}

	// V_{d * 2^r} = 0 (mod n) for some 0 < r < s?
	for _ in 1..s {
		v_k = (&v_k * &v_k - &q_k * 2i64).mod_floor(&n_int);
		if v_k.is_zero() {
			return true;
		}
		q_k = (&q_k * &q_k).mod_floor(&n_int);
	}

	false
}

/// Fermat test to base 2: 2^(n-1) = 1 (mod n).
///
/// Fast and batch-friendly, but fooled by Carmichael numbers; every
/// candidate that passes must be confirmed with `bpsw` before use.
pub fn fermat(n: &BigUint) -> bool {
	if *n < BigUint::from(2u32) {
		return false;
	}
	BigUint::from(2u32).modpow(&(n - 1u32), n).is_one()
}

/// Smallest prime strictly greater than `n`.
pub fn next_prime(n: &BigUint) -> BigUint {
	let mut candidate = n + 1u32;
	if candidate.is_even() {
		candidate += 1u32;
	}

	while !bpsw(&candidate) {
		candidate += 2u32;
	}
	candidate
}

/// Packs `start + offset` for each offset into fixed-width limbs for a
/// batched back-end. 320 bits suits shifts up to 64, 352 anything beyond.
pub fn prepare_batch(start: &BigUint, offsets: &[u64], max_bits: u32) -> CandidateBatch {
	let limbs = ((max_bits + 31) / 32) as usize;

	let mut batch = CandidateBatch {
		candidates: vec![0u32; offsets.len() * limbs],
		indices: Vec::with_capacity(offsets.len()),
		bits: max_bits,
		count: offsets.len(),
	};

	for (i, offset) in offsets.iter().enumerate() {
		let value = start + *offset;
		let bytes = value.to_bytes_le();
		debug_assert!(bytes.len() <= limbs * 4);

		let words = &mut batch.candidates[i * limbs..(i + 1) * limbs];
		for (j, byte) in bytes.iter().enumerate() {
			words[j / 4] |= u32::from(*byte) << (8 * (j % 4));
		}
		batch.indices.push(*offset);
	}

	batch
}
