use bitcrypto::SHA256D;
use network::{ConsensusParams, PowVersion, LEGACY_PATTERN};
use num_bigint::BigUint;
use num_traits::One;
use pow::primality;
use primitives::hash::H256;

/// Legacy blocks all carried difficulties between 304 and 2564; anything
/// outside this compact band is rejected outright.
pub const LEGACY_BITS_MIN: u32 = 33_632_256;
pub const LEGACY_BITS_MAX: u32 = 34_210_816;

/// 1 (leading one) + 8 (fractional field) + 256 (hash)
const SIGNIFICANT_DIGITS: u32 = 265;

lazy_static! {
	/// First 65536 primes, used to reconstruct the primorial during the
	/// current-rules nonce decode.
	static ref PRIME_TABLE: Vec<u64> = generate_prime_table(821_641);
}

/// Sieve of Eratosthenes over odd numbers up to `limit`.
fn generate_prime_table(limit: u64) -> Vec<u64> {
	if limit < 2 {
		return Vec::new();
	}

	let mut composite = vec![0u64; ((limit + 127) / 128) as usize];
	let mut f = 3u64;
	while f * f <= limit {
		if composite[(f >> 7) as usize] & (1 << ((f >> 1) & 63)) == 0 {
			let mut m = (f * f) >> 1;
			while m <= limit >> 1 {
				composite[(m >> 6) as usize] |= 1 << (m & 63);
				m += f;
			}
		}
		f += 2;
	}

	let mut primes = vec![2u64];
	let mut i = 1u64;
	while (i << 1) + 1 <= limit {
		if composite[(i >> 6) as usize] & (1 << (i & 63)) == 0 {
			primes.push((i << 1) + 1);
		}
		i += 1;
	}
	primes
}

/// How hard to test each tuple member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStrength {
	/// Fast base-2 Fermat screen.
	Screen,
	/// Full BPSW confirmation.
	Confirm,
}

/// Number of zero bits the proof result ends in, derived from `bits`.
pub fn derive_trailing_zeros(bits: u32, version: PowVersion, bits_min: u32) -> Option<u32> {
	if bits < bits_min {
		return None;
	}

	let trailing_zeros = match version {
		PowVersion::Legacy => (bits & 0x007f_ffff) >> 8,
		PowVersion::V1 => (bits >> 8) + 1,
	};

	if trailing_zeros < SIGNIFICANT_DIGITS {
		return None;
	}
	Some(trailing_zeros - SIGNIFICANT_DIGITS)
}

/// The constellation target for a header hash.
///
/// Legacy: `1 . 00000000 . hash bits reversed . 0...0`, padded to the
/// difficulty bit length. Current rules replace the eight zero bits with
/// `L = round(2^(8 + Df/2^8) - 2^8)`, evaluated by an integer cubic that
/// matches the real-valued formula for every Df.
pub fn derive_target(hash: &SHA256D, bits: u32, version: PowVersion, bits_min: u32) -> Option<BigUint> {
	let mut target = BigUint::from(256u32);

	match version {
		PowVersion::Legacy => {
			// inverts endianness and bit order inside bytes
			for i in 0..256 {
				target <<= 1u8;
				target += (hash[i / 8] >> (i % 8)) & 1;
			}
		}
		PowVersion::V1 => {
			let df = u64::from(bits & 255);
			target += (10 * df * df * df + 7383 * df * df + 5_840_720 * df + 3_997_440) >> 23;
			target <<= 256u16;
			target += BigUint::from_bytes_le(&hash[..]);
		}
	}

	let trailing_zeros = derive_trailing_zeros(bits, version, bits_min)?;
	Some(target << trailing_zeros as usize)
}

/// Length of the prime tuple rooted at `n` along `offsets` (deltas).
pub fn check_constellation(n: &BigUint, offsets: &[u32], strength: TestStrength) -> u32 {
	let mut n = n.clone();
	let mut tuple_length = 0;

	for offset in offsets {
		n += *offset;
		let probably_prime = match strength {
			TestStrength::Screen => primality::fermat(&n),
			TestStrength::Confirm => primality::bpsw(&n),
		};
		if !probably_prime {
			break;
		}
		tuple_length += 1;
	}

	tuple_length
}

/// Validates a constellation proof of work over `(hash, bits, nonce)`.
///
/// The rules version is selected by the low nonce bits; the 32-byte nonce
/// is either the raw offset (legacy) or the packed
/// `[primorial_number | primorial_factor | primorial_offset | version]`
/// record of the current rules.
pub fn check_constellation_proof_of_work(hash: &SHA256D, bits: u32, nonce: &H256, params: &ConsensusParams) -> bool {
	if *hash == params.genesis_pow_hash {
		return true;
	}

	let mut lane = [0u8; 8];
	lane.copy_from_slice(&nonce[0..8]);
	let lane0 = u64::from_le_bytes(lane);

	let version = if lane0 & 1 == 1 {
		// sanity band also rules out negative numbers and overflows
		if bits < LEGACY_BITS_MIN || bits > LEGACY_BITS_MAX {
			return false;
		}
		PowVersion::Legacy
	} else if lane0 & 65535 == 2 {
		if bits < params.bits_min {
			return false;
		}
		PowVersion::V1
	} else {
		return false;
	};

	let trailing_zeros = match derive_trailing_zeros(bits, version, params.bits_min) {
		Some(tz) => tz,
		None => return false,
	};
	let target = match derive_target(hash, bits, version, params.bits_min) {
		Some(target) => target,
		None => return false,
	};

	let offset_limit = BigUint::one() << trailing_zeros as usize;
	let offset = match version {
		PowVersion::Legacy => BigUint::from_bytes_le(&nonce[..]),
		PowVersion::V1 => {
			let mut number = [0u8; 2];
			number.copy_from_slice(&nonce[30..32]);
			let primorial_number = u16::from_le_bytes(number);

			let mut primorial = BigUint::one();
			for i in 0..primorial_number {
				primorial *= PRIME_TABLE[i as usize];
				if primorial > offset_limit {
					error!(target: "verification", "too large primorial number {}", primorial_number);
					return false;
				}
			}

			let primorial_factor = BigUint::from_bytes_le(&nonce[14..30]);
			let primorial_offset = BigUint::from_bytes_le(&nonce[2..14]);
			&primorial - (&target % &primorial) + primorial_factor * &primorial + primorial_offset
		}
	};

	if offset >= offset_limit {
		error!(target: "verification", "offset larger than allowed 2^{}", trailing_zeros);
		return false;
	}
	let result = target + offset;

	let accepted_patterns: Vec<Vec<u32>> = match version {
		PowVersion::Legacy => vec![LEGACY_PATTERN.to_vec()],
		PowVersion::V1 => params.pow_accepted_patterns.clone(),
	};

	for pattern in &accepted_patterns {
		// quick screen first, full confirmation only on a complete match
		if check_constellation(&result, pattern, TestStrength::Screen) != pattern.len() as u32 {
			continue;
		}
		if check_constellation(&result, pattern, TestStrength::Confirm) == pattern.len() as u32 {
			return true;
		}
	}

	false
}
