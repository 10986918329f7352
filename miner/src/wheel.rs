//! Wheel-2310 factorization tables.
//!
//! The wheel over 2*3*5*7*11 = 2310 keeps only the 480 residues coprime to
//! the primorial, discarding 79.2% of candidates before any sieving or
//! primality testing happens.

/// 2 * 3 * 5 * 7 * 11
pub const WHEEL_PRIMORIAL: u32 = 2310;

/// Residues coprime to 2310.
pub const WHEEL_SIZE: usize = 480;

lazy_static! {
	/// The 480 residues coprime to 2310, ascending.
	pub static ref WHEEL_RESIDUES: Vec<u16> = {
		let residues: Vec<u16> = (1..WHEEL_PRIMORIAL as u16).filter(|r| coprime_2310(u64::from(*r))).collect();
		assert_eq!(residues.len(), WHEEL_SIZE);
		residues
	};

	/// Distance from each residue to the next (wrapping to the next turn).
	pub static ref WHEEL_DELTAS: Vec<u8> = {
		let mut deltas = Vec::with_capacity(WHEEL_SIZE);
		for i in 0..WHEEL_SIZE {
			let current = u32::from(WHEEL_RESIDUES[i]);
			let next = if i + 1 < WHEEL_SIZE {
				u32::from(WHEEL_RESIDUES[i + 1])
			} else {
				u32::from(WHEEL_RESIDUES[0]) + WHEEL_PRIMORIAL
			};
			deltas.push((next - current) as u8);
		}
		deltas
	};

	/// Residue -> wheel index, -1 for residues sharing a factor with 2310.
	pub static ref WHEEL_INDEX: Vec<i16> = {
		let mut index = vec![-1i16; WHEEL_PRIMORIAL as usize];
		for (i, r) in WHEEL_RESIDUES.iter().enumerate() {
			index[*r as usize] = i as i16;
		}
		index
	};
}

fn coprime_2310(n: u64) -> bool {
	n & 1 != 0 && n % 3 != 0 && n % 5 != 0 && n % 7 != 0 && n % 11 != 0
}

/// Coprimality with 2310 without the lookup table.
#[inline]
pub fn is_coprime_2310(n: u64) -> bool {
	coprime_2310(n)
}

/// Index of `n mod 2310` in the residue table, None when not coprime.
#[inline]
pub fn wheel_index(n: u64) -> Option<usize> {
	let i = WHEEL_INDEX[(n % u64::from(WHEEL_PRIMORIAL)) as usize];
	if i >= 0 {
		Some(i as usize)
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_wheel_size() {
		assert_eq!(WHEEL_RESIDUES.len(), 480);
		assert_eq!(WHEEL_RESIDUES[0], 1);
		assert_eq!(WHEEL_RESIDUES[1], 13);
		assert_eq!(*WHEEL_RESIDUES.last().unwrap(), 2309);
	}

	#[test]
	fn test_deltas_close_the_wheel() {
		let total: u32 = WHEEL_DELTAS.iter().map(|d| u32::from(*d)).sum();
		assert_eq!(total, WHEEL_PRIMORIAL);
	}

	#[test]
	fn test_index_round_trip() {
		for (i, r) in WHEEL_RESIDUES.iter().enumerate() {
			assert_eq!(wheel_index(u64::from(*r)), Some(i));
			assert_eq!(wheel_index(u64::from(*r) + 2310), Some(i));
		}
		assert_eq!(wheel_index(0), None);
		assert_eq!(wheel_index(2), None);
		assert_eq!(wheel_index(33), None);
	}

	#[test]
	fn test_filter_rate() {
		// the wheel keeps 480 / 2310 = 20.8% of residues
		let kept = (0u64..2310).filter(|n| is_coprime_2310(*n)).count();
		assert_eq!(kept, 480);
	}
}
