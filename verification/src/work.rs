use chain::BlockIndex;
use network::ConsensusParams;
use pow::math;

/// Maximum allowed clock skew of a block timestamp, seconds.
pub const TIMESTAMP_WINDOW: i64 = 2 * 60 * 60;

/// ASERT-style difficulty for the block at `next_height`, from the previous
/// block's `bits` and solve time.
///
/// The solve time is clamped to `[-TIMESTAMP_WINDOW, 12 * spacing]`, then
/// the fixed-point approximation
/// `bits * (1 + 10 * (1 - solve/spacing) / (N * cp))` is applied with
/// smoothing N = 64 and cp = 10 * constellation_size + 23.
pub fn asert(bits: u32, previous_solve_time: i64, next_height: u32, params: &ConsensusParams) -> u32 {
	let n: i64 = 64; // smoothing
	let cp = (10 * params.constellation_size_at_height(next_height) + 23) as i64;
	let previous_difficulty = i64::from(bits);

	let mut solve_time = previous_solve_time;
	if solve_time < -TIMESTAMP_WINDOW {
		solve_time = -TIMESTAMP_WINDOW;
	}
	if solve_time > 12 * params.pow_target_spacing {
		solve_time = 12 * params.pow_target_spacing;
	}

	let difficulty =
		previous_difficulty * (65536 + 10 * (65536 - 65536 * solve_time / params.pow_target_spacing) / (n * cp)) / 65536;

	if difficulty < i64::from(params.bits_min) {
		params.bits_min
	} else if difficulty > 4_294_967_295 {
		u32::max_value()
	} else {
		difficulty as u32
	}
}

/// Required `bits` of the block following `last_ix` under constellation
/// rules.
///
/// At the fork boundary the compact legacy difficulty converts with the
/// fixed 171/256 factor; afterwards every block retargets through `asert`
/// on the previous solve time. Pre-fork heights are historical and are
/// never re-derived, the previous difficulty carries over.
pub fn next_work_required(index: &BlockIndex, last_ix: u32, params: &ConsensusParams) -> Option<u32> {
	let last = index.get(last_ix)?;
	let next_height = last.height + 1;

	if next_height < params.fork2_height {
		return Some(last.bits);
	}

	if next_height == params.fork2_height {
		// previous difficulty / 1.5: in the new format bits is difficulty * 256,
		// and 2 * 256 / 3 = ~171
		let old_difficulty = (last.bits & 0x007f_ffff) >> 8;
		let bits = old_difficulty * 171;
		return Some(bits.max(params.bits_min));
	}

	if last.height == 0 {
		return Some(last.bits);
	}
	if params.pow_no_retargeting {
		return Some(last.bits);
	}

	let prev_ix = index.prev(last_ix)?;
	let prev = index.get(prev_ix)?;
	let solve_time = i64::from(last.time) - i64::from(prev.time);
	Some(asert(last.bits, solve_time, next_height, params))
}

/// Required Q48 difficulty of the block following one of `prev_difficulty`
/// solved in `actual_timespan` seconds, under gap rules.
pub fn next_gap_difficulty(prev_difficulty: u64, actual_timespan: u64, params: &ConsensusParams) -> u64 {
	if params.pow_no_retargeting {
		return prev_difficulty;
	}
	math::next_difficulty(prev_difficulty, actual_timespan)
}

/// Checks that a difficulty transition at `height` stays within the
/// permitted envelope, without access to the full header chain.
pub fn permitted_difficulty_transition(height: u32, old_bits: u32, new_bits: u32, params: &ConsensusParams) -> bool {
	if height >= params.fork2_height {
		if height == params.fork2_height {
			let old_difficulty = (old_bits & 0x007f_ffff) >> 8;
			let expected = (old_difficulty * 171).max(params.bits_min);
			return new_bits == expected;
		}

		let largest = asert(old_bits, -TIMESTAMP_WINDOW, height, params);
		let smallest = asert(old_bits, 12 * params.pow_target_spacing, height, params);
		new_bits >= smallest && new_bits <= largest
	} else {
		// mainnet only, before the second fork: just enforce the historical
		// lower (304) and upper (2564) difficulty bounds
		(33_632_256..=34_210_816).contains(&new_bits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bitcrypto::SHA256D;
	use chain::{BlockIndex, BlockMeta};
	use network::{ConsensusParams, Network};
	use pow::TWO_POW48;

	fn meta(height: u32, time: u32, bits: u32) -> BlockMeta {
		BlockMeta {
			hash: SHA256D::default(),
			height,
			time,
			difficulty: 20 * TWO_POW48,
			bits,
		}
	}

	#[test]
	fn test_asert_on_target_is_stable() {
		let params = ConsensusParams::new(Network::Testnet);
		let bits = params.bits_min * 2;
		assert_eq!(asert(bits, params.pow_target_spacing, 100, &params), bits);
	}

	#[test]
	fn test_asert_direction() {
		let params = ConsensusParams::new(Network::Testnet);
		let bits = params.bits_min * 2;

		// fast block raises difficulty, slow block lowers it
		assert!(asert(bits, params.pow_target_spacing / 2, 100, &params) > bits);
		assert!(asert(bits, params.pow_target_spacing * 2, 100, &params) < bits);
	}

	#[test]
	fn test_asert_clamps() {
		let params = ConsensusParams::new(Network::Testnet);

		// floor at bits_min
		assert_eq!(asert(params.bits_min, 100 * params.pow_target_spacing, 100, &params), params.bits_min);

		// solve time saturates at the timestamp window, so an absurd
		// negative time changes nothing beyond the window's effect
		assert_eq!(
			asert(params.bits_min * 2, -10 * TIMESTAMP_WINDOW, 100, &params),
			asert(params.bits_min * 2, -TIMESTAMP_WINDOW, 100, &params)
		);
	}

	#[test]
	fn test_next_work_follows_asert_and_is_permitted() {
		let params = ConsensusParams::new(Network::Testnet);
		let mut index = BlockIndex::new();

		let genesis = index.insert(meta(0, 1_707_684_554, params.bits_min), None);
		// a steady chain with alternating solve times
		let mut prev = genesis;
		let mut time = 1_707_684_554u32;
		for height in 1..50 {
			let bits = next_work_required(&index, prev, &params).unwrap();
			time += if height % 2 == 0 { 250 } else { 350 };
			let ix = index.insert(meta(height, time, bits), Some(prev));

			let last = index.get(prev).unwrap().bits;
			assert!(
				permitted_difficulty_transition(height, last, bits, &params),
				"transition {} -> {} rejected at height {}",
				last,
				bits,
				height
			);
			prev = ix;
		}
	}

	#[test]
	fn test_fork_transition_value() {
		let params = ConsensusParams::new(Network::Mainnet);
		let mut index = BlockIndex::new();

		// chain ending right before the fork
		let mut prev = None;
		for height in 0..3 {
			prev = Some(index.insert(meta(height, height * 150, 33_632_256), prev));
		}
		// expected transition: old difficulty 304 * 171, floored at bits_min
		let old_difficulty = (33_632_256u32 & 0x007f_ffff) >> 8;
		assert_eq!(old_difficulty, 304);
		let expected = (old_difficulty * 171).max(params.bits_min);

		assert!(permitted_difficulty_transition(params.fork2_height, 33_632_256, expected, &params));
		assert!(!permitted_difficulty_transition(params.fork2_height, 33_632_256, expected + 1, &params));
	}

	#[test]
	fn test_pre_fork_band() {
		let params = ConsensusParams::new(Network::Mainnet);
		assert!(permitted_difficulty_transition(100, 33_632_256, 33_632_256, &params));
		assert!(permitted_difficulty_transition(100, 33_632_256, 34_210_816, &params));
		assert!(!permitted_difficulty_transition(100, 33_632_256, 33_632_255, &params));
		assert!(!permitted_difficulty_transition(100, 33_632_256, 34_210_817, &params));
	}

	#[test]
	fn test_no_retargeting_on_regtest() {
		let params = ConsensusParams::new(Network::Regtest);
		let mut index = BlockIndex::new();
		let genesis = index.insert(meta(0, 0, params.bits_min), None);
		let b1 = index.insert(meta(1, 150, params.bits_min), Some(genesis));

		assert_eq!(next_work_required(&index, b1, &params), Some(params.bits_min));
		assert_eq!(next_gap_difficulty(20 * TWO_POW48, 1, &params), 20 * TWO_POW48);
	}

	#[test]
	fn test_gap_difficulty_retarget() {
		let params = ConsensusParams::new(Network::Mainnet);
		let diff = 20 * TWO_POW48;

		// mirrors the kernel's logarithmic adjustment
		assert!(next_gap_difficulty(diff, 75, &params) > diff);
		assert!(next_gap_difficulty(diff, 300, &params) < diff);
		assert_eq!(next_gap_difficulty(diff, 150, &params) >> 40, diff >> 40);
	}
}
