use network::{ConsensusParams, PowVersion};
use primitives::U256;

/// Chain work contributed by a block, `difficulty ^ (len + 2.3)`.
///
/// The power to the constellation length comes from the prime number
/// theorem and the k-tuple conjecture; the 2.3 accounts for longer numbers
/// being harder to test, per empirical miner data. Floating point is fine
/// here: the proxy only compares chains that already agree on the rules.
/// The f64 value is truncated into the integer; that rounding rule is
/// fixed and must not change, or nodes would disagree on fork choice.
pub fn block_proof(bits: u32, height: u32, params: &ConsensusParams) -> U256 {
	let difficulty = match params.pow_version_at_height(height) {
		PowVersion::Legacy => f64::from((bits & 0x007f_ffff) >> 8),
		PowVersion::V1 => f64::from(bits) / 256.0,
	};
	let constellation_size = params.constellation_size_at_height(height) as f64;
	u256_from_f64(difficulty.powf(constellation_size + 2.3))
}

/// Truncating f64 to U256 conversion, saturating on overflow.
fn u256_from_f64(value: f64) -> U256 {
	if value.is_nan() || value < 1.0 {
		return U256::zero();
	}
	if value.is_infinite() {
		return U256::max_value();
	}

	let raw = value.to_bits();
	let exponent = ((raw >> 52) & 0x7ff) as i64 - 1075;
	let mantissa = (raw & 0x000f_ffff_ffff_ffff) | (1 << 52);

	if exponent > 0 {
		if exponent + 53 > 256 {
			return U256::max_value();
		}
		U256::from(mantissa) << (exponent as usize)
	} else {
		U256::from(mantissa >> (-exponent) as usize)
	}
}
