use crate::error::Error;
use chain::BlockHeader;
use network::ConsensusParams;
use pow::{Proof, MAX_SHIFT, MIN_SHIFT};

/// Validates the prime gap proof of work of a block header.
///
/// The starting prime is `hash * 2^shift + adder`; the header is valid when
/// the achieved difficulty of the gap it opens reaches the header's target:
///
/// 1. construct the start and verify it is a BPSW probable prime
/// 2. find the next prime after it
/// 3. measure `difficulty(start, end) = merit + rand % min_step`
/// 4. accept iff achieved >= header.difficulty
pub fn verify_header_proof_of_work(header: &BlockHeader, params: &ConsensusParams) -> Result<(), Error> {
	let hash = header.hash();

	// the genesis proof is part of the chain definition
	if hash == params.genesis_pow_hash {
		return Ok(());
	}

	if header.difficulty < params.difficulty_min {
		trace!(target: "verification", "difficulty {} below chain minimum {}", header.difficulty, params.difficulty_min);
		return Err(Error::Bits);
	}

	if header.shift < MIN_SHIFT || header.shift > MAX_SHIFT {
		trace!(target: "verification", "shift {} out of [{}, {}]", header.shift, MIN_SHIFT, MAX_SHIFT);
		return Err(Error::Pow);
	}

	let proof = Proof::from_bytes(
		&hash[..],
		header.shift,
		header.adder.significant_bytes(),
		header.difficulty,
		header.nonce,
	);

	if proof.valid() {
		Ok(())
	} else {
		trace!(target: "verification", "gap proof rejected for {:?}", hash);
		Err(Error::Pow)
	}
}

/// Boolean form of `verify_header_proof_of_work`.
pub fn check_proof_of_work(header: &BlockHeader, params: &ConsensusParams) -> bool {
	verify_header_proof_of_work(header, params).is_ok()
}
