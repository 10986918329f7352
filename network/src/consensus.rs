use crate::network::Network;
use bitcrypto::{FromStr, SHA256D};
use chain::BlockHeader;
use primitives::hash::H256;

/// Proof-of-work rule set in force at a given height.
///
/// The chain started with the legacy compact-difficulty sextuplet rules and
/// hard-forked to the current parameterized rules at `fork2_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowVersion {
	/// Pre-fork rules: Bitcoin-compact `nBits`, fixed sextuplet pattern.
	Legacy,
	/// Current rules: `nBits = difficulty * 256`, height-selected patterns.
	V1,
}

/// The constellation pattern accepted under the legacy rules.
pub const LEGACY_PATTERN: [u32; 6] = [0, 4, 2, 4, 2, 4];

#[derive(Debug, Clone)]
/// Parameters that influence chain consensus.
pub struct ConsensusParams {
	/// Network.
	pub network: Network,
	/// Minimum Q48 target difficulty of a gap-rule block.
	pub difficulty_min: u64,
	/// Minimum `nBits` of a constellation-rule block (current rules).
	pub bits_min: u32,
	/// Target block spacing in seconds.
	pub pow_target_spacing: i64,
	/// Disable difficulty retargeting (regtest only).
	pub pow_no_retargeting: bool,
	/// Height of the first fork (superblock era, historical).
	pub fork1_height: u32,
	/// Height at which the current constellation rules activate.
	pub fork2_height: u32,
	/// Accepted constellation patterns (offset deltas) from `fork2_height` on.
	pub pow_accepted_patterns: Vec<Vec<u32>>,
	/// Hash of the genesis header; its proof of work is accepted axiomatically.
	pub genesis_pow_hash: SHA256D,
}

impl ConsensusParams {
	pub fn new(network: Network) -> Self {
		match network {
			Network::Mainnet => ConsensusParams {
				network,
				difficulty_min: 16u64 << 48, // merit ~16, reachable on basic hardware
				bits_min: 600 * 256,
				pow_target_spacing: 150, // 2.5 min
				pow_no_retargeting: false,
				fork1_height: 157_248,
				fork2_height: 1_482_768,
				// prime septuplets, starting from fork2_height
				pow_accepted_patterns: vec![vec![0, 2, 4, 2, 4, 6, 2], vec![0, 2, 6, 4, 2, 4, 2]],
				genesis_pow_hash: SHA256D::from_str("eadc19bc904ffe00f7e6bf6175f2f0b73564348deecec80cca42de0f0f28acef").unwrap(),
			},
			Network::Testnet => ConsensusParams {
				network,
				difficulty_min: 16u64 << 48,
				bits_min: 512 * 256,
				pow_target_spacing: 300, // 5 min, 2x less blocks to download for testnet
				pow_no_retargeting: false,
				fork1_height: u32::max_value(), // no superblocks
				fork2_height: 0,                // chain starts with current rules
				// prime quintuplets for testnet
				pow_accepted_patterns: vec![vec![0, 4, 2, 4, 2], vec![0, 2, 4, 2, 4]],
				genesis_pow_hash: SHA256D::from_str("763cd257a950f018b91efa78b159c8141c19212b207c79256f7d860885f69b03").unwrap(),
			},
			Network::Regtest => ConsensusParams {
				network,
				difficulty_min: 1u64 << 48, // merit ~1 mines in milliseconds
				bits_min: 288 * 256,
				pow_target_spacing: 150,
				pow_no_retargeting: true,
				fork1_height: u32::max_value(),
				fork2_height: 0,
				// just prime numbers for regtest
				pow_accepted_patterns: vec![vec![0]],
				genesis_pow_hash: SHA256D::from_str("df6df987b7736aab00a4db603eda0852ac9909923273559ffc5f21df42d4d39b").unwrap(),
			},
		}
	}

	/// The genesis block header of this chain.
	pub fn genesis_header(&self) -> BlockHeader {
		let (version, merkle_root, time, difficulty) = match self.network {
			Network::Mainnet => (
				1,
				"d59afe19bb9e6126be90b2c8c18a8bee08c3c50ad3b3cca2b91c09683aa48118",
				1_392_079_741,
				self.difficulty_min,
			),
			Network::Testnet => (
				536_870_912,
				"495297a63256ff66e6bb810adc1660eee7a98eb55dbfeae8e25b1365b8bacca6",
				1_707_684_554,
				self.difficulty_min,
			),
			Network::Regtest => (
				536_870_912,
				"495297a63256ff66e6bb810adc1660eee7a98eb55dbfeae8e25b1365b8bacca6",
				1_707_684_554,
				self.difficulty_min,
			),
		};

		BlockHeader {
			version,
			previous_header_hash: SHA256D::default(),
			merkle_root_hash: SHA256D::from_str(merkle_root).unwrap(),
			time,
			difficulty,
			nonce: 0,
			shift: 0,
			adder: H256::default(),
			reserved: 0,
		}
	}

	/// Which proof-of-work rules apply at `height`.
	pub fn pow_version_at_height(&self, height: u32) -> PowVersion {
		if height >= self.fork2_height {
			PowVersion::V1
		} else {
			PowVersion::Legacy
		}
	}

	/// Accepted constellation patterns for a block at `height`.
	pub fn accepted_patterns_at_height(&self, height: u32) -> Vec<Vec<u32>> {
		if height >= self.fork2_height {
			self.pow_accepted_patterns.clone()
		} else {
			vec![LEGACY_PATTERN.to_vec()]
		}
	}

	/// Length of the primary accepted pattern at `height`.
	pub fn constellation_size_at_height(&self, height: u32) -> usize {
		self.accepted_patterns_at_height(height)[0].len()
	}
}

impl Default for ConsensusParams {
	fn default() -> Self {
		ConsensusParams::new(Network::default())
	}
}
