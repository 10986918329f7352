extern crate chain;
extern crate primitives;

mod consensus;
mod network;

pub use primitives::{compact, hash};

pub use crate::consensus::{ConsensusParams, LEGACY_PATTERN, PowVersion};
pub use crate::network::Network;
