//! Consensus validation of prime gap and prime constellation proofs of
//! work, and the difficulty transition rules tying blocks together.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

extern crate chain;
extern crate network;
extern crate pow;
extern crate primitives;

mod block_proof;
mod check_pow;
mod constellation;
mod error;
mod work;

pub use crate::block_proof::block_proof;
pub use crate::check_pow::{check_proof_of_work, verify_header_proof_of_work};
pub use crate::constellation::{check_constellation, check_constellation_proof_of_work, derive_target, derive_trailing_zeros, TestStrength};
pub use crate::error::Error;
pub use crate::work::{asert, next_gap_difficulty, next_work_required, permitted_difficulty_transition, TIMESTAMP_WINDOW};
