//! Prime gap proof-of-work primitives: consensus-critical fixed-point
//! arithmetic, deterministic primality testing and the proof object built
//! from a block header's proof partition.

#[macro_use]
extern crate lazy_static;
extern crate num_bigint;
extern crate num_integer;
extern crate num_traits;

pub mod math;
pub mod primality;
mod proof;

pub use crate::proof::Proof;

/// Fixed-point scale of all consensus difficulty quantities: 1.0 merit = 2^48.
pub const TWO_POW48: u64 = 1 << 48;

/// Minimum difficulty (merit ~16), gaps reachable on basic hardware.
pub const MIN_DIFFICULTY: u64 = 16 << 48;

/// Minimum left-shift of the header hash. Keeps starting primes large
/// enough for meaningful gaps.
pub const MIN_SHIFT: u16 = 14;

/// Maximum left-shift of the header hash. Caps starting primes at
/// hash * 2^256, preventing DoS via huge numbers.
pub const MAX_SHIFT: u16 = 256;

/// 23# = 2*3*5*7*11*13*17*19*23, used as a cheap gcd pre-filter.
pub const PRIMORIAL_23: u64 = 223_092_870;
