//! Prime gap mining: cache-sized segmented sieving, wheel filtering,
//! batched primality back-ends and the multi-threaded pipeline gluing
//! them to a block header template.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

extern crate chain;
extern crate network;
extern crate pow;
extern crate primitives;

mod backend;
mod combined_sieve;
mod engine;
mod presieve;
mod prime_table;
mod sieve;
mod stats;
mod wheel;

pub use crate::backend::{BackendError, CpuFermatBackend, PrimalityBackend};
pub use crate::combined_sieve::{CombinedSieve, COMBINED_SIEVE_BATCH};
pub use crate::engine::{MineError, MiningEngine, MiningTier};
pub use crate::presieve::{Presieve, PresieveTables, PRESIEVE_MAX_PRIME};
pub use crate::prime_table::{PrimeTable, DEFAULT_SIEVE_PRIMES};
pub use crate::sieve::{SegmentedSieve, SEGMENT_SIZE_BITS};
pub use crate::stats::{MiningStats, MiningStatsSnapshot};
pub use crate::wheel::{is_coprime_2310, wheel_index, WHEEL_PRIMORIAL, WHEEL_SIZE};
