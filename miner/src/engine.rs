//! The mining pipeline: worker topology, candidate dispatch and the gap
//! accumulator turning consecutive primes into submittable proofs.

use crate::backend::{CpuFermatBackend, PrimalityBackend};
use crate::combined_sieve::{CombinedSieve, COMBINED_SIEVE_BATCH};
use crate::prime_table::{PrimeTable, DEFAULT_SIEVE_PRIMES};
use crate::sieve::SegmentedSieve;
use crate::stats::{MiningStats, MiningStatsSnapshot};
use bitcrypto::dhash256;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use num_bigint::BigUint;
use num_integer::gcd;
use num_traits::ToPrimitive;
use parking_lot::Mutex;
use pow::{math, primality, Proof, MAX_SHIFT, MIN_SHIFT, PRIMORIAL_23};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Largest per-nonce search range in numbers, caps sieve memory and keeps
/// nonce turnover reasonable for big shifts.
const MAX_SIEVE_NUMBERS: u64 = 33_554_432;

/// How long a blocked queue operation may hide a stop request.
const QUEUE_WAIT: Duration = Duration::from_millis(50);

/// Selected pipeline shape.
///
/// Correctness is tier-independent: a proof found by any tier passes the
/// same CPU validation before the callback sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningTier {
	/// Sieve and BPSW-test on the worker threads.
	CpuOnly,
	/// Sieve on worker threads, Fermat-screen batches on a device worker.
	Batched,
}

impl MiningTier {
	/// Probes for the best available tier. CUDA and OpenCL adapters hook
	/// in through `PrimalityBackend`; in a CPU-only build the probe comes
	/// down to whether batching pays off on the vector unit.
	pub fn detect() -> MiningTier {
		if wide_multiplier_available() {
			MiningTier::Batched
		} else {
			MiningTier::CpuOnly
		}
	}
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn wide_multiplier_available() -> bool {
	is_x86_feature_detected!("avx512ifma")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn wide_multiplier_available() -> bool {
	false
}

#[derive(Debug, PartialEq)]
pub enum MineError {
	ShiftOutOfRange(u16),
	TemplateTooShort,
	NoThreads,
}

impl fmt::Display for MineError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			MineError::ShiftOutOfRange(shift) => write!(f, "shift {} outside [{}, {}]", shift, MIN_SHIFT, MAX_SHIFT),
			MineError::TemplateTooShort => write!(f, "header template does not contain the nonce field"),
			MineError::NoThreads => write!(f, "mining needs at least one worker thread"),
		}
	}
}

impl std::error::Error for MineError {}

struct MineJob<'a> {
	template: &'a [u8],
	nonce_offset: usize,
	shift: u16,
	difficulty: u64,
	start_nonce: u32,
}

struct BatchRequest {
	batch: primality::CandidateBatch,
	reply: Sender<Vec<u8>>,
}

/// Gap state machine for one nonce: remembers the last confirmed prime
/// offset and reports candidate gaps of sufficient size.
struct GapTracker {
	last: Option<u64>,
	min_gap: u64,
}

impl GapTracker {
	fn new(min_gap: u64) -> Self {
		GapTracker { last: None, min_gap }
	}

	/// Feeds the next prime offset (ascending). Returns the gap start when
	/// the distance from the previous prime reaches the minimum.
	fn submit(&mut self, offset: u64) -> Option<u64> {
		let result = match self.last {
			Some(prev) if offset - prev >= self.min_gap => Some(prev),
			_ => None,
		};
		self.last = Some(offset);
		result
	}
}

struct NonceSlot {
	nonce: u32,
	hash: BigUint,
	base: BigUint,
	base_mod_primorial: u64,
	tracker: GapTracker,
}

pub struct MiningEngine {
	tier: MiningTier,
	n_threads: usize,
	primes: Arc<PrimeTable>,
	stop: Arc<AtomicBool>,
	stats: Arc<MiningStats>,
	backend: Mutex<Option<Box<dyn PrimalityBackend>>>,
}

impl Default for MiningEngine {
	fn default() -> Self {
		MiningEngine::new()
	}
}

impl MiningEngine {
	pub fn new() -> Self {
		MiningEngine::with_tier(MiningTier::detect())
	}

	pub fn with_tier(tier: MiningTier) -> Self {
		let n_threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
		MiningEngine {
			tier,
			n_threads,
			primes: Arc::new(PrimeTable::new(DEFAULT_SIEVE_PRIMES)),
			stop: Arc::new(AtomicBool::new(false)),
			stats: Arc::new(MiningStats::new()),
			backend: Mutex::new(None),
		}
	}

	pub fn tier(&self) -> MiningTier {
		self.tier
	}

	pub fn set_threads(&mut self, n_threads: usize) {
		self.n_threads = n_threads;
	}

	/// Replaces the batch back-end used by the next `mine` call. Without
	/// this the batched tier screens on the CPU.
	pub fn set_backend(&mut self, backend: Box<dyn PrimalityBackend>) {
		*self.backend.lock() = Some(backend);
	}

	/// Signals all workers to stop. Idempotent; also flipped internally
	/// when the result callback breaks.
	pub fn request_stop(&self) {
		self.stop.store(true, Ordering::SeqCst);
	}

	/// Shareable stop trigger for the surrounding node.
	pub fn stop_handle(&self) -> Arc<AtomicBool> {
		self.stop.clone()
	}

	pub fn stats(&self) -> MiningStatsSnapshot {
		self.stats.snapshot()
	}

	/// Mines the template, iterating nonces from `start_nonce` across all
	/// workers. Blocks until the callback breaks or `request_stop` fires.
	///
	/// The template must contain the little-endian nonce at
	/// `nonce_offset`; everything else is hashed as-is, and the proof
	/// partition is not part of the template at all.
	pub fn mine<F>(
		&self,
		template: &[u8],
		nonce_offset: usize,
		shift: u16,
		difficulty: u64,
		start_nonce: u32,
		callback: F,
	) -> Result<(), MineError>
	where
		F: FnMut(&Proof) -> ControlFlow<()> + Send,
	{
		if shift < MIN_SHIFT || shift > MAX_SHIFT {
			return Err(MineError::ShiftOutOfRange(shift));
		}
		if nonce_offset + 4 > template.len() {
			return Err(MineError::TemplateTooShort);
		}
		if self.n_threads == 0 {
			return Err(MineError::NoThreads);
		}

		self.stop.store(false, Ordering::SeqCst);
		self.stats.reset();

		let job = MineJob {
			template,
			nonce_offset,
			shift,
			difficulty,
			start_nonce,
		};
		let callback = Mutex::new(callback);
		let disabled = AtomicBool::new(false);
		let job = &job;
		let callback = &callback;
		let disabled = &disabled;

		info!(
			target: "miner",
			"mining with {} threads ({:?}), difficulty {:.3}, ~{:.2} gaps per day at 1000 tests/s",
			self.n_threads,
			self.tier,
			math::readable_difficulty(difficulty),
			math::gaps_per_day(1000.0, difficulty),
		);

		thread::scope(|scope| match self.tier {
			MiningTier::CpuOnly => {
				for worker_ix in 0..self.n_threads {
					scope.spawn(move || self.cpu_worker(worker_ix, job, callback));
				}
			}
			MiningTier::Batched => {
				let backend = self.backend.lock().take().unwrap_or_else(|| Box::new(CpuFermatBackend::new()));
				let (tx, rx) = bounded::<BatchRequest>(self.n_threads * 2);
				let stop = &*self.stop;

				scope.spawn(move || Self::device_worker(rx, backend, stop, disabled));
				for worker_ix in 0..self.n_threads {
					let tx = tx.clone();
					scope.spawn(move || self.batched_worker(worker_ix, job, callback, tx, disabled));
				}
				drop(tx);
			}
		});

		Ok(())
	}

	fn prepare_slot(&self, template: &mut [u8], job: &MineJob, nonce: u32) -> Option<NonceSlot> {
		template[job.nonce_offset..job.nonce_offset + 4].copy_from_slice(&nonce.to_le_bytes());
		let hash = dhash256(template);
		self.stats.add(&self.stats.nonces_tried, 1);

		let hash = BigUint::from_bytes_le(&hash[..]);
		// only full-width hashes keep the difficulty arithmetic honest
		if hash.bits() != 256 {
			return None;
		}

		let base = &hash << job.shift as usize;
		let mut min_gap = math::target_size(&base, job.difficulty);
		if min_gap & 1 == 1 {
			min_gap += 1;
		}

		Some(NonceSlot {
			nonce,
			base_mod_primorial: (&base % PRIMORIAL_23).to_u64().expect("residue fits"),
			base,
			hash,
			tracker: GapTracker::new(min_gap),
		})
	}

	/// Runs the primorial pre-filter and BPSW on one candidate, feeding
	/// the gap tracker. Returns false when mining should unwind.
	fn test_candidate<F>(&self, slot: &mut NonceSlot, offset: u64, job: &MineJob, callback: &Mutex<F>) -> bool
	where
		F: FnMut(&Proof) -> ControlFlow<()> + Send,
	{
		if gcd(slot.base_mod_primorial + offset, PRIMORIAL_23) != 1 {
			return true;
		}

		self.stats.add(&self.stats.tests_performed, 1);
		let candidate = &slot.base + offset;
		if !primality::bpsw(&candidate) {
			return true;
		}

		self.stats.add(&self.stats.primes_found, 1);
		match slot.tracker.submit(offset) {
			Some(first_offset) => self.emit(slot, first_offset, job, callback),
			None => true,
		}
	}

	/// Confirms a candidate gap as a full proof and hands it to the
	/// callback. Returns false when the callback stops the run.
	fn emit<F>(&self, slot: &NonceSlot, first_offset: u64, job: &MineJob, callback: &Mutex<F>) -> bool
	where
		F: FnMut(&Proof) -> ControlFlow<()> + Send,
	{
		// the adder has to fit below 2^shift
		if job.shift < 64 && first_offset >> job.shift != 0 {
			return true;
		}

		let proof = Proof::new(slot.hash.clone(), job.shift, BigUint::from(first_offset), job.difficulty, slot.nonce);
		if !proof.valid() {
			return true;
		}

		self.stats.add(&self.stats.gaps_found, 1);
		info!(target: "miner", "solution {}", proof);

		let mut callback = callback.lock();
		match (*callback)(&proof) {
			ControlFlow::Continue(()) => true,
			ControlFlow::Break(()) => {
				self.stop.store(true, Ordering::SeqCst);
				false
			}
		}
	}

	fn cpu_worker<F>(&self, worker_ix: usize, job: &MineJob, callback: &Mutex<F>)
	where
		F: FnMut(&Proof) -> ControlFlow<()> + Send,
	{
		let mut sieve = CombinedSieve::new(self.primes.clone(), sieve_bits(job.shift));
		let mut template = job.template.to_vec();
		let stride = (self.n_threads * COMBINED_SIEVE_BATCH) as u32;
		let mut group = job.start_nonce.wrapping_add((worker_ix * COMBINED_SIEVE_BATCH) as u32);
		let mut candidates = Vec::new();

		while !self.stop.load(Ordering::Relaxed) {
			sieve.reset_segments();
			let mut slots: Vec<Option<NonceSlot>> = (0..COMBINED_SIEVE_BATCH).map(|_| None).collect();

			for (k, slot) in slots.iter_mut().enumerate() {
				if let Some(prepared) = self.prepare_slot(&mut template, job, group.wrapping_add(k as u32)) {
					sieve.init_interval(k, &prepared.base);
					*slot = Some(prepared);
				}
			}
			self.stats.add(&self.stats.sieve_runs, 1);

			'segments: loop {
				let sieving = Instant::now();
				let more = sieve.next_segment();
				self.stats.add(&self.stats.time_sieving_us, sieving.elapsed().as_micros() as u64);
				if !more || self.stop.load(Ordering::Relaxed) {
					break;
				}

				for (k, slot) in slots.iter_mut().enumerate() {
					let slot = match slot {
						Some(slot) => slot,
						None => continue,
					};

					sieve.candidates(k, &mut candidates);
					let testing = Instant::now();
					for offset in &candidates {
						if self.stop.load(Ordering::Relaxed) {
							break 'segments;
						}
						if !self.test_candidate(slot, *offset, job, callback) {
							self.stats.add(&self.stats.time_testing_us, testing.elapsed().as_micros() as u64);
							return;
						}
					}
					self.stats.add(&self.stats.time_testing_us, testing.elapsed().as_micros() as u64);
				}
			}

			group = group.wrapping_add(stride);
		}
	}

	fn batched_worker<F>(&self, worker_ix: usize, job: &MineJob, callback: &Mutex<F>, tx: Sender<BatchRequest>, disabled: &AtomicBool)
	where
		F: FnMut(&Proof) -> ControlFlow<()> + Send,
	{
		let mut sieve = SegmentedSieve::new(self.primes.clone(), sieve_bits(job.shift));
		let width = batch_width(job.shift);
		let mut template = job.template.to_vec();
		let stride = self.n_threads as u32;
		let mut nonce = job.start_nonce.wrapping_add(worker_ix as u32);
		let mut candidates = Vec::new();

		while !self.stop.load(Ordering::Relaxed) {
			let mut slot = match self.prepare_slot(&mut template, job, nonce) {
				Some(slot) => slot,
				None => {
					nonce = nonce.wrapping_add(stride);
					continue;
				}
			};
			sieve.init(&slot.base);
			self.stats.add(&self.stats.sieve_runs, 1);

			'segments: loop {
				let sieving = Instant::now();
				let more = sieve.next_segment();
				self.stats.add(&self.stats.time_sieving_us, sieving.elapsed().as_micros() as u64);
				if !more || self.stop.load(Ordering::Relaxed) {
					break;
				}

				sieve.candidates(&mut candidates);
				candidates.retain(|offset| gcd(slot.base_mod_primorial + offset, PRIMORIAL_23) == 1);

				let screened = match width {
					Some(bits) if !disabled.load(Ordering::Relaxed) => {
						let batch = primality::prepare_batch(&slot.base, &candidates, bits);
						self.stats.add(&self.stats.tests_performed, batch.count as u64);
						self.submit_batch(&tx, batch)
					}
					_ => None,
				};

				let testing = Instant::now();
				match screened {
					Some(results) => {
						for (i, offset) in candidates.iter().enumerate() {
							if self.stop.load(Ordering::Relaxed) {
								break 'segments;
							}
							if results.get(i) != Some(&1) {
								continue;
							}
							// the screen is Fermat only: confirm before accepting
							if !primality::bpsw(&(&slot.base + *offset)) {
								continue;
							}
							self.stats.add(&self.stats.primes_found, 1);
							if let Some(first_offset) = slot.tracker.submit(*offset) {
								if !self.emit(&slot, first_offset, job, callback) {
									return;
								}
							}
						}
					}
					None => {
						// no device available: test locally
						for offset in &candidates {
							if self.stop.load(Ordering::Relaxed) {
								break 'segments;
							}
							if !self.test_candidate(&mut slot, *offset, job, callback) {
								return;
							}
						}
					}
				}
				self.stats.add(&self.stats.time_testing_us, testing.elapsed().as_micros() as u64);
			}

			nonce = nonce.wrapping_add(stride);
		}
	}

	/// Pushes a batch into the bounded device queue and waits for its
	/// results, surfacing stop requests within one queue wait.
	fn submit_batch(&self, tx: &Sender<BatchRequest>, batch: primality::CandidateBatch) -> Option<Vec<u8>> {
		let (reply_tx, reply_rx) = bounded(1);
		let mut request = BatchRequest { batch, reply: reply_tx };

		loop {
			match tx.send_timeout(request, QUEUE_WAIT) {
				Ok(()) => break,
				Err(SendTimeoutError::Timeout(returned)) => {
					if self.stop.load(Ordering::Relaxed) {
						return None;
					}
					request = returned;
				}
				Err(SendTimeoutError::Disconnected(_)) => return None,
			}
		}

		loop {
			match reply_rx.recv_timeout(QUEUE_WAIT) {
				Ok(results) => return Some(results),
				Err(RecvTimeoutError::Timeout) => {
					if self.stop.load(Ordering::Relaxed) {
						return None;
					}
				}
				Err(RecvTimeoutError::Disconnected) => return None,
			}
		}
	}

	fn device_worker(rx: Receiver<BatchRequest>, mut backend: Box<dyn PrimalityBackend>, stop: &AtomicBool, disabled: &AtomicBool) {
		debug!(target: "miner", "device worker running on {}", backend.name());

		loop {
			let request = match rx.recv_timeout(Duration::from_millis(100)) {
				Ok(request) => request,
				Err(RecvTimeoutError::Timeout) => {
					if stop.load(Ordering::Relaxed) {
						break;
					}
					continue;
				}
				Err(RecvTimeoutError::Disconnected) => break,
			};

			let mut results = vec![0u8; request.batch.count];
			let outcome = backend.fermat_batch(&request.batch, &mut results).or_else(|error| {
				warn!(target: "miner", "backend {} failed a batch, retrying: {}", backend.name(), error);
				backend.fermat_batch(&request.batch, &mut results)
			});

			match outcome {
				Ok(()) => {
					request.reply.send(results).ok();
				}
				Err(error) => {
					// a failed batch counts as all-composite, which can only
					// lose candidates, never admit a bad proof
					error!(target: "miner", "backend {} disabled: {}", backend.name(), error);
					request.reply.send(vec![0u8; request.batch.count]).ok();
					disabled.store(true, Ordering::SeqCst);
					break;
				}
			}
		}
	}
}

fn sieve_bits(shift: u16) -> usize {
	let numbers = if u32::from(shift) >= 63 {
		MAX_SIEVE_NUMBERS
	} else {
		(1u64 << shift).min(MAX_SIEVE_NUMBERS)
	};
	(numbers / 2) as usize
}

/// Batch width covering `256 + shift` bit candidates, when one of the two
/// supported widths does.
fn batch_width(shift: u16) -> Option<u32> {
	let needed = 256 + u32::from(shift);
	if needed <= 320 {
		Some(320)
	} else if needed <= 352 {
		Some(352)
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::BackendError;
	use chain::BlockHeader;
	use network::{ConsensusParams, Network};
	use primitives::hash::H256;
	use serialization::serialize;
	use verification::check_proof_of_work;

	fn test_template() -> Vec<u8> {
		let header = BlockHeader {
			time: 1_700_000_000,
			difficulty: 1u64 << 48,
			..BlockHeader::default()
		};
		serialize(&header).take()[..BlockHeader::HASHED_SIZE].to_vec()
	}

	fn engine(tier: MiningTier) -> MiningEngine {
		let mut engine = MiningEngine::with_tier(tier);
		engine.set_threads(2);
		engine
	}

	fn mine_one(engine: &MiningEngine) -> Proof {
		let template = test_template();
		let found: Mutex<Option<Proof>> = Mutex::new(None);

		engine
			.mine(&template, BlockHeader::NONCE_OFFSET, 16, 1u64 << 48, 0, |proof| {
				*found.lock() = Some(proof.clone());
				ControlFlow::Break(())
			})
			.unwrap();

		let proof = found.into_inner().expect("a merit-1 gap is found in moments");
		assert!(proof.valid());
		proof
	}

	#[test]
	fn test_mine_cpu_tier_finds_valid_header() {
		let engine = engine(MiningTier::CpuOnly);
		let proof = mine_one(&engine);

		// fold the proof back into a header and run consensus validation
		let params = ConsensusParams::new(Network::Regtest);
		let mut header = BlockHeader {
			time: 1_700_000_000,
			difficulty: 1u64 << 48,
			nonce: proof.nonce(),
			shift: proof.shift(),
			..BlockHeader::default()
		};
		let adder_bytes = proof.adder_bytes();
		let mut adder = H256::default();
		adder[..adder_bytes.len()].copy_from_slice(&adder_bytes);
		header.adder = adder;

		assert!(check_proof_of_work(&header, &params));

		let stats = engine.stats();
		assert!(stats.gaps_found >= 1);
		assert!(stats.primes_found > stats.gaps_found);
		assert!(stats.tests_performed > stats.primes_found);
	}

	#[test]
	fn test_mine_batched_tier_finds_valid_proof() {
		let engine = engine(MiningTier::Batched);
		let proof = mine_one(&engine);
		assert_eq!(proof.shift(), 16);
	}

	struct FailingBackend;

	impl PrimalityBackend for FailingBackend {
		fn name(&self) -> &'static str {
			"failing"
		}

		fn fermat_batch(&mut self, _: &primality::CandidateBatch, _: &mut [u8]) -> Result<(), BackendError> {
			Err(BackendError::Device("synthetic failure".into()))
		}
	}

	#[test]
	fn test_device_failure_degrades_to_cpu() {
		let mut engine = engine(MiningTier::Batched);
		engine.set_backend(Box::new(FailingBackend));

		// the device dies immediately; mining must still complete on CPU
		let proof = mine_one(&engine);
		assert!(proof.valid());
	}

	#[test]
	fn test_external_stop_unwinds() {
		let engine = engine(MiningTier::CpuOnly);
		let template = test_template();

		thread::scope(|scope| {
			let engine = &engine;
			let template = &template;
			scope.spawn(move || {
				// unreachable difficulty: only the stop flag ends this run
				engine
					.mine(template, BlockHeader::NONCE_OFFSET, 16, 500u64 << 48, 0, |_| ControlFlow::Continue(()))
					.unwrap();
			});

			thread::sleep(Duration::from_millis(300));
			engine.request_stop();
		});
		// reaching this point means every worker joined
	}

	#[test]
	fn test_mine_rejects_bad_arguments() {
		let engine = engine(MiningTier::CpuOnly);
		let template = test_template();
		let noop = |_: &Proof| ControlFlow::Continue(());

		assert_eq!(
			engine.mine(&template, BlockHeader::NONCE_OFFSET, 13, 1u64 << 48, 0, noop),
			Err(MineError::ShiftOutOfRange(13))
		);
		assert_eq!(
			engine.mine(&template[..40], 80, 16, 1u64 << 48, 0, noop),
			Err(MineError::TemplateTooShort)
		);
	}

	#[test]
	fn test_gap_tracker_state_machine() {
		let mut tracker = GapTracker::new(10);
		assert_eq!(tracker.submit(100), None);
		assert_eq!(tracker.submit(105), None);
		assert_eq!(tracker.submit(115), Some(105));
		// the end of the emitted gap opens the next one
		assert_eq!(tracker.submit(126), Some(115));
		assert_eq!(tracker.submit(127), None);
	}
}
