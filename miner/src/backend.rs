//! Batched primality back-ends.
//!
//! A back-end runs the base-2 Fermat pre-filter over a packed candidate
//! batch. CUDA, OpenCL and AVX-512 IFMA adapters implement this same
//! trait around their device state; the in-tree implementation computes
//! the batch on the CPU. Correctness never depends on the back-end: every
//! surviving candidate is confirmed with BPSW before it is used, so a
//! faulty device can only cause false negatives.

use num_bigint::BigUint;
use pow::primality::{self, CandidateBatch};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
	/// The device rejected or failed the batch call.
	Device(String),
}

impl fmt::Display for BackendError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			BackendError::Device(message) => write!(f, "primality backend failure: {}", message),
		}
	}
}

impl std::error::Error for BackendError {}

pub trait PrimalityBackend: Send {
	fn name(&self) -> &'static str;

	/// Fermat-tests every candidate of the batch; `results[i]` is set to 1
	/// when candidate `i` is a base-2 Fermat probable prime, 0 otherwise.
	fn fermat_batch(&mut self, batch: &CandidateBatch, results: &mut [u8]) -> Result<(), BackendError>;
}

/// Scalar CPU implementation of the batch interface.
#[derive(Default)]
pub struct CpuFermatBackend;

impl CpuFermatBackend {
	pub fn new() -> Self {
		CpuFermatBackend
	}

	fn unpack(batch: &CandidateBatch, index: usize) -> BigUint {
		let limbs = ((batch.bits + 31) / 32) as usize;
		let words = &batch.candidates[index * limbs..(index + 1) * limbs];
		let mut bytes = Vec::with_capacity(limbs * 4);
		for word in words {
			bytes.extend_from_slice(&word.to_le_bytes());
		}
		BigUint::from_bytes_le(&bytes)
	}
}

impl PrimalityBackend for CpuFermatBackend {
	fn name(&self) -> &'static str {
		"cpu-fermat"
	}

	fn fermat_batch(&mut self, batch: &CandidateBatch, results: &mut [u8]) -> Result<(), BackendError> {
		debug_assert!(results.len() >= batch.count);
		for i in 0..batch.count {
			let candidate = Self::unpack(batch, i);
			results[i] = primality::fermat(&candidate) as u8;
		}
		Ok(())
	}
}
