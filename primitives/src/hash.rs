#[macro_export]
macro_rules! impl_array_wrapper {
	($name: ident, $size: expr) => {
		use std::hash::{Hash, Hasher};
		use std::{cmp, ops};

		#[repr(C)]
		#[derive(Copy, Debug)]
		pub struct $name(pub [u8; $size]);

		impl Default for $name {
			fn default() -> Self {
				$name([0u8; $size])
			}
		}

		impl AsRef<$name> for $name {
			fn as_ref(&self) -> &$name {
				self
			}
		}

		impl Clone for $name {
			fn clone(&self) -> Self {
				let mut result = Self::default();
				result.copy_from_slice(&self.0);
				result
			}
		}

		impl From<[u8; $size]> for $name {
			fn from(h: [u8; $size]) -> Self {
				$name(h)
			}
		}

		impl From<$name> for [u8; $size] {
			fn from(h: $name) -> Self {
				h.0
			}
		}

		impl<'a> From<&'a [u8]> for $name {
			fn from(slc: &[u8]) -> Self {
				let mut inner = [0u8; $size];
				inner[..].clone_from_slice(&slc[0..$size]);
				$name(inner)
			}
		}

		impl ops::Deref for $name {
			type Target = [u8; $size];

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}

		impl ops::DerefMut for $name {
			fn deref_mut(&mut self) -> &mut Self::Target {
				&mut self.0
			}
		}

		impl cmp::PartialEq for $name {
			fn eq(&self, other: &Self) -> bool {
				let self_ref: &[u8] = &self.0;
				let other_ref: &[u8] = &other.0;
				self_ref == other_ref
			}
		}

		impl cmp::PartialOrd for $name {
			fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
				let self_ref: &[u8] = &self.0;
				let other_ref: &[u8] = &other.0;
				self_ref.partial_cmp(other_ref)
			}
		}

		impl Hash for $name {
			fn hash<H>(&self, state: &mut H)
			where
				H: Hasher,
			{
				state.write(&self.0);
				state.finish();
			}
		}

		impl Eq for $name {}
	};
}

/// 32-byte little-endian magnitude, used for the proof adder field.
///
/// Unlike block hashes this is a plain number: byte 0 is the least
/// significant byte and no hex-reversal display convention applies.
pub mod h256 {
	impl_array_wrapper!(H256, 32);

	impl H256 {
		/// Number of significant bits in the little-endian magnitude.
		pub fn bits(&self) -> u32 {
			for (i, byte) in self.0.iter().enumerate().rev() {
				if *byte != 0 {
					return i as u32 * 8 + (8 - byte.leading_zeros());
				}
			}
			0
		}

		pub fn is_zero(&self) -> bool {
			self.0.iter().all(|b| *b == 0)
		}

		pub fn from_u64(value: u64) -> Self {
			let mut result = H256::default();
			result.0[..8].copy_from_slice(&value.to_le_bytes());
			result
		}

		/// Bytes up to and including the most significant non-zero one.
		pub fn significant_bytes(&self) -> &[u8] {
			let len = ((self.bits() + 7) / 8) as usize;
			&self.0[..len]
		}
	}
}

pub use self::h256::H256;

#[cfg(test)]
mod tests {
	use super::H256;

	#[test]
	fn test_h256_bits() {
		assert_eq!(H256::default().bits(), 0);
		assert_eq!(H256::from_u64(1).bits(), 1);
		assert_eq!(H256::from_u64(0xff).bits(), 8);
		assert_eq!(H256::from_u64(0x100).bits(), 9);

		let mut top = H256::default();
		top.0[31] = 0x80;
		assert_eq!(top.bits(), 256);
	}

	#[test]
	fn test_h256_significant_bytes() {
		assert_eq!(H256::from_u64(0x01ff).significant_bytes(), &[0xff, 0x01]);
		assert_eq!(H256::default().significant_bytes(), &[] as &[u8]);
	}
}
