use bitcrypto::{dhash256, SHA256D};
use primitives::bytes::Bytes;
use primitives::hash::H256;
use ser::{Deserializable, Error as ReaderError, Reader, Serializable, Stream};
use std::{fmt, io};

/// 120-byte block header of the prime gap chain.
///
/// The header splits into two partitions. The first 84 bytes are the
/// consensus fields covered by the header hash. The trailing 36 bytes
/// carry the proof of work itself and are deliberately excluded from
/// the hash, so miners can iterate proof space without changing the
/// puzzle:
///
///   hashed (84 B):  version, previous_header_hash, merkle_root_hash,
///                   time, difficulty (Q48 fixed-point), nonce
///   proof (36 B):   shift, adder (little-endian magnitude), reserved
///
/// The starting prime of the gap is `hash * 2^shift + adder`.
#[derive(PartialEq, Clone)]
pub struct BlockHeader {
	pub version: i32,
	pub previous_header_hash: SHA256D,
	pub merkle_root_hash: SHA256D,
	pub time: u32,
	/// Target difficulty, `merit * 2^48`.
	pub difficulty: u64,
	pub nonce: u32,
	/// Left-shift applied to the header hash, bounds the search space.
	pub shift: u16,
	/// Offset onto the shifted hash that lands on the starting prime.
	pub adder: H256,
	pub reserved: u16,
}

impl BlockHeader {
	/// Full serialized size, both partitions.
	pub const SERIALIZED_SIZE: usize = 120;
	/// Size of the hashed partition.
	pub const HASHED_SIZE: usize = 84;
	/// Byte offset of the nonce field inside the serialized header.
	pub const NONCE_OFFSET: usize = 80;

	/// Serialization of the hashed partition only.
	pub fn hashed_bytes(&self) -> Bytes {
		let mut stream = Stream::with_capacity(Self::HASHED_SIZE);
		stream
			.append(&self.version)
			.append(&self.previous_header_hash)
			.append(&self.merkle_root_hash)
			.append(&self.time)
			.append(&self.difficulty)
			.append(&self.nonce);
		stream.out()
	}

	pub fn hash(&self) -> SHA256D {
		block_header_hash(self)
	}
}

impl fmt::Debug for BlockHeader {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("BlockHeader")
			.field("version", &self.version)
			.field("previous_header_hash", &self.previous_header_hash)
			.field("merkle_root_hash", &self.merkle_root_hash)
			.field("time", &self.time)
			.field("difficulty", &self.difficulty)
			.field("nonce", &self.nonce)
			.field("shift", &self.shift)
			.field("adder", &self.adder)
			.field("reserved", &self.reserved)
			.finish()
	}
}

impl Serializable for BlockHeader {
	fn serialize(&self, stream: &mut Stream) {
		stream
			.append(&self.version)
			.append(&self.previous_header_hash)
			.append(&self.merkle_root_hash)
			.append(&self.time)
			.append(&self.difficulty)
			.append(&self.nonce)
			.append(&self.shift)
			.append(&self.adder)
			.append(&self.reserved);
	}

	#[inline]
	fn serialized_size(&self) -> usize {
		Self::SERIALIZED_SIZE
	}
}

impl Deserializable for BlockHeader {
	fn deserialize<T>(reader: &mut Reader<T>) -> Result<Self, ReaderError>
	where
		T: io::Read,
	{
		Ok(BlockHeader {
			version: reader.read()?,
			previous_header_hash: reader.read()?,
			merkle_root_hash: reader.read()?,
			time: reader.read()?,
			difficulty: reader.read()?,
			nonce: reader.read()?,
			shift: reader.read()?,
			adder: reader.read()?,
			reserved: reader.read()?,
		})
	}
}

#[cfg(any(test, feature = "test-helpers"))]
impl Default for BlockHeader {
	fn default() -> Self {
		BlockHeader {
			version: 0,
			previous_header_hash: SHA256D::default(),
			merkle_root_hash: SHA256D::default(),
			time: 0,
			difficulty: 0,
			nonce: 0,
			shift: 0,
			adder: H256::default(),
			reserved: 0,
		}
	}
}

/// Double SHA-256 of the hashed partition. Proof fields never contribute.
pub fn block_header_hash(header: &BlockHeader) -> SHA256D {
	dhash256(&header.hashed_bytes())
}
