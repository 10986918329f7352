use crate::block_header::{block_header_hash, BlockHeader};
use bitcrypto::SHA256D;
use ser::{Deserializable, Error as ReaderError, Reader};
use std::{cmp, fmt, io};

/// Block header bundled with its (lazily computed once) hash.
#[derive(Clone)]
pub struct IndexedBlockHeader {
	pub hash: SHA256D,
	pub raw: BlockHeader,
}

impl fmt::Debug for IndexedBlockHeader {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("IndexedBlockHeader")
			.field("hash", &self.hash)
			.field("raw", &self.raw)
			.finish()
	}
}

impl From<BlockHeader> for IndexedBlockHeader {
	fn from(header: BlockHeader) -> Self {
		Self::from_raw(header)
	}
}

impl IndexedBlockHeader {
	pub fn new(hash: SHA256D, header: BlockHeader) -> Self {
		IndexedBlockHeader { hash, raw: header }
	}

	/// Explicit conversion of the raw BlockHeader into IndexedBlockHeader.
	///
	/// Hashes the hashed partition of the block header.
	pub fn from_raw(header: BlockHeader) -> Self {
		IndexedBlockHeader::new(block_header_hash(&header), header)
	}
}

impl cmp::PartialEq for IndexedBlockHeader {
	fn eq(&self, other: &Self) -> bool {
		self.hash == other.hash
	}
}

impl Deserializable for IndexedBlockHeader {
	fn deserialize<T>(reader: &mut Reader<T>) -> Result<Self, ReaderError>
	where
		T: io::Read,
	{
		let header: BlockHeader = reader.read()?;
		Ok(IndexedBlockHeader::from_raw(header))
	}
}

#[cfg(test)]
mod tests {
	use super::IndexedBlockHeader;
	use crate::block_header::BlockHeader;

	#[test]
	fn test_indexed_header_hash_matches_raw() {
		let header = BlockHeader::default();
		let indexed = IndexedBlockHeader::from_raw(header.clone());
		assert_eq!(indexed.hash, header.hash());
	}
}
