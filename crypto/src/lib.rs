#[macro_use]
extern crate bitcoin_hashes;

pub use bitcoin_hashes::core::str::FromStr;
pub use bitcoin_hashes::hex::Error as HexError;
pub use bitcoin_hashes::hex::FromHex;
pub use bitcoin_hashes::Hash;
pub use bitcoin_hashes::HashEngine;
use bitcoin_hashes::{sha256, sha256d};

hash_newtype!(
	SHA256,
	sha256::Hash,
	32,
	doc = "SHA256 newtype wrapper of bitcoin_hashes::sha256::Hash"
);

#[inline]
pub fn sha256(input: &[u8]) -> SHA256 {
	SHA256(sha256::Hash::hash(input))
}

hash_newtype!(
	SHA256D,
	sha256d::Hash,
	32,
	doc = "SHA256D newtype wrapper of bitcoin_hashes::sha256d::Hash"
);

/// Double SHA-256, the block header hash of this chain.
#[inline]
pub fn dhash256(input: &[u8]) -> SHA256D {
	SHA256D(sha256d::Hash::hash(input))
}

/// A lot of tests use hashes in the form of already reversed hex strings. SHA256D from_str/from_hex impl reverses the
/// order and we don't want to do that if it's already reversed. This trait should only be used for this one hash type.
pub trait FromInnerHex {
	fn from_inner_hex(hex: &str) -> Result<SHA256D, HexError>;
}

impl FromInnerHex for SHA256D {
	fn from_inner_hex(hex: &str) -> Result<SHA256D, HexError> {
		Ok(SHA256D::from_inner(FromHex::from_hex(hex)?))
	}
}
