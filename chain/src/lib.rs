extern crate primitives;
extern crate serialization as ser;

mod block_header;
mod block_index;
mod indexed_header;

pub use primitives::{bytes, compact, hash};

pub use crate::block_header::{block_header_hash, BlockHeader};
pub use crate::block_index::{BlockIndex, BlockMeta};
pub use crate::indexed_header::IndexedBlockHeader;
