extern crate byteorder;
extern crate primitives;

mod compact_integer;
mod impls;
mod reader;
mod serialize_array_wrapper_macro;
mod stream;

pub use primitives::{bytes, compact, hash};

pub use crate::compact_integer::CompactInteger;
pub use crate::reader::{deserialize, Deserializable, Error, Reader};
pub use crate::stream::{serialize, serialize_list, Serializable, Stream};
