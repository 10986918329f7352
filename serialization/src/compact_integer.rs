use crate::reader::{Deserializable, Error, Reader};
use crate::stream::{Serializable, Stream};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// A type of variable-length integer used in the protocol to indicate the
/// number of upcoming fields or the length of an upcoming field.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct CompactInteger(u64);

impl From<CompactInteger> for usize {
	fn from(i: CompactInteger) -> Self {
		i.0 as usize
	}
}

impl From<CompactInteger> for u64 {
	fn from(i: CompactInteger) -> Self {
		i.0
	}
}

impl From<u8> for CompactInteger {
	fn from(i: u8) -> Self {
		CompactInteger(i as u64)
	}
}

impl From<u16> for CompactInteger {
	fn from(i: u16) -> Self {
		CompactInteger(i as u64)
	}
}

impl From<u32> for CompactInteger {
	fn from(i: u32) -> Self {
		CompactInteger(i as u64)
	}
}

impl From<usize> for CompactInteger {
	fn from(i: usize) -> Self {
		CompactInteger(i as u64)
	}
}

impl From<u64> for CompactInteger {
	fn from(i: u64) -> Self {
		CompactInteger(i)
	}
}

impl Serializable for CompactInteger {
	fn serialize(&self, stream: &mut Stream) {
		match self.0 {
			0..=0xfc => {
				stream.write_u8(self.0 as u8).unwrap();
			}
			0xfd..=0xffff => {
				stream.write_u8(0xfd).unwrap();
				stream.write_u16::<LittleEndian>(self.0 as u16).unwrap();
			}
			0x10000..=0xffff_ffff => {
				stream.write_u8(0xfe).unwrap();
				stream.write_u32::<LittleEndian>(self.0 as u32).unwrap();
			}
			_ => {
				stream.write_u8(0xff).unwrap();
				stream.write_u64::<LittleEndian>(self.0).unwrap();
			}
		}
	}

	fn serialized_size(&self) -> usize {
		match self.0 {
			0..=0xfc => 1,
			0xfd..=0xffff => 3,
			0x10000..=0xffff_ffff => 5,
			_ => 9,
		}
	}
}

impl Deserializable for CompactInteger {
	fn deserialize<T>(reader: &mut Reader<T>) -> Result<Self, Error>
	where
		T: io::Read,
	{
		let result = match reader.read::<u8>()? {
			i @ 0..=0xfc => i.into(),
			0xfd => reader.read_u16::<LittleEndian>()?.into(),
			0xfe => reader.read_u32::<LittleEndian>()?.into(),
			_ => reader.read_u64::<LittleEndian>()?.into(),
		};

		Ok(result)
	}
}
