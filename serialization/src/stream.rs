//! Stream used for serialization of consensus structures.

use crate::compact_integer::CompactInteger;
use primitives::bytes::Bytes;
use std::borrow::Borrow;
use std::io;

/// Serializes the struct and returns serialized bytes.
pub fn serialize<T>(t: &T) -> Bytes
where
	T: Serializable,
{
	let mut stream = Stream::default();
	stream.append(t);
	stream.out()
}

/// Serializes the list of items and returns serialized bytes.
pub fn serialize_list<T, K>(t: &[K]) -> Bytes
where
	T: Serializable,
	K: Borrow<T>,
{
	let mut stream = Stream::default();
	stream.append_list(t);
	stream.out()
}

pub trait Serializable {
	/// Serialize the struct and appends it to the end of stream.
	fn serialize(&self, s: &mut Stream);

	/// Hint about the size of serialized struct.
	fn serialized_size(&self) -> usize
	where
		Self: Sized,
	{
		// fallback implementation
		serialize(self).len()
	}
}

/// Stream used for serialization of consensus structures.
#[derive(Default)]
pub struct Stream {
	buffer: Vec<u8>,
}

impl Stream {
	/// New stream
	pub fn new() -> Self {
		Stream { buffer: Vec::default() }
	}

	pub fn with_capacity(len: usize) -> Self {
		Stream {
			buffer: Vec::with_capacity(len),
		}
	}

	/// Serializes the struct and appends it to the end of stream.
	pub fn append<T>(&mut self, t: &T) -> &mut Self
	where
		T: Serializable,
	{
		t.serialize(self);
		self
	}

	/// Appends raw bytes to the end of the stream.
	pub fn append_slice(&mut self, bytes: &[u8]) -> &mut Self {
		self.buffer.extend_from_slice(bytes);
		self
	}

	/// Appends a list of serializable structs to the end of the stream.
	pub fn append_list<T, K>(&mut self, t: &[K]) -> &mut Self
	where
		T: Serializable,
		K: Borrow<T>,
	{
		CompactInteger::from(t.len()).serialize(self);
		for i in t {
			i.borrow().serialize(self);
		}
		self
	}

	/// Full stream.
	pub fn out(self) -> Bytes {
		self.buffer.into()
	}
}

impl io::Write for Stream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		io::Write::write(&mut self.buffer, buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		io::Write::flush(&mut self.buffer)
	}
}
