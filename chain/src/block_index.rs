use bitcrypto::SHA256D;

/// Header-derived facts about one block, as stored in the in-memory index.
///
/// The chain carries two difficulty encodings over its history: Q48
/// fixed-point merit for gap-rule blocks and the compact `u32` for
/// constellation-rule blocks. Both travel with the entry; retargeting
/// reads whichever the rules at that height prescribe.
#[derive(Debug, Clone)]
pub struct BlockMeta {
	pub hash: SHA256D,
	pub height: u32,
	pub time: u32,
	/// Q48 fixed-point target difficulty (gap rules).
	pub difficulty: u64,
	/// Compact difficulty (constellation rules).
	pub bits: u32,
}

#[derive(Debug, Clone)]
struct Entry {
	meta: BlockMeta,
	prev: Option<u32>,
	skip: Option<u32>,
}

/// Append-only arena of block metadata forming a forest rooted at the
/// genesis entries. Entries are addressed by insertion index, ancestors
/// are reachable in O(log height) through skip links.
#[derive(Debug, Default)]
pub struct BlockIndex {
	entries: Vec<Entry>,
}

/// Turn the lowest '1' bit in the binary representation of a number into a '0'.
fn invert_lowest_one(n: i64) -> i64 {
	n & (n - 1)
}

/// Height to jump back to with the skip link.
fn skip_height(height: u32) -> u32 {
	if height < 2 {
		return 0;
	}

	// Any number strictly lower than height is acceptable, but the following
	// expression performs well in simulations (max 110 steps to go back up to
	// 2**18 blocks).
	let height = i64::from(height);
	let skip = if height & 1 == 1 {
		invert_lowest_one(invert_lowest_one(height - 1)) + 1
	} else {
		invert_lowest_one(height)
	};
	skip as u32
}

impl BlockIndex {
	pub fn new() -> Self {
		BlockIndex::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, ix: u32) -> Option<&BlockMeta> {
		self.entries.get(ix as usize).map(|entry| &entry.meta)
	}

	pub fn prev(&self, ix: u32) -> Option<u32> {
		self.entries.get(ix as usize).and_then(|entry| entry.prev)
	}

	/// Appends a block on top of `prev` (`None` for a genesis entry) and
	/// returns its index. The skip link is derived here; the height must be
	/// one above the parent's.
	pub fn insert(&mut self, meta: BlockMeta, prev: Option<u32>) -> u32 {
		debug_assert_eq!(
			meta.height,
			prev.and_then(|p| self.get(p)).map(|p| p.height + 1).unwrap_or_default()
		);

		let skip = prev.and_then(|p| self.ancestor(p, skip_height(meta.height)));
		let ix = self.entries.len() as u32;
		self.entries.push(Entry { meta, prev, skip });
		ix
	}

	/// Index of the ancestor of `ix` at `height`, following skip links
	/// where they do not overshoot.
	pub fn ancestor(&self, ix: u32, height: u32) -> Option<u32> {
		let mut walk = ix;
		let mut walk_height = self.get(walk)?.height;
		if height > walk_height {
			return None;
		}

		while walk_height > height {
			let entry = &self.entries[walk as usize];
			let height_skip = i64::from(skip_height(walk_height));
			let height_skip_prev = i64::from(skip_height(walk_height - 1));
			let target = i64::from(height);

			match entry.skip {
				// Only follow the skip link if prev's skip isn't better than skip's prev.
				Some(skip)
					if height_skip == target
						|| (height_skip > target && !(height_skip_prev < height_skip - 2 && height_skip_prev >= target)) =>
				{
					walk = skip;
					walk_height = height_skip as u32;
				}
				_ => {
					walk = entry.prev?;
					walk_height -= 1;
				}
			}
		}

		Some(walk)
	}
}

#[cfg(test)]
mod tests {
	use super::{skip_height, BlockIndex, BlockMeta};
	use bitcrypto::SHA256D;

	fn build_chain(len: u32) -> BlockIndex {
		let mut index = BlockIndex::new();
		let mut prev = None;
		for height in 0..len {
			let meta = BlockMeta {
				hash: SHA256D::default(),
				height,
				time: height * 150,
				difficulty: 20u64 << 48,
				bits: 0x02018000,
			};
			prev = Some(index.insert(meta, prev));
		}
		index
	}

	#[test]
	fn test_skip_height_is_strictly_lower() {
		for height in 2..10_000 {
			assert!(skip_height(height) < height);
		}
		assert_eq!(skip_height(0), 0);
		assert_eq!(skip_height(1), 0);
	}

	#[test]
	fn test_ancestor_walks_to_exact_height() {
		let index = build_chain(10_000);
		let tip = 9_999;

		// deterministic pseudo-random heights
		let mut state = 0x2545_f491_4f6c_dd1du64;
		for _ in 0..1_000 {
			state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
			let height = (state >> 33) as u32 % 10_000;
			let ancestor = index.ancestor(tip, height).unwrap();
			assert_eq!(index.get(ancestor).unwrap().height, height);
			// chain built in height order, so the index equals the height
			assert_eq!(ancestor, height);
		}
	}

	#[test]
	fn test_ancestor_above_tip_is_none() {
		let index = build_chain(10);
		assert_eq!(index.ancestor(9, 10), None);
		assert_eq!(index.ancestor(9, 9), Some(9));
		assert_eq!(index.ancestor(9, 0), Some(0));
	}

	#[test]
	fn test_forest_with_two_tips() {
		let mut index = build_chain(5);
		// fork off height 2
		let fork = BlockMeta {
			hash: SHA256D::default(),
			height: 3,
			time: 1_000,
			difficulty: 20u64 << 48,
			bits: 0x02018000,
		};
		let fork_ix = index.insert(fork, Some(2));
		assert_eq!(index.ancestor(fork_ix, 2), Some(2));
		assert_eq!(index.ancestor(4, 2), Some(2));
	}
}
