use std::slice;

use super::encoding;
use super::entry::{Entry, FileEntry};

/// The ordered collection of entries inside an archive.
///
/// Lookups resolve through the name hash with a linear scan, first match
/// wins; at archive scale that beats maintaining a side table. The index
/// also answers the free-space queries the flush path uses to reuse holes
/// left behind by removed entries.
#[derive(Debug, Default)]
pub struct EntryIndex {
	entries: Vec<Entry>,
}

impl EntryIndex {
	pub(crate) fn with_capacity(capacity: usize) -> EntryIndex {
		EntryIndex {
			entries: Vec::with_capacity(capacity),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> slice::Iter<'_, Entry> {
		self.entries.iter()
	}

	pub fn get(&self, index: usize) -> Option<&Entry> {
		self.entries.get(index)
	}

	pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
		self.entries.get_mut(index)
	}

	/// Index of the first entry whose hash matches the name
	pub fn index_of(&self, name: &str) -> Option<usize> {
		let hash = encoding::name_hash(name);
		self.entries.iter().position(|entry| entry.hash() == hash)
	}

	/// The first entry whose hash matches the name
	pub fn find(&self, name: &str) -> Option<&Entry> {
		self.index_of(name).and_then(|index| self.entries.get(index))
	}

	pub fn contains(&self, name: &str) -> bool {
		self.index_of(name).is_some()
	}

	/// Raw append, used while decoding a table
	pub(crate) fn push(&mut self, entry: Entry) {
		self.entries.push(entry);
	}

	/// Adds an entry, replacing any existing entry with the same hash in
	/// place. Returns whether a replacement happened.
	pub(crate) fn insert(&mut self, entry: Entry) -> bool {
		match self.entries.iter().position(|existing| existing.hash() == entry.hash()) {
			Some(index) => {
				self.entries[index] = entry;
				true
			}
			None => {
				self.entries.push(entry);
				false
			}
		}
	}

	pub(crate) fn remove_at(&mut self, index: usize) -> Option<Entry> {
		if index >= self.entries.len() {
			return None;
		}

		Some(self.entries.remove(index))
	}

	pub(crate) fn clear(&mut self) {
		self.entries.clear();
	}

	/// Mutable walk over the file entries only
	pub(crate) fn files_mut(&mut self) -> impl Iterator<Item = &mut FileEntry> {
		self.entries.iter_mut().filter_map(Entry::as_file_mut)
	}

	/// Orders the collection the way the table is laid out on disk:
	/// directories first, then files by ascending position.
	pub(crate) fn sort_by_position(&mut self) {
		self.entries.sort_by_key(Entry::position_key);
	}

	/// First-fit scan over the free space between placed file extents.
	///
	/// Collects `(position, aligned_length)` for every placed file, sorts
	/// by position and walks adjacent pairs for the first gap of at least
	/// `length` bytes. Returns the gap start, or zero for "no reusable
	/// gap, append at the end of the store".
	pub(crate) fn find_unused(&self, length: u64) -> u64 {
		let mut extents: Vec<(u64, u64)> = self
			.entries
			.iter()
			.filter_map(Entry::as_file)
			.filter(|file| file.position != 0 && file.original_length != 0)
			.map(|file| (file.position as u64, file.aligned_length as u64))
			.collect();

		extents.sort_unstable_by_key(|&(position, _)| position);

		for pair in extents.windows(2) {
			let (position, extent) = pair[0];
			let (next, _) = pair[1];

			let gap_start = position + extent;
			if next.saturating_sub(gap_start) >= length {
				return gap_start;
			}
		}

		0
	}
}

impl<'a> IntoIterator for &'a EntryIndex {
	type Item = &'a Entry;
	type IntoIter = slice::Iter<'a, Entry>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}
