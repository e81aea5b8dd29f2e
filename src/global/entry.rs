use std::fmt;

use super::encoding;
use super::flags::EntryFlags;

// The sentinel size/position quadruple a directory record carries in place
// of real values. An entry matching all four is a directory even when its
// flag byte claims otherwise.
pub(crate) const DIR_COMPRESSED: u32 = 0x0449;
pub(crate) const DIR_ALIGNED: u32 = 0x0714;
pub(crate) const DIR_ORIGINAL: u32 = 0x055C;
pub(crate) const DIR_POSITION: u32 = 0x058A;

/// Extensions whose content is stored with the head-only cipher mode; every
/// other file takes the mixed scheme in v1 archives.
const HEAD_CRYPT_EXTENSIONS: [&str; 4] = [".gnd", ".gat", ".act", ".str"];

/// A named record inside an archive, either a file or a directory
#[derive(Debug, Clone)]
pub enum Entry {
	File(FileEntry),
	Directory(DirectoryEntry),
}

/// A file entry: sizes, placement and the lazily loaded content buffer
#[derive(Debug, Clone)]
pub struct FileEntry {
	pub(crate) name: String,
	pub(crate) hash: u32,
	pub(crate) flags: EntryFlags,
	/// Size of the deflated content
	pub(crate) compressed_length: u32,
	/// Size of the content as stored, padded to a multiple of 8 when the
	/// cipher flags demand whole blocks
	pub(crate) aligned_length: u32,
	/// Size of the content before compression
	pub(crate) original_length: u32,
	/// Absolute byte offset of the content in the backing store, or zero
	/// while the entry has no placement yet
	pub(crate) position: u32,
	/// Content cache, filled on first access and kept until removal
	pub(crate) data: Option<Vec<u8>>,
}

/// A directory entry carries a name and nothing else
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
	pub(crate) name: String,
	pub(crate) hash: u32,
	pub(crate) flags: EntryFlags,
}

impl FileEntry {
	/// A fresh in-memory file entry; placement is assigned during flush
	pub(crate) fn new(name: &str, data: Vec<u8>, mut flags: EntryFlags) -> FileEntry {
		let name = encoding::normalize(name);
		flags.set(EntryFlags::FILE, true);

		FileEntry {
			hash: encoding::name_hash(&name),
			flags,
			compressed_length: 0,
			aligned_length: 0,
			original_length: data.len() as u32,
			position: 0,
			data: Some(data),
			name,
		}
	}

	pub fn flags(&self) -> EntryFlags {
		self.flags
	}

	pub fn compressed_length(&self) -> u32 {
		self.compressed_length
	}

	pub fn aligned_length(&self) -> u32 {
		self.aligned_length
	}

	pub fn original_length(&self) -> u32 {
		self.original_length
	}

	pub fn position(&self) -> u32 {
		self.position
	}

	/// Whether content has been written to the store for this entry
	pub(crate) fn is_placed(&self) -> bool {
		self.compressed_length != 0 || self.aligned_length != 0 || self.position != 0
	}

	pub(crate) fn clear_placement(&mut self) {
		self.compressed_length = 0;
		self.aligned_length = 0;
		self.position = 0;
	}
}

impl Entry {
	/// Builds the right variant for a decoded table record. The flag bit
	/// decides first; the sentinel quadruple catches records whose flag
	/// byte lies.
	pub(crate) fn from_table_record(
		name: String, flags: EntryFlags, compressed_length: u32, aligned_length: u32,
		original_length: u32, position: u32,
	) -> Entry {
		let sentinel = compressed_length == DIR_COMPRESSED
			&& aligned_length == DIR_ALIGNED
			&& original_length == DIR_ORIGINAL
			&& position == DIR_POSITION;

		let hash = encoding::name_hash(&name);

		if !flags.contains(EntryFlags::FILE) || sentinel {
			Entry::Directory(DirectoryEntry { name, hash, flags })
		} else {
			Entry::File(FileEntry {
				name,
				hash,
				flags,
				compressed_length,
				aligned_length,
				original_length,
				position,
				data: None,
			})
		}
	}

	pub(crate) fn directory(name: &str, flags: EntryFlags) -> Entry {
		let name = encoding::normalize(name);
		Entry::Directory(DirectoryEntry {
			hash: encoding::name_hash(&name),
			flags,
			name,
		})
	}

	/// The full, backslash-normalized path of the entry
	pub fn name(&self) -> &str {
		match self {
			Entry::File(file) => &file.name,
			Entry::Directory(directory) => &directory.name,
		}
	}

	/// The last path component of the entry name
	pub fn base_name(&self) -> &str {
		self.name().rsplit('\\').next().unwrap_or_default()
	}

	/// The lookup hash of the entry name
	pub fn hash(&self) -> u32 {
		match self {
			Entry::File(file) => file.hash,
			Entry::Directory(directory) => directory.hash,
		}
	}

	pub fn flags(&self) -> EntryFlags {
		match self {
			Entry::File(file) => file.flags,
			Entry::Directory(directory) => directory.flags,
		}
	}

	pub(crate) fn flags_mut(&mut self) -> &mut EntryFlags {
		match self {
			Entry::File(file) => &mut file.flags,
			Entry::Directory(directory) => &mut directory.flags,
		}
	}

	pub fn is_file(&self) -> bool {
		matches!(self, Entry::File(_))
	}

	pub fn is_directory(&self) -> bool {
		matches!(self, Entry::Directory(_))
	}

	pub fn as_file(&self) -> Option<&FileEntry> {
		match self {
			Entry::File(file) => Some(file),
			Entry::Directory(_) => None,
		}
	}

	pub(crate) fn as_file_mut(&mut self) -> Option<&mut FileEntry> {
		match self {
			Entry::File(file) => Some(file),
			Entry::Directory(_) => None,
		}
	}

	/// Sort key placing directories ahead of every placed file
	pub(crate) fn position_key(&self) -> i64 {
		match self {
			Entry::File(file) => file.position as i64,
			Entry::Directory(_) => -1,
		}
	}
}

impl fmt::Display for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Entry::File(file) => write!(
				f,
				"[File] {} ({} bytes at {}, {})",
				file.name, file.original_length, file.position, file.flags
			),
			Entry::Directory(directory) => write!(f, "[Directory] {}", directory.name),
		}
	}
}

/// True when the name ends in one of the asset extensions stored with the
/// head-only cipher mode.
pub(crate) fn uses_head_crypt(name: &str) -> bool {
	name.len() >= 4 && HEAD_CRYPT_EXTENSIONS.iter().any(|extension| name.ends_with(extension))
}
