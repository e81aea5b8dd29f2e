mod tests;

pub(crate) mod archive;
pub(crate) mod crypto;
pub(crate) mod global;
pub(crate) mod table;

// Global constants
/// The size in bytes of the magic sequence opening every archive
pub const MAGIC_LENGTH: usize = 16;

/// The magic sequence opening every archive
pub const MAGIC: &[u8; MAGIC_LENGTH] = b"Master of Magic\0";

/// The size in bytes of the capability watermark following the magic
pub const WATERMARK_LENGTH: usize = 15;

/// The size in bytes of the full header preamble: magic, watermark and four
/// little-endian `i32` fields. Entry positions and the table offset are
/// stored relative to the end of this preamble.
pub const HEADER_LENGTH: usize = 47;

/// The maximum size of an encoded entry name, terminator included
pub const NAME_LENGTH: usize = 0x100;

/// The size in bytes of a cipher key schedule
pub const KEY_SCHEDULE_LENGTH: usize = 0x80;

pub mod prelude {
	//! All public crate structures and logic is stored within
	pub use crate::archive::{Archive, Store};
	pub use crate::crypto::CipherKey;
	pub use crate::global::{
		entry::{DirectoryEntry, Entry, FileEntry},
		error::GrfError,
		flags::EntryFlags,
		header::{CreateConfig, Version},
		index::EntryIndex,
		result::InternalResult,
	};
}
