use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::compressor::Compressor;
use super::error::GrfError;
use super::result::InternalResult;
use crate::crypto::CipherKey;

/// The bias carried by the on-disk entry count field, retained for
/// compatibility with every other implementation of the format
const COUNT_BIAS: u32 = 7;

/// An archive version, packed on disk as an `i32` word with the major in
/// the high byte and the minor in the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
	pub major: u8,
	pub minor: u8,
}

impl Version {
	#[inline(always)]
	pub fn new(major: u8, minor: u8) -> Version {
		Version { major, minor }
	}

	pub(crate) fn from_word(word: u32) -> Version {
		Version {
			major: ((word & 0xFF00) >> 8) as u8,
			minor: (word & 0x00FF) as u8,
		}
	}

	pub(crate) fn word(&self) -> u32 {
		((self.major as u32) << 8) | self.minor as u32
	}

	/// Forces the version word into the supported `0x100..=0x200` range
	pub(crate) fn clamped(self) -> Version {
		Version::from_word(self.word().clamp(0x100, 0x200))
	}
}

impl Default for Version {
	#[inline(always)]
	fn default() -> Version {
		Version::new(2, 0)
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}

/// Used to configure the creation of a new archive.
/// ```
/// use rogrf::prelude::{CreateConfig, Version};
/// let config = CreateConfig::default().version(Version::new(1, 2)).allow_crypt(false);
/// ```
#[derive(Debug, Clone)]
pub struct CreateConfig {
	/// The version of the archive to create. Out-of-range versions are
	/// clamped into the supported range.
	pub version: Version,
	/// Whether the capability watermark permits content obfuscation
	pub allow_crypt: bool,
	/// The key schedule driving the block cipher
	pub key: CipherKey,
}

impl CreateConfig {
	pub fn new() -> CreateConfig {
		CreateConfig {
			version: Version::default(),
			allow_crypt: true,
			key: CipherKey::default(),
		}
	}

	/// Setter for the archive version
	pub fn version(mut self, version: Version) -> CreateConfig {
		self.version = version;
		self
	}

	/// Setter for the capability watermark
	pub fn allow_crypt(mut self, allow_crypt: bool) -> CreateConfig {
		self.allow_crypt = allow_crypt;
		self
	}

	/// Setter for the cipher key schedule
	pub fn key(mut self, key: CipherKey) -> CreateConfig {
		self.key = key;
		self
	}
}

impl Default for CreateConfig {
	#[inline(always)]
	fn default() -> CreateConfig {
		CreateConfig::new()
	}
}

/// The decoded header preamble of an archive source
#[derive(Debug)]
pub(crate) struct Header {
	/// Offset of the entry table, relative to the end of the preamble
	pub table_offset: u32,
	/// Number of entries in the table, bias already removed
	pub entry_count: usize,
	pub version: Version,
	/// Whether the watermark permits content obfuscation
	pub allow_crypt: bool,
}

impl Header {
	/// Byte offset of the rewritable field group: table offset, reserved
	/// word and biased entry count
	const FIELD_OFFSET: u64 = (crate::MAGIC_LENGTH + crate::WATERMARK_LENGTH) as u64;

	/// Reads and validates the preamble at the start of `handle`.
	/// ### Errors
	/// - The magic sequence or the capability watermark do not match
	/// - The stored entry count underflows its bias
	/// - `io` errors, including a source shorter than the preamble
	pub fn from_handle<T: Read + Seek>(handle: &mut T) -> InternalResult<Header> {
		handle.seek(SeekFrom::Start(0))?;

		let mut magic = [0u8; crate::MAGIC_LENGTH];
		handle.read_exact(&mut magic)?;
		if &magic != crate::MAGIC {
			return Err(GrfError::Malformed("bad magic sequence".to_string()));
		}

		let mut watermark = [0u8; crate::WATERMARK_LENGTH];
		handle.read_exact(&mut watermark)?;
		let allow_crypt = Header::validate_watermark(&watermark)?;

		let table_offset = handle.read_u32::<LE>()?;
		let reserved = handle.read_u32::<LE>()?;
		let raw_count = handle.read_u32::<LE>()?;
		let version = Version::from_word(handle.read_u32::<LE>()?);

		let entry_count = raw_count
			.checked_sub(reserved)
			.and_then(|count| count.checked_sub(COUNT_BIAS))
			.ok_or_else(|| GrfError::Malformed("entry count field underflows its bias".to_string()))?;

		Ok(Header {
			table_offset,
			entry_count: entry_count as usize,
			version,
			allow_crypt,
		})
	}

	/// The watermark takes exactly two forms: the byte sequence `0..=14`
	/// when content obfuscation is permitted, or fifteen zero bytes when it
	/// is not. The second byte selects which form is expected.
	fn validate_watermark(watermark: &[u8; crate::WATERMARK_LENGTH]) -> InternalResult<bool> {
		if watermark[1] == 1 {
			for (position, &byte) in watermark.iter().enumerate() {
				if byte != position as u8 {
					return Err(GrfError::Malformed("corrupt capability watermark".to_string()));
				}
			}

			Ok(true)
		} else if watermark[0] == 0 {
			if watermark.iter().any(|&byte| byte != 0) {
				return Err(GrfError::Malformed("corrupt capability watermark".to_string()));
			}

			Ok(false)
		} else {
			Err(GrfError::Malformed("corrupt capability watermark".to_string()))
		}
	}

	/// Writes a fresh preamble followed by the empty placeholder table, so
	/// that a newly created archive is immediately a valid source.
	pub fn write_new<T: Write + Seek>(
		handle: &mut T, version: Version, allow_crypt: bool,
	) -> InternalResult<()> {
		handle.seek(SeekFrom::Start(0))?;
		handle.write_all(crate::MAGIC)?;

		let mut watermark = [0u8; crate::WATERMARK_LENGTH];
		if allow_crypt {
			for (position, byte) in watermark.iter_mut().enumerate() {
				*byte = position as u8;
			}
		}
		handle.write_all(&watermark)?;

		handle.write_u32::<LE>(0)?; // table offset
		handle.write_u32::<LE>(0)?; // reserved
		handle.write_u32::<LE>(COUNT_BIAS)?; // biased entry count
		handle.write_u32::<LE>(version.word())?;

		// Empty placeholder table: a v2 shaped block with no entries
		let placeholder = Compressor::deflate(&[])?;
		handle.write_u32::<LE>(placeholder.len() as u32)?;
		handle.write_u32::<LE>(0)?;
		handle.write_all(&placeholder)?;

		Ok(())
	}

	/// Rewrites the table offset and biased entry count fields in place.
	/// `table_offset` is absolute; the bias against the preamble is applied
	/// here.
	pub fn update_table_fields<T: Write + Seek>(
		handle: &mut T, table_offset: u64, entry_count: usize,
	) -> InternalResult<()> {
		handle.seek(SeekFrom::Start(Header::FIELD_OFFSET))?;
		handle.write_u32::<LE>((table_offset - crate::HEADER_LENGTH as u64) as u32)?;
		handle.write_u32::<LE>(0)?;
		handle.write_u32::<LE>(entry_count as u32 + COUNT_BIAS)?;

		Ok(())
	}
}
