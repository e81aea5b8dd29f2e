//! The v2 entry table: one zlib block of plain records behind a pair of
//! length fields. Names travel unobfuscated; the bias constants of the v1
//! layout are gone, only the position keeps its preamble-relative form.

use std::io::Read;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::{read_u32, read_u8, TAIL_SIZE};
use crate::global::compressor::Compressor;
use crate::global::encoding;
use crate::global::entry::{self, Entry};
use crate::global::error::GrfError;
use crate::global::flags::EntryFlags;
use crate::global::index::EntryIndex;
use crate::global::result::InternalResult;

/// Reads and decodes a v2 entry table from the current position of
/// `handle`. A zero uncompressed length marks an empty table and short
/// circuits without touching the block.
/// ### Errors
/// - Unsupported minor version
/// - A block that does not inflate, or records running past its end
/// - A name overflowing the fixed name buffer
pub(crate) fn decode<R: Read>(handle: &mut R, count: usize, minor: u8) -> InternalResult<EntryIndex> {
	if minor != 0 {
		return Err(GrfError::Malformed(format!(
			"unsupported v2 minor version {}",
			minor
		)));
	}

	let compressed_length = handle.read_u32::<LE>()? as usize;
	let uncompressed_length = handle.read_u32::<LE>()? as usize;

	if uncompressed_length == 0 {
		return Ok(EntryIndex::with_capacity(0));
	}

	let mut block = vec![0u8; compressed_length];
	handle.read_exact(&mut block)?;

	let table = Compressor::inflate(&block, uncompressed_length)
		.map_err(|error| GrfError::Malformed(format!("entry table does not inflate: {}", error)))?;

	let mut index = EntryIndex::with_capacity(count);
	let mut offset = 0usize;

	for _ in 0..count {
		let terminator = table
			.get(offset..)
			.and_then(|rest| rest.iter().position(|&byte| byte == 0))
			.ok_or_else(|| GrfError::Malformed("unterminated entry name".to_string()))?;
		if terminator + 1 >= crate::NAME_LENGTH {
			return Err(GrfError::Malformed("entry name overflows the name buffer".to_string()));
		}

		let name = encoding::decode_name(&table[offset..offset + terminator]);
		offset += terminator + 1;

		let compressed_length = read_u32(&table, offset)?;
		let aligned_length = read_u32(&table, offset + 4)?;
		let original_length = read_u32(&table, offset + 8)?;
		let flags = EntryFlags::from_bits(read_u8(&table, offset + 0xC)?);
		let position = read_u32(&table, offset + 0xD)?.wrapping_add(crate::HEADER_LENGTH as u32);
		offset += TAIL_SIZE;

		index.push(Entry::from_table_record(
			name,
			flags,
			compressed_length,
			aligned_length,
			original_length,
			position,
		));
	}

	Ok(index)
}

/// Serializes and deflates the index into a v2 entry table block. Returns
/// the uncompressed record size alongside the block; both land in the
/// length fields in front of it.
/// ### Errors
/// - An entry name overflowing the fixed name buffer once encoded
pub(crate) fn encode(index: &EntryIndex) -> InternalResult<(usize, Vec<u8>)> {
	let mut buffer = Vec::new();

	for record in index {
		let encoded = encoding::encode_name(record.name());
		if encoded.len() + 1 >= crate::NAME_LENGTH {
			return Err(GrfError::NameTooLong(record.name().to_string()));
		}
		buffer.extend_from_slice(&encoded);
		buffer.push(0);

		match record {
			Entry::File(file) => {
				buffer.write_u32::<LE>(file.compressed_length())?;
				buffer.write_u32::<LE>(file.aligned_length())?;
				buffer.write_u32::<LE>(file.original_length())?;
				buffer.write_u8(record.flags().bits())?;
				buffer.write_u32::<LE>(
					file.position().wrapping_sub(crate::HEADER_LENGTH as u32),
				)?;
			}
			Entry::Directory(_) => {
				buffer.write_u32::<LE>(entry::DIR_COMPRESSED)?;
				buffer.write_u32::<LE>(entry::DIR_ALIGNED)?;
				buffer.write_u32::<LE>(entry::DIR_ORIGINAL)?;
				buffer.write_u8(record.flags().bits())?;
				buffer.write_u32::<LE>(entry::DIR_POSITION - crate::HEADER_LENGTH as u32)?;
			}
		}
	}

	let block = Compressor::deflate(&buffer)?;
	Ok((buffer.len(), block))
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;
	use crate::global::entry::FileEntry;

	fn framed(index: &EntryIndex) -> Vec<u8> {
		let (length, block) = encode(index).unwrap();

		let mut framed = Vec::new();
		framed.write_u32::<LE>(block.len() as u32).unwrap();
		framed.write_u32::<LE>(length as u32).unwrap();
		framed.extend_from_slice(&block);
		framed
	}

	#[test]
	fn round_trip() {
		let mut index = EntryIndex::default();
		index.push(Entry::directory("data", EntryFlags::empty()));

		let mut file = FileEntry::new(
			"data\\test.txt",
			Vec::new(),
			EntryFlags::from_bits(EntryFlags::MIXCRYPT),
		);
		file.compressed_length = 11;
		file.aligned_length = 16;
		file.original_length = 3;
		file.position = 47;
		index.push(Entry::File(file));

		let framed = framed(&index);
		let decoded = decode(&mut Cursor::new(framed), 2, 0).unwrap();

		assert_eq!(decoded.len(), 2);
		assert!(decoded.get(0).unwrap().is_directory());

		let file = decoded.find("data\\test.txt").unwrap().as_file().unwrap();
		assert_eq!(file.compressed_length(), 11);
		assert_eq!(file.aligned_length(), 16);
		assert_eq!(file.original_length(), 3);
		assert_eq!(file.position(), 47);
		assert!(file.flags.contains(EntryFlags::FILE | EntryFlags::MIXCRYPT));
	}

	#[test]
	fn empty_table_short_circuits() {
		let mut framed = Vec::new();
		framed.write_u32::<LE>(0).unwrap();
		framed.write_u32::<LE>(0).unwrap();

		let decoded = decode(&mut Cursor::new(framed), 0, 0).unwrap();
		assert!(decoded.is_empty());
	}

	#[test]
	fn nonzero_minor_is_fatal() {
		assert!(matches!(
			decode(&mut Cursor::new(Vec::new()), 0, 1),
			Err(GrfError::Malformed(_))
		));
	}

	#[test]
	fn garbage_block_is_fatal() {
		let mut framed = Vec::new();
		framed.write_u32::<LE>(4).unwrap();
		framed.write_u32::<LE>(64).unwrap();
		framed.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

		assert!(matches!(
			decode(&mut Cursor::new(framed), 1, 0),
			Err(GrfError::Malformed(_))
		));
	}
}
