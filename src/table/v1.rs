//! The legacy v1 entry table: length-prefixed obfuscated names and bias
//! constants on every size field, records packed back to back from the
//! table offset to the end of the store.

use byteorder::{WriteBytesExt, LE};

use super::{read_slice, read_u32, read_u8, TAIL_SIZE};
use crate::crypto::{self, CipherKey};
use crate::global::encoding;
use crate::global::entry::{self, Entry};
use crate::global::error::GrfError;
use crate::global::flags::EntryFlags;
use crate::global::index::EntryIndex;
use crate::global::result::InternalResult;

// Bias constants carried by the first two size fields of every record
const COMPRESSED_BIAS: u32 = 0x02CB;
const ALIGNED_BIAS: u32 = 0x92CB;

/// Decodes a v1 entry table out of `buffer`.
///
/// Name obfuscation depends on the minor version: a plain nibble swap
/// below 0x101, nibble swap over the block cipher for 0x101..=0x103.
/// Higher minors have no known decoding and are rejected.
/// ### Errors
/// - Unsupported minor version
/// - A name overflowing the fixed name buffer
/// - A record running past the end of the table
pub(crate) fn decode(
	buffer: &[u8], count: usize, minor: u8, key: &CipherKey,
) -> InternalResult<EntryIndex> {
	if minor > 3 {
		return Err(GrfError::Malformed(format!(
			"no name decoding scheme for v1 minor version {}",
			minor
		)));
	}

	let mut index = EntryIndex::with_capacity(count);
	let mut offset = 0usize;

	for _ in 0..count {
		let prefix = read_u32(buffer, offset)? as usize;
		offset += 4;

		let name = if minor < 1 {
			if prefix >= crate::NAME_LENGTH {
				return Err(GrfError::Malformed("entry name overflows the name buffer".to_string()));
			}

			let mut raw = read_slice(buffer, offset, prefix)?.to_vec();
			crypto::swap_nibbles(&mut raw);
			offset += prefix;

			decode_terminated(&raw)
		} else {
			// Two pad bytes, the obfuscated name, four pad bytes
			let length = prefix.checked_sub(6).ok_or_else(|| {
				GrfError::Malformed("v1 record name field shorter than its padding".to_string())
			})?;
			if length >= crate::NAME_LENGTH {
				return Err(GrfError::Malformed("entry name overflows the name buffer".to_string()));
			}

			let mut raw = read_slice(buffer, offset + 2, length)?.to_vec();
			crypto::swap_nibbles(&mut raw);
			crypto::process_name(&mut raw, key);
			offset += prefix;

			decode_terminated(&raw)
		};

		let field_a = read_u32(buffer, offset)?;
		let field_b = read_u32(buffer, offset + 4)?;
		let original_length = read_u32(buffer, offset + 8)?;
		let flags = EntryFlags::from_bits(read_u8(buffer, offset + 0xC)?);
		let position = read_u32(buffer, offset + 0xD)?.wrapping_add(crate::HEADER_LENGTH as u32);
		offset += TAIL_SIZE;

		let compressed_length = field_a.wrapping_sub(original_length).wrapping_sub(COMPRESSED_BIAS);
		let aligned_length = field_b.wrapping_sub(ALIGNED_BIAS);

		let mut decoded = Entry::from_table_record(
			name,
			flags,
			compressed_length,
			aligned_length,
			original_length,
			position,
		);

		// The stored flag byte only carries the file bit; the cipher mode
		// is a function of the extension
		let head_crypt = entry::uses_head_crypt(decoded.name());
		decoded.flags_mut().set(
			if head_crypt { EntryFlags::DES_0X14 } else { EntryFlags::MIXCRYPT },
			true,
		);

		index.push(decoded);
	}

	Ok(index)
}

/// Serializes the index into a v1 entry table.
/// ### Errors
/// - An entry name overflowing the fixed name buffer once encoded
pub(crate) fn encode(index: &EntryIndex, minor: u8, key: &CipherKey) -> InternalResult<Vec<u8>> {
	let mut buffer = Vec::new();

	for record in index {
		let mut encoded = encoding::encode_name(record.name());
		encoded.push(0);
		if encoded.len() >= crate::NAME_LENGTH {
			return Err(GrfError::NameTooLong(record.name().to_string()));
		}

		if minor < 1 {
			buffer.write_u32::<LE>(encoded.len() as u32)?;
			crypto::swap_nibbles(&mut encoded);
			buffer.extend_from_slice(&encoded);
		} else {
			buffer.write_u32::<LE>(encoded.len() as u32 + 6)?;
			buffer.extend_from_slice(&[0u8; 2]);
			crypto::process_name(&mut encoded, key);
			crypto::swap_nibbles(&mut encoded);
			buffer.extend_from_slice(&encoded);
			buffer.extend_from_slice(&[0u8; 4]);
		}

		match record {
			Entry::File(file) => {
				buffer.write_u32::<LE>(
					file.compressed_length()
						.wrapping_add(file.original_length())
						.wrapping_add(COMPRESSED_BIAS),
				)?;
				buffer.write_u32::<LE>(file.aligned_length().wrapping_add(ALIGNED_BIAS))?;
				buffer.write_u32::<LE>(file.original_length())?;
				buffer.write_u8(record.flags().bits() & EntryFlags::FILE)?;
				buffer.write_u32::<LE>(
					file.position().wrapping_sub(crate::HEADER_LENGTH as u32),
				)?;
			}
			Entry::Directory(_) => {
				buffer.write_u32::<LE>(
					entry::DIR_COMPRESSED + entry::DIR_ORIGINAL + COMPRESSED_BIAS,
				)?;
				buffer.write_u32::<LE>(entry::DIR_ALIGNED + ALIGNED_BIAS)?;
				buffer.write_u32::<LE>(entry::DIR_ORIGINAL)?;
				buffer.write_u8(record.flags().bits() & EntryFlags::FILE)?;
				buffer.write_u32::<LE>(entry::DIR_POSITION - crate::HEADER_LENGTH as u32)?;
			}
		}
	}

	Ok(buffer)
}

/// Cuts decoded name bytes at the terminator and maps them through the
/// legacy codepage.
fn decode_terminated(raw: &[u8]) -> String {
	let end = raw.iter().position(|&byte| byte == 0).unwrap_or(raw.len());
	encoding::decode_name(&raw[..end])
}
