//! The two incompatible on-disk layouts of the entry table. The header's
//! version major selects which codec applies; both share the 17-byte
//! record tail but differ in name obfuscation and framing.

pub mod v1;
pub mod v2;

use crate::global::error::GrfError;
use crate::global::result::InternalResult;

/// The size in bytes of the fixed record tail: three `i32` size fields,
/// one flag byte and an `i32` position
pub(crate) const TAIL_SIZE: usize = 0x11;

/// Bounds-checked little-endian `u32` read out of a table buffer
pub(crate) fn read_u32(buffer: &[u8], offset: usize) -> InternalResult<u32> {
	let bytes = buffer
		.get(offset..offset + 4)
		.ok_or_else(truncated)?;

	Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Bounds-checked single byte read out of a table buffer
pub(crate) fn read_u8(buffer: &[u8], offset: usize) -> InternalResult<u8> {
	buffer.get(offset).copied().ok_or_else(truncated)
}

/// Bounds-checked slice out of a table buffer
pub(crate) fn read_slice(buffer: &[u8], offset: usize, length: usize) -> InternalResult<&[u8]> {
	buffer.get(offset..offset + length).ok_or_else(truncated)
}

fn truncated() -> GrfError {
	GrfError::Malformed("truncated entry table".to_string())
}
