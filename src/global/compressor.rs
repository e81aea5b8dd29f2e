use std::io::Read;

use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use super::result::InternalResult;

/// Exported utility codec wrapping the zlib streams used for entry content
/// and the v2 entry table.
pub struct Compressor;

impl Compressor {
	/// Deflates a whole buffer into a fresh zlib stream
	pub fn deflate(data: &[u8]) -> InternalResult<Vec<u8>> {
		let mut encoder = ZlibEncoder::new(data, Compression::default());
		let mut buffer = Vec::new();
		encoder.read_to_end(&mut buffer)?;

		Ok(buffer)
	}

	/// Inflates a whole zlib stream. `size_hint` pre-sizes the output, it
	/// does not bound it.
	pub fn inflate(data: &[u8], size_hint: usize) -> InternalResult<Vec<u8>> {
		let mut decoder = ZlibDecoder::new(data);
		let mut buffer = Vec::with_capacity(size_hint);
		decoder.read_to_end(&mut buffer)?;

		Ok(buffer)
	}
}
