use std::io;

use thiserror::Error;

/// All errors the crate can produce while reading or writing an archive.
#[derive(Debug, Error)]
pub enum GrfError {
	/// The source failed structural validation: bad magic, a corrupt
	/// capability watermark, an unsupported version word or a broken entry
	/// table. Opening aborts on this error.
	#[error("malformed archive: {0}")]
	Malformed(String),
	/// A mutation was attempted on an archive opened read-only. Only the
	/// offending operation fails; the archive remains usable for reads.
	#[error("the archive is read-only")]
	ReadOnly,
	/// A content request named an entry the archive does not contain, or
	/// named a directory. Plain lookups report absence as `None` instead.
	#[error("no file entry named: {0}")]
	NotFound(String),
	/// An entry name is empty or cannot serve as an archive path
	#[error("invalid entry name: {0:?}")]
	InvalidName(String),
	/// An entry name exceeds the fixed name buffer once encoded
	#[error("entry name longer than the 256 byte name buffer: {0}")]
	NameTooLong(String),
	/// An underlying I/O fault, propagated as-is. Includes deflate stream
	/// errors raised while compressing or decompressing content.
	#[error("io error: {0}")]
	Io(#[from] io::Error),
}
