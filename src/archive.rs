use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{WriteBytesExt, LE};
use tracing::{debug, warn};

use crate::crypto::{self, CipherKey};
use crate::global::compressor::Compressor;
use crate::global::entry::{self, Entry, FileEntry};
use crate::global::error::GrfError;
use crate::global::flags::EntryFlags;
use crate::global::header::{CreateConfig, Header, Version};
use crate::global::index::EntryIndex;
use crate::global::result::InternalResult;
use crate::table::{v1, v2};

/// The random-access byte store backing an archive: anything seekable that
/// can also report its size and be cut short. Implemented for [`File`] and
/// for in-memory [`Cursor`] stores.
pub trait Store: Read + Write + Seek {
	/// Current total size of the store in bytes
	fn len(&mut self) -> io::Result<u64>;

	/// Cuts the store down to `length` bytes
	fn truncate(&mut self, length: u64) -> io::Result<()>;
}

impl Store for File {
	fn len(&mut self) -> io::Result<u64> {
		self.metadata().map(|metadata| metadata.len())
	}

	fn truncate(&mut self, length: u64) -> io::Result<()> {
		self.set_len(length)
	}
}

impl Store for Cursor<Vec<u8>> {
	fn len(&mut self) -> io::Result<u64> {
		Ok(self.get_ref().len() as u64)
	}

	fn truncate(&mut self, length: u64) -> io::Result<()> {
		self.get_mut().truncate(length as usize);
		Ok(())
	}
}

impl<S: Store + ?Sized> Store for &mut S {
	fn len(&mut self) -> io::Result<u64> {
		(**self).len()
	}

	fn truncate(&mut self, length: u64) -> io::Result<()> {
		(**self).truncate(length)
	}
}

/// A single-file game data archive and its in-memory entry index.
///
/// The archive owns its backing store exclusively; file entries never hold
/// a handle back into it, lazy content loads receive the store at the call
/// site. Content read once stays cached until the entry is removed. The
/// cache is deliberately unbounded; reload-from-store at the recorded
/// placement remains the fallback for anything evicted externally.
///
/// Every operation completes or fails synchronously. Pending changes reach
/// the store on [`Archive::flush`], at the latest when the archive is
/// dropped; `flush` is not transactional, a failure partway through can
/// leave the file inconsistent.
pub struct Archive<S: Store = File> {
	store: S,
	version: Version,
	index: EntryIndex,
	key: CipherKey,
	allow_crypt: bool,
	writable: bool,
	dirty: bool,
}

impl<S: Store> fmt::Debug for Archive<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Archive")
			.field("version", &self.version)
			.field("entries", &self.index.len())
			.field("allow_crypt", &self.allow_crypt)
			.field("writable", &self.writable)
			.field("dirty", &self.dirty)
			.finish()
	}
}

impl Archive<File> {
	/// Creates a new archive file with the default configuration: latest
	/// version, content obfuscation permitted, zero key schedule. An
	/// existing file at `path` is truncated.
	pub fn create<P: AsRef<Path>>(path: P) -> InternalResult<Archive<File>> {
		Archive::create_with(path, &CreateConfig::default())
	}

	/// Creates a new archive file from a [`CreateConfig`].
	/// ### Errors
	/// - A v1 version with a minor above 3, which could never be reopened
	/// - `io` errors
	pub fn create_with<P: AsRef<Path>>(
		path: P, config: &CreateConfig,
	) -> InternalResult<Archive<File>> {
		let file = File::options()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;

		Archive::create_in(file, config)
	}

	/// Opens an existing archive file with the zero key schedule
	pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> InternalResult<Archive<File>> {
		Archive::open_with(path, read_only, CipherKey::default())
	}

	/// Opens an existing archive file with an explicit key schedule.
	/// ### Errors
	/// - [`GrfError::Malformed`] when the source fails validation
	/// - `io` errors
	pub fn open_with<P: AsRef<Path>>(
		path: P, read_only: bool, key: CipherKey,
	) -> InternalResult<Archive<File>> {
		let file = if read_only {
			File::open(path)?
		} else {
			File::options().read(true).write(true).open(path)?
		};

		Archive::from_store(file, !read_only, key)
	}
}

impl<S: Store> Archive<S> {
	/// Writes a fresh archive into an empty store. The store is assumed
	/// writable.
	pub fn create_in(mut store: S, config: &CreateConfig) -> InternalResult<Archive<S>> {
		let version = config.version.clamped();
		if version.major == 1 && version.minor > 3 {
			return Err(GrfError::Malformed(format!(
				"no name encoding scheme for v1 minor version {}",
				version.minor
			)));
		}

		Header::write_new(&mut store, version, config.allow_crypt)?;
		debug!(%version, allow_crypt = config.allow_crypt, "created archive");

		Ok(Archive {
			store,
			version,
			index: EntryIndex::default(),
			key: config.key.clone(),
			allow_crypt: config.allow_crypt,
			writable: true,
			dirty: false,
		})
	}

	/// Reads and validates an archive out of a store, decoding the entry
	/// table for the version the header announces.
	/// ### Errors
	/// - [`GrfError::Malformed`] on a bad magic sequence, corrupt
	///   watermark, unsupported version word or broken entry table
	/// - `io` errors
	pub fn from_store(mut store: S, writable: bool, key: CipherKey) -> InternalResult<Archive<S>> {
		let header = Header::from_handle(&mut store)?;

		store.seek(SeekFrom::Start(
			header.table_offset as u64 + crate::HEADER_LENGTH as u64,
		))?;

		let index = match header.version.major {
			1 => {
				let mut table = Vec::new();
				store.read_to_end(&mut table)?;
				v1::decode(&table, header.entry_count, header.version.minor, &key)?
			}
			2 => v2::decode(&mut store, header.entry_count, header.version.minor)?,
			_ => {
				return Err(GrfError::Malformed(format!(
					"unsupported archive version {}",
					header.version
				)))
			}
		};

		debug!(version = %header.version, entries = index.len(), "opened archive");

		Ok(Archive {
			store,
			version: header.version,
			index,
			key,
			allow_crypt: header.allow_crypt,
			writable,
			dirty: false,
		})
	}

	/// The archive version
	pub fn version(&self) -> Version {
		self.version
	}

	/// Whether mutations are rejected on this archive
	pub fn is_read_only(&self) -> bool {
		!self.writable
	}

	/// Whether the capability watermark permits content obfuscation
	pub fn allow_crypt(&self) -> bool {
		self.allow_crypt
	}

	/// The ordered entry collection
	pub fn entries(&self) -> &EntryIndex {
		&self.index
	}

	/// The first entry matching `name`, or `None` when the archive holds
	/// no such entry
	pub fn get(&self, name: &str) -> Option<&Entry> {
		self.index.find(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.index.contains(name)
	}

	/// The content of the file entry named `name`, loading and caching it
	/// from the store on first access.
	/// ### Errors
	/// - [`GrfError::NotFound`] when no file entry matches the name
	/// - [`GrfError::Malformed`] when the stored content fails to decode
	pub fn data(&mut self, name: &str) -> InternalResult<&[u8]> {
		match self.index.index_of(name) {
			Some(index) => self.data_at(index),
			None => Err(GrfError::NotFound(name.to_string())),
		}
	}

	/// The content of the file entry in slot `index`. See [`Archive::data`].
	pub fn data_at(&mut self, index: usize) -> InternalResult<&[u8]> {
		let Archive { store, index: entries, key, .. } = self;

		let file = match entries.get_mut(index) {
			Some(Entry::File(file)) => file,
			Some(Entry::Directory(directory)) => {
				return Err(GrfError::NotFound(directory.name.clone()))
			}
			None => return Err(GrfError::NotFound(format!("entry slot {}", index))),
		};

		if file.data.is_none() {
			file.data = Some(load_content(store, file, key)?);
		}

		Ok(file.data.as_deref().unwrap_or(&[]))
	}

	/// Adds a file entry, replacing any entry with the same name. The
	/// content is written out on the next flush.
	/// ### Errors
	/// - [`GrfError::ReadOnly`] on a read-only archive
	/// - [`GrfError::InvalidName`] for an empty name
	pub fn add_file(&mut self, name: &str, data: Vec<u8>) -> InternalResult<()> {
		self.add_file_with_flags(name, data, EntryFlags::empty())
	}

	/// Adds a file entry with explicit flag bits. Requesting a cipher mode
	/// here only takes effect in v2 archives whose watermark permits it;
	/// v1 archives assign cipher modes by extension during flush.
	pub fn add_file_with_flags(
		&mut self, name: &str, data: Vec<u8>, flags: EntryFlags,
	) -> InternalResult<()> {
		self.ensure_writable()?;
		validate_name(name)?;

		self.index.insert(Entry::File(FileEntry::new(name, data, flags)));
		self.dirty = true;

		Ok(())
	}

	/// Adds a file entry, draining its content from a read handle
	pub fn add_file_from<R: Read>(&mut self, name: &str, mut source: R) -> InternalResult<()> {
		let mut data = Vec::new();
		source.read_to_end(&mut data)?;

		self.add_file(name, data)
	}

	/// Adds a directory entry, replacing any entry with the same name
	pub fn add_directory(&mut self, name: &str) -> InternalResult<()> {
		self.ensure_writable()?;
		validate_name(name)?;

		self.index.insert(Entry::directory(name, EntryFlags::empty()));
		self.dirty = true;

		Ok(())
	}

	/// Removes the entry matching `name`. Returns whether an entry was
	/// removed; absence is not an error.
	pub fn remove(&mut self, name: &str) -> InternalResult<bool> {
		self.ensure_writable()?;

		match self.index.index_of(name) {
			Some(index) => self.remove_at(index),
			None => Ok(false),
		}
	}

	/// Removes the entry in slot `index`, dropping any cached content
	pub fn remove_at(&mut self, index: usize) -> InternalResult<bool> {
		self.ensure_writable()?;

		let removed = self.index.remove_at(index).is_some();
		if removed {
			self.dirty = true;
		}

		Ok(removed)
	}

	/// Copies every entry of `other` into this archive, loading file
	/// content across. Same-name entries are replaced.
	pub fn merge<T: Store>(&mut self, other: &mut Archive<T>) -> InternalResult<()> {
		self.ensure_writable()?;

		for index in 0..other.index.len() {
			let (name, flags, is_file) = match other.index.get(index) {
				Some(record) => (record.name().to_string(), record.flags(), record.is_file()),
				None => continue,
			};

			if is_file {
				let data = other.data_at(index)?.to_vec();
				self.add_file_with_flags(&name, data, flags)?;
			} else {
				self.index.insert(Entry::directory(&name, flags));
				self.dirty = true;
			}
		}

		Ok(())
	}

	/// Extracts every entry below `path`, creating directories as needed.
	/// Stored backslash separators become platform path components.
	pub fn extract_to<P: AsRef<Path>>(&mut self, path: P) -> InternalResult<()> {
		let base = path.as_ref();

		for index in 0..self.index.len() {
			let (name, is_file) = match self.index.get(index) {
				Some(record) => (record.name().to_string(), record.is_file()),
				None => continue,
			};

			let target = base.join(relative_path(&name));

			if is_file {
				if let Some(parent) = target.parent() {
					std::fs::create_dir_all(parent)?;
				}
				let data = self.data_at(index)?;
				std::fs::write(target, data)?;
			} else {
				std::fs::create_dir_all(target)?;
			}
		}

		Ok(())
	}

	/// Writes all pending changes to the store: content for every entry
	/// without a placement, then the re-serialized entry table, then the
	/// header fields pointing at it. A no-op unless the archive is
	/// writable and dirty.
	///
	/// Not transactional: a failure partway through can leave the store
	/// inconsistent.
	pub fn flush(&mut self) -> InternalResult<()> {
		if !self.writable || !self.dirty {
			return Ok(());
		}

		match self.version.major {
			1 => self.flush_v1()?,
			2 => self.flush_v2()?,
			_ => {
				return Err(GrfError::Malformed(format!(
					"unsupported archive version {}",
					self.version
				)))
			}
		}

		self.dirty = false;
		Ok(())
	}

	/// Clears every file placement and rewrites the whole store from the
	/// preamble up, defragmenting it as a side effect of the sequential
	/// re-placement.
	pub fn repack(&mut self) -> InternalResult<()> {
		self.ensure_writable()?;

		// Content must be resident before the placements pointing at it
		// are dropped
		for index in 0..self.index.len() {
			let resident = match self.index.get(index) {
				Some(Entry::File(file)) => file.original_length == 0 || file.data.is_some(),
				_ => true,
			};
			if !resident {
				self.data_at(index)?;
			}
		}

		for file in self.index.files_mut() {
			file.clear_placement();
		}

		let before = self.store.len()?;
		self.store.truncate(crate::HEADER_LENGTH as u64)?;
		self.dirty = true;
		self.flush()?;

		debug!(
			entries = self.index.len(),
			before,
			after = self.store.len()?,
			"repacked archive"
		);
		Ok(())
	}

	/// Flushes pending changes and consumes the archive. Dropping the
	/// archive flushes too, but only here does a failure reach the caller.
	pub fn close(mut self) -> InternalResult<()> {
		self.flush()
	}

	fn ensure_writable(&self) -> InternalResult<()> {
		if self.writable {
			Ok(())
		} else {
			Err(GrfError::ReadOnly)
		}
	}

	/// Deflates, pads, obfuscates and places the content of one file
	/// entry, recording the resulting placement on the entry.
	fn flush_entry_content(&mut self, index: usize) -> InternalResult<()> {
		let (mut buffer, flags) = match self.index.get(index) {
			Some(Entry::File(file)) => {
				let content = match &file.data {
					Some(content) => content,
					None => {
						return Err(GrfError::Malformed(format!(
							"file entry without resident content: {}",
							file.name
						)))
					}
				};

				(Compressor::deflate(content)?, file.flags)
			}
			_ => return Ok(()),
		};

		let compressed_length = buffer.len() as u32;

		// Whole cipher blocks require the stored form padded to a multiple
		// of eight
		let aligned_length = if flags.is_encrypted() {
			(compressed_length + 7) & !7
		} else {
			compressed_length
		};
		buffer.resize(aligned_length as usize, 0);

		if flags.is_encrypted() {
			crypto::encrypt_content(&mut buffer, compressed_length, flags, &self.key);
		}

		let gap = self.index.find_unused(buffer.len() as u64);
		let position = if gap == 0 {
			self.store.seek(SeekFrom::End(0))?
		} else {
			self.store.seek(SeekFrom::Start(gap))?
		};
		self.store.write_all(&buffer)?;

		if let Some(file) = self.index.get_mut(index).and_then(Entry::as_file_mut) {
			file.compressed_length = compressed_length;
			file.aligned_length = aligned_length;
			file.position = position as u32;
		}

		Ok(())
	}

	fn flush_v1(&mut self) -> InternalResult<()> {
		self.index.sort_by_position();

		for index in 0..self.index.len() {
			let pending = match self.index.get(index) {
				Some(Entry::File(file)) => !file.is_placed() && file.original_length != 0,
				_ => false,
			};

			if pending {
				// v1 content is always obfuscated; the mode follows the
				// extension allowlist
				if let Some(file) = self.index.get_mut(index).and_then(Entry::as_file_mut) {
					let head_crypt = entry::uses_head_crypt(&file.name);
					file.flags.set(EntryFlags::DES_0X14, head_crypt);
					file.flags.set(EntryFlags::MIXCRYPT, !head_crypt);
				}

				self.flush_entry_content(index)?;
			}
		}

		let table = v1::encode(&self.index, self.version.minor, &self.key)?;

		let table_offset = self.store.seek(SeekFrom::End(0))?;
		self.store.write_all(&table)?;

		Header::update_table_fields(&mut self.store, table_offset, self.index.len())?;

		debug!(entries = self.index.len(), table_offset, "flushed v1 archive");
		Ok(())
	}

	fn flush_v2(&mut self) -> InternalResult<()> {
		self.index.sort_by_position();

		for index in 0..self.index.len() {
			let pending = match self.index.get(index) {
				Some(Entry::File(file)) => !file.is_placed() && file.original_length != 0,
				_ => false,
			};

			if pending {
				if !self.allow_crypt {
					if let Some(file) = self.index.get_mut(index).and_then(Entry::as_file_mut) {
						file.flags
							.set(EntryFlags::MIXCRYPT | EntryFlags::DES_0X14, false);
					}
				}

				self.flush_entry_content(index)?;
			}
		}

		let (table_length, block) = v2::encode(&self.index)?;

		let gap = self.index.find_unused(8 + block.len() as u64);
		let table_offset = if gap == 0 {
			self.store.seek(SeekFrom::End(0))?
		} else {
			self.store.seek(SeekFrom::Start(gap))?
		};

		self.store.write_u32::<LE>(block.len() as u32)?;
		self.store.write_u32::<LE>(table_length as u32)?;
		self.store.write_all(&block)?;

		Header::update_table_fields(&mut self.store, table_offset, self.index.len())?;

		debug!(entries = self.index.len(), table_offset, "flushed v2 archive");
		Ok(())
	}
}

impl<S: Store> Drop for Archive<S> {
	/// The store goes away on every exit path with pending changes written
	/// first; an error here can only be logged.
	fn drop(&mut self) {
		if self.writable && self.dirty {
			if let Err(error) = self.flush() {
				warn!(%error, "flush on drop failed, archive left inconsistent");
			}
		}
	}
}

/// Reads, restores and inflates the content of a placed file entry.
fn load_content<S: Store>(
	store: &mut S, file: &FileEntry, key: &CipherKey,
) -> InternalResult<Vec<u8>> {
	if file.original_length == 0 {
		return Ok(Vec::new());
	}

	if file.position == 0 || file.compressed_length == 0 {
		return Err(GrfError::Malformed(format!(
			"file entry without placement: {}",
			file.name
		)));
	}

	let mut raw = vec![0u8; file.aligned_length as usize];
	store.seek(SeekFrom::Start(file.position as u64))?;
	store.read_exact(&mut raw)?;

	crypto::decrypt_content(&mut raw, file.compressed_length, file.flags, key);

	let stream_end = (file.compressed_length as usize).min(raw.len());
	Compressor::inflate(&raw[..stream_end], file.original_length as usize)
}

fn validate_name(name: &str) -> InternalResult<()> {
	if name.is_empty() {
		return Err(GrfError::InvalidName(name.to_string()));
	}

	Ok(())
}

/// Maps a stored backslash path onto platform path components
fn relative_path(name: &str) -> std::path::PathBuf {
	name.split('\\').filter(|part| !part.is_empty()).collect()
}
