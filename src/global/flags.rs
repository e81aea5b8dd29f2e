use std::fmt;

/// Abstracted flag access and manipulation over the single flag byte every
/// entry record carries. A knock-off minimal bitflags of sorts.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct EntryFlags {
	pub(crate) bits: u8,
}

impl EntryFlags {
	/// The size in bytes of a flag field inside an entry record
	pub const SIZE: usize = 1;

	/// Marks the entry as a file. When unset the entry is a directory.
	pub const FILE: u8 = 0x01;
	/// The file content uses the mixed obfuscation scheme: the head blocks
	/// and every cycle-th block run through the block cipher, interleaved
	/// with a periodic byte shuffle.
	pub const MIXCRYPT: u8 = 0x02;
	/// Only the first 0x14 blocks of the file content run through the block
	/// cipher; the rest is stored untouched.
	pub const DES_0X14: u8 = 0x04;

	/// Construct an `EntryFlags` struct from a `u8` number
	#[inline(always)]
	pub fn from_bits(bits: u8) -> Self {
		EntryFlags { bits }
	}

	/// Returns a copy of the underlying number.
	#[inline(always)]
	pub fn bits(&self) -> u8 {
		self.bits
	}

	/// Yield a new empty `EntryFlags` instance.
	/// ```
	/// use rogrf::prelude::EntryFlags;
	/// assert_eq!(EntryFlags::empty(), EntryFlags::from_bits(0));
	/// ```
	#[inline(always)]
	pub fn empty() -> Self {
		EntryFlags { bits: 0 }
	}

	/// Set a flag into the underlying structure. The `toggle` parameter
	/// specifies whether to insert the flags (when true), or to pop the
	/// flags (when false).
	/// ```
	/// use rogrf::prelude::EntryFlags;
	///
	/// let mut flags = EntryFlags::empty();
	/// flags.set(EntryFlags::FILE, true);
	/// assert!(flags.contains(EntryFlags::FILE));
	///
	/// flags.set(EntryFlags::FILE, false);
	/// assert_eq!(flags, EntryFlags::empty());
	/// ```
	pub fn set(&mut self, mask: u8, toggle: bool) {
		if toggle {
			self.bits |= mask;
		} else {
			self.bits &= !mask;
		}
	}

	/// Checks whether any bit of the given mask is set.
	#[inline(always)]
	pub fn contains(&self, mask: u8) -> bool {
		(self.bits & mask) != 0
	}

	/// True when either of the content obfuscation bits is set
	#[inline(always)]
	pub fn is_encrypted(&self) -> bool {
		self.contains(EntryFlags::MIXCRYPT | EntryFlags::DES_0X14)
	}
}

#[rustfmt::skip]
impl fmt::Display for EntryFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let file = if self.contains(EntryFlags::FILE) { 'F' } else { '-' };
		let mixed = if self.contains(EntryFlags::MIXCRYPT) { 'M' } else { '-' };
		let head = if self.contains(EntryFlags::DES_0X14) { 'D' } else { '-' };

		write!(f, "EntryFlags[{}{}{}]", file, mixed, head)
	}
}

#[rustfmt::skip]
impl fmt::Debug for EntryFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: <{:#010b}>", self, self.bits)
	}
}
