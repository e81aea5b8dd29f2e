//! The obfuscation layer of the archive format.
//!
//! Content and legacy filenames are scrambled with a single application of
//! a DES-shaped block transform: initial permutation, E bit-selection,
//! eight S-boxes, P permutation, final permutation. The format runs one
//! round only and skips the trailing half-swap, which makes the transform
//! its own inverse. This weakened form *is* the wire format; running the
//! full sixteen-round schedule would produce incompatible archives.

use std::fmt;

use crate::global::flags::EntryFlags;

/// The size in bytes of one cipher block
pub(crate) const BLOCK_SIZE: usize = 8;

/// Blocks at the head of a buffer that are always run through the cipher
const HEAD_BLOCKS: usize = 0x14;

/// The key schedule driving the block transform.
///
/// The format ships with the all-zero schedule; a single round consumes
/// only the first eight bytes, the rest is carried for layout
/// compatibility with multi-round schedules.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey {
	schedule: [u8; crate::KEY_SCHEDULE_LENGTH],
}

impl CipherKey {
	pub fn new(schedule: [u8; crate::KEY_SCHEDULE_LENGTH]) -> CipherKey {
		CipherKey { schedule }
	}

	/// The eight bytes consumed by the single round
	#[inline(always)]
	fn round(&self) -> &[u8] {
		&self.schedule[..BLOCK_SIZE]
	}
}

impl Default for CipherKey {
	#[inline(always)]
	fn default() -> CipherKey {
		CipherKey {
			schedule: [0u8; crate::KEY_SCHEDULE_LENGTH],
		}
	}
}

impl fmt::Debug for CipherKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "CipherKey({:02X?}..)", self.round())
	}
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
	Encrypt,
	Decrypt,
}

// Initial Permutation (IP)
#[rustfmt::skip]
const IP: [u8; 0x40] = [
	0x3A, 0x32, 0x2A, 0x22, 0x1A, 0x12, 0x0A, 0x02,
	0x3C, 0x34, 0x2C, 0x24, 0x1C, 0x14, 0x0C, 0x04,
	0x3E, 0x36, 0x2E, 0x26, 0x1E, 0x16, 0x0E, 0x06,
	0x40, 0x38, 0x30, 0x28, 0x20, 0x18, 0x10, 0x08,
	0x39, 0x31, 0x29, 0x21, 0x19, 0x11, 0x09, 0x01,
	0x3B, 0x33, 0x2B, 0x23, 0x1B, 0x13, 0x0B, 0x03,
	0x3D, 0x35, 0x2D, 0x25, 0x1D, 0x15, 0x0D, 0x05,
	0x3F, 0x37, 0x2F, 0x27, 0x1F, 0x17, 0x0F, 0x07,
];

// Inverse Initial Permutation (IP^-1)
#[rustfmt::skip]
const IP_INV: [u8; 0x40] = [
	0x28, 0x08, 0x30, 0x10, 0x38, 0x18, 0x40, 0x20,
	0x27, 0x07, 0x2F, 0x0F, 0x37, 0x17, 0x3F, 0x1F,
	0x26, 0x06, 0x2E, 0x0E, 0x36, 0x16, 0x3E, 0x1E,
	0x25, 0x05, 0x2D, 0x0D, 0x35, 0x15, 0x3D, 0x1D,
	0x24, 0x04, 0x2C, 0x0C, 0x34, 0x14, 0x3C, 0x1C,
	0x23, 0x03, 0x2B, 0x0B, 0x33, 0x13, 0x3B, 0x1B,
	0x22, 0x02, 0x2A, 0x0A, 0x32, 0x12, 0x3A, 0x1A,
	0x21, 0x01, 0x29, 0x09, 0x31, 0x11, 0x39, 0x19,
];

// The eight selection functions (S)
#[rustfmt::skip]
const S_BOXES: [[u8; 0x40]; 8] = [
	[
		0x0E, 0x00, 0x04, 0x0F, 0x0D, 0x07, 0x01, 0x04,
		0x02, 0x0E, 0x0F, 0x02, 0x0B, 0x0D, 0x08, 0x01,
		0x03, 0x0A, 0x0A, 0x06, 0x06, 0x0C, 0x0C, 0x0B,
		0x05, 0x09, 0x09, 0x05, 0x00, 0x03, 0x07, 0x08,
		0x04, 0x0F, 0x01, 0x0C, 0x0E, 0x08, 0x08, 0x02,
		0x0D, 0x04, 0x06, 0x09, 0x02, 0x01, 0x0B, 0x07,
		0x0F, 0x05, 0x0C, 0x0B, 0x09, 0x03, 0x07, 0x0E,
		0x03, 0x0A, 0x0A, 0x00, 0x05, 0x06, 0x00, 0x0D,
	],
	[
		0x0F, 0x03, 0x01, 0x0D, 0x08, 0x04, 0x0E, 0x07,
		0x06, 0x0F, 0x0B, 0x02, 0x03, 0x08, 0x04, 0x0E,
		0x09, 0x0C, 0x07, 0x00, 0x02, 0x01, 0x0D, 0x0A,
		0x0C, 0x06, 0x00, 0x09, 0x05, 0x0B, 0x0A, 0x05,
		0x00, 0x0D, 0x0E, 0x08, 0x07, 0x0A, 0x0B, 0x01,
		0x0A, 0x03, 0x04, 0x0F, 0x0D, 0x04, 0x01, 0x02,
		0x05, 0x0B, 0x08, 0x06, 0x0C, 0x07, 0x06, 0x0C,
		0x09, 0x00, 0x03, 0x05, 0x02, 0x0E, 0x0F, 0x09,
	],
	[
		0x0A, 0x0D, 0x00, 0x07, 0x09, 0x00, 0x0E, 0x09,
		0x06, 0x03, 0x03, 0x04, 0x0F, 0x06, 0x05, 0x0A,
		0x01, 0x02, 0x0D, 0x08, 0x0C, 0x05, 0x07, 0x0E,
		0x0B, 0x0C, 0x04, 0x0B, 0x02, 0x0F, 0x08, 0x01,
		0x0D, 0x01, 0x06, 0x0A, 0x04, 0x0D, 0x09, 0x00,
		0x08, 0x06, 0x0F, 0x09, 0x03, 0x08, 0x00, 0x07,
		0x0B, 0x04, 0x01, 0x0F, 0x02, 0x0E, 0x0C, 0x03,
		0x05, 0x0B, 0x0A, 0x05, 0x0E, 0x02, 0x07, 0x0C,
	],
	[
		0x07, 0x0D, 0x0D, 0x08, 0x0E, 0x0B, 0x03, 0x05,
		0x00, 0x06, 0x06, 0x0F, 0x09, 0x00, 0x0A, 0x03,
		0x01, 0x04, 0x02, 0x07, 0x08, 0x02, 0x05, 0x0C,
		0x0B, 0x01, 0x0C, 0x0A, 0x04, 0x0E, 0x0F, 0x09,
		0x0A, 0x03, 0x06, 0x0F, 0x09, 0x00, 0x00, 0x06,
		0x0C, 0x0A, 0x0B, 0x01, 0x07, 0x0D, 0x0D, 0x08,
		0x0F, 0x09, 0x01, 0x04, 0x03, 0x05, 0x0E, 0x0B,
		0x05, 0x0C, 0x02, 0x07, 0x08, 0x02, 0x04, 0x0E,
	],
	[
		0x02, 0x0E, 0x0C, 0x0B, 0x04, 0x02, 0x01, 0x0C,
		0x07, 0x04, 0x0A, 0x07, 0x0B, 0x0D, 0x06, 0x01,
		0x08, 0x05, 0x05, 0x00, 0x03, 0x0F, 0x0F, 0x0A,
		0x0D, 0x03, 0x00, 0x09, 0x0E, 0x08, 0x09, 0x06,
		0x04, 0x0B, 0x02, 0x08, 0x01, 0x0C, 0x0B, 0x07,
		0x0A, 0x01, 0x0D, 0x0E, 0x07, 0x02, 0x08, 0x0D,
		0x0F, 0x06, 0x09, 0x0F, 0x0C, 0x00, 0x05, 0x09,
		0x06, 0x0A, 0x03, 0x04, 0x00, 0x05, 0x0E, 0x03,
	],
	[
		0x0C, 0x0A, 0x01, 0x0F, 0x0A, 0x04, 0x0F, 0x02,
		0x09, 0x07, 0x02, 0x0C, 0x06, 0x09, 0x08, 0x05,
		0x00, 0x06, 0x0D, 0x01, 0x03, 0x0D, 0x04, 0x0E,
		0x0E, 0x00, 0x07, 0x0B, 0x05, 0x03, 0x0B, 0x08,
		0x09, 0x04, 0x0E, 0x03, 0x0F, 0x02, 0x05, 0x0C,
		0x02, 0x09, 0x08, 0x05, 0x0C, 0x0F, 0x03, 0x0A,
		0x07, 0x0B, 0x00, 0x0E, 0x04, 0x01, 0x0A, 0x07,
		0x01, 0x06, 0x0D, 0x00, 0x0B, 0x08, 0x06, 0x0D,
	],
	[
		0x04, 0x0D, 0x0B, 0x00, 0x02, 0x0B, 0x0E, 0x07,
		0x0F, 0x04, 0x00, 0x09, 0x08, 0x01, 0x0D, 0x0A,
		0x03, 0x0E, 0x0C, 0x03, 0x09, 0x05, 0x07, 0x0C,
		0x05, 0x02, 0x0A, 0x0F, 0x06, 0x08, 0x01, 0x06,
		0x01, 0x06, 0x04, 0x0B, 0x0B, 0x0D, 0x0D, 0x08,
		0x0C, 0x01, 0x03, 0x04, 0x07, 0x0A, 0x0E, 0x07,
		0x0A, 0x09, 0x0F, 0x05, 0x06, 0x00, 0x08, 0x0F,
		0x00, 0x0E, 0x05, 0x02, 0x09, 0x03, 0x02, 0x0C,
	],
	[
		0x0D, 0x01, 0x02, 0x0F, 0x08, 0x0D, 0x04, 0x08,
		0x06, 0x0A, 0x0F, 0x03, 0x0B, 0x07, 0x01, 0x04,
		0x0A, 0x0C, 0x09, 0x05, 0x03, 0x06, 0x0E, 0x0B,
		0x05, 0x00, 0x00, 0x0E, 0x0C, 0x09, 0x07, 0x02,
		0x07, 0x02, 0x0B, 0x01, 0x04, 0x0E, 0x01, 0x07,
		0x09, 0x04, 0x0C, 0x0A, 0x0E, 0x08, 0x02, 0x0D,
		0x00, 0x0F, 0x06, 0x0C, 0x0A, 0x09, 0x0D, 0x00,
		0x0F, 0x03, 0x03, 0x05, 0x05, 0x06, 0x08, 0x0B,
	],
];

// Bit-selection table (E)
#[rustfmt::skip]
const E: [u8; 0x30] = [
	0x20, 0x01, 0x02, 0x03, 0x04, 0x05,
	0x04, 0x05, 0x06, 0x07, 0x08, 0x09,
	0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
	0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11,
	0x10, 0x11, 0x12, 0x13, 0x14, 0x15,
	0x14, 0x15, 0x16, 0x17, 0x18, 0x19,
	0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D,
	0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x01,
];

// Permutation (P)
#[rustfmt::skip]
const P: [u8; 0x20] = [
	0x10, 0x07, 0x14, 0x15,
	0x1D, 0x0C, 0x1C, 0x11,
	0x01, 0x0F, 0x17, 0x1A,
	0x05, 0x12, 0x1F, 0x0A,
	0x02, 0x08, 0x18, 0x0E,
	0x20, 0x1B, 0x03, 0x09,
	0x13, 0x0D, 0x1E, 0x06,
	0x16, 0x0B, 0x04, 0x19,
];

const BIT: [u8; 8] = [0x80, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01];

/// Applies a 64-bit permutation table over a block. Tables hold one-based
/// source bit numbers.
fn permute(block: &mut [u8], table: &[u8; 0x40]) {
	let mut output = [0u8; BLOCK_SIZE];

	for (position, &source) in table.iter().enumerate() {
		let bit = (source - 1) as usize;
		if block[bit >> 3] & BIT[bit & 7] != 0 {
			output[position >> 3] |= BIT[position & 7];
		}
	}

	block.copy_from_slice(&output);
}

/// One Feistel round over a permuted block: the right half is expanded,
/// keyed, substituted and permuted, then folded into the left half.
fn feistel_round(block: &mut [u8], round_key: &[u8]) {
	// Expand the right half into eight groups of six bits, one group per
	// byte, packed into the high bits
	let mut expanded = [0u8; 8];
	for (position, &selection) in E.iter().enumerate() {
		let bit = selection as usize + 0x1F;
		if block[bit >> 3] & BIT[bit & 7] != 0 {
			expanded[position / 6] |= BIT[position % 6];
		}
	}

	for (byte, &key_byte) in expanded.iter_mut().zip(round_key) {
		*byte ^= key_byte;
	}

	// Substitute every group down to four bits, two groups per output byte
	let mut substituted = [0u8; 4];
	for (index, sbox) in S_BOXES.iter().enumerate() {
		let value = sbox[(expanded[index] >> 2) as usize];
		if index % 2 > 0 {
			substituted[index >> 1] |= value;
		} else {
			substituted[index >> 1] = value << 4;
		}
	}

	// P-box the substitution output and fold it into the left half
	let mut permuted = [0u8; 4];
	for (position, &source) in P.iter().enumerate() {
		let bit = (source - 1) as usize;
		if substituted[bit >> 3] & BIT[bit & 7] != 0 {
			permuted[position >> 3] |= BIT[position & 7];
		}
	}

	for (byte, folded) in block.iter_mut().zip(permuted) {
		*byte ^= folded;
	}
}

/// Runs one 8-byte block through the transform in place.
///
/// A single round with the trailing half-swap elided is an involution, so
/// the same call performs both encryption and decryption.
pub(crate) fn process_block(block: &mut [u8], key: &CipherKey) {
	permute(block, &IP);
	feistel_round(block, key.round());
	permute(block, &IP_INV);
}

/// Swaps the nibbles of every byte in place. Involution; used on v1 entry
/// names.
pub(crate) fn swap_nibbles(data: &mut [u8]) {
	for byte in data.iter_mut() {
		*byte = (*byte << 4) | (*byte >> 4);
	}
}

/// Obfuscates or restores a v1 entry name in place: every full block runs
/// through the cipher, trailing bytes pass through unchanged.
pub(crate) fn process_name(data: &mut [u8], key: &CipherKey) {
	for block in data.chunks_exact_mut(BLOCK_SIZE) {
		process_block(block, key);
	}
}

/// Derives the mixed-mode cycle length from the decimal digit count of the
/// compressed content length.
fn mixed_cycle(seed: u32) -> usize {
	let mut digits = 0usize;
	let mut rest = seed;
	while rest > 0 {
		rest /= 10;
		digits += 1;
	}
	if digits < 1 {
		digits = 1;
	}

	match digits {
		0..=2 => 1,
		3..=4 => digits + 1,
		5..=6 => digits + 9,
		_ => digits + 0xF,
	}
}

/// The mixed scheme: head blocks and every cycle-th block run through the
/// cipher. A counter runs over the skipped blocks, and each time it
/// reaches seven the block is shuffled instead of copied: a fixed
/// 7-position byte permutation plus an involutive substitution on the
/// eighth byte.
fn process_mixed(data: &mut [u8], cycle: usize, key: &CipherKey, direction: Direction) {
	let mut skipped = 0u8;

	for (index, block) in data.chunks_exact_mut(BLOCK_SIZE).enumerate() {
		if index < HEAD_BLOCKS || index % cycle == 0 {
			process_block(block, key);
		} else {
			if skipped == 7 {
				shuffle_block(block, direction);
				skipped = 0;
			}
			skipped += 1;
		}
	}
}

const SHUFFLE_ENCRYPT: [usize; 7] = [3, 4, 5, 0, 1, 6, 2];
const SHUFFLE_DECRYPT: [usize; 7] = [3, 4, 6, 0, 1, 2, 5];

fn shuffle_block(block: &mut [u8], direction: Direction) {
	let table = match direction {
		Direction::Encrypt => &SHUFFLE_ENCRYPT,
		Direction::Decrypt => &SHUFFLE_DECRYPT,
	};

	let mut copy = [0u8; BLOCK_SIZE];
	copy.copy_from_slice(block);

	for (position, &source) in table.iter().enumerate() {
		block[position] = copy[source];
	}

	block[7] = substitute(copy[7]);
}

/// The eighth-byte substitution of the mixed shuffle. The mapping pairs up
/// fourteen values, so it is its own inverse; unmapped bytes pass through.
fn substitute(byte: u8) -> u8 {
	match byte {
		0x00 => 0x2B,
		0x2B => 0x00,
		0x01 => 0x68,
		0x68 => 0x01,
		0x48 => 0x77,
		0x77 => 0x48,
		0x60 => 0xFF,
		0xFF => 0x60,
		0x6C => 0x80,
		0x80 => 0x6C,
		0xB9 => 0xC0,
		0xC0 => 0xB9,
		0xEB => 0xFE,
		0xFE => 0xEB,
		other => other,
	}
}

/// The head-only scheme: at most the first 0x14 blocks run through the
/// cipher, the rest of the buffer passes through unchanged.
fn process_head(data: &mut [u8], key: &CipherKey) {
	for block in data.chunks_exact_mut(BLOCK_SIZE).take(HEAD_BLOCKS) {
		process_block(block, key);
	}
}

fn process_content(
	data: &mut [u8], seed: u32, flags: EntryFlags, key: &CipherKey, direction: Direction,
) {
	if flags.contains(EntryFlags::MIXCRYPT) {
		process_mixed(data, mixed_cycle(seed), key, direction);
	} else if flags.contains(EntryFlags::DES_0X14) {
		process_head(data, key);
	}
}

/// Obfuscates file content in place according to its flag bits. `seed` is
/// the compressed (unaligned) content length; its decimal digit count
/// drives the mixed-mode cycle and must match between both directions.
pub(crate) fn encrypt_content(data: &mut [u8], seed: u32, flags: EntryFlags, key: &CipherKey) {
	process_content(data, seed, flags, key, Direction::Encrypt);
}

/// Restores file content obfuscated by [`encrypt_content`]
pub(crate) fn decrypt_content(data: &mut [u8], seed: u32, flags: EntryFlags, key: &CipherKey) {
	process_content(data, seed, flags, key, Direction::Decrypt);
}
