//! The legacy filename codec. Entry names travel as code page 949 bytes
//! with backslash separators; lookups go through a case-insensitive rolling
//! hash over that encoded form.

use encoding_rs::EUC_KR;

/// Normalizes a path for storage: forward slashes become backslashes.
pub fn normalize(name: &str) -> String {
	name.replace('/', "\\")
}

/// Encodes a name into its legacy code page 949 byte form, without a
/// terminator. Characters outside the code page degrade to replacements,
/// they do not fail the encode.
pub fn encode_name(name: &str) -> Vec<u8> {
	let (bytes, _, _) = EUC_KR.encode(name);
	bytes.into_owned()
}

/// Decodes a stored code page 949 name, normalizing separators
pub fn decode_name(bytes: &[u8]) -> String {
	let (name, _, _) = EUC_KR.decode(bytes);
	normalize(&name)
}

/// Creates the lookup hash of a name.
///
/// The hash runs over the uppercased encoded bytes of the normalized name,
/// making lookups case-insensitive and independent of the separator style
/// the caller used.
pub fn name_hash(name: &str) -> u32 {
	let mut hash = 0u32;
	for byte in encode_name(&normalize(name)) {
		hash = hash
			.wrapping_shl(5)
			.wrapping_add(hash)
			.wrapping_add(byte.to_ascii_uppercase() as u32);
	}

	hash
}
