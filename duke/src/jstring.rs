//! Conversion between the modified UTF-8 of class files and [`JavaString`].
//!
//! Modified UTF-8 stores `\0` using the two bytes `0xc0 0x80` and code points outside the basic multilingual plane as
//! two three byte encoded surrogates.
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se9/html/jvms-4.html#jvms-4.4.7>.

use std::borrow::Cow;
use anyhow::{anyhow, Result};
use java_string::{JavaStr, JavaString};
use crate::ClassError;

/// Decodes the contents of a `CONSTANT_Utf8_info`. Malformed input fails with [`ClassError::BadString`].
pub(crate) fn decode(bytes: &[u8]) -> Result<JavaString> {
	JavaString::from_modified_utf8(bytes.to_vec())
		.map_err(|_| anyhow!(ClassError::BadString))
}

/// Encodes a string as the contents of a `CONSTANT_Utf8_info`.
pub(crate) fn encode(string: &JavaStr) -> Cow<[u8]> {
	string.to_modified_utf8()
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::ClassError;
	use crate::jstring::{decode, encode};

	fn both_ways(raw: &[u8], string: &str) -> Result<()> {
		let string = JavaStr::from_str(string);
		assert_eq!(encode(string), raw);
		assert_eq!(decode(raw)?, string);
		Ok(())
	}

	#[test]
	fn ascii_is_unchanged() -> Result<()> {
		both_ways(b"java/lang/Object", "java/lang/Object")?;
		both_ways(b"<init>", "<init>")
	}

	#[test]
	fn nul_takes_two_bytes() -> Result<()> {
		both_ways(&[b'a', 0xc0, 0x80, b'b'], "a\0b")
	}

	#[test]
	fn multi_byte() -> Result<()> {
		// U+00E9, U+20AC
		both_ways(&[0xc3, 0xa9, 0xe2, 0x82, 0xac], "\u{e9}\u{20ac}")?;
		// U+1F600 as the surrogates D83D DE00
		both_ways(&[0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80], "\u{1f600}")
	}

	#[test]
	fn lone_surrogate_survives() -> Result<()> {
		let raw = [b'x', 0xed, 0xb0, 0x80];
		assert_eq!(encode(&decode(&raw)?), &raw[..]);
		Ok(())
	}

	#[test]
	fn malformed() {
		for bytes in [&[0xff][..], &[0xc0][..], &[0xe0, 0x80][..], &[0x80, 0x80][..]] {
			let err = decode(bytes).unwrap_err();
			assert_eq!(ClassError::find(&err), Some(&ClassError::BadString));
		}
	}
}
