//! Common utilities and helper functions
//!
//! Encoding lookup and strict decoding shared by the file source and the
//! CLI validation layer.

use encoding_rs::Encoding;
use std::borrow::Cow;

/// Look up a text encoding by its WHATWG label (`shift_jis`, `utf-8`, `euc-jp`, ...)
///
/// Labels that only map to the replacement encoding are rejected, since
/// decoding with it discards the whole input.
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label_no_replacement(label.trim().as_bytes())
}

/// Decode bytes with the given encoding, failing on any malformed sequence
///
/// No BOM sniffing takes place and nothing is trimmed, so the returned text
/// corresponds exactly to the input bytes. Input that is already valid in an
/// ASCII-compatible encoding is borrowed rather than copied.
pub fn decode_strict<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Option<Cow<'a, str>> {
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}
