//! Byte-to-text conversion.

use encoding_rs::Encoding;
use tracing::debug;

/// Resolve an encoding label.
///
/// WHATWG labels are tried first, then common spellings such as `latin_1`,
/// `utf_8` or `utf-8-sig`.
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().to_ascii_lowercase();
    let aliased = match label.as_str() {
        "utf-8-sig" | "utf_8_sig" | "utf8-sig" => "utf-8",
        "utf_16_le" | "utf-16-le" => "utf-16le",
        "utf_16_be" | "utf-16-be" => "utf-16be",
        "latin_1" | "latin-1" => "latin1",
        other => other,
    };

    Encoding::for_label(aliased.as_bytes())
        .or_else(|| Encoding::for_label(aliased.replace('_', "-").as_bytes()))
        .or_else(|| Encoding::for_label(aliased.replace(['_', '-'], "").as_bytes()))
}

/// Decode `data`, dropping any byte-order mark and embedded NUL characters.
///
/// Malformed sequences become U+FFFD rather than failing the file.
pub fn decode_text(data: &[u8], encoding: &'static Encoding) -> String {
    let (text, actual, had_errors) = encoding.decode(data);
    if had_errors {
        debug!(encoding = actual.name(), "Replaced malformed byte sequences");
    }
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text.into_owned()
    }
}
