//! Source-text helpers: legacy encoding and accent-insensitive keys.

use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Decode a published file into text.
///
/// Regulator and exchange files are ISO-8859-1, but re-exported copies are
/// sometimes UTF-8. Valid UTF-8 is kept as-is.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(s);
    }
    let (decoded, _, _) = WINDOWS_1252.decode(bytes);
    decoded
}

/// Lower-case, accent-free key for name matching and ordering.
pub fn fold_name(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_bytes_are_transcoded() {
        let (bytes, _, _) = WINDOWS_1252.encode("Balanço Patrimonial");
        assert_eq!(decode_text(&bytes), "Balanço Patrimonial");
    }

    #[test]
    fn utf8_with_bom_is_kept() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Demonstração".as_bytes());
        assert_eq!(decode_text(&bytes), "Demonstração");
    }

    #[test]
    fn fold_strips_accents_and_case() {
        assert_eq!(fold_name("ÁGUAS DO BRASIL"), "aguas do brasil");
        assert_eq!(fold_name("Cia. Energética"), "cia. energetica");
    }
}
