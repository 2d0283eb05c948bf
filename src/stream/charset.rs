//! Text encoding lookup and lossy decoding

use encoding_rs::Encoding;

/// Resolve an encoding label such as `utf-8`, `shift_jis` or `latin1`
pub fn lookup(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Decode bytes, substituting U+FFFD for malformed sequences.
///
/// BOM sniffing is disabled: a BOM in the middle of a serial stream must not
/// switch the encoding of one line.
pub fn decode_lossy(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_labels() {
        assert_eq!(lookup("utf-8"), Some(encoding_rs::UTF_8));
        assert_eq!(lookup(" UTF8 "), Some(encoding_rs::UTF_8));
        assert_eq!(lookup("sjis"), Some(encoding_rs::SHIFT_JIS));
        assert_eq!(lookup("latin1"), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(lookup("klingon"), None);
    }

    #[test]
    fn test_decode_replaces_invalid() {
        let text = decode_lossy(encoding_rs::UTF_8, b"ok\xFFok");
        assert_eq!(text, "ok\u{FFFD}ok");
    }

    #[test]
    fn test_decode_shift_jis() {
        let text = decode_lossy(encoding_rs::SHIFT_JIS, &[0x82, 0xA0]);
        assert_eq!(text, "\u{3042}");
    }
}
