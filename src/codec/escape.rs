//! Backslash escape expansion
//!
//! Recognizes `\n`, `\r`, `\t`, `\\` and `\xHH` (exactly two hex digits).
//! Expansion is lenient: any other escape, a `\x` without two hex digits and
//! a trailing lone backslash are all kept as literal text.

use encoding_rs::Encoding;

/// Expand escapes, encoding literal text with `encoding`.
///
/// Escaped bytes are emitted raw, so `\xFF` is always the single byte `0xFF`
/// whatever the text encoding is.
pub fn expand_with(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut literal = String::new();
    let mut rest = text;

    while let Some(pos) = rest.find('\\') {
        literal.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let escaped = match after.as_bytes().first() {
            Some(b'n') => Some((b'\n', 1)),
            Some(b'r') => Some((b'\r', 1)),
            Some(b't') => Some((b'\t', 1)),
            Some(b'\\') => Some((b'\\', 1)),
            Some(b'x') => hex_byte(&after[1..]).map(|byte| (byte, 3)),
            _ => None,
        };

        match escaped {
            Some((byte, consumed)) => {
                flush_literal(&mut out, &mut literal, encoding);
                out.push(byte);
                rest = &after[consumed..];
            }
            None => {
                literal.push('\\');
                rest = after;
            }
        }
    }

    literal.push_str(rest);
    flush_literal(&mut out, &mut literal, encoding);
    out
}

fn hex_byte(s: &str) -> Option<u8> {
    let digits = s.as_bytes();
    if digits.len() < 2 || !digits[0].is_ascii_hexdigit() || !digits[1].is_ascii_hexdigit() {
        return None;
    }
    u8::from_str_radix(&s[..2], 16).ok()
}

fn flush_literal(out: &mut Vec<u8>, literal: &mut String, encoding: &'static Encoding) {
    if literal.is_empty() {
        return;
    }
    let (bytes, _, _) = encoding.encode(literal);
    out.extend_from_slice(&bytes);
    literal.clear();
}
