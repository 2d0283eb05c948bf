//! Hex parsing and hex view
//!
//! Input like `AA55`, `aa 55 01`, `0xAA,0x55` or `AA:55` all parse to the same
//! bytes. Separators are whitespace, `,`, `;` and `:`; a `0x`/`0X` prefix is
//! dropped from each token. Remaining non-hex characters are ignored.

use super::FormatError;

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ',' | ';' | ':')
}

/// Parse hex text into bytes
pub fn parse_hex(text: &str) -> Result<Vec<u8>, FormatError> {
    let mut digits = String::with_capacity(text.len());

    for token in text.split(is_separator).filter(|t| !t.is_empty()) {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        digits.extend(token.chars().filter(|c| c.is_ascii_hexdigit()));
    }

    if digits.len() % 2 != 0 {
        return Err(FormatError::OddHexLength {
            digits: digits.len(),
        });
    }

    // Only hex digits remain, so decoding cannot fail on content
    hex::decode(&digits).map_err(|_| FormatError::OddHexLength {
        digits: digits.len(),
    })
}

/// Format bytes as upper-case pairs separated by spaces (`AA 55 01`)
pub fn format_hex(bytes: &[u8]) -> String {
    let digits = hex::encode_upper(bytes);
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(char::from(pair[0]));
        out.push(char::from(pair[1]));
    }
    out
}
