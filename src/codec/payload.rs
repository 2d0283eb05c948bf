//! Send format dispatch
//!
//! `encode` maps a `SendFormat` plus raw user input to the bytes to transmit.

use std::fmt;
use std::fs;
use std::num::IntErrorKind;
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

use super::{escape, hexfmt, CodecError, FormatError, Result};

/// How user input is turned into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendFormat {
    Text,
    Hex,
    Base64,
    U16Le,
    U16Be,
    I16Le,
    I16Be,
    File,
}

impl SendFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SendFormat::Text => "text",
            SendFormat::Hex => "hex",
            SendFormat::Base64 => "base64",
            SendFormat::U16Le => "u16le",
            SendFormat::U16Be => "u16be",
            SendFormat::I16Le => "i16le",
            SendFormat::I16Be => "i16be",
            SendFormat::File => "file",
        }
    }
}

impl FromStr for SendFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(SendFormat::Text),
            "hex" => Ok(SendFormat::Hex),
            "b64" | "base64" => Ok(SendFormat::Base64),
            "u16le" => Ok(SendFormat::U16Le),
            "u16be" => Ok(SendFormat::U16Be),
            "i16le" => Ok(SendFormat::I16Le),
            "i16be" => Ok(SendFormat::I16Be),
            "file" => Ok(SendFormat::File),
            other => Err(format!("unknown send format: {:?}", other)),
        }
    }
}

impl fmt::Display for SendFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Line terminator appended to text sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EolMode {
    None,
    Lf,
    Cr,
    #[default]
    Crlf,
}

impl EolMode {
    pub fn suffix(&self) -> &'static [u8] {
        match self {
            EolMode::None => b"",
            EolMode::Lf => b"\n",
            EolMode::Cr => b"\r",
            EolMode::Crlf => b"\r\n",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EolMode::None => "none",
            EolMode::Lf => "lf",
            EolMode::Cr => "cr",
            EolMode::Crlf => "crlf",
        }
    }
}

impl FromStr for EolMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(EolMode::None),
            "lf" => Ok(EolMode::Lf),
            "cr" => Ok(EolMode::Cr),
            "crlf" => Ok(EolMode::Crlf),
            other => Err(format!("unknown eol: {:?}", other)),
        }
    }
}

/// Options that only affect `SendFormat::Text`
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub eol: EolMode,
    pub escapes: bool,
    /// Encoding for literal characters of text sends
    pub encoding: &'static Encoding,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            eol: EolMode::None,
            escapes: false,
            encoding: UTF_8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WordKind {
    U16,
    I16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Endian {
    Little,
    Big,
}

/// Encode user input into the exact bytes to transmit
pub fn encode(format: SendFormat, input: &str, options: &SendOptions) -> Result<Vec<u8>> {
    let bytes = match format {
        SendFormat::Text => encode_text(input, options),
        SendFormat::Hex => hexfmt::parse_hex(input)?,
        SendFormat::Base64 => parse_base64(input)?,
        SendFormat::U16Le => pack_words(input, WordKind::U16, Endian::Little)?,
        SendFormat::U16Be => pack_words(input, WordKind::U16, Endian::Big)?,
        SendFormat::I16Le => pack_words(input, WordKind::I16, Endian::Little)?,
        SendFormat::I16Be => pack_words(input, WordKind::I16, Endian::Big)?,
        SendFormat::File => read_file(Path::new(input))?,
    };
    Ok(bytes)
}

fn encode_text(input: &str, options: &SendOptions) -> Vec<u8> {
    let mut out = if options.escapes {
        escape::expand_with(input, options.encoding)
    } else {
        let (bytes, _, _) = options.encoding.encode(input);
        bytes.into_owned()
    };
    out.extend_from_slice(options.eol.suffix());
    out
}

/// Strict standard-alphabet base64; ASCII whitespace is ignored
pub fn parse_base64(text: &str) -> std::result::Result<Vec<u8>, FormatError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Ok(Vec::new());
    }
    Ok(BASE64_STANDARD.decode(compact)?)
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer, with optional sign
pub fn parse_int(token: &str) -> std::result::Result<i64, FormatError> {
    let invalid = || FormatError::InvalidInteger {
        token: token.to_string(),
    };

    let (negative, unsigned) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };

    let (digits, radix) = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (unsigned, 10),
    };

    // from_str_radix would accept a second sign here
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    match i64::from_str_radix(digits, radix) {
        Ok(value) => Ok(if negative { -value } else { value }),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                Err(FormatError::OutOfRange {
                    kind: "integer",
                    token: token.to_string(),
                })
            }
            _ => Err(invalid()),
        },
    }
}

fn pack_words(input: &str, kind: WordKind, endian: Endian) -> std::result::Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();

    for token in input.split_whitespace() {
        let value = parse_int(token)?;
        let word = match kind {
            WordKind::U16 => u16::try_from(value)
                .map_err(|_| FormatError::OutOfRange {
                    kind: "u16",
                    token: token.to_string(),
                })?,
            WordKind::I16 => i16::try_from(value)
                .map_err(|_| FormatError::OutOfRange {
                    kind: "i16",
                    token: token.to_string(),
                })? as u16,
        };
        match endian {
            Endian::Little => out.extend_from_slice(&word.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&word.to_be_bytes()),
        }
    }

    Ok(out)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}
