//! Send-side payload codecs.
//!
//! Turns free-form user input into the exact bytes written to the port:
//!
//! - **payload**: format dispatch (`SendFormat`) and the integer/base64/file encoders
//! - **escape**: backslash escape expansion for text sends
//! - **hexfmt**: hex parsing and the canonical `AA 55 01` hex view
//!
//! Every encoder is a pure function. A send either yields the full buffer or
//! an error; there is no partial output.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod escape;
pub mod hexfmt;
pub mod payload;

pub use hexfmt::{format_hex, parse_hex};
pub use payload::{encode, EolMode, SendFormat, SendOptions};

/// Malformed send input
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("hex input has an odd number of digits ({digits})")]
    OddHexLength { digits: usize },

    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("invalid integer: {token:?}")]
    InvalidInteger { token: String },

    #[error("{kind} out of range: {token:?}")]
    OutOfRange { kind: &'static str, token: String },
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;
