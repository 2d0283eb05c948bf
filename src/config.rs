//! Configuration management for sertap.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.sertap/config.toml`
//! - Validation of serial framing and display settings
//! - Conversion into classifier and send options
//!
//! # Configuration File
//!
//! ```toml
//! # Optional HEX capture log of every TX/RX chunk
//! log_path = "serial.log"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! data_bits = 8
//! parity = "N"        # N, E, O
//! stop_bits = 1.0     # 1 or 2
//! xonxoff = false
//! rtscts = false
//! dsrdtr = false
//! timeout_ms = 100
//!
//! [display]
//! encoding = "utf-8"
//! rx = "both"         # text, hex, both
//! timestamp = false
//! eol = "crlf"        # none, lf, cr, crlf
//! escapes = false
//! max_line_len = 65536
//! tag_history = 500
//! max_tags = 256
//! ```
//!
//! Command-line flags override values from the file.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::codec::{EolMode, SendOptions};
use crate::stream::{charset, ClassifierConfig, DEFAULT_MAX_LINE_LEN};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Invalid parity {0:?} (expected N, E or O)")]
    InvalidParity(String),

    #[error("Unsupported stop bits: {0} (expected 1 or 2)")]
    UnsupportedStopBits(f32),

    #[error("Invalid data bits: {0} (expected 5-8)")]
    InvalidDataBits(u8),

    #[error("Invalid value for {option}: {value:?}")]
    InvalidValue { option: &'static str, value: String },

    #[error("No serial port configured. Use --port, or --list to see ports")]
    MissingPort,

    #[error("Could not determine config path")]
    NoConfigPath,

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config: {0}")]
    Write(#[source] io::Error),
}

/// What the receive view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RxMode {
    Text,
    Hex,
    #[default]
    Both,
}

impl RxMode {
    pub fn shows_text(&self) -> bool {
        matches!(self, RxMode::Text | RxMode::Both)
    }

    pub fn shows_hex(&self) -> bool {
        matches!(self, RxMode::Hex | RxMode::Both)
    }
}

impl FromStr for RxMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(RxMode::Text),
            "hex" => Ok(RxMode::Hex),
            "both" => Ok(RxMode::Both),
            other => Err(ConfigError::InvalidValue {
                option: "rx",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RxMode::Text => "text",
            RxMode::Hex => "hex",
            RxMode::Both => "both",
        })
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HEX capture log path
    pub log_path: Option<String>,
    /// Port and framing
    pub serial: SerialConfig,
    /// Receive view and send defaults
    pub display: DisplayConfig,
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: Option<String>,
    pub baud: u32,
    pub data_bits: u8,
    pub parity: String, // "N", "E", "O"
    pub stop_bits: f32,
    pub xonxoff: bool,
    pub rtscts: bool,
    pub dsrdtr: bool,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115200,
            data_bits: 8,
            parity: "N".to_string(),
            stop_bits: 1.0,
            xonxoff: false,
            rtscts: false,
            dsrdtr: false,
            timeout_ms: 100,
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub encoding: String,
    pub rx: RxMode,
    pub timestamp: bool,
    pub eol: EolMode,
    pub escapes: bool,
    pub max_line_len: usize,
    /// Lines kept per tag channel
    pub tag_history: usize,
    /// Named channels tracked for `:tags` and `:show`
    pub max_tags: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            rx: RxMode::Both,
            timestamp: false,
            eol: EolMode::Crlf,
            escapes: false,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            tag_history: 500,
            max_tags: 256,
        }
    }
}

impl DisplayConfig {
    pub fn resolve_encoding(&self) -> Result<&'static Encoding, ConfigError> {
        charset::lookup(&self.encoding)
            .ok_or_else(|| ConfigError::UnknownEncoding(self.encoding.clone()))
    }

    pub fn classifier_config(&self) -> Result<ClassifierConfig, ConfigError> {
        Ok(ClassifierConfig {
            encoding: self.resolve_encoding()?,
            timestamp: self.timestamp,
            max_line_len: self.max_line_len,
        })
    }

    pub fn send_options(&self) -> Result<SendOptions, ConfigError> {
        Ok(SendOptions {
            eol: self.eol,
            escapes: self.escapes,
            encoding: self.resolve_encoding()?,
        })
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!("Ignoring {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::get_config_path().ok_or(ConfigError::NoConfigPath)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(ConfigError::Write)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }
}

/// `~/.sertap`, created on first use
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".sertap");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.serial.baud, 115200);
        assert_eq!(config.serial.parity, "N");
        assert_eq!(config.display.rx, RxMode::Both);
        assert_eq!(config.display.eol, EolMode::Crlf);
        assert!(config.log_path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "COM3"
            baud = 9600

            [display]
            rx = "text"
            eol = "lf"
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("COM3"));
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.display.rx, RxMode::Text);
        assert_eq!(config.display.eol, EolMode::Lf);
        assert_eq!(config.display.encoding, "utf-8");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.serial.port = Some("/dev/ttyACM0".to_string());
        config.display.timestamp = true;
        config.log_path = Some("rx.log".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(loaded.display.timestamp);
        assert_eq!(loaded.log_path.as_deref(), Some("rx.log"));
    }

    #[test]
    fn test_bad_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[display]\nrx = \"sideways\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let display = DisplayConfig {
            encoding: "klingon".to_string(),
            ..DisplayConfig::default()
        };
        assert!(matches!(
            display.classifier_config(),
            Err(ConfigError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_send_options_follow_display() {
        let display = DisplayConfig {
            eol: EolMode::Lf,
            escapes: true,
            encoding: "shift_jis".to_string(),
            ..DisplayConfig::default()
        };
        let options = display.send_options().unwrap();
        assert_eq!(options.eol, EolMode::Lf);
        assert!(options.escapes);
        assert_eq!(options.encoding, encoding_rs::SHIFT_JIS);
    }

    #[test]
    fn test_rx_mode_parse() {
        assert_eq!("HEX".parse::<RxMode>().unwrap(), RxMode::Hex);
        assert!(RxMode::Both.shows_text() && RxMode::Both.shows_hex());
        assert!(!RxMode::Text.shows_hex());
        assert!("binary".parse::<RxMode>().is_err());
    }
}
