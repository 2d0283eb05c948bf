//! HEX capture log
//!
//! Appends one line per transmitted or received chunk:
//!
//! ```text
//! 12:30:01.042 TX 48 65 6C 6C 6F 0D 0A
//! 12:30:01.107 RX 4F 4B 0D 0A
//! ```
//!
//! The timestamp prefix is only written when enabled. The reader thread and
//! the shell share one log, so each line is written under a single lock.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::codec::format_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
        })
    }
}

/// `HH:MM:SS.mmm `, the prefix used by the log and the receive view
pub fn clock_prefix(now: &DateTime<Local>) -> String {
    format!("{} ", now.format("%H:%M:%S%.3f"))
}

fn format_entry(direction: Direction, bytes: &[u8], now: Option<&DateTime<Local>>) -> String {
    let prefix = now.map(clock_prefix).unwrap_or_default();
    format!("{}{} {}\n", prefix, direction, format_hex(bytes))
}

pub struct HexLog {
    file: Mutex<File>,
    timestamp: AtomicBool,
}

impl HexLog {
    /// Open `path` for appending
    pub fn open(path: &Path, timestamp: bool) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            timestamp: AtomicBool::new(timestamp),
        })
    }

    pub fn set_timestamp(&self, enabled: bool) {
        self.timestamp.store(enabled, Ordering::SeqCst);
    }

    /// Append one chunk. Failures are logged, never propagated.
    pub fn record(&self, direction: Direction, bytes: &[u8]) {
        let now = Local::now();
        let stamp = self.timestamp.load(Ordering::SeqCst).then_some(&now);
        let entry = format_entry(direction, bytes, stamp);

        let Ok(mut file) = self.file.lock() else {
            warn!("Capture log lock poisoned; dropping {} entry", direction);
            return;
        };
        if let Err(e) = file.write_all(entry.as_bytes()).and_then(|_| file.flush()) {
            warn!("Failed to write capture log: {}", e);
        }
    }
}
