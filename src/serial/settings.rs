//! Conversion from configured framing to serialport crate types.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::warn;

use crate::config::{ConfigError, SerialConfig};

/// Validated port framing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortSettings {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Assert DTR after opening
    pub dtr: bool,
    pub timeout: Duration,
}

impl TryFrom<&SerialConfig> for PortSettings {
    type Error = ConfigError;

    fn try_from(config: &SerialConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            baud: config.baud,
            data_bits: to_data_bits(config.data_bits)?,
            parity: to_parity(&config.parity)?,
            stop_bits: to_stop_bits(config.stop_bits)?,
            flow_control: to_flow_control(config.xonxoff, config.rtscts),
            dtr: config.dsrdtr,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
        })
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_data_bits(bits: u8) -> Result<DataBits, ConfigError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(ConfigError::InvalidDataBits(other)),
    }
}

/// Convert a parity letter or word ("N", "even", ...) to serialport's Parity
pub fn to_parity(s: &str) -> Result<Parity, ConfigError> {
    match s.trim().to_lowercase().as_str() {
        "n" | "none" => Ok(Parity::None),
        "e" | "even" => Ok(Parity::Even),
        "o" | "odd" => Ok(Parity::Odd),
        _ => Err(ConfigError::InvalidParity(s.to_string())),
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub fn to_stop_bits(bits: f32) -> Result<StopBits, ConfigError> {
    if bits == 1.0 {
        Ok(StopBits::One)
    } else if bits == 2.0 {
        Ok(StopBits::Two)
    } else {
        Err(ConfigError::UnsupportedStopBits(bits))
    }
}

pub fn to_flow_control(xonxoff: bool, rtscts: bool) -> FlowControl {
    match (xonxoff, rtscts) {
        (true, true) => {
            warn!("Both XON/XOFF and RTS/CTS requested; using RTS/CTS");
            FlowControl::Hardware
        }
        (false, true) => FlowControl::Hardware,
        (true, false) => FlowControl::Software,
        (false, false) => FlowControl::None,
    }
}
