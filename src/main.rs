//! sertap - A serial port terminal with tagged and table channels
//!
//! sertap sends free-form input in several formats (text with escapes, hex,
//! base64, 16-bit integer lists, raw files) and splits the received stream
//! into channels: everything, lines tagged `[name]`, and live-refreshing
//! tables delimited by `[&Table][name][Start]` / `[&Table][name][End]`.
//!
//! # Quick Start
//!
//! ```text
//! sertap --list                      # List serial ports
//! sertap --port /dev/ttyUSB0         # Connect at 115200 8N1
//! sertap --port COM3 --baud 9600 --rx text --timestamp
//! ```
//!
//! # Receive Modes
//!
//! | Mode | Output |
//! |------|--------|
//! | text | Classified lines with device colors |
//! | hex  | One `RX AA 55 ..` line per chunk |
//! | both | Both of the above |

mod capture;
mod codec;
mod config;
mod serial;
mod shell;
mod stream;

use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::capture::HexLog;
use crate::codec::EolMode;
use crate::config::{config_dir, Config, RxMode};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the command line asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Run,
    List,
    Help,
    Version,
}

fn print_version() {
    eprintln!("sertap {}", VERSION);
}

fn print_help() {
    eprintln!("sertap {} - Serial port terminal with tagged channels", VERSION);
    eprintln!();
    eprintln!("Usage: sertap [OPTIONS]");
    eprintln!();
    eprintln!("Port options:");
    eprintln!("  --list                List available serial ports");
    eprintln!("  --port <NAME>         Serial port, e.g. COM3 or /dev/ttyUSB0");
    eprintln!("  --baud <RATE>         Baud rate (default: 115200)");
    eprintln!("  --bytesize <5-8>      Data bits (default: 8)");
    eprintln!("  --parity <N|E|O>      Parity (default: N)");
    eprintln!("  --stopbits <1|2>      Stop bits (default: 1)");
    eprintln!("  --xonxoff             Software flow control");
    eprintln!("  --rtscts              Hardware flow control");
    eprintln!("  --dsrdtr              Assert DTR after opening");
    eprintln!("  --timeout <SECONDS>   Read timeout (default: 0.1)");
    eprintln!();
    eprintln!("Display options:");
    eprintln!("  --encoding <LABEL>    Text encoding (default: utf-8)");
    eprintln!("  --rx <text|hex|both>  Receive view (default: both)");
    eprintln!("  --timestamp           Prefix lines with HH:MM:SS.mmm");
    eprintln!("  --log <PATH>          Append RX/TX as HEX to a file");
    eprintln!();
    eprintln!("Send options:");
    eprintln!("  --eol <none|lf|cr|crlf>  Line ending for text (default: crlf)");
    eprintln!("  --escapes             Interpret \\n, \\r, \\t, \\\\, \\xNN in text");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.sertap/config.toml");
    eprintln!("Diagnostics:   ~/.sertap/sertap.log (level from SERTAP_LOG, default info)");
    eprintln!();
    eprintln!("Type :help after connecting for interactive commands.");
}

/// Apply command-line flags on top of the loaded configuration
fn parse_args(args: &[String], config: &mut Config) -> Result<Mode, String> {
    let mut mode = Mode::Run;
    let mut i = 0;

    while i < args.len() {
        let flag = args[i].as_str();

        match flag {
            "-h" | "--help" => return Ok(Mode::Help),
            "-v" | "--version" => return Ok(Mode::Version),
            "--list" => mode = Mode::List,
            // Port
            "--port" => config.serial.port = Some(value(args, &mut i, flag)?.to_string()),
            "--baud" => config.serial.baud = parse_number(flag, value(args, &mut i, flag)?)?,
            "--bytesize" => config.serial.data_bits = parse_number(flag, value(args, &mut i, flag)?)?,
            "--parity" => config.serial.parity = value(args, &mut i, flag)?.to_uppercase(),
            "--stopbits" => config.serial.stop_bits = parse_number(flag, value(args, &mut i, flag)?)?,
            "--xonxoff" => config.serial.xonxoff = true,
            "--rtscts" => config.serial.rtscts = true,
            "--dsrdtr" => config.serial.dsrdtr = true,
            "--timeout" => {
                let seconds: f64 = parse_number(flag, value(args, &mut i, flag)?)?;
                if seconds.is_nan() || seconds < 0.0 {
                    return Err(format!("Invalid value for {}: {}", flag, seconds));
                }
                config.serial.timeout_ms = (seconds * 1000.0).round() as u64;
            }
            // Display
            "--encoding" => config.display.encoding = value(args, &mut i, flag)?.to_string(),
            "--rx" => {
                config.display.rx = value(args, &mut i, flag)?.parse::<RxMode>().map_err(|e| e.to_string())?
            }
            "--timestamp" => config.display.timestamp = true,
            "--log" => config.log_path = Some(value(args, &mut i, flag)?.to_string()),
            // Send
            "--eol" => config.display.eol = value(args, &mut i, flag)?.parse::<EolMode>()?,
            "--escapes" => config.display.escapes = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(mode)
}

/// Take the value following `flag`
fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Log to ~/.sertap/sertap.log so diagnostics never mix with the console
fn init_logging() {
    let Some(dir) = config_dir() else {
        return;
    };
    let Ok(file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("sertap.log"))
    else {
        return;
    };

    let filter = EnvFilter::try_from_env("SERTAP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serial::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        println!(
            "{}\t{}\t{}",
            port.name,
            port.kind,
            port.description.unwrap_or_default()
        );
    }
    Ok(())
}

fn run(config: Config) -> anyhow::Result<()> {
    let capture = match &config.log_path {
        Some(path) => {
            let log = HexLog::open(Path::new(path), config.display.timestamp)
                .with_context(|| format!("Failed to open log file {}", path))?;
            info!("Capturing RX/TX to {}", path);
            Some(Arc::new(log))
        }
        None => None,
    };

    shell::run(config, capture)
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut config = Config::load();

    let mode = match parse_args(&args, &mut config) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(2);
        }
    };

    match mode {
        Mode::Help => print_help(),
        Mode::Version => print_version(),
        Mode::List => list_ports()?,
        Mode::Run => {
            info!("sertap {} starting", VERSION);
            run(config)?;
        }
    }
    Ok(())
}
