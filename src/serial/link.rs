//! Serial link
//!
//! Opens a port, runs a background reader thread and exposes send/flush for
//! the foreground. The reader thread owns the `StreamClassifier`; received
//! chunks are classified there and forwarded with their events over an mpsc
//! channel. Reconfiguration reaches the classifier as `ReaderCommand`s.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use encoding_rs::Encoding;
use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::settings::PortSettings;
use crate::capture::{Direction, HexLog};
use crate::stream::{ClassifierConfig, ClassifierEvent, StreamClassifier};

/// Bytes requested per read
const READ_CHUNK: usize = 4096;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to configure {port}: {source}")]
    Configure {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to enumerate ports: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("Failed to write to port: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to flush input: {0}")]
    Clear(#[source] serialport::Error),

    #[error("Failed to start reader thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Serial port not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// What the reader thread reports
#[derive(Debug)]
pub enum LinkEvent {
    /// A received chunk and the events classified from it. `chunk` is empty
    /// for the final flush when the link closes.
    Rx {
        chunk: Vec<u8>,
        events: Vec<ClassifierEvent>,
    },
    /// Reading failed; the link is closing
    Error(String),
    Closed,
}

/// Classifier reconfiguration delivered to the reader thread
#[derive(Debug, Clone, Copy)]
pub enum ReaderCommand {
    SetEncoding(&'static Encoding),
    SetTimestamp(bool),
    Reset,
}

/// An open serial port with its reader thread
pub struct SerialLink {
    port_name: String,
    writer: Box<dyn SerialPort>,
    capture: Option<Arc<HexLog>>,
    running: Arc<AtomicBool>,
    commands: Sender<ReaderCommand>,
    reader_thread: Option<JoinHandle<()>>,
}

impl SerialLink {
    /// Open `port_name` and start reading.
    ///
    /// Events go to `sink` as `T::from(LinkEvent)`, so a caller can merge
    /// them into its own event channel.
    pub fn open<T>(
        port_name: &str,
        settings: &PortSettings,
        classifier: ClassifierConfig,
        capture: Option<Arc<HexLog>>,
        sink: Sender<T>,
    ) -> Result<Self>
    where
        T: From<LinkEvent> + Send + 'static,
    {
        let mut port = serialport::new(port_name, settings.baud)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| LinkError::Open {
                port: port_name.to_string(),
                source,
            })?;

        if settings.dtr {
            port.write_data_terminal_ready(true)
                .map_err(|source| LinkError::Configure {
                    port: port_name.to_string(),
                    source,
                })?;
        }

        let reader = port.try_clone().map_err(|source| LinkError::Configure {
            port: port_name.to_string(),
            source,
        })?;

        info!(
            "Opened {} at {} baud ({:?}, {:?}, {:?}, flow {:?})",
            port_name,
            settings.baud,
            settings.data_bits,
            settings.parity,
            settings.stop_bits,
            settings.flow_control
        );

        let running = Arc::new(AtomicBool::new(true));
        let (commands, command_rx) = mpsc::channel();

        let reader_thread = {
            let running = running.clone();
            let capture = capture.clone();
            thread::Builder::new()
                .name("serial-reader".to_string())
                .spawn(move || {
                    read_loop(reader, classifier, capture, running, command_rx, sink)
                })
                .map_err(LinkError::Spawn)?
        };

        Ok(Self {
            port_name: port_name.to_string(),
            writer: port,
            capture,
            running,
            commands,
            reader_thread: Some(reader_thread),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Check if the reader is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Write a payload and wait for it to drain. Empty payloads are ignored.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(LinkError::NotOpen);
        }
        if payload.is_empty() {
            return Ok(());
        }

        self.writer.write_all(payload).map_err(LinkError::Write)?;
        self.writer.flush().map_err(LinkError::Write)?;

        if let Some(capture) = &self.capture {
            capture.record(Direction::Tx, payload);
        }
        Ok(())
    }

    /// Discard bytes received but not yet read
    pub fn flush_input(&self) -> Result<()> {
        self.writer.clear(ClearBuffer::Input).map_err(LinkError::Clear)
    }

    /// Forward a reconfiguration to the reader thread's classifier
    pub fn command(&self, command: ReaderCommand) {
        if self.commands.send(command).is_err() {
            debug!("Reader thread gone; dropping {:?}", command);
        }
    }

    /// Stop the reader thread and wait for it
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
            info!("Closed {}", self.port_name);
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop<T>(
    mut port: Box<dyn SerialPort>,
    config: ClassifierConfig,
    capture: Option<Arc<HexLog>>,
    running: Arc<AtomicBool>,
    commands: Receiver<ReaderCommand>,
    sink: Sender<T>,
) where
    T: From<LinkEvent>,
{
    let mut classifier = StreamClassifier::new(config);
    let mut buffer = vec![0u8; READ_CHUNK];

    while running.load(Ordering::SeqCst) {
        while let Ok(command) = commands.try_recv() {
            match command {
                ReaderCommand::SetEncoding(encoding) => classifier.set_encoding(encoding),
                ReaderCommand::SetTimestamp(enabled) => classifier.set_timestamp(enabled),
                ReaderCommand::Reset => classifier.reset(),
            }
        }

        match port.read(&mut buffer) {
            Ok(0) => {}
            Ok(n) => {
                let chunk = buffer[..n].to_vec();
                if let Some(capture) = &capture {
                    capture.record(Direction::Rx, &chunk);
                }
                let events = classifier.feed(&chunk);
                if sink.send(T::from(LinkEvent::Rx { chunk, events })).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {}
            Err(e) => {
                error!("Read failed: {}", e);
                let _ = sink.send(T::from(LinkEvent::Error(format!("Read failed: {}", e))));
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);

    if let Some(name) = classifier.active_table() {
        warn!("Table [{}] still open when the reader stopped", name);
    }
    debug!("Flushing {} buffered bytes", classifier.pending().len());
    let events = classifier.finish();
    if !events.is_empty() {
        let _ = sink.send(T::from(LinkEvent::Rx {
            chunk: Vec::new(),
            events,
        }));
    }
    let _ = sink.send(T::from(LinkEvent::Closed));
}

/// A port reported by the system
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
}

/// List available serial ports
///
/// On macOS, `/dev/tty.*` devices are skipped in favor of `/dev/cu.*`, which
/// do not block on open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(LinkError::Enumerate)?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (kind, description) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    let description = match (info.manufacturer, info.product) {
                        (Some(m), Some(p)) => Some(format!("{} {}", m, p)),
                        (m, p) => p.or(m),
                    };
                    (
                        format!("USB {:04x}:{:04x}", info.vid, info.pid),
                        description,
                    )
                }
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None),
            };
            PortInfo {
                name: p.port_name,
                kind,
                description,
            }
        })
        .collect())
}
