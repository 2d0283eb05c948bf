//! Serial transport.
//!
//! - **link**: port ownership, background reader thread, send/flush
//! - **settings**: framing validation and serialport conversions

pub mod link;
pub mod settings;

pub use link::{list_ports, LinkEvent, PortInfo, ReaderCommand, SerialLink};
pub use settings::PortSettings;
