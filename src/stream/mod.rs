//! Receive-side stream processing.
//!
//! - **classifier**: line reassembly and channel routing (the stateful part)
//! - **route**: tag and dynamic-table marker grammar
//! - **ansi**: SGR color decoding into styled runs
//! - **charset**: encoding lookup and lossy decoding
//!
//! # Data Flow
//!
//! ```text
//! serial bytes
//! └── StreamClassifier::feed
//!     ├── line reassembly (LF, optional CR, bounded length)
//!     ├── charset::decode_lossy
//!     ├── ansi::decode  -> styled runs + plain text
//!     └── route         -> Clear / Line events for All, [tag], [table]
//! ```

pub mod ansi;
pub mod charset;
pub mod classifier;
pub mod route;

pub use ansi::{AttrFlags, Color, ColorStyle, StyledRun};
pub use classifier::{
    Channel, ClassifiedLine, ClassifierConfig, ClassifierEvent, LineBoundary, StreamClassifier,
    DEFAULT_MAX_LINE_LEN,
};
