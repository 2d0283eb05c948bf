//! Receive-stream classifier
//!
//! Reassembles arbitrary byte chunks into lines and routes every line to the
//! `All` channel plus, optionally, a tag channel and the channel of the active
//! dynamic table. The classifier owns the only cross-chunk state (partial line
//! bytes and the table session), so one instance serves exactly one stream and
//! must be driven by a single owner.

use std::fmt;
use std::mem;

use chrono::{DateTime, Local};
use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};

use super::ansi::{self, StyledRun};
use super::charset;
use super::route::{self, TableMarker};

/// Default bound on buffered bytes of one unterminated line
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// A logical display channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    All,
    Tag(String),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::All => f.write_str("[ALL]"),
            Channel::Tag(name) => write!(f, "[{}]", name),
        }
    }
}

/// How a line was delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineBoundary {
    /// Terminated by LF (a preceding CR is dropped)
    Newline,
    /// Forced split at the buffered-line bound
    Split,
    /// Unterminated remainder flushed by `finish`
    Partial,
}

/// One reassembled line with its routing
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedLine {
    pub timestamp: Option<DateTime<Local>>,
    /// Line bytes without the terminator
    pub raw: Vec<u8>,
    /// Decoded text, escape sequences included
    pub text: String,
    /// Visible text; routing is decided on this
    pub plain: String,
    pub runs: Vec<StyledRun>,
    pub tag: Option<String>,
    pub table: Option<String>,
    pub boundary: LineBoundary,
}

impl ClassifiedLine {
    /// Every channel this line is appended to, `All` first
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = vec![Channel::All];
        if let Some(tag) = &self.tag {
            channels.push(Channel::Tag(tag.clone()));
        }
        if let Some(table) = &self.table {
            if self.tag.as_ref() != Some(table) {
                channels.push(Channel::Tag(table.clone()));
            }
        }
        channels
    }
}

/// Output of the classifier, in stream order
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierEvent {
    /// Clear the channel and bring it to front; precedes the table's content
    Clear(Channel),
    Line(ClassifiedLine),
}

/// Receive-side settings
#[derive(Debug, Clone, Copy)]
pub struct ClassifierConfig {
    pub encoding: &'static Encoding,
    pub timestamp: bool,
    pub max_line_len: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            timestamp: false,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// The dynamic table currently being refreshed
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableSession {
    name: String,
}

pub struct StreamClassifier {
    config: ClassifierConfig,
    buffer: Vec<u8>,
    table: Option<TableSession>,
}

impl Default for StreamClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl StreamClassifier {
    pub fn new(mut config: ClassifierConfig) -> Self {
        config.max_line_len = config.max_line_len.max(1);
        Self {
            config,
            buffer: Vec::new(),
            table: None,
        }
    }

    pub fn set_encoding(&mut self, encoding: &'static Encoding) {
        self.config.encoding = encoding;
    }

    pub fn set_timestamp(&mut self, enabled: bool) {
        self.config.timestamp = enabled;
    }

    /// Name of the active table session, if any
    pub fn active_table(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.name.as_str())
    }

    /// Bytes held for the next chunk
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Feed a chunk received now
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ClassifierEvent> {
        self.feed_at(chunk, Local::now())
    }

    /// Feed a chunk, stamping completed lines with `now`
    pub fn feed_at(&mut self, chunk: &[u8], now: DateTime<Local>) -> Vec<ClassifierEvent> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..pos], now, &mut events);
            let mut line = mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.classify(line, LineBoundary::Newline, now, &mut events);
            rest = &rest[pos + 1..];
        }
        self.append(rest, now, &mut events);

        events
    }

    /// Flush an unterminated trailing line, e.g. when the port closes
    pub fn finish(&mut self) -> Vec<ClassifierEvent> {
        self.finish_at(Local::now())
    }

    pub fn finish_at(&mut self, now: DateTime<Local>) -> Vec<ClassifierEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = mem::take(&mut self.buffer);
            self.classify(line, LineBoundary::Partial, now, &mut events);
        }
        events
    }

    /// Drop buffered bytes and any table session
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.table = None;
    }

    /// Buffer line bytes, splitting before the bound would be exceeded
    fn append(&mut self, mut bytes: &[u8], now: DateTime<Local>, events: &mut Vec<ClassifierEvent>) {
        let max = self.config.max_line_len;
        while !bytes.is_empty() {
            if self.buffer.len() >= max {
                // A CR right at the bound may still be half of a CRLF
                if self.buffer.len() == max && bytes[0] == b'\r' {
                    self.buffer.push(b'\r');
                    bytes = &bytes[1..];
                    continue;
                }
                warn!("Line exceeded {} bytes without terminator; splitting", max);
                let carry = if self.buffer.len() > max {
                    self.buffer.split_off(max)
                } else {
                    Vec::new()
                };
                let line = mem::replace(&mut self.buffer, carry);
                self.classify(line, LineBoundary::Split, now, events);
            }
            let take = max.saturating_sub(self.buffer.len()).min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
    }

    fn classify(
        &mut self,
        raw: Vec<u8>,
        boundary: LineBoundary,
        now: DateTime<Local>,
        events: &mut Vec<ClassifierEvent>,
    ) {
        let text = charset::decode_lossy(self.config.encoding, &raw);
        let runs = ansi::decode(&text);
        let plain: String = runs.iter().map(|run| run.text.as_str()).collect();

        let mut tag = None;
        let mut table = None;

        if !self.apply_table_marker(&plain, events) {
            tag = route::extract_tag(&plain).map(str::to_string);
            table = self.table.as_ref().map(|t| t.name.clone());
        }

        events.push(ClassifierEvent::Line(ClassifiedLine {
            timestamp: self.config.timestamp.then_some(now),
            raw,
            text,
            plain,
            runs,
            tag,
            table,
            boundary,
        }));
    }

    /// Apply a table transition; false when the line is not one
    fn apply_table_marker(&mut self, plain: &str, events: &mut Vec<ClassifierEvent>) -> bool {
        match route::parse_table_marker(plain) {
            Some(TableMarker::Start(name)) => {
                if let Some(active) = &self.table {
                    warn!(
                        "Table {:?} started while {:?} is active; replacing session",
                        name, active.name
                    );
                }
                debug!("Table session {:?} started", name);
                self.table = Some(TableSession {
                    name: name.to_string(),
                });
                events.push(ClassifierEvent::Clear(Channel::Tag(name.to_string())));
                true
            }
            Some(TableMarker::End(name))
                if self.table.as_ref().is_some_and(|t| t.name == name) =>
            {
                debug!("Table session {:?} ended", name);
                self.table = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn lines(events: &[ClassifierEvent]) -> Vec<&ClassifiedLine> {
        events
            .iter()
            .filter_map(|e| match e {
                ClassifierEvent::Line(line) => Some(line),
                ClassifierEvent::Clear(_) => None,
            })
            .collect()
    }

    fn feed_all(classifier: &mut StreamClassifier, chunks: &[&[u8]]) -> Vec<ClassifierEvent> {
        chunks
            .iter()
            .flat_map(|chunk| classifier.feed_at(chunk, fixed_now()))
            .collect()
    }

    fn tag(name: &str) -> Channel {
        Channel::Tag(name.to_string())
    }

    #[test]
    fn test_line_reassembly_across_chunks() {
        let mut c = StreamClassifier::default();
        assert!(c.feed_at(b"hel", fixed_now()).is_empty());
        assert_eq!(c.pending(), b"hel");
        let events = c.feed_at(b"lo\r\nwor", fixed_now());
        let got = lines(&events);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "hello");
        assert_eq!(got[0].raw, b"hello".to_vec());
        assert_eq!(got[0].boundary, LineBoundary::Newline);
        assert_eq!(c.pending(), b"wor");
    }

    #[test]
    fn test_lone_cr_is_not_a_boundary() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"a\rb\n", fixed_now());
        assert_eq!(lines(&events)[0].text, "a\rb");
    }

    #[test]
    fn test_tag_routing_with_timestamp_group() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"[00:11:22][debug]hello\n[00:11:22][123]hello\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got[0].channels(), vec![Channel::All, tag("debug")]);
        assert_eq!(got[1].channels(), vec![Channel::All]);
    }

    #[test]
    fn test_empty_tag_message() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"[tag]\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got[0].tag.as_deref(), Some("tag"));
        assert!(got[0].channels().contains(&tag("tag")));
    }

    #[test]
    fn test_routing_ignores_color_codes() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"\x1b[32m[info]\x1b[0m ready\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got[0].plain, "[info] ready");
        assert_eq!(got[0].tag.as_deref(), Some("info"));
        assert_eq!(got[0].runs.len(), 2);
    }

    #[test]
    fn test_table_protocol() {
        let mut c = StreamClassifier::default();
        let events = feed_all(
            &mut c,
            &[
                b"[&Table][MyStatus][Start]\n",
                b"cpu: 10%\n",
                b"[&Table][MyStatus][End]\n",
                b"unrelated\n",
            ],
        );

        assert_eq!(events[0], ClassifierEvent::Clear(tag("MyStatus")));
        let got = lines(&events);
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].channels(), vec![Channel::All]);
        assert_eq!(got[1].channels(), vec![Channel::All, tag("MyStatus")]);
        assert_eq!(got[2].channels(), vec![Channel::All]);
        assert_eq!(got[3].channels(), vec![Channel::All]);
        assert_eq!(c.active_table(), None);
    }

    #[test]
    fn test_table_content_keeps_own_tag() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"[&Table][T][Start]\n[warn]hot\n\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got[1].channels(), vec![Channel::All, tag("warn"), tag("T")]);
        // Empty lines still reach the table
        assert_eq!(got[2].text, "");
        assert_eq!(got[2].channels(), vec![Channel::All, tag("T")]);
    }

    #[test]
    fn test_mismatched_end_stays_in_active_table() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"[&Table][A][Start]\n[&Table][B][End]\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got[1].tag, None);
        assert_eq!(got[1].table.as_deref(), Some("A"));
        assert_eq!(got[1].channels(), vec![Channel::All, tag("A")]);
        assert_eq!(c.active_table(), Some("A"));
    }

    #[test]
    fn test_end_without_session_is_routing_noop() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"[&Table][X][End]\n", fixed_now());
        assert_eq!(events.len(), 1);
        let got = lines(&events);
        assert_eq!(got[0].tag, None);
        assert_eq!(got[0].channels(), vec![Channel::All]);
    }

    #[test]
    fn test_start_while_active_replaces_session() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"[&Table][A][Start]\n[&Table][B][Start]\nrow\n", fixed_now());
        assert_eq!(events[0], ClassifierEvent::Clear(tag("A")));
        assert_eq!(events[2], ClassifierEvent::Clear(tag("B")));
        let got = lines(&events);
        assert_eq!(got[2].channels(), vec![Channel::All, tag("B")]);
        assert_eq!(c.active_table(), Some("B"));
    }

    #[test]
    fn test_table_marker_with_color_codes() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"\x1b[1m[&Table][S][Start]\x1b[0m\r\n", fixed_now());
        assert_eq!(events[0], ClassifierEvent::Clear(tag("S")));
    }

    #[test]
    fn test_chunking_does_not_change_events() {
        let mut stream = "boot \u{00e9}\u{3042}\r\n[00:01][dbg]x=1\n\x1b[31m[err]\x1b[0m bad\n\
            [&Table][Stat][Start]\ncpu\n\n[&Table][Stat][End]\n[Stat]after\n"
            .as_bytes()
            .to_vec();
        stream.extend_from_slice(b"\xFF\xFEtail");
        let stream = stream.as_slice();

        let whole = {
            let mut c = StreamClassifier::default();
            let mut events = c.feed_at(stream, fixed_now());
            events.extend(c.finish_at(fixed_now()));
            events
        };

        for split in 0..=stream.len() {
            let mut c = StreamClassifier::default();
            let mut events = c.feed_at(&stream[..split], fixed_now());
            events.extend(c.feed_at(&stream[split..], fixed_now()));
            events.extend(c.finish_at(fixed_now()));
            assert_eq!(events, whole, "split at {}", split);
        }

        let mut c = StreamClassifier::default();
        let mut events: Vec<_> = stream.iter().flat_map(|b| c.feed_at(&[*b], fixed_now())).collect();
        events.extend(c.finish_at(fixed_now()));
        assert_eq!(events, whole);
    }

    #[test]
    fn test_invalid_bytes_are_replaced_not_dropped() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"a\xFFb\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got[0].text, "a\u{FFFD}b");
        assert_eq!(got[0].raw, vec![b'a', 0xFF, b'b']);
    }

    #[test]
    fn test_configured_encoding() {
        let mut c = StreamClassifier::new(ClassifierConfig {
            encoding: encoding_rs::SHIFT_JIS,
            ..ClassifierConfig::default()
        });
        let events = c.feed_at(&[b'[', b'j', b']', 0x82, 0xA0, b'\n'], fixed_now());
        let got = lines(&events);
        assert_eq!(got[0].text, "[j]\u{3042}");
        assert_eq!(got[0].tag.as_deref(), Some("j"));
    }

    #[test]
    fn test_long_line_is_split_at_bound() {
        let mut c = StreamClassifier::new(ClassifierConfig {
            max_line_len: 4,
            ..ClassifierConfig::default()
        });
        let mut events = c.feed_at(b"abcdef", fixed_now());
        assert_eq!(c.pending(), b"ef");
        events.extend(c.feed_at(b"gh\n", fixed_now()));
        let got = lines(&events);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text, "abcd");
        assert_eq!(got[0].boundary, LineBoundary::Split);
        assert_eq!(got[1].text, "efgh");
        assert_eq!(got[1].boundary, LineBoundary::Newline);
    }

    #[test]
    fn test_crlf_at_bound_is_not_split() {
        let config = ClassifierConfig {
            max_line_len: 4,
            ..ClassifierConfig::default()
        };
        let data = b"[&Table][T][Start]\nabcd\r\nnext\n";

        let mut whole = StreamClassifier::new(config);
        let events = whole.feed_at(data, fixed_now());
        let got = lines(&events);
        assert_eq!(got.len(), 3);
        assert_eq!(got[1].text, "abcd");
        assert_eq!(got[1].boundary, LineBoundary::Newline);
        assert_eq!(got[1].channels(), vec![Channel::All, tag("T")]);
        assert_eq!(got[2].text, "next");

        let mut bytewise = StreamClassifier::new(config);
        let split: Vec<ClassifierEvent> = data
            .iter()
            .flat_map(|b| bytewise.feed_at(std::slice::from_ref(b), fixed_now()))
            .collect();
        assert_eq!(split, events);
    }

    #[test]
    fn test_cr_at_bound_without_lf_starts_next_line() {
        let mut c = StreamClassifier::new(ClassifierConfig {
            max_line_len: 4,
            ..ClassifierConfig::default()
        });
        let events = c.feed_at(b"abcd\rx\n", fixed_now());
        let got = lines(&events);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].raw, b"abcd".to_vec());
        assert_eq!(got[0].boundary, LineBoundary::Split);
        assert_eq!(got[1].raw, b"\rx".to_vec());
        assert_eq!(got[1].boundary, LineBoundary::Newline);
    }

    #[test]
    fn test_finish_flushes_partial_line() {
        let mut c = StreamClassifier::default();
        assert!(c.feed_at(b"[dbg]no newline", fixed_now()).is_empty());
        let events = c.finish_at(fixed_now());
        let got = lines(&events);
        assert_eq!(got[0].boundary, LineBoundary::Partial);
        assert_eq!(got[0].tag.as_deref(), Some("dbg"));
        assert!(c.finish_at(fixed_now()).is_empty());
    }

    #[test]
    fn test_reset_drops_state() {
        let mut c = StreamClassifier::default();
        c.feed_at(b"[&Table][T][Start]\npart", fixed_now());
        c.reset();
        assert_eq!(c.active_table(), None);
        assert!(c.pending().is_empty());
    }

    #[test]
    fn test_timestamp_only_when_enabled() {
        let mut c = StreamClassifier::default();
        let events = c.feed_at(b"x\n", fixed_now());
        assert_eq!(lines(&events)[0].timestamp, None);

        c.set_timestamp(true);
        let events = c.feed_at(b"x\n", fixed_now());
        assert_eq!(lines(&events)[0].timestamp, Some(fixed_now()));
    }

    #[test]
    fn test_channel_labels() {
        assert_eq!(Channel::All.to_string(), "[ALL]");
        assert_eq!(tag("debug").to_string(), "[debug]");
    }
}
