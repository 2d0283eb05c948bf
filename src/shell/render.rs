//! Console output for the interactive shell
//!
//! Classified lines are re-rendered from their styled runs with crossterm, so
//! the device's SGR colors survive. Control characters left in the text
//! (a stray ESC, BEL, OSC payloads) are printed in caret notation and never
//! reach the user's terminal raw.

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use crossterm::{
    queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
};
use unicode_width::UnicodeWidthStr;

use crate::capture::clock_prefix;
use crate::codec::format_hex;
use crate::stream::{AttrFlags, ClassifiedLine, ColorStyle};

/// Print one classified line with its styles
pub fn write_line<W: Write>(out: &mut W, line: &ClassifiedLine) -> io::Result<()> {
    if let Some(ts) = &line.timestamp {
        queue!(out, Print(clock_prefix(ts)))?;
    }

    for run in &line.runs {
        let text = printable(&run.text);
        if run.style.is_default() {
            queue!(out, Print(&text))?;
        } else {
            apply_style(out, &run.style)?;
            queue!(
                out,
                Print(&text),
                ResetColor,
                SetAttribute(Attribute::Reset)
            )?;
        }
    }

    queue!(out, Print("\n"))?;
    out.flush()
}

/// Print a received chunk as `RX AA 55 ..`
pub fn write_hex<W: Write>(
    out: &mut W,
    chunk: &[u8],
    now: Option<&DateTime<Local>>,
) -> io::Result<()> {
    let prefix = now.map(clock_prefix).unwrap_or_default();
    queue!(out, Print(format!("{}RX {}\n", prefix, format_hex(chunk))))?;
    out.flush()
}

/// Print the named channels as an aligned two-column list
pub fn write_tags<W: Write>(out: &mut W, tags: &[(&str, usize)]) -> io::Result<()> {
    if tags.is_empty() {
        writeln!(out, "(no tagged lines yet)")?;
        return out.flush();
    }

    let width = tags
        .iter()
        .map(|(name, _)| name.width() + 2)
        .max()
        .unwrap_or(0);

    for (name, count) in tags {
        let label = format!("[{}]", name);
        let pad = width.saturating_sub(label.width());
        writeln!(out, "  {}{}  {} lines", label, " ".repeat(pad), count)?;
    }
    out.flush()
}

pub fn write_error<W: Write>(out: &mut W, message: &str) -> io::Result<()> {
    writeln!(out, "[ERR] {}", message)?;
    out.flush()
}

/// Replace control characters other than tab: C0 and DEL in caret notation
/// (`^[`, `^G`, `^?`), C1 as U+FFFD
fn printable(text: &str) -> Cow<'_, str> {
    let is_unsafe = |c: char| c.is_control() && c != '\t';
    if !text.chars().any(is_unsafe) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\t' => out.push(c),
            '\u{00}'..='\u{1F}' => {
                out.push('^');
                out.push(char::from(c as u8 + 0x40));
            }
            '\u{7F}' => out.push_str("^?"),
            c if c.is_control() => out.push(char::REPLACEMENT_CHARACTER),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn apply_style<W: Write>(out: &mut W, style: &ColorStyle) -> io::Result<()> {
    let attributes = [
        (AttrFlags::BOLD, Attribute::Bold),
        (AttrFlags::DIM, Attribute::Dim),
        (AttrFlags::ITALIC, Attribute::Italic),
        (AttrFlags::UNDERLINE, Attribute::Underlined),
        (AttrFlags::BLINK, Attribute::SlowBlink),
        (AttrFlags::INVERSE, Attribute::Reverse),
        (AttrFlags::HIDDEN, Attribute::Hidden),
        (AttrFlags::STRIKETHROUGH, Attribute::CrossedOut),
    ];
    for (flag, attribute) in attributes {
        if style.flags.contains(flag) {
            queue!(out, SetAttribute(attribute))?;
        }
    }

    let fg = style.fg.to_crossterm();
    if fg != crossterm::style::Color::Reset {
        queue!(out, SetForegroundColor(fg))?;
    }
    let bg = style.bg.to_crossterm();
    if bg != crossterm::style::Color::Reset {
        queue!(out, SetBackgroundColor(bg))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamClassifier;

    fn classify(data: &[u8]) -> ClassifiedLine {
        let mut classifier = StreamClassifier::default();
        match classifier.feed(data).pop() {
            Some(crate::stream::ClassifierEvent::Line(line)) => line,
            other => panic!("expected a line, got {:?}", other),
        }
    }

    fn render(line: &ClassifiedLine) -> String {
        let mut out = Vec::new();
        write_line(&mut out, line).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_line() {
        assert_eq!(render(&classify(b"hello\r\n")), "hello\n");
    }

    #[test]
    fn test_non_sgr_sequences_removed() {
        assert_eq!(render(&classify(b"\x1b[2Kstatus\n")), "status\n");
    }

    #[test]
    fn test_styled_line_keeps_text() {
        let rendered = render(&classify(b"ok \x1b[31mfail\x1b[0m done\n"));
        assert!(rendered.starts_with("ok "));
        assert!(rendered.contains("fail"));
        assert!(rendered.contains('\x1b'));
        assert!(rendered.ends_with(" done\n"));
    }

    #[test]
    fn test_control_characters_neutralized() {
        let line = classify(b"a\x1bcb\x1b]0;x\x07\n");
        assert_eq!(render(&line), "a^[cb^[]0;x^G\n");

        let line = classify("tab\there\u{7f}\u{9b}2J\n".as_bytes());
        assert_eq!(render(&line), "tab\there^?\u{fffd}2J\n");
    }

    #[test]
    fn test_styled_control_characters_neutralized() {
        let rendered = render(&classify(b"\x1b[31mred\x1bc\x1b[0m\n"));
        assert!(rendered.contains("red^[c"));
        assert!(!rendered.contains("\x1bc"));
    }

    #[test]
    fn test_hex_view() {
        let mut out = Vec::new();
        write_hex(&mut out, &[0xAA, 0x55, 0x01], None).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "RX AA 55 01\n");
    }

    #[test]
    fn test_tags_aligned() {
        let mut out = Vec::new();
        write_tags(&mut out, &[("a", 3), ("gps", 12)]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "  [a]    3 lines\n  [gps]  12 lines\n"
        );
    }
}
