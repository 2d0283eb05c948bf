//! ANSI SGR decoder
//!
//! Splits a decoded line into runs of plain text, each tagged with the
//! color/style active where it appears. Complete CSI sequences are consumed;
//! only SGR (`ESC [ ... m`) changes the style. Anything that is not a complete
//! CSI sequence is kept as text, so concatenating the runs always equals the
//! input with its CSI sequences removed.

use bitflags::bitflags;

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    /// Convert to crossterm color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        match self {
            Color::Default => crossterm::style::Color::Reset,
            Color::Indexed(n) => crossterm::style::Color::AnsiValue(*n),
            Color::Rgb(r, g, b) => crossterm::style::Color::Rgb {
                r: *r,
                g: *g,
                b: *b,
            },
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Active rendition; the default value is the reset state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorStyle {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl ColorStyle {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Apply SGR parameters. An empty list is a reset.
    fn apply_sgr(&mut self, params: &[u16]) {
        if params.is_empty() {
            self.reset();
            return;
        }

        let mut iter = params.iter();

        while let Some(&param) = iter.next() {
            match param {
                0 => self.reset(),
                1 => self.flags |= AttrFlags::BOLD,
                2 => self.flags |= AttrFlags::DIM,
                3 => self.flags |= AttrFlags::ITALIC,
                4 => self.flags |= AttrFlags::UNDERLINE,
                5 => self.flags |= AttrFlags::BLINK,
                7 => self.flags |= AttrFlags::INVERSE,
                8 => self.flags |= AttrFlags::HIDDEN,
                9 => self.flags |= AttrFlags::STRIKETHROUGH,

                22 => self.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => self.flags &= !AttrFlags::ITALIC,
                24 => self.flags &= !AttrFlags::UNDERLINE,
                25 => self.flags &= !AttrFlags::BLINK,
                27 => self.flags &= !AttrFlags::INVERSE,
                28 => self.flags &= !AttrFlags::HIDDEN,
                29 => self.flags &= !AttrFlags::STRIKETHROUGH,

                30..=37 => self.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = extended_color(&mut iter) {
                        self.fg = color;
                    }
                }
                39 => self.fg = Color::Default,

                40..=47 => self.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = extended_color(&mut iter) {
                        self.bg = color;
                    }
                }
                49 => self.bg = Color::Default,

                90..=97 => self.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => self.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
        }
    }
}

/// `5;n` (256 color) or `2;r;g;b` following a 38/48
fn extended_color<'a>(iter: &mut impl Iterator<Item = &'a u16>) -> Option<Color> {
    match iter.next() {
        Some(5) => iter
            .next()
            .and_then(|&n| u8::try_from(n).ok())
            .map(Color::Indexed),
        Some(2) => {
            // Missing components are 0; out-of-range ones void the color
            let component = |v: Option<&u16>| v.map_or(Some(0), |&v| u8::try_from(v).ok());
            let r = component(iter.next());
            let g = component(iter.next());
            let b = component(iter.next());
            Some(Color::Rgb(r?, g?, b?))
        }
        _ => None,
    }
}

/// A stretch of text rendered with one style
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub style: ColorStyle,
}

#[derive(Clone, Copy, PartialEq)]
enum ScanState {
    Ground,
    Escape,
    CsiParam,
    CsiIntermediate,
}

struct Scanner<'a> {
    input: &'a str,
    state: ScanState,
    /// Byte offset of the ESC that opened the pending sequence
    seq_start: usize,
    params: Vec<u16>,
    current_param: Option<u16>,
    private: bool,
    intermediates: Vec<u8>,
    style: ColorStyle,
    pending: String,
    runs: Vec<StyledRun>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            state: ScanState::Ground,
            seq_start: 0,
            params: Vec::with_capacity(16),
            current_param: None,
            private: false,
            intermediates: Vec::with_capacity(4),
            style: ColorStyle::default(),
            pending: String::new(),
            runs: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<StyledRun> {
        for (i, ch) in self.input.char_indices() {
            self.feed(i, ch);
        }
        if self.state != ScanState::Ground {
            // Unterminated sequence stays visible
            let tail = &self.input[self.seq_start..];
            self.pending.push_str(tail);
        }
        self.flush_run();
        self.runs
    }

    fn feed(&mut self, i: usize, ch: char) {
        match self.state {
            ScanState::Ground => self.ground(i, ch),
            ScanState::Escape => {
                if ch == '[' {
                    self.state = ScanState::CsiParam;
                    self.params.clear();
                    self.intermediates.clear();
                    self.current_param = None;
                    self.private = false;
                } else {
                    self.abort(i, ch);
                }
            }
            ScanState::CsiParam => match ch {
                '0'..='9' => {
                    let digit = ch as u16 - '0' as u16;
                    self.current_param = Some(
                        self.current_param
                            .unwrap_or(0)
                            .saturating_mul(10)
                            .saturating_add(digit),
                    );
                }
                ';' | ':' => {
                    self.params.push(self.current_param.take().unwrap_or(0));
                }
                '<' | '=' | '>' | '?' => self.private = true,
                '\u{20}'..='\u{2F}' => {
                    self.finish_param();
                    self.intermediates.push(ch as u8);
                    self.state = ScanState::CsiIntermediate;
                }
                '\u{40}'..='\u{7E}' => {
                    self.finish_param();
                    self.execute_csi(ch);
                }
                _ => self.abort(i, ch),
            },
            ScanState::CsiIntermediate => match ch {
                '\u{20}'..='\u{2F}' => self.intermediates.push(ch as u8),
                '\u{40}'..='\u{7E}' => self.execute_csi(ch),
                _ => self.abort(i, ch),
            },
        }
    }

    fn ground(&mut self, i: usize, ch: char) {
        if ch == '\x1b' {
            self.state = ScanState::Escape;
            self.seq_start = i;
        } else {
            self.pending.push(ch);
        }
    }

    fn finish_param(&mut self) {
        if let Some(p) = self.current_param.take() {
            self.params.push(p);
        }
    }

    /// Not a CSI sequence after all: keep what was swallowed as text and
    /// rescan `ch` from ground state.
    fn abort(&mut self, i: usize, ch: char) {
        let swallowed = &self.input[self.seq_start..i];
        self.pending.push_str(swallowed);
        self.state = ScanState::Ground;
        self.ground(i, ch);
    }

    fn execute_csi(&mut self, final_char: char) {
        self.state = ScanState::Ground;

        if final_char != 'm' || self.private || !self.intermediates.is_empty() {
            tracing::debug!(
                "Dropping CSI: private={}, intermediates={:?}, params={:?}, final={:?}",
                self.private,
                self.intermediates,
                self.params,
                final_char
            );
            return;
        }

        let mut next = self.style;
        next.apply_sgr(&self.params);
        if next != self.style {
            self.flush_run();
            self.style = next;
        }
    }

    fn flush_run(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.runs.push(StyledRun {
            text: std::mem::take(&mut self.pending),
            style: self.style,
        });
    }
}

/// Decode a line into styled runs. Style starts at the reset state.
pub fn decode(text: &str) -> Vec<StyledRun> {
    Scanner::new(text).run()
}
