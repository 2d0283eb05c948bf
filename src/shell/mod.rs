//! Interactive line shell
//!
//! Stdin is read on its own thread; stdin lines and serial events share one
//! mpsc channel, so the main loop is the only place that touches the console,
//! the send options and the channel book.
//!
//! Plain input is sent as text. Lines starting with `:` are commands.

pub mod channels;
pub mod render;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::capture::HexLog;
use crate::codec::{self, EolMode, SendFormat, SendOptions};
use crate::config::{Config, ConfigError, RxMode};
use crate::serial::{LinkEvent, PortSettings, ReaderCommand, SerialLink};
use crate::stream::{charset, ClassifierEvent};
use channels::ChannelBook;

const HELP: &str = "\
Interactive commands:
  :help
  :quit                 (also :q, :exit)
  :text <payload>
  :hex <AA 55 01 02>
  :b64 <base64>
  :u16le <n1 n2 ...>    (e.g. :u16le 0x1234 4660)
  :u16be <n1 n2 ...>
  :i16le <n1 n2 ...>
  :i16be <n1 n2 ...>
  :file <path>          (send raw file bytes)
  :eol <none|lf|cr|crlf>
  :encoding <name>
  :rx <text|hex|both>
  :timestamp <on|off>
  :escapes <on|off>     (interpret \\n, \\r, \\t, \\\\, \\xNN in text)
  :flush                (discard pending input)
  :reset                (drop the partial line and any open table)
  :tags                 (list tagged channels)
  :show <tag>           (replay a tagged channel)
  :save                 (write current settings to ~/.sertap/config.toml)
Plain input (no leading ':') is sent as text.";

/// A parsed shell line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send { format: SendFormat, payload: String },
    Help,
    Quit,
    Eol(EolMode),
    Encoding(String),
    Rx(RxMode),
    Timestamp(bool),
    Escapes(bool),
    Flush,
    Reset,
    Tags,
    Show(String),
    Save,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(None);
    }

    let Some(cmdline) = line.strip_prefix(':') else {
        return Ok(Some(Command::Send {
            format: SendFormat::Text,
            payload: line.to_string(),
        }));
    };

    let cmdline = cmdline.trim();
    if cmdline.is_empty() {
        return Ok(None);
    }
    let (cmd, rest) = cmdline.split_once(' ').unwrap_or((cmdline, ""));

    let command = match cmd.to_lowercase().as_str() {
        "q" | "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        "flush" => Command::Flush,
        "reset" => Command::Reset,
        "tags" => Command::Tags,
        "save" => Command::Save,
        "show" => {
            let name = rest.trim().trim_start_matches('[').trim_end_matches(']');
            if name.is_empty() {
                return Err("missing tag name".to_string());
            }
            Command::Show(name.to_string())
        }
        "eol" => Command::Eol(rest.parse()?),
        "encoding" => {
            let label = rest.trim();
            if label.is_empty() {
                return Err("missing encoding name".to_string());
            }
            Command::Encoding(label.to_string())
        }
        "rx" => Command::Rx(
            rest.parse::<RxMode>()
                .map_err(|_| "rx must be text|hex|both".to_string())?,
        ),
        "timestamp" => Command::Timestamp(parse_switch("timestamp", rest)?),
        "escapes" => Command::Escapes(parse_switch("escapes", rest)?),
        "file" => {
            let path = rest.trim().trim_matches('"');
            if path.is_empty() {
                return Err("missing file path".to_string());
            }
            Command::Send {
                format: SendFormat::File,
                payload: path.to_string(),
            }
        }
        other => match other.parse::<SendFormat>() {
            Ok(format) => Command::Send {
                format,
                payload: rest.to_string(),
            },
            Err(_) => return Err("unknown command. Type :help".to_string()),
        },
    };
    Ok(Some(command))
}

fn parse_switch(name: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(format!("{} must be on|off", name)),
    }
}

/// Everything the main loop reacts to
#[derive(Debug)]
pub enum ShellInput {
    Line(String),
    /// Stdin closed
    Eof,
    Link(LinkEvent),
}

impl From<LinkEvent> for ShellInput {
    fn from(event: LinkEvent) -> Self {
        ShellInput::Link(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct Shell {
    config: Config,
    link: SerialLink,
    capture: Option<Arc<HexLog>>,
    send_options: SendOptions,
    book: ChannelBook,
}

/// Open the port and run the shell until `:quit`, stdin EOF or port loss
pub fn run(config: Config, capture: Option<Arc<HexLog>>) -> anyhow::Result<()> {
    let port = config
        .serial
        .port
        .clone()
        .ok_or(ConfigError::MissingPort)?;
    let settings = PortSettings::try_from(&config.serial)?;
    let classifier = config.display.classifier_config()?;
    let send_options = config.display.send_options()?;

    let (tx, rx) = mpsc::channel::<ShellInput>();
    let link = SerialLink::open(&port, &settings, classifier, capture.clone(), tx.clone())?;
    spawn_stdin_reader(tx)?;

    let mut shell = Shell {
        book: ChannelBook::new(config.display.tag_history, config.display.max_tags),
        config,
        link,
        capture,
        send_options,
    };

    println!(
        "Connected to {}. Type :help for commands. Type :quit to exit.",
        shell.link.port_name()
    );

    for input in rx {
        let flow = match input {
            ShellInput::Line(line) => shell.handle_line(&line)?,
            ShellInput::Eof => Flow::Quit,
            ShellInput::Link(event) => shell.handle_link(event)?,
        };
        if flow == Flow::Quit {
            break;
        }
    }

    shell.link.close();
    Ok(())
}

fn spawn_stdin_reader(tx: Sender<ShellInput>) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(ShellInput::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(ShellInput::Eof);
        })?;
    Ok(())
}

impl Shell {
    fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        match parse_command(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => Ok(Flow::Continue),
            Err(message) => {
                render::write_error(&mut io::stdout(), &message)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn execute(&mut self, command: Command) -> io::Result<Flow> {
        let mut out = io::stdout();

        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => println!("{}", HELP),
            Command::Send { format, payload } => self.send(format, &payload)?,
            Command::Eol(eol) => {
                self.send_options.eol = eol;
                self.config.display.eol = eol;
            }
            Command::Encoding(label) => match charset::lookup(&label) {
                Some(encoding) => {
                    self.send_options.encoding = encoding;
                    self.link.command(ReaderCommand::SetEncoding(encoding));
                    self.config.display.encoding = label;
                    info!("Encoding set to {}", encoding.name());
                }
                None => render::write_error(&mut out, &format!("unknown encoding: {}", label))?,
            },
            Command::Rx(mode) => self.config.display.rx = mode,
            Command::Timestamp(enabled) => {
                self.config.display.timestamp = enabled;
                self.link.command(ReaderCommand::SetTimestamp(enabled));
                if let Some(capture) = &self.capture {
                    capture.set_timestamp(enabled);
                }
            }
            Command::Escapes(enabled) => {
                self.send_options.escapes = enabled;
                self.config.display.escapes = enabled;
            }
            Command::Flush => {
                if let Err(e) = self.link.flush_input() {
                    render::write_error(&mut out, &e.to_string())?;
                }
            }
            Command::Reset => self.link.command(ReaderCommand::Reset),
            Command::Tags => {
                render::write_tags(&mut out, &self.book.tags())?;
                if self.book.refused() > 0 {
                    writeln!(out, "({} events for untracked tags were not kept)", self.book.refused())?;
                    out.flush()?;
                }
            }
            Command::Show(name) => match self.book.lines(&name) {
                Some(lines) => {
                    for line in lines {
                        render::write_line(&mut out, line)?;
                    }
                }
                None => render::write_error(&mut out, &format!("no channel [{}]", name))?,
            },
            Command::Save => match self.config.save() {
                Ok(()) => println!("Settings saved"),
                Err(e) => render::write_error(&mut out, &e.to_string())?,
            },
        }
        Ok(Flow::Continue)
    }

    fn send(&mut self, format: SendFormat, payload: &str) -> io::Result<()> {
        let bytes = match codec::encode(format, payload, &self.send_options) {
            Ok(bytes) => bytes,
            Err(e) => return render::write_error(&mut io::stdout(), &e.to_string()),
        };

        match self.link.send(&bytes) {
            Ok(()) => {
                debug!("Sent {} bytes as {}", bytes.len(), format);
                Ok(())
            }
            Err(e) => {
                error!("Send failed: {}", e);
                render::write_error(&mut io::stdout(), &e.to_string())
            }
        }
    }

    fn handle_link(&mut self, event: LinkEvent) -> io::Result<Flow> {
        let mut out = io::stdout();
        let rx = self.config.display.rx;

        match event {
            LinkEvent::Rx { chunk, events } => {
                if rx.shows_hex() && !chunk.is_empty() {
                    let now = self.config.display.timestamp.then(Local::now);
                    render::write_hex(&mut out, &chunk, now.as_ref())?;
                }
                for event in &events {
                    self.book.apply(event);
                    if let ClassifierEvent::Line(line) = event {
                        if rx.shows_text() {
                            render::write_line(&mut out, line)?;
                        }
                    }
                }
                Ok(Flow::Continue)
            }
            LinkEvent::Error(message) => {
                render::write_error(&mut out, &message)?;
                Ok(Flow::Continue)
            }
            LinkEvent::Closed => {
                println!("Port closed");
                Ok(Flow::Quit)
            }
        }
    }
}
