//! Per-tag line retention
//!
//! Keeps the most recent lines of every named channel so `:show` can replay
//! them. `[ALL]` is the live console and is not retained here.
//!
//! Both the lines per channel and the number of channels are bounded. Once
//! `max_tags` channels exist, lines for new names are only shown live.

use std::collections::{BTreeMap, VecDeque};

use tracing::warn;

use crate::stream::{Channel, ClassifiedLine, ClassifierEvent};

/// Default number of lines kept per channel
pub const DEFAULT_TAG_HISTORY: usize = 500;

/// Default number of named channels tracked
pub const DEFAULT_MAX_TAGS: usize = 256;

pub struct ChannelBook {
    channels: BTreeMap<String, VecDeque<ClassifiedLine>>,
    /// Maximum lines per channel
    limit: usize,
    /// Maximum number of channels
    max_tags: usize,
    /// Events dropped because their channel could not be created
    refused: usize,
}

impl Default for ChannelBook {
    fn default() -> Self {
        Self::new(DEFAULT_TAG_HISTORY, DEFAULT_MAX_TAGS)
    }
}

impl ChannelBook {
    pub fn new(limit: usize, max_tags: usize) -> Self {
        Self {
            channels: BTreeMap::new(),
            limit: limit.max(1),
            max_tags: max_tags.max(1),
            refused: 0,
        }
    }

    /// Apply one classifier event
    pub fn apply(&mut self, event: &ClassifierEvent) {
        match event {
            ClassifierEvent::Clear(Channel::Tag(name)) => {
                if let Some(lines) = self.channel(name) {
                    lines.clear();
                }
            }
            ClassifierEvent::Clear(Channel::All) => {}
            ClassifierEvent::Line(line) => {
                for channel in line.channels() {
                    if let Channel::Tag(name) = channel {
                        self.push(&name, line.clone());
                    }
                }
            }
        }
    }

    /// Existing channel, or a new one while under `max_tags`
    fn channel(&mut self, name: &str) -> Option<&mut VecDeque<ClassifiedLine>> {
        if !self.channels.contains_key(name) {
            if self.channels.len() >= self.max_tags {
                if self.refused == 0 {
                    warn!(
                        "Tag channel limit ({}) reached; not tracking [{}] or later new tags",
                        self.max_tags, name
                    );
                }
                self.refused += 1;
                return None;
            }
            self.channels.insert(name.to_string(), VecDeque::new());
        }
        self.channels.get_mut(name)
    }

    fn push(&mut self, name: &str, line: ClassifiedLine) {
        let limit = self.limit;
        let Some(lines) = self.channel(name) else {
            return;
        };
        lines.push_back(line);
        while lines.len() > limit {
            lines.pop_front();
        }
    }

    /// Events not retained because the channel limit was reached
    pub fn refused(&self) -> usize {
        self.refused
    }

    /// Named channels in order, with their retained line counts
    pub fn tags(&self) -> Vec<(&str, usize)> {
        self.channels
            .iter()
            .map(|(name, lines)| (name.as_str(), lines.len()))
            .collect()
    }

    pub fn lines(&self, name: &str) -> Option<impl Iterator<Item = &ClassifiedLine>> {
        self.channels.get(name).map(|lines| lines.iter())
    }
}
