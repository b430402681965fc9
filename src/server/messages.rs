//! Station message log shown next to the player

use chrono::Local;
use serde::Serialize;
use std::collections::VecDeque;

use crate::constants::MESSAGE_LOG_CAPACITY;

/// Host credited with interjections
pub const DEFAULT_HOST: &str = "Ollie";

const WELCOME: &str = "Welcome to Recurse Radio!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub content: String,
    /// Local wall-clock time, `HH:MM:SS`
    pub timestamp: String,
}

/// Most recent messages, oldest first
#[derive(Debug)]
pub struct MessageLog {
    messages: VecDeque<Message>,
    capacity: usize,
    next_id: u64,
}

impl MessageLog {
    /// A log holding the welcome message
    pub fn new() -> Self {
        Self::with_capacity(MESSAGE_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut log = Self {
            messages: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            next_id: 1,
        };
        log.push(MessageKind::System, None, WELCOME.to_string());
        log
    }

    /// Append a listener-visible message from `host`
    pub fn add(&mut self, content: impl Into<String>, host: impl Into<String>) -> Message {
        self.push(MessageKind::User, Some(host.into()), content.into())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, kind: MessageKind, host: Option<String>, content: String) -> Message {
        let message = Message {
            id: self.next_id,
            kind,
            host,
            content,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        };
        self.next_id += 1;

        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message.clone());
        message
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}
