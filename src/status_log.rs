//! User-visible status messages.
//!
//! Every toast the workspace shows (copied N items, save failed, terminal
//! not connected, ...) is appended here. The buffer is bounded; the oldest
//! entries fall off once it is full. Logs for developers go through
//! `tracing` instead and never land in this buffer.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Visual class of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Copy,
    Cut,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    pub kind: StatusKind,
    pub message: String,
    /// Persistent entries stay on screen until replaced (e.g. "gave up
    /// reconnecting"); the rest are transient toasts.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub persistent: bool,
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

pub const STATUS_LOG_CAPACITY: usize = 200;

pub struct StatusLog {
    entries: VecDeque<StatusEntry>,
    capacity: usize,
    next_id: u64,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(STATUS_LOG_CAPACITY)
    }
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Append a transient message. Returns its id.
    pub fn push(&mut self, kind: StatusKind, message: impl Into<String>) -> u64 {
        self.push_entry(kind, message.into(), false)
    }

    /// Append a message that should stay visible until superseded.
    pub fn push_persistent(&mut self, kind: StatusKind, message: impl Into<String>) -> u64 {
        self.push_entry(kind, message.into(), true)
    }

    pub fn info(&mut self, message: impl Into<String>) -> u64 {
        self.push(StatusKind::Info, message)
    }

    pub fn error(&mut self, message: impl Into<String>) -> u64 {
        self.push(StatusKind::Error, message)
    }

    fn push_entry(&mut self, kind: StatusKind, message: String, persistent: bool) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(StatusEntry {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            kind,
            message,
            persistent,
        });
        id
    }

    /// Most recent entry, if any.
    pub fn latest(&self) -> Option<&StatusEntry> {
        self.entries.back()
    }

    /// Last `limit` entries, oldest first. `0` means all.
    pub fn recent(&self, limit: usize) -> Vec<StatusEntry> {
        let take = if limit == 0 { self.entries.len() } else { limit.min(self.entries.len()) };
        let skip = self.entries.len() - take;
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Drop every entry. Ids keep increasing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
