//! Message history for easy-sync.
//!
//! This module provides the bounded store of received messages with:
//! - Newest-first ordering by arrival
//! - Deduplication by message id (bounded, FIFO eviction)
//! - Max size limits to prevent unbounded memory growth
//!
//! The history is owned by the connection manager in sync-client and is
//! mutated only from its serialized dispatch path.

use easysync_types::Message;
use std::collections::{HashSet, VecDeque};

/// Default bound for both the history and the dedup set.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Result of offering a message to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// The message was prepended.
    Stored,
    /// The id was already seen; nothing changed.
    Duplicate,
}

/// Bounded, deduplicated message history.
///
/// Messages flow through the history like this:
/// 1. `record()` - check the id against the dedup set
/// 2. unseen ids are remembered (oldest id forgotten past the bound)
/// 3. the message is prepended (oldest message evicted past the bound)
///
/// Messages without an id are never deduplicated.
#[derive(Debug)]
pub struct MessageHistory {
    /// Maximum number of messages and of remembered ids.
    limit: usize,
    /// Stored messages, newest at the front.
    entries: VecDeque<Message>,
    /// Ids seen so far.
    seen: HashSet<String>,
    /// Ids in insertion order, for FIFO eviction.
    seen_order: VecDeque<String>,
}

impl MessageHistory {
    /// Create a new history with the given bound.
    ///
    /// A bound of zero is raised to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            entries: VecDeque::with_capacity(limit),
            seen: HashSet::with_capacity(limit),
            seen_order: VecDeque::with_capacity(limit),
        }
    }

    /// Offer a message to the history.
    pub fn record(&mut self, message: Message) -> Recorded {
        if let Some(id) = message.id() {
            if self.seen.contains(id) {
                return Recorded::Duplicate;
            }
            let id = id.to_owned();
            self.seen.insert(id.clone());
            self.seen_order.push_back(id);
            while self.seen_order.len() > self.limit {
                if let Some(evicted) = self.seen_order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
        }

        self.entries.push_front(message);
        self.entries.truncate(self.limit);
        Recorded::Stored
    }

    /// Check whether an id is currently remembered.
    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Iterate over stored messages, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// The most recently stored message.
    pub fn newest(&self) -> Option<&Message> {
        self.entries.front()
    }

    /// Copy of the stored messages, newest first.
    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of remembered ids.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// The configured bound.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drop all stored messages.
    ///
    /// Remembered ids are kept so replays stay suppressed.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
