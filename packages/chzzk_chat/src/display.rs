//! Paced delivery of normalized chats into the visible list.
//!
//! Live arrivals land in `pending` and are moved to `visible` by a fixed-period
//! tick: one per tick while the feed is flowing, everything at once when the
//! previous visible tick is older than `catch_up_after`. A backlog snapshot
//! bypasses pacing and replaces `visible` outright.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::chat::Chat;

/// What a tick did to the visible list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing pending.
    Idle,
    /// One entry moved.
    Trickled,
    /// The whole pending queue moved.
    CaughtUp { flushed: usize },
}

impl TickOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Debug)]
pub struct DisplayBuffer {
    pending: VecDeque<Chat>,
    visible: VecDeque<Chat>,
    max_visible: usize,
    catch_up_after: Duration,
    last_flush_at: Option<Instant>,
}

impl DisplayBuffer {
    pub fn new(max_visible: usize, catch_up_after: Duration) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_visible),
            visible: VecDeque::with_capacity(max_visible),
            max_visible,
            catch_up_after,
            last_flush_at: None,
        }
    }

    /// Append live arrivals to the pending queue.
    ///
    /// Only the newest `max_visible` pending entries are retained; anything
    /// older would be evicted from the visible list before it was ever seen.
    pub fn enqueue(&mut self, chats: impl IntoIterator<Item = Chat>) {
        self.pending.extend(chats);
        while self.pending.len() > self.max_visible {
            self.pending.pop_front();
        }
    }

    /// Replace the visible list with a backlog snapshot, ordered by source time.
    pub fn replace_with_backlog(&mut self, mut chats: Vec<Chat>) {
        self.pending.clear();
        chats.sort_by_key(|chat| chat.received_at);
        let skip = chats.len().saturating_sub(self.max_visible);
        self.visible = chats.into_iter().skip(skip).collect();
    }

    /// Run one display tick at `now`. Callers skip ticks entirely while the
    /// page is hidden.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let catching_up = match self.last_flush_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.catch_up_after,
        };
        self.last_flush_at = Some(now);

        if self.pending.is_empty() {
            return TickOutcome::Idle;
        }

        if catching_up {
            let flushed = self.pending.len();
            self.visible.extend(self.pending.drain(..));
            self.trim_visible();
            TickOutcome::CaughtUp { flushed }
        } else {
            if let Some(chat) = self.pending.pop_front() {
                self.visible.push_back(chat);
            }
            self.trim_visible();
            TickOutcome::Trickled
        }
    }

    /// Drop everything, including the flush timestamp.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.visible.clear();
        self.last_flush_at = None;
    }

    fn trim_visible(&mut self) {
        while self.visible.len() > self.max_visible {
            self.visible.pop_front();
        }
    }

    pub fn visible(&self) -> impl ExactSizeIterator<Item = &Chat> {
        self.visible.iter()
    }

    /// Owned copy of the visible list for publishing.
    pub fn snapshot(&self) -> Vec<Chat> {
        self.visible.iter().cloned().collect()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn max_visible(&self) -> usize {
        self.max_visible
    }
}
