//! Buffer for events that arrive while their UI surface is detached.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::channel::{ChannelKind, ServerFrame};

/// An event captured while its consumer was away.
///
/// Ordering is by `sequence` (arrival order), never by `received_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub channel: ChannelKind,
    pub sequence: u64,
    pub frame: ServerFrame,
    pub received_at: DateTime<Utc>,
}

impl PendingEvent {
    /// Wire `type` of the buffered frame.
    pub fn event_type(&self) -> &'static str {
        self.frame.type_name()
    }
}

/// Bounded FIFO of [`PendingEvent`]s.
///
/// `flush` hands back everything in arrival order and leaves the queue
/// empty. When the capacity is reached the oldest event is dropped.
#[derive(Debug)]
pub struct PendingEventQueue {
    events: VecDeque<PendingEvent>,
    capacity: usize,
    next_sequence: u64,
    dropped: u64,
}

impl PendingEventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            next_sequence: 0,
            dropped: 0,
        }
    }

    pub fn enqueue(&mut self, channel: ChannelKind, frame: ServerFrame) {
        if self.events.len() >= self.capacity {
            if let Some(oldest) = self.events.pop_front() {
                self.dropped += 1;
                tracing::warn!(
                    "[PendingEventQueue] Capacity {} reached, dropping oldest {} event (seq {})",
                    self.capacity,
                    oldest.event_type(),
                    oldest.sequence
                );
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push_back(PendingEvent {
            channel,
            sequence,
            frame,
            received_at: Utc::now(),
        });
    }

    /// Empties the queue, returning its events in arrival order.
    pub fn flush(&mut self) -> Vec<PendingEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for PendingEventQueue {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> ServerFrame {
        ServerFrame::StreamToken {
            content: text.to_string(),
        }
    }

    #[test]
    fn flush_returns_arrival_order_then_empty() {
        let mut queue = PendingEventQueue::new(10);
        queue.enqueue(ChannelKind::Chat, token("A"));
        queue.enqueue(ChannelKind::Chat, token("B"));
        queue.enqueue(ChannelKind::Chat, token("C"));

        let flushed: Vec<ServerFrame> = queue.flush().into_iter().map(|e| e.frame).collect();
        assert_eq!(flushed, vec![token("A"), token("B"), token("C")]);
        assert!(queue.flush().is_empty());
    }

    #[test]
    fn sequence_keeps_increasing_across_flushes() {
        let mut queue = PendingEventQueue::new(10);
        queue.enqueue(ChannelKind::Tasks, ServerFrame::Ready);
        let first = queue.flush();
        queue.enqueue(ChannelKind::Tasks, ServerFrame::Ready);
        let second = queue.flush();

        assert!(second[0].sequence > first[0].sequence);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = PendingEventQueue::new(2);
        queue.enqueue(ChannelKind::Chat, token("A"));
        queue.enqueue(ChannelKind::Chat, token("B"));
        queue.enqueue(ChannelKind::Chat, token("C"));

        assert_eq!(queue.dropped(), 1);
        let flushed: Vec<ServerFrame> = queue.flush().into_iter().map(|e| e.frame).collect();
        assert_eq!(flushed, vec![token("B"), token("C")]);
    }
}
