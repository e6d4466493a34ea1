//! Serialized events waiting for their place on the buffer timeline

use std::collections::VecDeque;

use crate::media::{ClockTime, Event};

/// FIFO of serialized events held back until the buffers before them are out
#[derive(Debug, Default)]
pub struct PendingEvents {
    queue: VecDeque<Event>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Pop every event that is due before a buffer stamped `next_pts`
    ///
    /// Events are released in order while their timestamp is earlier than
    /// `next_pts`. When no more buffers are queued (`output_empty`) the rest
    /// is released regardless. An unstamped event or buffer never holds
    /// events back.
    pub fn drain_due(&mut self, next_pts: Option<ClockTime>, output_empty: bool) -> Vec<Event> {
        let mut due = Vec::new();
        while let Some(front) = self.queue.front() {
            let ready = output_empty
                || match (front.timestamp, next_pts) {
                    (Some(ts), Some(pts)) => ts < pts,
                    _ => true,
                };
            if !ready {
                break;
            }
            if let Some(event) = self.queue.pop_front() {
                due.push(event);
            }
        }
        due
    }
}
