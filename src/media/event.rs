//! Stream events
//!
//! Events travel alongside buffers. *Serialized* events must keep their place
//! on the buffer timeline and therefore carry a timestamp; *out-of-band*
//! events are delivered as soon as they arrive.

use bytes::Bytes;

use super::ClockTime;
use crate::caps::Caps;

/// Which way an event travels through a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From producer towards consumers
    Downstream,
    /// From consumers towards the producer
    Upstream,
    /// Valid in both directions
    Both,
}

/// The event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Start of a new stream
    StreamStart { stream_id: String },
    /// Schema of the following buffers
    Caps(Caps),
    /// New playback segment
    Segment { start: ClockTime, rate: f64 },
    /// Free-form metadata
    Tag(String),
    /// Begin discarding data
    FlushStart,
    /// Stop discarding data
    FlushStop { reset_time: bool },
    /// End of stream
    Eos,
    /// Gap in the data
    Gap { duration: ClockTime },
    /// Latency report
    Latency(ClockTime),
    /// Ask upstream to renegotiate its schema
    Reconfigure,
    /// Reposition playback
    Seek { rate: f64, position: ClockTime },
    /// Quality-of-service feedback
    Qos { proportion: f64, diff: i64 },
    /// Application event travelling downstream in order with buffers
    CustomDownstream { name: String, data: Bytes },
    /// Application event travelling downstream immediately
    CustomDownstreamOob { name: String, data: Bytes },
    /// Application event travelling upstream
    CustomUpstream { name: String, data: Bytes },
}

impl EventKind {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::StreamStart { .. } => "stream-start",
            EventKind::Caps(_) => "caps",
            EventKind::Segment { .. } => "segment",
            EventKind::Tag(_) => "tag",
            EventKind::FlushStart => "flush-start",
            EventKind::FlushStop { .. } => "flush-stop",
            EventKind::Eos => "eos",
            EventKind::Gap { .. } => "gap",
            EventKind::Latency(_) => "latency",
            EventKind::Reconfigure => "reconfigure",
            EventKind::Seek { .. } => "seek",
            EventKind::Qos { .. } => "qos",
            EventKind::CustomDownstream { .. } => "custom-downstream",
            EventKind::CustomDownstreamOob { .. } => "custom-downstream-oob",
            EventKind::CustomUpstream { .. } => "custom-upstream",
        }
    }

    fn direction(&self) -> Direction {
        match self {
            EventKind::FlushStart | EventKind::FlushStop { .. } => Direction::Both,
            EventKind::Latency(_)
            | EventKind::Reconfigure
            | EventKind::Seek { .. }
            | EventKind::Qos { .. }
            | EventKind::CustomUpstream { .. } => Direction::Upstream,
            _ => Direction::Downstream,
        }
    }

    fn serialized(&self) -> bool {
        matches!(
            self,
            EventKind::StreamStart { .. }
                | EventKind::Caps(_)
                | EventKind::Segment { .. }
                | EventKind::Tag(_)
                | EventKind::FlushStop { .. }
                | EventKind::Eos
                | EventKind::Gap { .. }
                | EventKind::CustomDownstream { .. }
        )
    }
}

/// A stream event with its timeline position
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What the event carries
    pub kind: EventKind,
    /// Position on the buffer timeline, in nanoseconds
    pub timestamp: Option<ClockTime>,
}

impl Event {
    /// Create an unstamped event
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: None,
        }
    }

    /// End-of-stream event
    pub fn eos() -> Self {
        Self::new(EventKind::Eos)
    }

    /// Reconfigure request
    pub fn reconfigure() -> Self {
        Self::new(EventKind::Reconfigure)
    }

    /// Builder-style timestamp setter
    pub fn at(mut self, timestamp: ClockTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether the event must stay ordered with buffers
    pub fn is_serialized(&self) -> bool {
        self.kind.serialized()
    }

    /// Whether the event may travel upstream
    pub fn is_upstream(&self) -> bool {
        matches!(self.kind.direction(), Direction::Upstream | Direction::Both)
    }

    /// Whether the event may travel downstream
    pub fn is_downstream(&self) -> bool {
        matches!(
            self.kind.direction(),
            Direction::Downstream | Direction::Both
        )
    }

    /// Whether this is an end-of-stream event
    pub fn is_eos(&self) -> bool {
        matches!(self.kind, EventKind::Eos)
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Event::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_flags() {
        assert!(Event::eos().is_serialized());
        assert!(Event::new(EventKind::Tag("title".into())).is_serialized());
        assert!(!Event::new(EventKind::FlushStart).is_serialized());
        assert!(!Event::new(EventKind::CustomDownstreamOob {
            name: "x".into(),
            data: Bytes::new()
        })
        .is_serialized());
    }

    #[test]
    fn test_direction_flags() {
        assert!(Event::reconfigure().is_upstream());
        assert!(!Event::reconfigure().is_downstream());

        let flush = Event::new(EventKind::FlushStart);
        assert!(flush.is_upstream());
        assert!(flush.is_downstream());

        assert!(!Event::eos().is_upstream());
    }

    #[test]
    fn test_timestamp_builder() {
        let ev = Event::eos().at(42);
        assert_eq!(ev.timestamp, Some(42));
        assert_eq!(ev.name(), "eos");
    }
}
