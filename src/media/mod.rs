//! Media units routed between pipelines
//!
//! This module provides:
//! - [`Blob`]: the timestamped, reference-counted payload unit
//! - [`Event`]: serialized and out-of-band stream events

pub mod blob;
pub mod event;

pub use blob::Blob;
pub use event::{Direction, Event, EventKind};

/// A point or span on a pipeline timeline, in nanoseconds
pub type ClockTime = u64;
