//! Timestamp reconciliation between two pipeline clocks
//!
//! Buffers carry timestamps relative to the producing pipeline's base time.
//! When the consuming pipeline started at a different moment, the same
//! instant has a different running time on each side:
//!
//! ```text
//!   own base 100, node base 40  ──►  shift forward by 60
//!   own base 40,  node base 100 ──►  shift back by 60, drop if pts < 60
//! ```

use super::config::StreamSync;
use super::error::DropReason;
use crate::media::{Blob, ClockTime, Event};

/// Offset to apply to incoming timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeShift {
    None,
    Forward(ClockTime),
    Backward(ClockTime),
}

impl TimeShift {
    /// Offset between the consumer's and the producer's base times
    pub fn between(own_base: ClockTime, node_base: ClockTime) -> Self {
        match own_base.cmp(&node_base) {
            std::cmp::Ordering::Equal => TimeShift::None,
            std::cmp::Ordering::Greater => TimeShift::Forward(own_base - node_base),
            std::cmp::Ordering::Less => TimeShift::Backward(node_base - own_base),
        }
    }

    /// Shift a buffer's PTS and DTS
    ///
    /// A backward shift larger than the PTS cannot be represented and drops
    /// the buffer. A DTS that would underflow is cleared.
    pub fn apply_buffer(&self, mut blob: Blob) -> Result<Blob, DropReason> {
        match *self {
            TimeShift::None => {}
            TimeShift::Forward(delta) => {
                blob.pts = blob.pts.map(|t| t.saturating_add(delta));
                blob.dts = blob.dts.map(|t| t.saturating_add(delta));
            }
            TimeShift::Backward(delta) => {
                if let Some(pts) = blob.pts {
                    if pts < delta {
                        return Err(DropReason::TimestampUnderflow { pts, delta });
                    }
                    blob.pts = Some(pts - delta);
                }
                blob.dts = blob.dts.and_then(|t| t.checked_sub(delta));
            }
        }
        Ok(blob)
    }

    /// Shift a timestamp, clamping at zero
    pub fn apply(&self, ts: ClockTime) -> ClockTime {
        match *self {
            TimeShift::None => ts,
            TimeShift::Forward(delta) => ts.saturating_add(delta),
            TimeShift::Backward(delta) => ts.saturating_sub(delta),
        }
    }
}

/// Rewrite a buffer's timestamps according to `mode`
pub fn reconcile_buffer(
    mode: StreamSync,
    mut blob: Blob,
    own_base: ClockTime,
    node_base: ClockTime,
    playing: bool,
) -> Result<Blob, DropReason> {
    match mode {
        StreamSync::Passthrough => Ok(blob),
        StreamSync::Restart => {
            blob.pts = None;
            blob.dts = None;
            Ok(blob)
        }
        StreamSync::Compensate => {
            if !playing {
                return Err(DropReason::NotPlaying);
            }
            TimeShift::between(own_base, node_base).apply_buffer(blob)
        }
    }
}

/// Rewrite a serialized event's timestamp so it stays aligned with buffers
///
/// Only the compensating policy moves event timestamps.
pub fn reconcile_event(
    mode: StreamSync,
    mut event: Event,
    own_base: ClockTime,
    node_base: ClockTime,
) -> Event {
    if mode == StreamSync::Compensate {
        let shift = TimeShift::between(own_base, node_base);
        event.timestamp = event.timestamp.map(|ts| shift.apply(ts));
    }
    event
}
