//! Listener error types

use thiserror::Error;

use crate::media::ClockTime;
use crate::node::NodeError;
use crate::registry::RegistryError;

/// Why a buffer was discarded on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    /// Compensation needs a running clock
    #[error("listener is not playing")]
    NotPlaying,

    /// Shifting the timestamp back would go below zero
    #[error("pts {pts} is earlier than the base time offset {delta}")]
    TimestampUnderflow { pts: ClockTime, delta: ClockTime },
}

/// Error type for listener operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// Caps are pinned and renegotiation is disabled
    #[error("caps already set and renegotiation is disabled")]
    RenegotiationDisabled,

    /// The buffer was discarded by timestamp reconciliation
    #[error("buffer dropped: {0}")]
    Dropped(DropReason),

    /// Switching away from the current node is blocked
    #[error("switch from {current} to {requested} blocked")]
    SwitchBlocked { current: String, requested: String },

    /// The listener is not running
    #[error("listener is flushing")]
    Flushing,

    /// End-of-stream already queued
    #[error("listener reached end of stream")]
    Eos,

    /// The consuming pipeline or the event itself was refused
    #[error("event rejected: {0}")]
    EventRejected(&'static str),

    /// The listener is not attached to any node
    #[error("listener is not attached")]
    NotAttached,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Node(#[from] NodeError),
}
