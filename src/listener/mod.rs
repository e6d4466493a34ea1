//! Consumer-side endpoints
//!
//! A listener sits at the head of a consuming pipeline and receives what the
//! node it is attached to produces. [`PipeSource`] is the stock
//! implementation; nodes and the registry only rely on the [`Listener`]
//! trait.

pub mod config;
pub mod error;
pub mod pending;
pub mod source;
pub mod sync;

pub use config::{SourceConfig, StreamSync};
pub use error::{DropReason, ListenerError};
pub use pending::PendingEvents;
pub use source::{Phase, PipeSource, Pulled};

use crate::caps::Caps;
use crate::media::{Blob, ClockTime, Event};
use crate::node::AllocationReply;

/// The contract nodes and the registry use to talk to a listener
///
/// Listener names key the registry's subscription table and must be unique
/// within a registry.
pub trait Listener: Send + Sync {
    fn name(&self) -> &str;

    /// Caps this listener accepts, and whether they are pinned
    ///
    /// Pinned caps are the ones a node must honor when the listener joins;
    /// unpinned listeners adopt whatever the node is producing.
    fn capabilities(&self) -> (Caps, bool);

    /// Accept caps chosen by the node
    fn set_capabilities(&self, caps: &Caps) -> Result<(), ListenerError>;

    /// A node was registered under `node`
    fn node_added(&self, node: &str);

    /// The node registered under `node` went away
    fn node_removed(&self, node: &str);

    /// Receive a buffer stamped against the node's base time
    fn push_buffer(&self, blob: Blob, node_base_time: ClockTime) -> Result<(), ListenerError>;

    /// Receive an event stamped against the node's base time
    fn push_event(&self, event: Event, node_base_time: ClockTime) -> Result<(), ListenerError>;

    /// The node's stream ended
    fn send_eos(&self) -> Result<(), ListenerError>;

    /// Answer an allocation query, `None` if it failed
    fn query_allocation(&self, caps: Option<&Caps>) -> Option<AllocationReply>;
}

/// The consuming pipeline behind a listener
pub trait Downstream: Send + Sync {
    /// Caps the consuming pipeline accepts
    fn query_caps(&self) -> Caps {
        Caps::any()
    }

    /// Deliver an event; returns whether it was accepted
    fn push_event(&self, event: Event) -> bool;

    /// Answer an allocation query
    fn query_allocation(&self, _caps: Option<&Caps>) -> Option<AllocationReply> {
        Some(AllocationReply::default())
    }
}
