//! Producer-side endpoints
//!
//! A node sits at the end of a producing pipeline and replicates everything
//! it receives to the listeners attached to it. [`PipeSink`] is the stock
//! implementation; the registry only relies on the [`Node`] trait.

pub mod allocation;
pub mod config;
pub mod error;
pub mod sink;

use std::sync::Arc;

pub use allocation::{
    aggregate_allocation, AllocationParams, AllocationPlan, AllocationPool, AllocationReply,
    MetaRequest,
};
pub use config::NodeConfig;
pub use error::NodeError;
pub use sink::PipeSink;

use crate::listener::Listener;
use crate::media::Event;

/// The contract the registry and listeners use to talk to a node
pub trait Node: Send + Sync {
    /// Admit a listener into the fan-out set, negotiating caps as needed
    ///
    /// On error the fan-out set is unchanged.
    fn add_listener(&self, listener: Arc<dyn Listener>) -> Result<(), NodeError>;

    /// Remove a listener from the fan-out set
    fn remove_listener(&self, listener: &dyn Listener) -> Result<(), NodeError>;

    /// Forward an upstream event from a listener to the producer
    fn receive_upstream_event(&self, event: Event) -> Result<(), NodeError>;
}

/// The producing pipeline feeding a node
///
/// Receives upstream events such as reconfigure requests. Returns whether
/// the event was handled.
pub trait Upstream: Send + Sync {
    fn send_event(&self, event: Event) -> bool;
}

impl<F> Upstream for F
where
    F: Fn(Event) -> bool + Send + Sync,
{
    fn send_event(&self, event: Event) -> bool {
        self(event)
    }
}
