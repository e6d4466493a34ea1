//! Named connection points for routing live media between pipelines
//!
//! A producing pipeline ends in a [`PipeSink`] published under a name; any
//! number of consuming pipelines start with a [`PipeSource`] that listens to
//! that name. Buffers and events pushed into the sink are replicated to every
//! attached source, and sources can switch between sinks at runtime without
//! either pipeline being rebuilt.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use interpipe::listener::Downstream;
//! use interpipe::{Blob, Event, PipeSink, PipeSource, Pulled, Registry, SourceConfig};
//!
//! struct Player;
//!
//! impl Downstream for Player {
//!     fn push_event(&self, _event: Event) -> bool {
//!         true
//!     }
//! }
//!
//! # fn main() -> interpipe::Result<()> {
//! let registry = Arc::new(Registry::new());
//!
//! let camera = PipeSink::new(registry.clone(), Arc::new(|_: Event| true));
//! camera.publish("camera")?;
//!
//! let preview = PipeSource::with_config(
//!     "preview",
//!     registry.clone(),
//!     Arc::new(Player),
//!     SourceConfig::listening_to("camera"),
//! );
//! preview.start()?;
//!
//! camera.push_buffer(Blob::with_pts(Bytes::from_static(b"frame"), 0));
//! assert!(matches!(preview.pull(), Some(Pulled::Buffer(_))));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`registry`]: the name directory and attachment bookkeeping
//! - [`node`]: producer-side endpoints and caps negotiation
//! - [`listener`]: consumer-side endpoints and timestamp reconciliation
//! - [`caps`]: capability descriptors and their text form
//! - [`media`]: buffers and events

pub mod caps;
pub mod error;
pub mod listener;
pub mod media;
pub mod node;
pub mod registry;
pub mod stats;

pub use caps::Caps;
pub use error::{Error, Result};
pub use listener::{Listener, PipeSource, Pulled, SourceConfig, StreamSync};
pub use media::{Blob, ClockTime, Event, EventKind};
pub use node::{Node, NodeConfig, PipeSink};
pub use registry::{AttachState, Registry, RegistryConfig, RegistryEvent};
pub use stats::{NodeStats, SourceStats};
