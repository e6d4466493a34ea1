//! Node registry for named inter-pipeline routing
//!
//! The registry is the meeting point between producing pipelines (nodes) and
//! consuming pipelines (listeners). Nodes register under a unique name;
//! listeners ask for a name and are attached as soon as a node holds it.
//!
//! # Architecture
//!
//! ```text
//!                             Arc<Registry>
//!                     ┌──────────────────────────┐
//!                     │ nodes: HashMap<name,     │
//!                     │   Weak<dyn Node>>        │
//!                     │ subscriptions: HashMap<  │
//!                     │   listener, AttachState> │
//!                     └────────────┬─────────────┘
//!                                  │ listen / leave
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!    [PipeSink "cam"]  ──►  [PipeSource "a"]          [PipeSource "b"]
//!    push_buffer()          push_buffer() ─► queue    push_buffer() ─► queue
//! ```
//!
//! Listeners that ask for a name before it is registered are parked as
//! pending and attached when the node appears. Lifecycle changes are also
//! published on a `tokio::sync::broadcast` channel for observers.

pub mod attach;
pub mod config;
pub mod error;
pub mod event;
pub mod store;

pub use attach::AttachState;
pub use config::RegistryConfig;
pub use error::RegistryError;
pub use event::RegistryEvent;
pub use store::Registry;
