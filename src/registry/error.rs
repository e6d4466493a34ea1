//! Registry error types

use thiserror::Error;

use crate::node::NodeError;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A live node already holds the name
    #[error("node already registered: {0}")]
    AlreadyExists(String),

    /// No node with this name (or not the node that holds it)
    #[error("node not found: {0}")]
    NotFound(String),

    /// The listener has no subscription to leave
    #[error("listener not attached: {0}")]
    NotAttached(String),

    /// The node refused the listener
    #[error("listener {listener} could not attach to node {node}: {source}")]
    AttachFailed {
        listener: String,
        node: String,
        #[source]
        source: NodeError,
    },
}
