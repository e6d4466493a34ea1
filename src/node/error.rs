//! Node error types

use thiserror::Error;

/// Error type for node operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Capabilities have no common configuration
    #[error("incompatible caps: {0}")]
    CapsIncompatible(String),

    /// The producer refused to renegotiate its output
    #[error("upstream refused to reconfigure")]
    ReconfigureFailed,

    /// The listener refused the narrowed caps
    #[error("listener {0} refused the negotiated caps")]
    SetCapsFailed(String),

    /// The listener is not attached to this node
    #[error("listener not found: {0}")]
    ListenerNotFound(String),

    /// Upstream events need exactly one listener
    #[error("upstream event needs exactly one listener, node has {count}")]
    MultipleSubscribers { count: usize },

    /// The producer did not accept the upstream event
    #[error("upstream rejected {0} event")]
    UpstreamRejected(&'static str),
}
