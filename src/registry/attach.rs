//! Listener attachment state
//!
//! ```text
//!              listen(name), node absent
//!   Detached ───────────────────────────► Pending(name)
//!      │  ▲                                   │
//!      │  │ leave / node_removed               │ node_added(name)
//!      │  │                                   ▼
//!      └──┼───────────────────────────────► Attached(name)
//!         │     listen(name), node present    │
//!         └───────────────────────────────────┘
//! ```

use std::fmt;

/// Where a listener stands with respect to its target node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttachState {
    /// No subscription
    #[default]
    Detached,
    /// Waiting for the named node to be registered
    Pending(String),
    /// Receiving from the named node
    Attached(String),
}

impl AttachState {
    /// Name of the node the listener targets, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            AttachState::Detached => None,
            AttachState::Pending(name) | AttachState::Attached(name) => Some(name),
        }
    }

    /// Whether the listener is receiving from `name`
    pub fn is_attached_to(&self, name: &str) -> bool {
        matches!(self, AttachState::Attached(n) if n == name)
    }

    /// Whether the listener is waiting for `name`
    pub fn is_pending_on(&self, name: &str) -> bool {
        matches!(self, AttachState::Pending(n) if n == name)
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, AttachState::Attached(_))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, AttachState::Detached)
    }
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachState::Detached => write!(f, "detached"),
            AttachState::Pending(name) => write!(f, "pending on {}", name),
            AttachState::Attached(name) => write!(f, "attached to {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target() {
        assert_eq!(AttachState::Detached.target(), None);
        assert_eq!(AttachState::Pending("cam".into()).target(), Some("cam"));
        assert_eq!(AttachState::Attached("cam".into()).target(), Some("cam"));
    }

    #[test]
    fn test_predicates() {
        let state = AttachState::Attached("cam".into());
        assert!(state.is_attached_to("cam"));
        assert!(!state.is_attached_to("mic"));
        assert!(!state.is_pending_on("cam"));
        assert!(AttachState::Pending("mic".into()).is_pending_on("mic"));
        assert!(AttachState::default().is_detached());
    }

    #[test]
    fn test_display() {
        assert_eq!(AttachState::Pending("cam".into()).to_string(), "pending on cam");
    }
}
