//! Registry lifecycle notifications

/// A change in the registry, published to [`subscribe_events`] receivers
///
/// [`subscribe_events`]: super::Registry::subscribe_events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A node was registered under `node`
    NodeAdded { node: String },
    /// The node registered under `node` went away
    NodeRemoved { node: String },
    /// A listener started receiving from a node
    ListenerAttached { listener: String, node: String },
    /// A listener is waiting for a node that does not exist yet
    ListenerPending { listener: String, node: String },
    /// A listener's subscription ended
    ListenerDetached {
        listener: String,
        /// The node it was attached to, `None` if it was only pending
        node: Option<String>,
    },
}
