//! Node registry implementation
//!
//! The process-wide directory mapping node names to live nodes, plus the
//! subscription table recording which listener targets which name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::broadcast;

use super::attach::AttachState;
use super::config::RegistryConfig;
use super::error::RegistryError;
use super::event::RegistryEvent;
use crate::listener::Listener;
use crate::node::Node;

struct Registration {
    node: Weak<dyn Node>,
    /// Distinguishes re-registrations of the same node under the same name
    epoch: u64,
}

struct Subscription {
    listener: Weak<dyn Listener>,
    state: AttachState,
}

type Gate = Arc<ReentrantMutex<()>>;

/// Directory of named nodes and their listeners
///
/// The registry holds only weak references: a node or listener is owned by
/// whoever created it and removes itself when dropped.
///
/// Lock order is listener gate, then subscriptions, then nodes. The gate
/// serializes attach and detach of one listener and is the only lock held
/// while a node is called, so nodes, producers and consumers may call back
/// into the registry from `add_listener` / `remove_listener`. The gate is
/// reentrant for the same reason. Notifications to listeners are delivered
/// with no registry lock held.
pub struct Registry {
    /// Node name to node
    nodes: Mutex<HashMap<String, Registration>>,

    /// Source of registration epochs
    epochs: AtomicU64,

    /// Listener name to subscription
    subscriptions: Mutex<HashMap<String, Subscription>>,

    /// Listener name to its attach/detach gate
    gates: Mutex<HashMap<String, Gate>>,

    /// Lifecycle event fan-out
    events: broadcast::Sender<RegistryEvent>,

    /// Configuration
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            nodes: Mutex::new(HashMap::new()),
            epochs: AtomicU64::new(0),
            subscriptions: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            events,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Look up a live node by name
    pub fn find_node(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.lookup(name).map(|(node, _)| node)
    }

    /// Names of all live nodes
    pub fn node_names(&self) -> Vec<String> {
        self.nodes
            .lock()
            .iter()
            .filter(|(_, entry)| entry.node.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes
            .lock()
            .values()
            .filter(|entry| entry.node.strong_count() > 0)
            .count()
    }

    /// Number of listeners that are attached or pending
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Current attachment state of the named listener
    pub fn attach_state(&self, listener: &str) -> AttachState {
        self.subscriptions
            .lock()
            .get(listener)
            .map(|sub| sub.state.clone())
            .unwrap_or_default()
    }

    /// Register a node under `name`
    ///
    /// Listeners waiting for `name` are notified once the node is visible.
    /// A stale entry left by a dropped node is replaced.
    pub fn register_node(&self, node: Weak<dyn Node>, name: &str) -> Result<(), RegistryError> {
        {
            let mut nodes = self.nodes.lock();
            if nodes
                .get(name)
                .is_some_and(|existing| existing.node.strong_count() > 0)
            {
                tracing::warn!(node = %name, "Node name already in use");
                return Err(RegistryError::AlreadyExists(name.to_string()));
            }
            let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
            nodes.insert(name.to_string(), Registration { node, epoch });
        }

        tracing::info!(node = %name, "Node registered");
        self.publish(RegistryEvent::NodeAdded {
            node: name.to_string(),
        });

        let waiting = self.collect_listeners(|state| state.is_pending_on(name));
        for listener in waiting {
            tracing::debug!(node = %name, listener = %listener.name(), "Notifying pending listener");
            listener.node_added(name);
        }

        Ok(())
    }

    /// Remove the node registered under `name`
    ///
    /// Only the node that holds the name may remove it. Its attached
    /// listeners are told the node went away.
    pub fn unregister_node(&self, node: &Weak<dyn Node>, name: &str) -> Result<(), RegistryError> {
        {
            let mut nodes = self.nodes.lock();
            match nodes.get(name) {
                Some(existing) if Weak::ptr_eq(&existing.node, node) => {
                    nodes.remove(name);
                }
                _ => {
                    tracing::debug!(node = %name, "Unregister for a name this node does not hold");
                    return Err(RegistryError::NotFound(name.to_string()));
                }
            }
        }

        tracing::info!(node = %name, "Node unregistered");
        self.publish(RegistryEvent::NodeRemoved {
            node: name.to_string(),
        });

        let attached = self.collect_listeners(|state| state.is_attached_to(name));
        for listener in attached {
            tracing::debug!(node = %name, listener = %listener.name(), "Notifying attached listener");
            listener.node_removed(name);
        }

        Ok(())
    }

    /// Attach `listener` to the node named `name`
    ///
    /// If the node does not exist yet the subscription is parked as pending
    /// and completes when the node registers. A listener attached elsewhere
    /// is detached first. On failure no subscription is recorded.
    pub fn listen(&self, listener: Arc<dyn Listener>, name: &str) -> Result<(), RegistryError> {
        let listener_name = listener.name().to_string();
        let gate = self.gate(&listener_name);
        let _serial = gate.lock();

        let previous = self.attach_state(&listener_name);
        if previous.is_attached_to(name) {
            tracing::debug!(listener = %listener_name, node = %name, "Already listening");
            return Ok(());
        }

        self.subscriptions.lock().remove(&listener_name);
        if let AttachState::Attached(current) = previous {
            self.detach_from(&current, listener.as_ref());
            self.publish(RegistryEvent::ListenerDetached {
                listener: listener_name.clone(),
                node: Some(current),
            });
        }

        loop {
            // Checked under the subscription lock so a node registering
            // concurrently either is found here or sees the pending record
            let (node, epoch) = {
                let mut subs = self.subscriptions.lock();
                match self.lookup(name) {
                    Some(found) => found,
                    None => {
                        subs.insert(
                            listener_name.clone(),
                            Subscription {
                                listener: Arc::downgrade(&listener),
                                state: AttachState::Pending(name.to_string()),
                            },
                        );
                        drop(subs);
                        tracing::info!(
                            listener = %listener_name,
                            node = %name,
                            "Node not registered yet, listener pending"
                        );
                        self.publish(RegistryEvent::ListenerPending {
                            listener: listener_name,
                            node: name.to_string(),
                        });
                        return Ok(());
                    }
                }
            };

            if let Err(source) = node.add_listener(Arc::clone(&listener)) {
                tracing::warn!(
                    listener = %listener_name,
                    node = %name,
                    error = %source,
                    "Node refused listener"
                );
                return Err(RegistryError::AttachFailed {
                    listener: listener_name,
                    node: name.to_string(),
                    source,
                });
            }

            // The node may have been unregistered, or unregistered and
            // registered again, while it negotiated
            let committed = {
                let mut subs = self.subscriptions.lock();
                let still_registered = self
                    .nodes
                    .lock()
                    .get(name)
                    .is_some_and(|current| current.epoch == epoch);
                if still_registered {
                    subs.insert(
                        listener_name.clone(),
                        Subscription {
                            listener: Arc::downgrade(&listener),
                            state: AttachState::Attached(name.to_string()),
                        },
                    );
                }
                still_registered
            };

            if committed {
                tracing::info!(listener = %listener_name, node = %name, "Listener attached");
                self.publish(RegistryEvent::ListenerAttached {
                    listener: listener_name,
                    node: name.to_string(),
                });
                return Ok(());
            }

            tracing::debug!(listener = %listener_name, node = %name, "Node went away while attaching, retrying");
            let _ = node.remove_listener(listener.as_ref());
        }
    }

    /// End the listener's subscription, detaching it from its node
    ///
    /// A node that has disappeared in the meantime is logged and the
    /// subscription is cleared anyway.
    pub fn leave(&self, listener: &dyn Listener) -> Result<(), RegistryError> {
        let listener_name = listener.name().to_string();
        let gate = self.gate(&listener_name);
        let serial = gate.lock();

        let sub = self
            .subscriptions
            .lock()
            .remove(&listener_name)
            .ok_or_else(|| RegistryError::NotAttached(listener_name.clone()))?;

        let node = match sub.state {
            AttachState::Attached(target) => {
                self.detach_from(&target, listener);
                Some(target)
            }
            _ => None,
        };

        tracing::info!(listener = %listener_name, node = ?node, "Listener left");
        self.publish(RegistryEvent::ListenerDetached {
            listener: listener_name.clone(),
            node,
        });

        drop(serial);
        drop(gate);
        self.release_gate(&listener_name);
        Ok(())
    }

    /// Complete a pending subscription once its node shows up
    ///
    /// Does nothing if the listener moved on in the meantime.
    pub(crate) fn resume_pending(
        &self,
        listener: Arc<dyn Listener>,
        name: &str,
    ) -> Result<(), RegistryError> {
        let gate = self.gate(listener.name());
        let _serial = gate.lock();
        if !self.attach_state(listener.name()).is_pending_on(name) {
            return Ok(());
        }
        self.listen(listener, name)
    }

    /// Leave, but only if still attached to `name`
    ///
    /// Returns whether the listener left.
    pub(crate) fn leave_if_attached_to(&self, listener: &dyn Listener, name: &str) -> bool {
        let gate = self.gate(listener.name());
        let serial = gate.lock();
        let left = self.attach_state(listener.name()).is_attached_to(name)
            && self.leave(listener).is_ok();

        drop(serial);
        drop(gate);
        self.release_gate(listener.name());
        left
    }

    fn lookup(&self, name: &str) -> Option<(Arc<dyn Node>, u64)> {
        let nodes = self.nodes.lock();
        let entry = nodes.get(name)?;
        entry.node.upgrade().map(|node| (node, entry.epoch))
    }

    fn gate(&self, listener: &str) -> Gate {
        Arc::clone(
            self.gates
                .lock()
                .entry(listener.to_string())
                .or_insert_with(|| Arc::new(ReentrantMutex::new(()))),
        )
    }

    /// Drop the gate of a detached listener nobody else is holding
    fn release_gate(&self, listener: &str) {
        let mut gates = self.gates.lock();
        if gates.get(listener).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(listener);
        }
    }

    fn detach_from(&self, node_name: &str, listener: &dyn Listener) {
        match self.find_node(node_name) {
            Some(node) => {
                if let Err(e) = node.remove_listener(listener) {
                    tracing::warn!(
                        listener = %listener.name(),
                        node = %node_name,
                        error = %e,
                        "Listener was not registered on node"
                    );
                }
            }
            None => {
                tracing::debug!(
                    listener = %listener.name(),
                    node = %node_name,
                    "Node gone, treating listener as detached"
                );
            }
        }
    }

    /// Snapshot the live listeners whose state matches, pruning dead entries
    fn collect_listeners(&self, matches: impl Fn(&AttachState) -> bool) -> Vec<Arc<dyn Listener>> {
        let mut subs = self.subscriptions.lock();
        subs.retain(|_, sub| sub.listener.strong_count() > 0);
        subs.values()
            .filter(|sub| matches(&sub.state))
            .filter_map(|sub| sub.listener.upgrade())
            .collect()
    }

    fn publish(&self, event: RegistryEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
