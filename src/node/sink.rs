//! The stock node: a named sink that replicates into listeners
//!
//! ```text
//!   producer ──► PipeSink "cam" ──┬──► listener "preview"
//!                                 ├──► listener "record"
//!                                 └──► listener "stream"
//! ```
//!
//! Every buffer and forwarded event is cloned to each listener. Caps are
//! negotiated as the intersection of what the listeners accept, and a
//! listener joining with different needs either triggers a producer
//! reconfigure (if it is the first) or narrows the shared caps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::allocation::{aggregate_allocation, AllocationPlan};
use super::config::NodeConfig;
use super::error::NodeError;
use super::{Node, Upstream};
use crate::caps::Caps;
use crate::listener::Listener;
use crate::media::{Blob, ClockTime, Event, EventKind};
use crate::registry::{Registry, RegistryError};
use crate::stats::{NodeCounters, NodeStats};

#[derive(Default)]
struct SinkState {
    /// Fan-out set keyed by listener name; listeners are owned by their pipelines
    listeners: HashMap<String, Weak<dyn Listener>>,
    /// Caps the producer is currently pushing
    caps: Option<Caps>,
    /// Cached intersection of the listeners' caps
    negotiated: Option<Caps>,
    /// PTS of the most recent buffer
    last_pts: Option<ClockTime>,
}

impl SinkState {
    /// Upgrade the live listeners, pruning the ones that were dropped
    ///
    /// The returned handles must outlive the state guard: dropping the last
    /// one runs the listener's teardown, which calls back into this node.
    fn live_listeners(&mut self) -> Vec<Arc<dyn Listener>> {
        let before = self.listeners.len();
        self.listeners.retain(|_, listener| listener.strong_count() > 0);
        if before != self.listeners.len() && self.listeners.is_empty() {
            self.negotiated = None;
        }
        self.listeners.values().filter_map(Weak::upgrade).collect()
    }

    fn live_count(&self) -> usize {
        self.listeners
            .values()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }
}

/// A producer-side endpoint that fans out to attached listeners
pub struct PipeSink {
    me: Weak<PipeSink>,
    registry: Arc<Registry>,
    upstream: Arc<dyn Upstream>,
    name: Mutex<Option<String>>,
    forward_events: AtomicBool,
    forward_eos: AtomicBool,
    base_time: AtomicU64,
    state: Mutex<SinkState>,
    counters: NodeCounters,
}

impl PipeSink {
    /// Create an unpublished sink with default configuration
    pub fn new(registry: Arc<Registry>, upstream: Arc<dyn Upstream>) -> Arc<Self> {
        Self::with_config(registry, upstream, NodeConfig::default())
    }

    /// Create an unpublished sink with custom configuration
    pub fn with_config(
        registry: Arc<Registry>,
        upstream: Arc<dyn Upstream>,
        config: NodeConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| PipeSink {
            me: me.clone(),
            registry,
            upstream,
            name: Mutex::new(None),
            forward_events: AtomicBool::new(config.forward_events),
            forward_eos: AtomicBool::new(config.forward_eos),
            base_time: AtomicU64::new(0),
            state: Mutex::new(SinkState::default()),
            counters: NodeCounters::default(),
        })
    }

    /// Name the sink is registered under
    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    /// Register the sink under `name`
    ///
    /// Publishing an already published sink under a different name renames
    /// it: the old registration is removed (detaching its listeners) before
    /// the new one is added.
    pub fn publish(&self, name: &str) -> Result<(), RegistryError> {
        let current = self.name();
        match current.as_deref() {
            Some(current) if current == name => return Ok(()),
            Some(_) => self.unpublish(),
            None => {}
        }

        let me: Weak<dyn Node> = self.me.clone();
        self.registry.register_node(me, name)?;
        *self.name.lock() = Some(name.to_string());
        Ok(())
    }

    /// Move the registration to `name`
    ///
    /// Listeners of the old name are told the node went away. An
    /// unpublished sink is simply published.
    pub fn rename(&self, name: &str) -> Result<(), RegistryError> {
        self.publish(name)
    }

    /// Remove the sink from the registry and drop every listener
    pub fn unpublish(&self) {
        let Some(name) = self.name.lock().take() else {
            return;
        };

        let me: Weak<dyn Node> = self.me.clone();
        if let Err(e) = self.registry.unregister_node(&me, &name) {
            tracing::warn!(node = %name, error = %e, "Failed to unregister node");
        }

        let released = {
            let mut state = self.state.lock();
            state.negotiated = None;
            let count = state.live_count();
            state.listeners.clear();
            count
        };
        if released > 0 {
            tracing::debug!(node = %name, count = released, "Released remaining listeners");
        }
    }

    /// Number of attached listeners
    pub fn num_listeners(&self) -> usize {
        self.state.lock().live_count()
    }

    /// Names of the attached listeners, sorted
    pub fn listener_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .state
            .lock()
            .listeners
            .iter()
            .filter(|(_, listener)| listener.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Caps the producer is currently pushing
    pub fn caps(&self) -> Option<Caps> {
        self.state.lock().caps.clone()
    }

    /// Cached intersection of the listeners' caps
    pub fn negotiated_caps(&self) -> Option<Caps> {
        self.state.lock().negotiated.clone()
    }

    /// Running-time origin of the producing pipeline
    pub fn base_time(&self) -> ClockTime {
        self.base_time.load(Ordering::Acquire)
    }

    /// Set the running-time origin of the producing pipeline
    pub fn set_base_time(&self, base_time: ClockTime) {
        self.base_time.store(base_time, Ordering::Release);
    }

    /// Whether downstream events are replicated to listeners
    pub fn forward_events(&self) -> bool {
        self.forward_events.load(Ordering::Acquire)
    }

    /// Enable or disable event replication
    pub fn set_forward_events(&self, enabled: bool) {
        self.forward_events.store(enabled, Ordering::Release);
    }

    /// Whether end-of-stream reaches the listeners
    pub fn forward_eos(&self) -> bool {
        self.forward_eos.load(Ordering::Acquire)
    }

    /// Enable or disable end-of-stream forwarding
    pub fn set_forward_eos(&self, enabled: bool) {
        self.forward_eos.store(enabled, Ordering::Release);
    }

    /// Current statistics
    pub fn stats(&self) -> NodeStats {
        self.counters.snapshot(self.num_listeners())
    }

    /// Compute the caps the producer may push
    ///
    /// Returns the intersection of every listener's caps (and of the
    /// previously negotiated caps), or `filter` / `ANY` when nobody listens.
    /// When the listeners cannot agree, or disagree with `filter`, every
    /// listener is detached and `None` is returned.
    pub fn query_capabilities(&self, filter: Option<&Caps>) -> Option<Caps> {
        let mut state = self.state.lock();
        let listeners = state.live_listeners();

        if listeners.is_empty() {
            drop(state);
            tracing::debug!(node = %self.label(), "No listeners, accepting any caps");
            return Some(filter.cloned().unwrap_or_else(Caps::any));
        }

        let mut negotiated = state.negotiated.clone().unwrap_or_else(Caps::any);
        for listener in &listeners {
            let (caps, _) = listener.capabilities();
            negotiated = negotiated.intersect(&caps);
        }

        let compatible =
            !negotiated.is_empty() && filter.map_or(true, |f| negotiated.can_intersect(f));
        if compatible {
            state.negotiated = Some(negotiated.clone());
            drop(state);
            tracing::debug!(node = %self.label(), caps = %negotiated, "Negotiated caps");
            return Some(negotiated);
        }

        tracing::error!(
            node = %self.label(),
            negotiated = %negotiated,
            filter = ?filter.map(ToString::to_string),
            "Listeners have no common caps, detaching all"
        );
        state.negotiated = None;
        drop(state);

        self.counters.add_rejected(listeners.len() as u64);
        for listener in &listeners {
            self.force_detach(listener.as_ref());
        }
        None
    }

    /// Accept new caps from the producer and push them to every listener
    ///
    /// The caps are recorded as the ones the producer pushes either way.
    /// When they cannot intersect what the listeners negotiated, the
    /// listeners are left untouched and an error is returned.
    pub fn set_capabilities(&self, caps: &Caps) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        state.caps = Some(caps.clone());
        let listeners = state.live_listeners();

        if listeners.is_empty() {
            drop(state);
            tracing::debug!(node = %self.label(), caps = %caps, "Caps set with no listeners");
            return Ok(());
        }

        let negotiated = match &state.negotiated {
            Some(negotiated) => negotiated.clone(),
            None => listeners
                .iter()
                .fold(Caps::any(), |acc, l| acc.intersect(&l.capabilities().0)),
        };

        if !negotiated.can_intersect(caps) {
            drop(state);
            tracing::warn!(
                node = %self.label(),
                caps = %caps,
                negotiated = %negotiated,
                "Caps do not match what listeners accept"
            );
            return Err(NodeError::CapsIncompatible(format!(
                "{} against negotiated {}",
                caps, negotiated
            )));
        }

        for listener in &listeners {
            if let Err(e) = listener.set_capabilities(caps) {
                tracing::warn!(
                    node = %self.label(),
                    listener = %listener.name(),
                    error = %e,
                    "Listener refused new caps"
                );
            }
        }
        drop(state);

        tracing::info!(node = %self.label(), caps = %caps, listeners = listeners.len(), "Caps set");
        Ok(())
    }

    /// Replicate a buffer to every listener
    ///
    /// Delivery failures are per listener and never stop the fan-out.
    pub fn push_buffer(&self, blob: Blob) {
        let mut state = self.state.lock();
        if blob.pts.is_some() {
            state.last_pts = blob.pts;
        }
        let listeners = state.live_listeners();

        // Delivered under the lock to keep buffers in order per listener
        let base_time = self.base_time();
        for listener in &listeners {
            if let Err(e) = listener.push_buffer(blob.clone(), base_time) {
                tracing::trace!(listener = %listener.name(), error = %e, "Buffer not delivered");
                self.counters.inc_delivery_errors();
            }
        }
        drop(state);
        self.counters.inc_buffers();
    }

    /// Handle a downstream event from the producer
    ///
    /// Caps events update the negotiated caps and end-of-stream goes
    /// through [`send_eos`](Self::send_eos). Everything else is replicated
    /// when event forwarding is enabled, serialized events stamped with the
    /// PTS of the last buffer so listeners can keep them in order.
    pub fn push_event(&self, event: Event) -> Result<(), NodeError> {
        match &event.kind {
            EventKind::Caps(caps) => return self.set_capabilities(caps),
            EventKind::Eos => {
                self.send_eos();
                return Ok(());
            }
            _ => {}
        }

        if !event.is_downstream() {
            tracing::debug!(node = %self.label(), event = event.name(), "Ignoring upstream-only event");
            return Ok(());
        }
        if !self.forward_events() {
            tracing::trace!(node = %self.label(), event = event.name(), "Event forwarding disabled");
            return Ok(());
        }

        let mut state = self.state.lock();
        let mut event = event;
        if event.is_serialized() {
            event.timestamp = Some(state.last_pts.unwrap_or(0));
        }
        let listeners = state.live_listeners();

        let base_time = self.base_time();
        for listener in &listeners {
            tracing::trace!(listener = %listener.name(), event = event.name(), "Forwarding event");
            if let Err(e) = listener.push_event(event.clone(), base_time) {
                tracing::debug!(listener = %listener.name(), error = %e, "Event not delivered");
                self.counters.inc_delivery_errors();
            }
        }
        drop(state);
        self.counters.inc_events();
        Ok(())
    }

    /// Tell every listener the stream ended, if EOS forwarding is enabled
    pub fn send_eos(&self) {
        if !self.forward_eos() {
            tracing::debug!(node = %self.label(), "EOS forwarding disabled");
            return;
        }

        let mut state = self.state.lock();
        let listeners = state.live_listeners();
        for listener in &listeners {
            if let Err(e) = listener.send_eos() {
                tracing::debug!(listener = %listener.name(), error = %e, "EOS not delivered");
                self.counters.inc_delivery_errors();
            }
        }
        drop(state);

        tracing::info!(node = %self.label(), listeners = listeners.len(), "EOS forwarded");
        self.counters.inc_eos();
    }

    /// Ask every listener how buffers should be allocated and merge the answers
    pub fn propose_allocation(&self, caps: Option<&Caps>) -> AllocationPlan {
        let listeners = self.state.lock().live_listeners();
        let replies: Vec<_> = listeners
            .iter()
            .map(|listener| listener.query_allocation(caps))
            .collect();

        let plan = aggregate_allocation(&replies);
        tracing::debug!(
            node = %self.label(),
            participants = plan.participants,
            ok = plan.is_ok(),
            "Allocation proposal aggregated"
        );
        plan
    }

    fn force_detach(&self, listener: &dyn Listener) {
        let label = self.label();
        if !self.registry.leave_if_attached_to(listener, &label) {
            tracing::debug!(node = %label, listener = %listener.name(), "Listener had no subscription here");
        }
        // The registry may have resolved the name to another node
        let _ = Node::remove_listener(self, listener);
    }

    fn label(&self) -> String {
        self.name.lock().clone().unwrap_or_default()
    }
}

impl Node for PipeSink {
    fn add_listener(&self, listener: Arc<dyn Listener>) -> Result<(), NodeError> {
        let listener_name = listener.name().to_string();
        let (caps, fixed) = listener.capabilities();
        let mut state = self.state.lock();

        let duplicate = state
            .listeners
            .get(&listener_name)
            .is_some_and(|existing| existing.strong_count() > 0);
        if duplicate {
            tracing::warn!(node = %self.label(), listener = %listener_name, "Listener already attached");
            return Ok(());
        }

        match state.caps.clone() {
            Some(current) if !fixed => {
                if let Err(e) = listener.set_capabilities(&current) {
                    tracing::warn!(
                        node = %self.label(),
                        listener = %listener_name,
                        error = %e,
                        "Listener refused current caps"
                    );
                }
            }
            Some(current) if caps != current => {
                if state.live_count() == 0 {
                    tracing::info!(
                        node = %self.label(),
                        listener = %listener_name,
                        caps = %caps,
                        "First listener needs different caps, requesting reconfigure"
                    );
                    drop(state);
                    if !self.upstream.send_event(Event::reconfigure()) {
                        tracing::warn!(node = %self.label(), "Producer refused to reconfigure");
                        self.counters.add_rejected(1);
                        return Err(NodeError::ReconfigureFailed);
                    }
                    state = self.state.lock();
                } else {
                    let base = state.negotiated.clone().unwrap_or(current);
                    let narrowed = base.intersect(&caps);
                    if narrowed.is_empty() {
                        tracing::error!(
                            node = %self.label(),
                            listener = %listener_name,
                            caps = %caps,
                            negotiated = %base,
                            "Listener caps incompatible with the other listeners"
                        );
                        self.counters.add_rejected(1);
                        return Err(NodeError::CapsIncompatible(format!(
                            "{} against negotiated {}",
                            caps, base
                        )));
                    }
                    if let Err(e) = listener.set_capabilities(&narrowed) {
                        tracing::warn!(
                            node = %self.label(),
                            listener = %listener_name,
                            error = %e,
                            "Listener refused negotiated caps"
                        );
                        self.counters.add_rejected(1);
                        return Err(NodeError::SetCapsFailed(listener_name));
                    }
                    state.negotiated = Some(narrowed);
                }
            }
            Some(_) => {}
            None => {
                tracing::debug!(node = %self.label(), listener = %listener_name, "No caps yet");
            }
        }

        state
            .listeners
            .insert(listener_name.clone(), Arc::downgrade(&listener));
        tracing::info!(
            node = %self.label(),
            listener = %listener_name,
            listeners = state.live_count(),
            "Listener added"
        );
        Ok(())
    }

    fn remove_listener(&self, listener: &dyn Listener) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        if state.listeners.remove(listener.name()).is_none() {
            return Err(NodeError::ListenerNotFound(listener.name().to_string()));
        }
        let remaining = state.live_count();
        if remaining == 0 {
            state.negotiated = None;
        }

        tracing::info!(
            node = %self.label(),
            listener = %listener.name(),
            listeners = remaining,
            "Listener removed"
        );
        Ok(())
    }

    fn receive_upstream_event(&self, event: Event) -> Result<(), NodeError> {
        let count = self.num_listeners();
        if count != 1 {
            tracing::debug!(
                node = %self.label(),
                event = event.name(),
                listeners = count,
                "Upstream event dropped"
            );
            return Err(NodeError::MultipleSubscribers { count });
        }

        let name = event.name();
        if !self.upstream.send_event(event) {
            return Err(NodeError::UpstreamRejected(name));
        }
        self.counters.inc_upstream();
        Ok(())
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        if let Some(name) = self.name.get_mut().take() {
            let me: Weak<dyn Node> = self.me.clone();
            if self.registry.unregister_node(&me, &name).is_ok() {
                tracing::debug!(node = %name, "Node dropped");
            }
        }
    }
}
