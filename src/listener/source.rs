//! The stock listener: a named source feeding a consuming pipeline
//!
//! ```text
//!   node ──push_buffer──► reconcile ts ──► buffer queue ──┐
//!        ──push_event───► serialized? ──► pending events ─┤ pull()
//!                         │ no                            ▼
//!                         └──────────────► downstream ◄── due events, then buffer
//! ```
//!
//! Buffers are queued until the consuming pipeline pulls them. Serialized
//! events wait in their own FIFO and are released just before the first
//! buffer whose PTS is later than theirs, so they keep their place on the
//! timeline. Out-of-band events go straight to the downstream.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::config::{SourceConfig, StreamSync};
use super::error::ListenerError;
use super::pending::PendingEvents;
use super::sync;
use super::{Downstream, Listener};
use crate::caps::Caps;
use crate::media::{Blob, ClockTime, Event};
use crate::node::AllocationReply;
use crate::registry::{AttachState, Registry};
use crate::stats::{SourceCounters, SourceStats};

/// Run state of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started: buffers are discarded
    Stopped,
    /// Started: buffers are queued, the clock is not running
    Paused,
    /// Started with a running clock
    Playing,
}

/// What the consuming pipeline gets from [`PipeSource::pull`]
#[derive(Debug, Clone, PartialEq)]
pub enum Pulled {
    Buffer(Blob),
    Eos,
}

struct Timing {
    phase: Phase,
    base_time: ClockTime,
}

#[derive(Default)]
struct Output {
    buffers: VecDeque<Blob>,
    pending: PendingEvents,
    eos: bool,
    eos_delivered: bool,
}

impl Output {
    fn reset(&mut self) {
        self.buffers.clear();
        self.pending.clear();
        self.eos = false;
        self.eos_delivered = false;
    }
}

/// A consumer-side endpoint attached to a node by name
pub struct PipeSource {
    me: Weak<PipeSource>,
    name: String,
    registry: Arc<Registry>,
    downstream: Arc<dyn Downstream>,
    settings: Mutex<SourceConfig>,
    caps: Mutex<Option<Caps>>,
    timing: Mutex<Timing>,
    output: Mutex<Output>,
    counters: SourceCounters,
}

impl PipeSource {
    /// Create a stopped listener with default configuration
    pub fn new(
        name: impl Into<String>,
        registry: Arc<Registry>,
        downstream: Arc<dyn Downstream>,
    ) -> Arc<Self> {
        Self::with_config(name, registry, downstream, SourceConfig::default())
    }

    /// Create a stopped listener with custom configuration
    pub fn with_config(
        name: impl Into<String>,
        registry: Arc<Registry>,
        downstream: Arc<dyn Downstream>,
        config: SourceConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| PipeSource {
            me: me.clone(),
            name: name.into(),
            registry,
            downstream,
            settings: Mutex::new(config),
            caps: Mutex::new(None),
            timing: Mutex::new(Timing {
                phase: Phase::Stopped,
                base_time: 0,
            }),
            output: Mutex::new(Output::default()),
            counters: SourceCounters::default(),
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SourceConfig {
        self.settings.lock().clone()
    }

    /// Name of the node this listener targets
    pub fn listen_to(&self) -> Option<String> {
        self.settings.lock().listen_to.clone()
    }

    /// Change the target node
    ///
    /// A started listener switches immediately. If attaching to the new node
    /// fails, the listener goes back to the node it was receiving from.
    /// `None` detaches.
    pub fn set_listen_to(&self, target: Option<&str>) -> Result<(), ListenerError> {
        let current = self.listen_to();
        if current.as_deref() == target {
            tracing::debug!(listener = %self.name, node = ?target, "Already targeting node");
            return Ok(());
        }

        match target {
            Some(target) => {
                if self.phase() != Phase::Stopped {
                    self.listen_node(target)?;
                }
                self.settings.lock().listen_to = Some(target.to_string());
            }
            None => {
                self.leave();
                self.settings.lock().listen_to = None;
            }
        }

        tracing::info!(listener = %self.name, from = ?current, to = ?target, "Target changed");
        Ok(())
    }

    /// Whether switching away from an attached node is refused
    pub fn block_switch(&self) -> bool {
        self.settings.lock().block_switch
    }

    /// Refuse or allow target switches while attached
    pub fn set_block_switch(&self, enabled: bool) {
        self.settings.lock().block_switch = enabled;
    }

    /// Whether caps may change once set
    pub fn allow_renegotiation(&self) -> bool {
        self.settings.lock().allow_renegotiation
    }

    /// Allow or forbid caps changes after the first set
    pub fn set_allow_renegotiation(&self, enabled: bool) {
        self.settings.lock().allow_renegotiation = enabled;
    }

    /// Timestamp policy applied to incoming buffers and events
    pub fn stream_sync(&self) -> StreamSync {
        self.settings.lock().stream_sync
    }

    /// Change the timestamp policy; applies from the next buffer
    pub fn set_stream_sync(&self, mode: StreamSync) {
        self.settings.lock().stream_sync = mode;
    }

    /// Whether events from the node are accepted
    pub fn accept_events(&self) -> bool {
        self.settings.lock().accept_events
    }

    /// Accept or ignore events from the node
    pub fn set_accept_events(&self, enabled: bool) {
        self.settings.lock().accept_events = enabled;
    }

    /// Whether end-of-stream from the node is accepted
    pub fn accept_eos_event(&self) -> bool {
        self.settings.lock().accept_eos_event
    }

    /// Accept or ignore end-of-stream from the node
    pub fn set_accept_eos_event(&self, enabled: bool) {
        self.settings.lock().accept_eos_event = enabled;
    }

    /// Caps pinned by the node, if any
    pub fn caps(&self) -> Option<Caps> {
        self.caps.lock().clone()
    }

    /// Where this listener stands in the registry
    pub fn attach_state(&self) -> AttachState {
        self.registry.attach_state(&self.name)
    }

    /// Current run state
    pub fn phase(&self) -> Phase {
        self.timing.lock().phase
    }

    /// Running-time origin set by the last [`play`](Self::play)
    pub fn base_time(&self) -> ClockTime {
        self.timing.lock().base_time
    }

    /// Start accepting buffers and attach to the configured node
    pub fn start(&self) -> Result<(), ListenerError> {
        {
            let mut timing = self.timing.lock();
            if timing.phase != Phase::Stopped {
                return Ok(());
            }
            timing.phase = Phase::Paused;
        }
        self.output.lock().reset();

        if let Some(target) = self.listen_to() {
            if let Err(e) = self.listen_node(&target) {
                self.timing.lock().phase = Phase::Stopped;
                return Err(e);
            }
        }

        tracing::info!(listener = %self.name, node = ?self.listen_to(), "Listener started");
        Ok(())
    }

    /// Run the clock from `base_time`, starting first if needed
    pub fn play(&self, base_time: ClockTime) -> Result<(), ListenerError> {
        if self.phase() == Phase::Stopped {
            self.start()?;
        }

        let mut timing = self.timing.lock();
        timing.phase = Phase::Playing;
        timing.base_time = base_time;
        tracing::debug!(listener = %self.name, base_time, "Listener playing");
        Ok(())
    }

    /// Stop the clock, keeping the queues
    pub fn pause(&self) {
        let mut timing = self.timing.lock();
        if timing.phase == Phase::Playing {
            timing.phase = Phase::Paused;
        }
    }

    /// Detach and discard everything queued
    pub fn stop(&self) {
        self.leave();
        self.timing.lock().phase = Phase::Stopped;
        self.output.lock().reset();
        tracing::info!(listener = %self.name, "Listener stopped");
    }

    /// Take the next buffer for the consuming pipeline
    ///
    /// Serialized events due before the buffer are delivered to the
    /// downstream first. With nothing queued, pending events stay where they
    /// are until a buffer arrives. Once the queue is empty and end-of-stream
    /// was received, the remaining events are flushed and [`Pulled::Eos`] is
    /// returned exactly once.
    pub fn pull(&self) -> Option<Pulled> {
        let next = self.output.lock().buffers.pop_front();
        if let Some(blob) = next {
            self.drain_pending_events(blob.pts);
            self.counters.inc_pulled();
            return Some(Pulled::Buffer(blob));
        }

        {
            let out = self.output.lock();
            if !out.eos || out.eos_delivered {
                return None;
            }
        }
        self.drain_pending_events(None);
        self.output.lock().eos_delivered = true;
        Some(Pulled::Eos)
    }

    /// Deliver the pending events that are due before `next_pts`
    ///
    /// Returns how many events were delivered.
    pub fn drain_pending_events(&self, next_pts: Option<ClockTime>) -> usize {
        let due = {
            let mut out = self.output.lock();
            let output_empty = out.buffers.is_empty();
            out.pending.drain_due(next_pts, output_empty)
        };

        let count = due.len();
        for event in due {
            let name = event.name();
            if !self.downstream.push_event(event) {
                tracing::debug!(listener = %self.name, event = name, "Downstream refused event");
            }
        }
        self.counters.add_forwarded_events(count as u64);
        count
    }

    /// Buffers waiting to be pulled
    pub fn queued_buffers(&self) -> usize {
        self.output.lock().buffers.len()
    }

    /// Serialized events waiting for their buffer
    pub fn pending_events(&self) -> usize {
        self.output.lock().pending.len()
    }

    /// Send an event from the consuming pipeline to the node's producer
    pub fn send_upstream_event(&self, event: Event) -> Result<(), ListenerError> {
        if !event.is_upstream() {
            return Err(ListenerError::EventRejected(event.name()));
        }

        let AttachState::Attached(target) = self.attach_state() else {
            return Err(ListenerError::NotAttached);
        };
        let node = self
            .registry
            .find_node(&target)
            .ok_or(ListenerError::NotAttached)?;

        tracing::debug!(listener = %self.name, node = %target, event = event.name(), "Sending upstream event");
        node.receive_upstream_event(event)?;
        Ok(())
    }

    /// Current statistics
    pub fn stats(&self) -> SourceStats {
        let (queued, pending) = {
            let out = self.output.lock();
            (out.buffers.len(), out.pending.len())
        };
        self.counters.snapshot(queued, pending)
    }

    fn listen_node(&self, target: &str) -> Result<(), ListenerError> {
        let Some(me) = self.me.upgrade() else {
            return Err(ListenerError::Flushing);
        };
        let (block_switch, previous) = {
            let settings = self.settings.lock();
            (settings.block_switch, settings.listen_to.clone())
        };

        if let AttachState::Attached(current) = self.attach_state() {
            if block_switch && current != target {
                tracing::warn!(
                    listener = %self.name,
                    current = %current,
                    requested = %target,
                    "Switching is blocked"
                );
                return Err(ListenerError::SwitchBlocked {
                    current,
                    requested: target.to_string(),
                });
            }
        }

        match self.registry.listen(me.clone(), target) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    listener = %self.name,
                    node = %target,
                    error = %e,
                    "Could not listen to node"
                );
                self.leave();
                if let Some(previous) = previous.filter(|p| p != target) {
                    tracing::info!(listener = %self.name, node = %previous, "Restoring previous node");
                    if let Err(e) = self.registry.listen(me, &previous) {
                        tracing::warn!(
                            listener = %self.name,
                            node = %previous,
                            error = %e,
                            "Could not restore previous node"
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    fn leave(&self) {
        if self.attach_state().is_detached() {
            return;
        }
        if let Err(e) = self.registry.leave(self) {
            tracing::debug!(listener = %self.name, error = %e, "Leave failed");
        }
    }
}

impl Listener for PipeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> (Caps, bool) {
        let allow_renegotiation = self.allow_renegotiation();
        let pinned = self.caps.lock().clone();

        match pinned {
            Some(caps) if !allow_renegotiation => (caps, true),
            Some(_) => (self.downstream.query_caps(), true),
            None => (self.downstream.query_caps(), false),
        }
    }

    fn set_capabilities(&self, caps: &Caps) -> Result<(), ListenerError> {
        let allow_renegotiation = self.allow_renegotiation();
        let mut pinned = self.caps.lock();

        if let Some(current) = pinned.as_ref() {
            if !allow_renegotiation && current != caps {
                tracing::error!(
                    listener = %self.name,
                    current = %current,
                    requested = %caps,
                    "Caps already set and renegotiation is disabled"
                );
                return Err(ListenerError::RenegotiationDisabled);
            }
        }

        tracing::debug!(listener = %self.name, caps = %caps, "Caps set");
        *pinned = Some(caps.clone());
        Ok(())
    }

    fn node_added(&self, node: &str) {
        if !self.attach_state().is_pending_on(node) {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };

        tracing::info!(listener = %self.name, node = %node, "Target node appeared");
        if let Err(e) = self.registry.resume_pending(me, node) {
            tracing::warn!(listener = %self.name, node = %node, error = %e, "Could not attach to node");
        }
    }

    fn node_removed(&self, node: &str) {
        if self.registry.leave_if_attached_to(self, node) {
            tracing::info!(listener = %self.name, node = %node, "Target node went away");
        }
    }

    fn push_buffer(&self, blob: Blob, node_base_time: ClockTime) -> Result<(), ListenerError> {
        let (phase, own_base) = {
            let timing = self.timing.lock();
            (timing.phase, timing.base_time)
        };
        if phase == Phase::Stopped {
            tracing::trace!(listener = %self.name, "Not started, discarding buffer");
            return Ok(());
        }

        let mode = self.stream_sync();
        let blob = match sync::reconcile_buffer(
            mode,
            blob,
            own_base,
            node_base_time,
            phase == Phase::Playing,
        ) {
            Ok(blob) => blob,
            Err(reason) => {
                tracing::debug!(listener = %self.name, reason = %reason, "Buffer dropped");
                self.counters.inc_dropped();
                return Err(ListenerError::Dropped(reason));
            }
        };

        let mut out = self.output.lock();
        if out.eos {
            return Err(ListenerError::Eos);
        }
        out.buffers.push_back(blob);
        self.counters.inc_received();
        Ok(())
    }

    fn push_event(&self, event: Event, node_base_time: ClockTime) -> Result<(), ListenerError> {
        let (accept, mode) = {
            let settings = self.settings.lock();
            (settings.accept_events, settings.stream_sync)
        };
        if !accept {
            tracing::trace!(listener = %self.name, event = event.name(), "Events not accepted");
            return Ok(());
        }

        if !event.is_serialized() {
            let name = event.name();
            if !self.downstream.push_event(event) {
                return Err(ListenerError::EventRejected(name));
            }
            self.counters.add_forwarded_events(1);
            return Ok(());
        }

        let own_base = self.base_time();
        let event = sync::reconcile_event(mode, event, own_base, node_base_time);
        tracing::trace!(
            listener = %self.name,
            event = event.name(),
            timestamp = ?event.timestamp,
            "Queueing serialized event"
        );
        self.output.lock().pending.push(event);
        self.counters.inc_queued_events();
        Ok(())
    }

    fn send_eos(&self) -> Result<(), ListenerError> {
        if !self.accept_eos_event() {
            tracing::debug!(listener = %self.name, "EOS not accepted");
            return Ok(());
        }
        if self.phase() == Phase::Stopped {
            return Err(ListenerError::Flushing);
        }

        self.output.lock().eos = true;
        tracing::info!(listener = %self.name, "EOS received");
        Ok(())
    }

    fn query_allocation(&self, caps: Option<&Caps>) -> Option<AllocationReply> {
        self.downstream.query_allocation(caps)
    }
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        let state = self.registry.attach_state(&self.name);
        if state.is_detached() {
            return;
        }

        tracing::error!(listener = %self.name, state = %state, "Listener dropped while subscribed");
        if let Err(e) = self.registry.leave(&*self) {
            tracing::debug!(listener = %self.name, error = %e, "Leave on drop failed");
        }
    }
}
