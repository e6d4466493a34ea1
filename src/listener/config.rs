//! Listener configuration

use std::fmt;
use std::str::FromStr;

/// How a listener reconciles timestamps between two pipeline clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamSync {
    /// Strip timestamps; the consuming pipeline stamps on arrival
    Restart,
    /// Keep timestamps unchanged
    #[default]
    Passthrough,
    /// Shift timestamps by the difference between the base times
    Compensate,
}

impl StreamSync {
    /// Short name used in configuration text
    pub fn nick(&self) -> &'static str {
        match self {
            StreamSync::Restart => "restart-ts",
            StreamSync::Passthrough => "passthrough-ts",
            StreamSync::Compensate => "compensate-ts",
        }
    }
}

impl fmt::Display for StreamSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nick())
    }
}

impl FromStr for StreamSync {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "restart-ts" | "restart" | "0" => Ok(StreamSync::Restart),
            "passthrough-ts" | "passthrough" | "1" => Ok(StreamSync::Passthrough),
            "compensate-ts" | "compensate" | "2" => Ok(StreamSync::Compensate),
            other => Err(format!("unknown stream-sync mode: {}", other)),
        }
    }
}

/// Listener configuration options
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Name of the node to receive from
    pub listen_to: Option<String>,

    /// Refuse to switch away once attached
    pub block_switch: bool,

    /// Accept new caps after the first ones were pinned
    pub allow_renegotiation: bool,

    /// Timestamp reconciliation policy
    pub stream_sync: StreamSync,

    /// Accept events from the node
    pub accept_events: bool,

    /// Accept end-of-stream from the node
    pub accept_eos_event: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listen_to: None,
            block_switch: false,
            allow_renegotiation: true,
            stream_sync: StreamSync::Passthrough,
            accept_events: true,
            accept_eos_event: true,
        }
    }
}

impl SourceConfig {
    /// Create a config targeting `node`
    pub fn listening_to(node: impl Into<String>) -> Self {
        Self {
            listen_to: Some(node.into()),
            ..Default::default()
        }
    }

    /// Set the target node
    pub fn listen_to(mut self, node: impl Into<String>) -> Self {
        self.listen_to = Some(node.into());
        self
    }

    /// Set whether switching is blocked once attached
    pub fn block_switch(mut self, enabled: bool) -> Self {
        self.block_switch = enabled;
        self
    }

    /// Set whether caps may change after being pinned
    pub fn allow_renegotiation(mut self, enabled: bool) -> Self {
        self.allow_renegotiation = enabled;
        self
    }

    /// Set the timestamp policy
    pub fn stream_sync(mut self, mode: StreamSync) -> Self {
        self.stream_sync = mode;
        self
    }

    /// Set whether events are accepted
    pub fn accept_events(mut self, enabled: bool) -> Self {
        self.accept_events = enabled;
        self
    }

    /// Set whether end-of-stream is accepted
    pub fn accept_eos_event(mut self, enabled: bool) -> Self {
        self.accept_eos_event = enabled;
        self
    }
}
