//! Node configuration

/// Node configuration options
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Forward serialized and out-of-band events to listeners
    pub forward_events: bool,

    /// Forward end-of-stream to listeners
    pub forward_eos: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            forward_events: true,
            forward_eos: false,
        }
    }
}

impl NodeConfig {
    /// Set whether events are forwarded
    pub fn forward_events(mut self, enabled: bool) -> Self {
        self.forward_events = enabled;
        self
    }

    /// Set whether end-of-stream is forwarded
    pub fn forward_eos(mut self, enabled: bool) -> Self {
        self.forward_eos = enabled;
        self
    }
}
