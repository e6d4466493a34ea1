//! Registry configuration

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of the lifecycle event channel
    ///
    /// Subscribers that fall further behind than this lose the oldest events.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

impl RegistryConfig {
    /// Set the lifecycle event channel capacity (minimum 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
