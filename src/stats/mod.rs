//! Statistics for nodes and listeners

mod metrics;

pub use metrics::{NodeStats, SourceStats};
pub(crate) use metrics::{NodeCounters, SourceCounters};
