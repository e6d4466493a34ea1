//! Allocation proposal aggregation
//!
//! When the producer asks a node how buffers should be allocated, the node
//! polls every listener and merges their replies into one plan that suits
//! all of them:
//!
//! - memory params: the strictest alignment, prefix and padding
//! - pool: the largest buffer size and minimum count, plus one buffer when
//!   more than one listener shares the output
//! - metadata: only what every listener supports with identical params

/// Memory layout requirements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationParams {
    /// Alignment mask (`align + 1` must be a power of two)
    pub align: usize,
    /// Bytes reserved before the payload
    pub prefix: usize,
    /// Bytes reserved after the payload
    pub padding: usize,
}

impl AllocationParams {
    fn merge(&mut self, other: &AllocationParams) {
        self.align = self.align.max(other.align);
        self.prefix = self.prefix.max(other.prefix);
        self.padding = self.padding.max(other.padding);
    }
}

/// Buffer pool requirements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationPool {
    /// Size of each buffer in bytes
    pub size: u32,
    /// Buffers that must exist at all times
    pub min_buffers: u32,
    /// Upper bound on buffers (0 = unlimited)
    pub max_buffers: u32,
}

/// A metadata API a listener can consume, with its optional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRequest {
    pub api: String,
    pub params: Option<String>,
}

impl MetaRequest {
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            params: None,
        }
    }

    pub fn with_params(api: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            params: Some(params.into()),
        }
    }
}

/// One listener's answer to an allocation query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReply {
    pub params: Vec<AllocationParams>,
    pub pools: Vec<AllocationPool>,
    pub metas: Vec<MetaRequest>,
}

/// The merged allocation answer returned to the producer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Merged memory params, `None` when no listener had requirements
    pub params: Option<AllocationParams>,
    /// Merged pool, `None` when no listener asked for a buffer size
    pub pool: Option<AllocationPool>,
    /// Metadata supported by every listener
    pub metas: Vec<MetaRequest>,
    /// Number of listeners that answered
    pub participants: usize,
    /// Whether any listener failed to answer
    pub failed: bool,
}

impl AllocationPlan {
    pub fn is_ok(&self) -> bool {
        !self.failed
    }
}

/// Merge per-listener replies; `None` marks a listener whose query failed
pub fn aggregate_allocation(replies: &[Option<AllocationReply>]) -> AllocationPlan {
    let mut params = AllocationParams::default();
    let mut has_params = false;
    let mut size = 0u32;
    let mut min_buffers = 0u32;
    let mut metas: Vec<MetaRequest> = Vec::new();
    let mut participants = 0usize;
    let mut failed = false;

    for reply in replies {
        let Some(reply) = reply else {
            failed = true;
            continue;
        };

        for p in &reply.params {
            params.merge(p);
            has_params = true;
        }

        if let Some(pool) = reply.pools.first() {
            size = size.max(pool.size);
            min_buffers = min_buffers.max(pool.min_buffers);
        }

        if participants == 0 {
            for meta in &reply.metas {
                if !metas.iter().any(|m| m.api == meta.api) {
                    metas.push(meta.clone());
                }
            }
        } else {
            metas.retain(|ours| reply.metas.iter().any(|theirs| theirs == ours));
        }

        participants += 1;
    }

    if failed {
        return AllocationPlan {
            participants,
            failed: true,
            ..Default::default()
        };
    }

    if participants > 1 {
        min_buffers += 1;
    }

    AllocationPlan {
        params: has_params.then_some(params),
        pool: (size > 0).then_some(AllocationPool {
            size,
            min_buffers,
            max_buffers: 0,
        }),
        metas,
        participants,
        failed: false,
    }
}
