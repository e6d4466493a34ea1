//! Timestamped payload units routed from nodes to listeners

use std::sync::Arc;

use bytes::Bytes;

use super::ClockTime;
use crate::caps::Caps;

/// A buffer travelling from a node to its listeners
///
/// This is designed to be cheap to clone: the payload is a reference-counted
/// `Bytes` and the caps are behind an `Arc`, so every listener of a fan-out
/// shares the same memory. Timestamp rewrites done by a listener operate on
/// its own clone and never affect the other receivers.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Payload (opaque to the router)
    pub data: Bytes,
    /// Presentation timestamp in nanoseconds
    pub pts: Option<ClockTime>,
    /// Decode timestamp in nanoseconds
    pub dts: Option<ClockTime>,
    /// Duration in nanoseconds
    pub duration: Option<ClockTime>,
    /// Whether the payload can be decoded on its own
    pub is_keyframe: bool,
    /// Whether the payload carries stream headers rather than media
    pub is_header: bool,
    /// Schema of the payload, when the producer attached one
    pub caps: Option<Arc<Caps>>,
}

impl Blob {
    /// Create a blob with no timestamps
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            pts: None,
            dts: None,
            duration: None,
            is_keyframe: false,
            is_header: false,
            caps: None,
        }
    }

    /// Create a blob stamped with a presentation timestamp
    pub fn with_pts(data: Bytes, pts: ClockTime) -> Self {
        Self {
            pts: Some(pts),
            ..Self::new(data)
        }
    }

    /// Builder-style decode timestamp setter
    pub fn dts(mut self, dts: ClockTime) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Builder-style duration setter
    pub fn duration(mut self, duration: ClockTime) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder-style keyframe flag setter
    pub fn keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    /// Builder-style caps setter
    pub fn caps(mut self, caps: Caps) -> Self {
        self.caps = Some(Arc::new(caps));
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether two blobs share the same payload allocation
    pub fn shares_payload(&self, other: &Blob) -> bool {
        self.data.as_ptr() == other.data.as_ptr() && self.data.len() == other.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_payload() {
        let blob = Blob::with_pts(Bytes::from(vec![1u8, 2, 3, 4]), 100);
        let mut copy = blob.clone();
        copy.pts = Some(200);

        assert!(blob.shares_payload(&copy));
        assert_eq!(blob.pts, Some(100));
        assert_eq!(copy.pts, Some(200));
    }

    #[test]
    fn test_builder() {
        let blob = Blob::with_pts(Bytes::from_static(b"abc"), 10)
            .dts(8)
            .duration(33)
            .keyframe(true);

        assert_eq!(blob.size(), 3);
        assert_eq!(blob.dts, Some(8));
        assert_eq!(blob.duration, Some(33));
        assert!(blob.is_keyframe);
        assert!(!blob.is_header);
    }
}
