use label_scan_common::frame::Frame;

/// Compact numeric fingerprint of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Signature(pub u64);

impl Signature {
    /// Absolute distance between two signatures.
    pub fn abs_diff(self, other: Signature) -> u64 {
        self.0.abs_diff(other.0)
    }
}

/// Reduces a frame to a [`Signature`] cheaply enough to run on every
/// sampling tick.
///
/// Implementations must be pure functions of the pixel data.
pub trait FrameHasher: Send + Sync {
    fn signature(&self, frame: &Frame) -> Signature;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
