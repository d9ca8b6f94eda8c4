use label_scan_common::frame::{Frame, BYTES_PER_PIXEL};

use super::traits::{FrameHasher, Signature};

/// Sparse colour-sum hash.
///
/// Sums the red, green and blue channels of every `pixel_stride`-th pixel
/// of an RGBA buffer. The default stride of 100 reads every 400th byte.
#[derive(Debug, Clone)]
pub struct SparseRgbHasher {
    pixel_stride: usize,
}

impl SparseRgbHasher {
    pub fn new(pixel_stride: usize) -> Self {
        Self {
            pixel_stride: pixel_stride.max(1),
        }
    }

    /// Hash a raw RGBA buffer. A trailing partial pixel is ignored.
    pub fn hash_rgba(&self, pixels: &[u8]) -> Signature {
        let sum = pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .step_by(self.pixel_stride)
            .map(|px| px[0] as u64 + px[1] as u64 + px[2] as u64)
            .sum();
        Signature(sum)
    }
}

impl Default for SparseRgbHasher {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FrameHasher for SparseRgbHasher {
    fn signature(&self, frame: &Frame) -> Signature {
        self.hash_rgba(frame.pixels())
    }

    fn name(&self) -> &str {
        "sparse-rgb"
    }
}
