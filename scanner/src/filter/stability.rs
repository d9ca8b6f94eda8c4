use std::collections::VecDeque;

use label_scan_common::config::StabilityConfig;
use label_scan_common::frame::Frame;
use tracing::debug;

use super::signature::SparseRgbHasher;
use super::traits::{FrameHasher, Signature};

/// Result of one stability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityReport {
    pub is_stable: bool,
    /// Average pairwise similarity over the window, in `[0, 1]`.
    pub similarity: f64,
}

impl StabilityReport {
    /// Reported while the window holds fewer than two signatures.
    pub const UNSTABLE: StabilityReport = StabilityReport {
        is_stable: false,
        similarity: 0.0,
    };
}

/// Sliding-window stability detector.
///
/// Keeps the last `window` signatures and averages the similarity of every
/// adjacent pair, so a one-frame autofocus flicker is diluted by its
/// neighbours.
pub struct StabilityDetector {
    hasher: Box<dyn FrameHasher>,
    history: VecDeque<Signature>,
    window: usize,
    threshold: f64,
    max_diff: f64,
}

impl StabilityDetector {
    pub fn new(hasher: Box<dyn FrameHasher>, window: usize, threshold: f64, max_diff: f64) -> Self {
        let window = window.max(2);
        Self {
            hasher,
            history: VecDeque::with_capacity(window),
            window,
            threshold,
            max_diff,
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(
            Box::new(SparseRgbHasher::new(config.pixel_stride)),
            config.window,
            config.threshold,
            config.max_diff,
        )
    }

    /// Hash `frame`, push it into the window and report.
    pub fn observe(&mut self, frame: &Frame) -> StabilityReport {
        let sig = self.hasher.signature(frame);
        self.observe_signature(sig)
    }

    /// Push an already computed signature and report.
    pub fn observe_signature(&mut self, sig: Signature) -> StabilityReport {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(sig);

        if self.history.len() < 2 {
            debug!(signature = sig.0, "stability: window too short");
            return StabilityReport::UNSTABLE;
        }

        let pairs = self.history.len() - 1;
        let total: f64 = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(&a, &b)| self.similarity(a, b))
            .sum();
        let similarity = total / pairs as f64;
        let is_stable = similarity >= self.threshold;

        debug!(
            signature = sig.0,
            similarity = format!("{:.4}", similarity),
            threshold = self.threshold,
            is_stable,
            hasher = self.hasher.name(),
            "stability check"
        );

        StabilityReport {
            is_stable,
            similarity,
        }
    }

    /// `max(0, 1 - |a - b| / max_diff)`.
    pub fn similarity(&self, a: Signature, b: Signature) -> f64 {
        (1.0 - a.abs_diff(b) as f64 / self.max_diff).max(0.0)
    }

    /// Forget every signature. Used when a new scanning session begins.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
