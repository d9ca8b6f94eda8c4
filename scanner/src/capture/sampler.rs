use label_scan_common::frame::{CaptureTrigger, Frame, FrameError, StillImage};
use tracing::debug;

use crate::source::VideoSource;

/// Pulls frames from a [`VideoSource`] into one reusable buffer.
pub struct FrameSampler<S> {
    source: S,
    frame: Frame,
    stopped: bool,
    observed: u64,
    skipped: u64,
}

impl<S: VideoSource> FrameSampler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            frame: Frame::empty(),
            stopped: false,
            observed: 0,
            skipped: 0,
        }
    }

    /// Read the current frame, or `None` if the source has nothing full to
    /// give this tick. Never returns a partial frame.
    pub fn sample(&mut self) -> Option<&Frame> {
        if self.stopped || !self.source.has_enough_data() {
            self.skipped += 1;
            return None;
        }
        match self.source.read_frame(&mut self.frame) {
            Ok(()) => {
                self.observed += 1;
                Some(&self.frame)
            }
            Err(e) => {
                debug!(error = %e, "no observation this tick");
                self.skipped += 1;
                None
            }
        }
    }

    /// The most recently sampled frame (empty before the first sample).
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Encode the last sampled frame for the capture sink.
    pub fn snapshot(&self, quality: u8, trigger: CaptureTrigger) -> Result<StillImage, FrameError> {
        self.frame.encode_jpeg(quality, trigger)
    }

    /// Stop the source. Only the first call reaches it.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.source.stop();
        debug!("frame sampler stopped");
    }

    pub fn is_live(&self) -> bool {
        !self.stopped && self.source.is_live()
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
