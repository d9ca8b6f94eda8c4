pub mod mjpeg;

use label_scan_common::frame::{Frame, FrameError};

pub use mjpeg::MjpegCamera;

/// A live camera the sampler can read frames from.
///
/// Reads are synchronous and cheap: implementations buffer the latest frame
/// in the background and hand it over on demand.
pub trait VideoSource: Send {
    /// True once a complete frame is buffered and can be read.
    fn has_enough_data(&self) -> bool;

    /// Copy the current frame into `frame`, reusing its buffer.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), SourceError>;

    /// Release the underlying stream. Must be idempotent.
    fn stop(&mut self);

    /// False once [`stop`](Self::stop) has been called or the underlying
    /// stream has gone away.
    fn is_live(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("no camera at {0}")]
    NotFound(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera stream error: {0}")]
    Stream(reqwest::Error),
    #[error("unreadable frame: {0}")]
    Frame(#[from] FrameError),
    #[error("camera has been stopped")]
    Stopped,
    #[error("no frame buffered yet")]
    NotReady,
    /// The camera closed the stream mid-session.
    #[error("camera stream at {0} ended")]
    Ended(String),
}

impl SourceError {
    /// Acquisition failures end the session; there is no retry short of
    /// starting a new one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SourceError::PermissionDenied(_)
                | SourceError::NotFound(_)
                | SourceError::Unavailable(_)
                | SourceError::Stopped
                | SourceError::Ended(_)
        )
    }
}
