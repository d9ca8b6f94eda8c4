pub mod http;

use std::future::Future;

use label_scan_common::frame::StillImage;
use label_scan_common::verdict::ComplianceVerdict;

use crate::capture::CancelToken;

pub use http::HttpComplianceSink;

/// Receives captured stills and returns the compliance verdict.
pub trait CaptureSink {
    /// `alt_language` selects the server's alternate text-recognition mode.
    fn submit(
        &self,
        image: StillImage,
        alt_language: bool,
    ) -> impl Future<Output = Result<ComplianceVerdict, SinkError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Request never got a response (DNS, connect, timeout, reset).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("not authorized by compliance API")]
    Unauthorized,
    /// The server looked at the request and refused it.
    #[error("compliance API rejected the scan ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("invalid response from compliance API: {0}")]
    InvalidResponse(String),
    #[error("submission cancelled")]
    Cancelled,
}

impl SinkError {
    pub fn is_network(&self) -> bool {
        matches!(self, SinkError::Network(_))
    }
}

/// Submit `image`, giving up as soon as `cancel` fires.
pub async fn submit_cancellable<K: CaptureSink>(
    sink: &K,
    image: StillImage,
    alt_language: bool,
    cancel: &CancelToken,
) -> Result<ComplianceVerdict, SinkError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SinkError::Cancelled),
        result = sink.submit(image, alt_language) => result,
    }
}
