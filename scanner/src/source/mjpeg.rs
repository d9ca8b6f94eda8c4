use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use label_scan_common::frame::{now_ms, Frame};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{SourceError, VideoSource};

/// Boundary assumed when the camera does not announce one.
const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of part headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental `multipart/x-mixed-replace` splitter.
///
/// Chunks can cut anywhere, including through a boundary marker.
pub struct MultipartParser {
    /// `--{boundary}\r\n`
    delimiter: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    /// Offset into `buffer` already scanned for the closing boundary.
    scanned: usize,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scanned: 0,
        }
    }

    /// Append `chunk` and return every JPEG it completed, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let delim_len = self.delimiter.len();
        let mut complete = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.delimiter) {
                        let _ = self.buffer.split_to(pos + delim_len);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep a tail in case the boundary spans chunks.
                        if self.buffer.len() > delim_len {
                            let _ = self.buffer.split_to(self.buffer.len() - delim_len);
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.scanned = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.scanned..], &self.delimiter)
                    else {
                        self.scanned = self.buffer.len().saturating_sub(delim_len);
                        break;
                    };
                    let jpeg_end = self.scanned + pos;
                    // Part body ends with \r\n before the next boundary.
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let part = self.buffer.split_to(jpeg_end + delim_len);
                    if end > 0 {
                        complete.push(part.freeze().slice(..end));
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        complete
    }
}

/// Pull the multipart boundary out of a `Content-Type` header value.
///
/// Quotes and a leading `--` (which some cameras include) are stripped.
fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim_start_matches("--");
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Latest complete JPEG received from the stream.
#[derive(Default)]
struct Latest {
    jpeg: Option<Bytes>,
    seq: u64,
    received_at_ms: i64,
    ended: bool,
}

/// HTTP MJPEG camera (`multipart/x-mixed-replace`).
///
/// A background task keeps only the newest complete JPEG; the sampler
/// decodes it on demand.
pub struct MjpegCamera {
    url: String,
    latest: Arc<Mutex<Latest>>,
    reader: Option<JoinHandle<()>>,
    /// Sequence number of the JPEG currently decoded into the caller's frame.
    last_read_seq: Option<u64>,
}

impl MjpegCamera {
    /// Open the stream. Fails if the camera cannot be acquired.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::PermissionDenied(format!(
                    "{url} answered {}",
                    response.status()
                )));
            }
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound(url.to_string())),
            other => {
                return Err(SourceError::Unavailable(format!("{url} answered {other}")));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let boundary = match boundary_from_content_type(content_type) {
            Some(b) => b,
            None => {
                warn!(
                    url,
                    content_type,
                    assumed = DEFAULT_BOUNDARY,
                    "camera did not announce a multipart boundary"
                );
                DEFAULT_BOUNDARY.to_string()
            }
        };

        info!(url, status = %response.status(), boundary, "connected to MJPEG stream");

        let latest = Arc::new(Mutex::new(Latest::default()));
        let parser = MultipartParser::new(&boundary);
        let reader = tokio::spawn(read_stream(response, parser, Arc::clone(&latest), url.to_string()));

        Ok(Self {
            url: url.to_string(),
            latest,
            reader: Some(reader),
            last_read_seq: None,
        })
    }
}

async fn read_stream(
    response: reqwest::Response,
    mut parser: MultipartParser,
    latest: Arc<Mutex<Latest>>,
    url: String,
) {
    let mut byte_stream = response.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %SourceError::Stream(e), url, "MJPEG stream broke");
                break;
            }
        };
        if let Some(jpeg) = parser.push(&chunk).pop() {
            let mut slot = latest.lock().unwrap();
            slot.seq += 1;
            slot.received_at_ms = now_ms();
            debug!(seq = slot.seq, bytes = jpeg.len(), "buffered MJPEG frame");
            slot.jpeg = Some(jpeg);
        }
    }

    warn!(url, "MJPEG stream ended");
    latest.lock().unwrap().ended = true;
}

impl VideoSource for MjpegCamera {
    fn has_enough_data(&self) -> bool {
        if self.reader.is_none() {
            return false;
        }
        let slot = self.latest.lock().unwrap();
        slot.jpeg.is_some() && !slot.ended
    }

    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), SourceError> {
        if self.reader.is_none() {
            return Err(SourceError::Stopped);
        }
        let (jpeg, seq, received_at_ms) = {
            let slot = self.latest.lock().unwrap();
            if slot.ended {
                return Err(SourceError::Ended(self.url.clone()));
            }
            match &slot.jpeg {
                Some(jpeg) => (jpeg.clone(), slot.seq, slot.received_at_ms),
                None => return Err(SourceError::NotReady),
            }
        };
        // Nothing new since the last read; the caller's frame is current.
        if self.last_read_seq == Some(seq) && !frame.is_empty() {
            return Ok(());
        }
        frame.load_jpeg(&jpeg, seq, received_at_ms)?;
        self.last_read_seq = Some(seq);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            info!(url = self.url, "camera stream released");
        }
    }

    /// False once stopped or once the camera closed the stream.
    fn is_live(&self) -> bool {
        self.reader.is_some() && !self.latest.lock().unwrap().ended
    }
}

impl Drop for MjpegCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
