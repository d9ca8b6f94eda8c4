//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use label_scan_common::frame::{CaptureTrigger, Frame, FrameError};

use crate::source::{SourceError, VideoSource};

/// 4800 pixels: 48 sampled at the default stride, so a black/white swing
/// moves the signature by more than the default `max_diff`.
pub const FRAME_W: u32 = 80;
pub const FRAME_H: u32 = 60;

/// A frame where every channel of every pixel is `value`.
pub fn solid_frame(value: u8) -> Frame {
    let pixels = vec![value; (FRAME_W * FRAME_H * 4) as usize];
    Frame::from_rgba(FRAME_W, FRAME_H, pixels, 0, 1708300000000).unwrap()
}

pub fn jpeg_fixture(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i % 251) as u8, 90, 160, 255])
        .collect();
    Frame::from_rgba(width, height, pixels, 0, 0)
        .unwrap()
        .encode_jpeg(quality, CaptureTrigger::Manual)
        .unwrap()
        .jpeg
}

/// In-memory camera that replays a fixed list of frames.
///
/// After the list runs out it cycles from `loop_from`.
pub struct ScriptedSource {
    frames: Vec<Frame>,
    loop_from: usize,
    cursor: usize,
    ready: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    failing_reads: usize,
    live: bool,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        assert!(!frames.is_empty());
        Self {
            loop_from: frames.len() - 1,
            frames,
            cursor: 0,
            ready: Arc::new(AtomicBool::new(true)),
            lost: Arc::new(AtomicBool::new(false)),
            stops: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
            failing_reads: 0,
            live: true,
        }
    }

    pub fn loop_from(mut self, index: usize) -> Self {
        self.loop_from = index.min(self.frames.len() - 1);
        self
    }

    /// The first `n` reads fail as if the frame could not be decoded.
    pub fn failing_reads(mut self, n: usize) -> Self {
        self.failing_reads = n;
        self
    }

    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    /// Setting this simulates the camera dropping the stream on its own.
    pub fn lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }

    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl VideoSource for ScriptedSource {
    fn has_enough_data(&self) -> bool {
        self.is_live() && self.ready.load(Ordering::SeqCst)
    }

    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), SourceError> {
        if !self.live {
            return Err(SourceError::Stopped);
        }
        if self.lost.load(Ordering::SeqCst) {
            return Err(SourceError::Ended("scripted".into()));
        }
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(SourceError::Frame(FrameError::Decode("scripted".into())));
        }
        let next = &self.frames[self.cursor];
        frame.fill_rgba(
            next.width(),
            next.height(),
            next.pixels(),
            self.reads.load(Ordering::SeqCst) as u64,
            next.captured_at_ms(),
        )?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.cursor += 1;
        if self.cursor == self.frames.len() {
            self.cursor = self.loop_from;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.live = false;
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live && !self.lost.load(Ordering::SeqCst)
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
