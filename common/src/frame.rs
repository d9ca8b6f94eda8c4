use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

/// Bytes per pixel in the RGBA layout every frame uses.
pub const BYTES_PER_PIXEL: usize = 4;

/// Current wall-clock time as Unix milliseconds, the timestamp unit every
/// frame and still carries.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// An RGBA raster sampled from the live video source.
///
/// One `Frame` is owned per scanning session and overwritten on every
/// sampling tick, so the pixel buffer keeps its allocation across reads.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    seq: u64,
    captured_at_ms: i64,
}

/// How a still image came to be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTrigger {
    /// Countdown reached zero while the image stayed stable.
    Auto,
    /// The operator asked for a capture.
    Manual,
}

impl CaptureTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureTrigger::Auto => "auto",
            CaptureTrigger::Manual => "manual",
        }
    }
}

/// A captured frame encoded for transport to the compliance API.
#[derive(Debug, Clone)]
pub struct StillImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at_ms: i64,
    pub trigger: CaptureTrigger,
}

impl Frame {
    /// An empty frame with no pixels; `is_empty()` until the first read.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a frame from an existing RGBA buffer.
    pub fn from_rgba(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        seq: u64,
        captured_at_ms: i64,
    ) -> Result<Self, FrameError> {
        check_len(width, height, pixels.len())?;
        Ok(Self {
            width,
            height,
            pixels,
            seq,
            captured_at_ms,
        })
    }

    /// Overwrite this frame with new RGBA pixels, reusing the allocation.
    pub fn fill_rgba(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
        seq: u64,
        captured_at_ms: i64,
    ) -> Result<(), FrameError> {
        check_len(width, height, pixels.len())?;
        self.pixels.clear();
        self.pixels.extend_from_slice(pixels);
        self.width = width;
        self.height = height;
        self.seq = seq;
        self.captured_at_ms = captured_at_ms;
        Ok(())
    }

    /// Decode a JPEG into this frame, reusing the allocation.
    ///
    /// On error the previous contents are left untouched.
    pub fn load_jpeg(
        &mut self,
        jpeg_data: &[u8],
        seq: u64,
        captured_at_ms: i64,
    ) -> Result<(), FrameError> {
        let img = image::load_from_memory_with_format(jpeg_data, ImageFormat::Jpeg)
            .map_err(|e| FrameError::Decode(e.to_string()))?
            .into_rgba8();
        let (width, height) = img.dimensions();
        self.fill_rgba(width, height, img.as_raw(), seq, captured_at_ms)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Encode as a lossy JPEG still. Alpha is dropped.
    pub fn encode_jpeg(&self, quality: u8, trigger: CaptureTrigger) -> Result<StillImage, FrameError> {
        if self.is_empty() {
            return Err(FrameError::Empty);
        }
        let rgb: Vec<u8> = self
            .pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut jpeg = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(&rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| FrameError::Encode(e.to_string()))?;

        Ok(StillImage {
            jpeg,
            width: self.width,
            height: self.height,
            captured_at_ms: self.captured_at_ms,
            trigger,
        })
    }
}

fn check_len(width: u32, height: u32, len: usize) -> Result<(), FrameError> {
    let expected = width as usize * height as usize * BYTES_PER_PIXEL;
    if len != expected {
        return Err(FrameError::BadLength {
            width,
            height,
            got: len,
            expected,
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("pixel buffer is {got} bytes, expected {expected} for {width}x{height} RGBA")]
    BadLength {
        width: u32,
        height: u32,
        got: usize,
        expected: usize,
    },
    #[error("failed to decode JPEG: {0}")]
    Decode(String),
    #[error("failed to encode JPEG: {0}")]
    Encode(String),
    #[error("frame has no pixels")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Frame::from_rgba(4, 4, vec![0; 10], 0, 0).unwrap_err();
        assert!(matches!(err, FrameError::BadLength { expected: 64, .. }));
    }

    #[test]
    fn fill_reuses_allocation() {
        let mut frame = Frame::from_rgba(8, 8, solid(8, 8, [1, 2, 3]), 0, 0).unwrap();
        let cap = frame.pixels.capacity();
        frame.fill_rgba(4, 4, &solid(4, 4, [9, 9, 9]), 1, 1000).unwrap();
        assert_eq!(frame.pixels.capacity(), cap);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.seq(), 1);
        assert_eq!(&frame.pixels()[..4], &[9, 9, 9, 255]);
    }

    #[test]
    fn encode_then_load_keeps_dimensions() {
        let frame = Frame::from_rgba(32, 16, solid(32, 16, [200, 100, 50]), 7, 1708300000000).unwrap();
        let still = frame.encode_jpeg(90, CaptureTrigger::Auto).unwrap();
        assert_eq!(&still.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(still.captured_at_ms, 1708300000000);
        assert_eq!(still.trigger, CaptureTrigger::Auto);

        let mut decoded = Frame::empty();
        decoded.load_jpeg(&still.jpeg, 8, 0).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 16);
        assert_eq!(decoded.pixels().len(), 32 * 16 * 4);
    }

    #[test]
    fn bad_jpeg_leaves_frame_untouched() {
        let mut frame = Frame::from_rgba(2, 2, solid(2, 2, [5, 5, 5]), 3, 0).unwrap();
        assert!(frame.load_jpeg(&[0xFF, 0xD8, 0x00], 4, 0).is_err());
        assert_eq!(frame.seq(), 3);
        assert_eq!(frame.width(), 2);
    }

    #[test]
    fn now_ms_is_unix_millis() {
        let before = now_ms();
        // 2023-11-14 in Unix ms; anything earlier means seconds were returned.
        assert!(before > 1_700_000_000_000);
        assert!(now_ms() >= before);
    }

    #[test]
    fn empty_frame_cannot_be_encoded() {
        let err = Frame::empty().encode_jpeg(90, CaptureTrigger::Manual).unwrap_err();
        assert!(matches!(err, FrameError::Empty));
    }
}
