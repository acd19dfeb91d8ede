//! Raw frame types shared between pipeline stages.
//!
//! A [`Frame`] is an exclusively owned camera buffer. It is not `Clone`:
//! ownership moves from the source into the slot, out to the encoder, and
//! the buffer is handed back to its producer when the `Frame` is dropped.

use std::fmt;
use std::time::Instant;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raw camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// YUV 4:2:0 in three planes (Y, U, V). Chroma planes may be planar
    /// (`pixel_stride == 1`) or interleaved (`pixel_stride == 2`).
    Yuv420,
    /// 3 bytes per pixel: Red, Green, Blue, in a single plane.
    Rgb8,
    /// A device-specific layout the pipeline does not interpret.
    Other(u32),
}

impl PixelFormat {
    /// Number of planes a frame of this format carries, if known.
    pub const fn plane_count(self) -> Option<usize> {
        match self {
            PixelFormat::Yuv420 => Some(3),
            PixelFormat::Rgb8 => Some(1),
            PixelFormat::Other(_) => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Yuv420 => write!(f, "YUV420"),
            PixelFormat::Rgb8 => write!(f, "RGB8"),
            PixelFormat::Other(tag) => write!(f, "0x{tag:x}"),
        }
    }
}

// ── Plane ────────────────────────────────────────────────────────

/// One pixel plane of a frame.
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane bytes, `row_stride * rows` (the last row may be short).
    pub data: Vec<u8>,
    /// Distance in bytes between the starts of two consecutive rows.
    pub row_stride: usize,
    /// Distance in bytes between two consecutive samples in a row.
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Sample at column `x`, row `y`, in sample units.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the plane.
    pub fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x * self.pixel_stride]
    }

    /// Bytes needed to address `cols` x `rows` samples with these strides.
    pub fn required_len(&self, cols: usize, rows: usize) -> usize {
        if cols == 0 || rows == 0 {
            return 0;
        }
        (rows - 1) * self.row_stride + (cols - 1) * self.pixel_stride + 1
    }
}

// ── Frame ────────────────────────────────────────────────────────

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// A raw, uncompressed camera frame with exclusive ownership.
///
/// The optional release hook runs exactly once, when the frame is
/// dropped. Sources use it to return the buffer to their pool.
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
    sequence: u64,
    timestamp: Instant,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            sequence: 0,
            timestamp: Instant::now(),
            release: None,
        }
    }

    /// Attach a sequence number assigned by the source.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Attach the hook that hands the buffer back to its producer.
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Source-assigned sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Monotonic capture timestamp.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Total bytes held across all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .field("bytes", &self.byte_len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
