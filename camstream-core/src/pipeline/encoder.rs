//! Frame encoder adapter.
//!
//! [`FrameEncoder::encode`] takes the [`Frame`] by value, so the frame is
//! released before `encode` returns on every path: success, unsupported
//! format, or codec failure. Callers never release a frame they passed in.
//!
//! [`JpegFrameEncoder`] is the production encoder. It converts the raw
//! planes to packed RGB, releases the frame as early as possible, then
//! compresses to JPEG at the requested quality.

use bytes::Bytes;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;
use crate::pipeline::types::{Frame, PixelFormat, Plane};

// ── Quality ──────────────────────────────────────────────────────

/// JPEG quality on the usual 1..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    /// Default quality for continuous streaming.
    pub const STREAM: Quality = Quality(80);
    /// Default quality for single-shot stills.
    pub const CAPTURE: Quality = Quality(90);

    /// Clamp `value` into 1..=100.
    pub const fn new(value: u8) -> Self {
        if value == 0 {
            Quality(1)
        } else if value > 100 {
            Quality(100)
        } else {
            Quality(value)
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for Quality {
    fn from(value: u8) -> Self {
        Quality::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

// ── FrameEncoder ─────────────────────────────────────────────────

/// Compresses a raw frame into a wire payload.
pub trait FrameEncoder: Send {
    /// Encode `frame` at `quality`. The frame is consumed and released
    /// before this returns, whatever the outcome.
    fn encode(&mut self, frame: Frame, quality: Quality) -> Result<Bytes, EncodeError>;
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for Box<E> {
    fn encode(&mut self, frame: Frame, quality: Quality) -> Result<Bytes, EncodeError> {
        (**self).encode(frame, quality)
    }
}

// ── JpegFrameEncoder ─────────────────────────────────────────────

/// JPEG encoder for YUV 4:2:0 and packed RGB frames.
#[derive(Debug, Default)]
pub struct JpegFrameEncoder {
    /// Packed RGB scratch buffer, reused across frames.
    rgb: Vec<u8>,
    frame_count: u64,
}

impl JpegFrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames encoded successfully so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&mut self, frame: Frame, quality: Quality) -> Result<Bytes, EncodeError> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidGeometry("zero width or height"));
        }

        self.rgb.clear();
        match frame.format() {
            PixelFormat::Yuv420 => yuv420_to_rgb(&frame, &mut self.rgb)?,
            PixelFormat::Rgb8 => pack_rgb(&frame, &mut self.rgb)?,
            other => return Err(EncodeError::UnsupportedFormat(other)),
        }

        // Pixels are copied out; hand the camera buffer back now.
        drop(frame);

        let mut out = Vec::with_capacity(self.rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.get()).encode(
            &self.rgb,
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;

        self.frame_count += 1;
        Ok(Bytes::from(out))
    }
}

// ── Pixel conversion ─────────────────────────────────────────────

fn check_planes(frame: &Frame) -> Result<(), EncodeError> {
    match frame.format().plane_count() {
        Some(n) if n == frame.planes().len() => Ok(()),
        Some(_) => Err(EncodeError::InvalidGeometry("plane count does not match format")),
        None => Err(EncodeError::UnsupportedFormat(frame.format())),
    }
}

fn check_len(index: usize, plane: &Plane, needed: usize) -> Result<(), EncodeError> {
    if plane.data.len() < needed {
        return Err(EncodeError::PlaneTooShort {
            plane: index,
            needed,
            actual: plane.data.len(),
        });
    }
    Ok(())
}

/// Full-range BT.601 YUV 4:2:0 → packed RGB.
fn yuv420_to_rgb(frame: &Frame, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    check_planes(frame)?;
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));

    let planes = frame.planes();
    let (y_plane, u_plane, v_plane) = (&planes[0], &planes[1], &planes[2]);
    check_len(0, y_plane, y_plane.required_len(w, h))?;
    check_len(1, u_plane, u_plane.required_len(cw, ch))?;
    check_len(2, v_plane, v_plane.required_len(cw, ch))?;

    out.reserve(w * h * 3);
    for row in 0..h {
        for col in 0..w {
            let y = y_plane.sample(col, row) as i32;
            let u = u_plane.sample(col / 2, row / 2) as i32 - 128;
            let v = v_plane.sample(col / 2, row / 2) as i32 - 128;

            let r = y + ((91_881 * v) >> 16);
            let g = y - ((22_554 * u + 46_802 * v) >> 16);
            let b = y + ((116_130 * u) >> 16);

            out.push(r.clamp(0, 255) as u8);
            out.push(g.clamp(0, 255) as u8);
            out.push(b.clamp(0, 255) as u8);
        }
    }
    Ok(())
}

/// Strip row padding from a packed RGB plane.
fn pack_rgb(frame: &Frame, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    check_planes(frame)?;
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let plane = &frame.planes()[0];
    if plane.pixel_stride < 3 {
        return Err(EncodeError::InvalidGeometry("RGB pixel stride below 3"));
    }
    check_len(0, plane, plane.required_len(w, h) + 2)?;

    out.reserve(w * h * 3);
    for row in 0..h {
        let start = row * plane.row_stride;
        if plane.pixel_stride == 3 {
            out.extend_from_slice(&plane.data[start..start + w * 3]);
        } else {
            for col in 0..w {
                let px = start + col * plane.pixel_stride;
                out.extend_from_slice(&plane.data[px..px + 3]);
            }
        }
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
