use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::Result;

/// Represents a single video frame
///
/// A thin wrapper around an RGB image buffer. Every stage of the pipeline
/// produces and consumes frames of this type.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Get a mutable reference to the underlying image buffer
    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Raw packed RGB24 bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Linear mix of two equally sized frames.
    ///
    /// `weight` is the share of `incoming`: `0.0` returns `self`, `1.0`
    /// returns `incoming`.
    pub fn blend(&self, incoming: &Frame, weight: f32) -> Frame {
        assert_eq!(
            self.size(),
            incoming.size(),
            "cannot blend frames of different sizes"
        );

        let weight = weight.clamp(0.0, 1.0);
        let keep = 1.0 - weight;
        let data = self
            .buffer
            .as_raw()
            .iter()
            .zip(incoming.buffer.as_raw())
            .map(|(&a, &b)| (a as f32 * keep + b as f32 * weight).round().clamp(0.0, 255.0) as u8)
            .collect();

        // Same dimensions as self, so the buffer length always matches.
        Frame {
            buffer: ImageBuffer::from_raw(self.width(), self.height(), data)
                .unwrap_or_else(|| self.buffer.clone()),
        }
    }
}

/// Static properties of a clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ClipInfo {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

/// A finite, time-indexed sequence of frames.
///
/// Implementations are lazy views: wrapping a clip in a transform never
/// decodes anything until `frame_at` is called. `frame_at` takes `&mut self`
/// because file-backed clips keep a streaming decoder between calls.
pub trait Clip: Send {
    /// Human readable label for logs
    fn label(&self) -> String;

    fn info(&self) -> ClipInfo;

    /// Produce the frame shown at `t` seconds, `0 <= t < duration`.
    /// Times outside that range are clamped.
    fn frame_at(&mut self, t: f64) -> Result<Frame>;

    /// Release decoder handles. Further `frame_at` calls may reopen them.
    fn close(&mut self) {}

    fn duration(&self) -> f64 {
        self.info().duration
    }
}

impl std::fmt::Debug for dyn Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.info();
        write!(
            f,
            "Clip({} {}x{} @{}fps {:.3}s)",
            self.label(),
            info.width,
            info.height,
            info.fps,
            info.duration
        )
    }
}

/// A clip showing one frame for its whole duration
#[derive(Debug, Clone)]
pub struct StaticClip {
    label: String,
    frame: Frame,
    fps: f64,
    duration: f64,
}

impl StaticClip {
    pub fn new(label: impl Into<String>, frame: Frame, fps: f64, duration: f64) -> Self {
        Self {
            label: label.into(),
            frame,
            fps,
            duration,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl Clip for StaticClip {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn info(&self) -> ClipInfo {
        ClipInfo {
            width: self.frame.width(),
            height: self.frame.height(),
            fps: self.fps,
            duration: self.duration,
        }
    }

    fn frame_at(&mut self, _t: f64) -> Result<Frame> {
        Ok(self.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_endpoints() {
        let a = Frame::new_filled(4, 3, [100, 100, 100]);
        let b = Frame::new_filled(4, 3, [200, 200, 200]);

        assert_eq!(a.blend(&b, 0.0), a);
        assert_eq!(a.blend(&b, 1.0), b);
    }

    #[test]
    fn test_blend_midpoint_is_symmetric() {
        let a = Frame::new_filled(4, 3, [0, 0, 0]);
        let b = Frame::new_filled(4, 3, [200, 100, 50]);

        let mid = a.blend(&b, 0.5);
        assert_eq!(mid.get_pixel(2, 1), [100, 50, 25]);
        assert_eq!(b.blend(&a, 0.5), mid);
    }

    #[test]
    #[should_panic(expected = "different sizes")]
    fn test_blend_size_mismatch_panics() {
        let a = Frame::new_filled(4, 3, [0, 0, 0]);
        let b = Frame::new_filled(3, 4, [0, 0, 0]);
        let _ = a.blend(&b, 0.5);
    }

    #[test]
    fn test_static_clip_frames_identical() {
        let mut clip = StaticClip::new("card", Frame::new_filled(8, 6, [10, 20, 30]), 24.0, 2.0);
        let first = clip.frame_at(0.0).unwrap();
        let last = clip.frame_at(1.99).unwrap();
        assert_eq!(first, last);
        assert_eq!(clip.info().size(), (8, 6));
        assert_eq!(clip.duration(), 2.0);
    }

    #[test]
    fn test_rgb_bytes_roundtrip_dimensions() {
        let frame = Frame::new_filled(2, 2, [1, 2, 3]);
        let bytes = frame.as_rgb_bytes().to_vec();
        assert_eq!(bytes.len(), 12);
        assert!(Frame::from_rgb_bytes(2, 2, bytes).is_some());
        assert!(Frame::from_rgb_bytes(3, 2, vec![0; 12]).is_none());
    }
}
