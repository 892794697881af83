use image::imageops::{self, FilterType};
use tracing::debug;

use crate::config::{CropAnchor, ResizeFilter};
use crate::error::{Result, VideoError};
use crate::video::types::{Clip, ClipInfo, Frame};

/// Region of a source frame kept by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop needed to bring a `source` frame to the `target` aspect ratio.
///
/// Only portrait sources are cropped: full width is kept and
/// `floor(width * H / W)` rows are taken around the anchor. Everything else
/// goes straight to the rescale.
pub fn crop_window(source: (u32, u32), target: (u32, u32), anchor: CropAnchor) -> Option<CropWindow> {
    let (width, height) = source;
    let (target_w, target_h) = target;

    if height <= width || target_w == 0 {
        return None;
    }

    let new_height = ((width as u64 * target_h as u64) / target_w as u64) as u32;
    let new_height = new_height.clamp(1, height);

    let y = match anchor {
        CropAnchor::Top => 0,
        CropAnchor::Center => (height / 2).saturating_sub(new_height / 2),
        CropAnchor::Bottom => height - new_height,
    };

    Some(CropWindow {
        x: 0,
        y,
        width,
        height: new_height,
    })
}

/// Crops and rescales source frames to the canonical size
#[derive(Debug, Clone, Copy)]
pub struct ClipNormalizer {
    target: (u32, u32),
    anchor: CropAnchor,
    filter: ResizeFilter,
}

impl ClipNormalizer {
    pub fn new(target: (u32, u32), anchor: CropAnchor, filter: ResizeFilter) -> Self {
        Self { target, anchor, filter }
    }

    pub fn target(&self) -> (u32, u32) {
        self.target
    }

    /// Wrap `source` so every frame comes out at the canonical size
    pub fn normalize(&self, source: Box<dyn Clip>) -> Result<NormalizedClip> {
        let info = source.info();
        if info.width == 0 || info.height == 0 {
            return Err(VideoError::DecodeFailed {
                path: source.label(),
                reason: format!("invalid frame size {}x{}", info.width, info.height),
            }
            .into());
        }

        let window = crop_window(info.size(), self.target, self.anchor);
        match window {
            Some(w) => debug!(
                "Normalizing {} ({}x{}): crop rows {}..{}, resize to {}x{}",
                source.label(),
                info.width,
                info.height,
                w.y,
                w.y + w.height,
                self.target.0,
                self.target.1
            ),
            None => debug!(
                "Normalizing {} ({}x{}): resize to {}x{}",
                source.label(),
                info.width,
                info.height,
                self.target.0,
                self.target.1
            ),
        }

        Ok(NormalizedClip {
            source,
            normalizer: *self,
        })
    }

    /// Apply crop and rescale to one decoded frame
    pub fn apply(&self, frame: Frame) -> Frame {
        // The window comes from the decoded frame, not the probed size, so a
        // decoder that disagrees with the probe still yields the right output.
        let cropped = match crop_window(frame.size(), self.target, self.anchor) {
            Some(w) => Frame::new(imageops::crop_imm(frame.as_image(), w.x, w.y, w.width, w.height).to_image()),
            None => frame,
        };

        if cropped.size() == self.target {
            return cropped;
        }

        let filter: FilterType = self.filter.into();
        Frame::new(imageops::resize(cropped.as_image(), self.target.0, self.target.1, filter))
    }
}

/// A source clip viewed at the canonical frame size
#[derive(Debug)]
pub struct NormalizedClip {
    source: Box<dyn Clip>,
    normalizer: ClipNormalizer,
}

impl NormalizedClip {
    /// Crop applied to the source at its probed size
    pub fn crop(&self) -> Option<CropWindow> {
        crop_window(self.source.info().size(), self.normalizer.target, self.normalizer.anchor)
    }
}

impl Clip for NormalizedClip {
    fn label(&self) -> String {
        self.source.label()
    }

    fn info(&self) -> ClipInfo {
        let source = self.source.info();
        ClipInfo {
            width: self.normalizer.target.0,
            height: self.normalizer.target.1,
            ..source
        }
    }

    fn frame_at(&mut self, t: f64) -> Result<Frame> {
        let frame = self.source.frame_at(t)?;
        Ok(self.normalizer.apply(frame))
    }

    fn close(&mut self) {
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::types::StaticClip;
    use image::{Rgb, RgbImage};

    fn normalizer() -> ClipNormalizer {
        ClipNormalizer::new((1280, 720), CropAnchor::Center, ResizeFilter::Nearest)
    }

    #[test]
    fn test_portrait_crop_is_vertically_centered() {
        let window = crop_window((720, 1280), (1280, 720), CropAnchor::Center).unwrap();
        // floor(720 * 720 / 1280) = 405 rows around row 640
        assert_eq!(window.width, 720);
        assert_eq!(window.height, 405);
        assert_eq!(window.x, 0);
        assert_eq!(window.y, 640 - 202);
        let above = window.y;
        let below = 1280 - (window.y + window.height);
        assert!(above.abs_diff(below) <= 1);
    }

    #[test]
    fn test_landscape_and_square_are_not_cropped() {
        assert_eq!(crop_window((1920, 1080), (1280, 720), CropAnchor::Center), None);
        assert_eq!(crop_window((640, 480), (1280, 720), CropAnchor::Center), None);
        assert_eq!(crop_window((500, 500), (1280, 720), CropAnchor::Center), None);
    }

    #[test]
    fn test_crop_anchor_variants() {
        let top = crop_window((720, 1280), (1280, 720), CropAnchor::Top).unwrap();
        let bottom = crop_window((720, 1280), (1280, 720), CropAnchor::Bottom).unwrap();
        assert_eq!(top.y, 0);
        assert_eq!(bottom.y + bottom.height, 1280);
    }

    #[test]
    fn test_crop_height_clamped_for_portrait_target() {
        // A portrait canonical size would ask for more rows than the source has
        let window = crop_window((720, 1000), (720, 1280), CropAnchor::Center).unwrap();
        assert_eq!(window.height, 1000);
        assert_eq!(window.y, 0);
    }

    #[test]
    fn test_portrait_clip_normalized_to_canonical_size() {
        // Top and bottom bands are red, the centered band that survives the crop is green
        let source = RgbImage::from_fn(72, 128, |_, y| {
            if (44..84).contains(&y) {
                Rgb([0, 255, 0])
            } else {
                Rgb([255, 0, 0])
            }
        });
        let clip = StaticClip::new("portrait", Frame::new(source), 24.0, 2.0);
        let mut normalized = normalizer().normalize(Box::new(clip)).unwrap();

        assert_eq!(normalized.info().size(), (1280, 720));
        assert_eq!(normalized.info().duration, 2.0);

        let frame = normalized.frame_at(0.5).unwrap();
        assert_eq!(frame.size(), (1280, 720));
        // floor(72 * 720 / 1280) = 40 rows starting at 64 - 20 = 44: all green
        assert_eq!(frame.get_pixel(0, 0), [0, 255, 0]);
        assert_eq!(frame.get_pixel(640, 360), [0, 255, 0]);
        assert_eq!(frame.get_pixel(1279, 719), [0, 255, 0]);
    }

    #[test]
    fn test_landscape_clip_is_stretched() {
        let clip = StaticClip::new("wide", Frame::new_filled(320, 240, [1, 2, 3]), 30.0, 1.0);
        let mut normalized = normalizer().normalize(Box::new(clip)).unwrap();
        assert!(normalized.crop().is_none());

        let frame = normalized.frame_at(0.0).unwrap();
        assert_eq!(frame.size(), (1280, 720));
        assert_eq!(frame.get_pixel(1000, 700), [1, 2, 3]);
        assert_eq!(normalized.info().fps, 30.0);
    }

    #[test]
    fn test_zero_sized_source_rejected() {
        let clip = StaticClip::new("empty", Frame::new_filled(0, 0, [0, 0, 0]), 24.0, 1.0);
        let err = normalizer().normalize(Box::new(clip)).unwrap_err();
        assert!(err.is_recoverable());
    }
}
