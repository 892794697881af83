use std::path::{Path, PathBuf};

use fontdue::layout::{
    CoordinateSystem, HorizontalAlign, Layout, LayoutSettings, TextStyle, VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use tracing::{debug, info};

use crate::config::EndCardConfig;
use crate::error::{ConfigError, Result};
use crate::video::types::{Clip, ClipInfo, Frame, StaticClip};

/// Smallest size the caption is shrunk to before it is allowed to overflow vertically
const MIN_FONT_SIZE: f32 = 12.0;

/// Searched in order when no font is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// A synthesized closing card: solid background with a centered caption
pub struct EndCard {
    text: String,
    background: [u8; 3],
    clip: StaticClip,
}

impl EndCard {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn background(&self) -> [u8; 3] {
        self.background
    }
}

impl Clip for EndCard {
    fn label(&self) -> String {
        format!("end card \"{}\"", self.text)
    }

    fn info(&self) -> ClipInfo {
        self.clip.info()
    }

    fn frame_at(&mut self, t: f64) -> Result<Frame> {
        self.clip.frame_at(t)
    }
}

/// Renders end cards at the canonical frame size
pub struct EndCardSynthesizer {
    config: EndCardConfig,
    size: (u32, u32),
    fps: f64,
}

impl EndCardSynthesizer {
    pub fn new(config: EndCardConfig, size: (u32, u32), fps: f64) -> Self {
        Self { config, size, fps }
    }

    /// Render `text` once; every frame of the returned clip is that image.
    pub fn synthesize(&self, text: &str) -> Result<EndCard> {
        let (width, height) = self.size;
        let mut frame = Frame::new_filled(width, height, self.config.background);

        if !text.trim().is_empty() {
            let font = load_font(self.config.font_path.as_deref())?;
            let mut caption = CaptionLayout::new(&font, self.size, self.config.margin);
            let size = caption.fit(text, self.config.font_size);
            debug!("End card caption at {:.1}px", size);
            caption.draw(&mut frame, self.config.text_color);
        }

        info!(
            "Synthesized end card ({}x{}, {:.2}s): \"{}\"",
            width, height, self.config.duration, text
        );

        Ok(EndCard {
            text: text.to_string(),
            background: self.config.background,
            clip: StaticClip::new("end card", frame, self.fps, self.config.duration),
        })
    }
}

/// Load the configured font, or the first system font that exists
pub fn load_font(configured: Option<&Path>) -> Result<Font> {
    let candidates: Vec<PathBuf> = match configured {
        Some(path) => vec![path.to_path_buf()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };

    for path in &candidates {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        match Font::from_bytes(bytes, FontSettings::default()) {
            Ok(font) => {
                debug!("Using end card font {}", path.display());
                return Ok(font);
            }
            Err(e) => debug!("Skipping unreadable font {}: {}", path.display(), e),
        }
    }

    Err(ConfigError::FontUnavailable {
        searched: candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
    .into())
}

/// Shrink from `start_size` by 10% steps until `measure(size)` fits inside
/// `(max_width, max_height)`, stopping at the 12 px minimum.
///
/// `measure` returns the laid out block's width and height at a size.
pub fn fit_font_size<M>(start_size: f32, max_width: f32, max_height: f32, mut measure: M) -> f32
where
    M: FnMut(f32) -> (f32, f32),
{
    let mut size = start_size.max(MIN_FONT_SIZE);
    loop {
        let (block_width, block_height) = measure(size);
        if (block_width <= max_width && block_height <= max_height) || size <= MIN_FONT_SIZE {
            return size;
        }
        size = (size * 0.9).max(MIN_FONT_SIZE);
    }
}

/// Caption centered in the frame, inside the configured margin
struct CaptionLayout<'a> {
    font: &'a Font,
    layout: Layout,
    origin: (f32, f32),
    max_width: f32,
    max_height: f32,
}

impl<'a> CaptionLayout<'a> {
    fn new(font: &'a Font, frame_size: (u32, u32), margin: u32) -> Self {
        let margin = margin as f32;
        Self {
            font,
            layout: Layout::new(CoordinateSystem::PositiveYDown),
            origin: (margin, margin),
            max_width: (frame_size.0 as f32 - 2.0 * margin).max(1.0),
            max_height: (frame_size.1 as f32 - 2.0 * margin).max(1.0),
        }
    }

    /// Lay out `text` and return the block's width and height
    fn arrange(&mut self, text: &str, size: f32, wrap_style: WrapStyle) -> (f32, f32) {
        self.layout.reset(&LayoutSettings {
            x: self.origin.0,
            y: self.origin.1,
            max_width: Some(self.max_width),
            max_height: Some(self.max_height),
            horizontal_align: HorizontalAlign::Center,
            vertical_align: VerticalAlign::Middle,
            line_height: 1.0,
            wrap_style,
            wrap_hard_breaks: true,
        });
        self.layout.append(&[self.font], &TextStyle::new(text, size, 0));
        (self.block_width(), self.layout.height())
    }

    fn block_width(&self) -> f32 {
        let mut left = f32::MAX;
        let mut right = f32::MIN;
        for glyph in self.layout.glyphs().iter().filter(|g| g.width > 0) {
            left = left.min(glyph.x);
            right = right.max(glyph.x + glyph.width as f32);
        }
        if right < left {
            0.0
        } else {
            right - left
        }
    }

    /// Fit `text` by shrinking; a word still too wide at the minimum size is
    /// broken between letters.
    fn fit(&mut self, text: &str, start_size: f32) -> f32 {
        let (max_width, max_height) = (self.max_width, self.max_height);
        let size = fit_font_size(start_size, max_width, max_height, |size| {
            self.arrange(text, size, WrapStyle::Word)
        });

        let (block_width, _) = self.arrange(text, size, WrapStyle::Word);
        if block_width > max_width {
            debug!("Caption too wide at {:.1}px, breaking words", size);
            self.arrange(text, size, WrapStyle::Letter);
        }
        size
    }

    fn draw(&self, frame: &mut Frame, color: [u8; 3]) {
        for glyph in self.layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (_, coverage) = self.font.rasterize_config(glyph.key);
            blend_glyph(
                frame,
                glyph.x.round() as i64,
                glyph.y.round() as i64,
                glyph.width,
                glyph.height,
                &coverage,
                color,
            );
        }
    }
}

fn blend_glyph(frame: &mut Frame, x: i64, y: i64, glyph_width: usize, glyph_height: usize, coverage: &[u8], color: [u8; 3]) {
    let (width, height) = frame.size();
    let image = frame.as_image_mut();

    for row in 0..glyph_height {
        let py = y + row as i64;
        if py < 0 || py >= height as i64 {
            continue;
        }
        for col in 0..glyph_width {
            let px = x + col as i64;
            if px < 0 || px >= width as i64 {
                continue;
            }
            let alpha = coverage[row * glyph_width + col] as f32 / 255.0;
            if alpha == 0.0 {
                continue;
            }
            let pixel = image.get_pixel_mut(px as u32, py as u32);
            for (channel, &target) in pixel.0.iter_mut().zip(color.iter()) {
                *channel = (*channel as f32 * (1.0 - alpha) + target as f32 * alpha).round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_keeps_size_when_caption_fits() {
        let size = fit_font_size(60.0, 1000.0, 1000.0, |size| (size * 4.0, size * 1.2));
        assert_eq!(size, 60.0);
    }

    #[test]
    fn test_fit_shrinks_in_ten_percent_steps() {
        let mut tried = Vec::new();
        let size = fit_font_size(60.0, 1000.0, 100.0, |size| {
            tried.push(size);
            (size * 4.0, size * 2.0)
        });
        // 60 -> 54 -> 48.6
        assert_eq!(tried.len(), 3);
        assert!((size - 48.6).abs() < 1e-3);
    }

    #[test]
    fn test_fit_stops_at_minimum_size() {
        let size = fit_font_size(40.0, 10.0, 10.0, |size| (size * 100.0, size * 100.0));
        assert_eq!(size, MIN_FONT_SIZE);
    }

    #[test]
    fn test_caption_wraps_inside_margins() {
        let Ok(font) = load_font(None) else {
            eprintln!("skipping: no system font available");
            return;
        };

        let mut caption = CaptionLayout::new(&font, (160, 90), 8);
        let size = caption.fit("Built for the crews who build everything", 48.0);
        assert!(size < 48.0);

        let lines = caption.layout.lines().map_or(0, |lines| lines.len());
        assert!(lines > 1, "caption was not wrapped");
        assert!(caption
            .layout
            .glyphs()
            .iter()
            .filter(|g| g.width > 0)
            .all(|g| g.x >= 7.0 && g.x + g.width as f32 <= 153.0));
    }

    #[test]
    fn test_overlong_word_breaks_between_letters() {
        let Ok(font) = load_font(None) else {
            eprintln!("skipping: no system font available");
            return;
        };

        let mut caption = CaptionLayout::new(&font, (60, 120), 4);
        caption.fit("Supercalifragilisticexpialidocious", 30.0);
        assert!(caption.block_width() <= 52.0 + 1.0);
        assert!(caption.layout.lines().map_or(0, |lines| lines.len()) > 1);
    }

    #[test]
    fn test_blank_card_is_solid_background() {
        let config = EndCardConfig {
            background: [12, 34, 56],
            duration: 2.5,
            ..EndCardConfig::default()
        };
        let synthesizer = EndCardSynthesizer::new(config, (64, 36), 24.0);
        let mut card = synthesizer.synthesize("").unwrap();

        let info = card.info();
        assert_eq!(info.size(), (64, 36));
        assert_eq!(info.duration, 2.5);

        let first = card.frame_at(0.0).unwrap();
        let last = card.frame_at(2.49).unwrap();
        assert_eq!(first, last);
        assert!(first.as_image().pixels().all(|p| p.0 == [12, 34, 56]));
    }

    #[test]
    fn test_missing_configured_font_is_config_error() {
        let config = EndCardConfig {
            font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..EndCardConfig::default()
        };
        let synthesizer = EndCardSynthesizer::new(config, (64, 36), 24.0);
        let err = synthesizer.synthesize("Hello").err().unwrap();
        assert!(matches!(
            err,
            crate::error::AssemblerError::Config(ConfigError::FontUnavailable { .. })
        ));
    }
}
