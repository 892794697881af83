use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Hero sequence assembled when no clip list is configured
pub const DEFAULT_CLIPS: [&str; 5] = [
    "clip1_desk.mp4",
    "clip2_jobsite.mp4",
    "clip3_phone_jobsite.mp4",
    "clip4_truck.mp4",
    "clip5_home.mp4",
];

/// Main configuration for the clip assembler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that relative clip paths are resolved against
    pub source_dir: PathBuf,

    /// Ordered list of source clips
    pub clips: Vec<PathBuf>,

    /// Where the finished video is written
    pub output: PathBuf,

    /// Canonical frame geometry and source handling
    pub video: VideoConfig,

    /// How clips are joined, end card text and trimming
    pub composition: CompositionConfig,

    /// End card appearance
    pub end_card: EndCardConfig,

    /// Encoder settings
    pub export: EncodeParams,

    /// Generation service polling
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            clips: DEFAULT_CLIPS.iter().map(PathBuf::from).collect(),
            output: PathBuf::from("build/hero_final.mp4"),
            video: VideoConfig::default(),
            composition: CompositionConfig::default(),
            end_card: EndCardConfig::default(),
            export: EncodeParams::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.composition.validate()?;
        self.end_card.validate()?;
        self.export.validate()?;
        Ok(())
    }

    /// Configured clip paths, with relative entries resolved against `source_dir`
    pub fn resolved_clip_paths(&self) -> Vec<PathBuf> {
        self.clips
            .iter()
            .map(|clip| {
                if clip.is_absolute() {
                    clip.clone()
                } else {
                    self.source_dir.join(clip)
                }
            })
            .collect()
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Where the crop window sits when a portrait clip is cut down to the canonical ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropAnchor {
    Top,
    Center,
    Bottom,
}

/// Resampling filter used when rescaling to the canonical size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Canonical frame geometry and source handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Canonical frame width
    pub width: u32,

    /// Canonical frame height
    pub height: u32,

    /// Output frame rate
    pub fps: f64,

    /// Vertical placement of the portrait crop window
    pub crop_anchor: CropAnchor,

    /// Filter used for the final rescale
    pub resize_filter: ResizeFilter,

    /// How long a still image source is shown, in seconds
    pub still_duration: f64,

    /// Threads used to probe and open sources
    pub processing_threads: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24.0,
            crop_anchor: CropAnchor::Center,
            resize_filter: ResizeFilter::Lanczos3,
            still_duration: 3.0,
            processing_threads: num_cpus::get(),
        }
    }
}

impl VideoConfig {
    /// Canonical `(width, height)`
    pub fn canonical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid("video.size", format!("{}x{}", self.width, self.height)).into());
        }

        // yuv420p output needs even dimensions
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(invalid("video.size", format!("{}x{} (must be even)", self.width, self.height)).into());
        }

        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(invalid("video.fps", self.fps).into());
        }

        if !(self.still_duration.is_finite() && self.still_duration > 0.0) {
            return Err(invalid("video.still_duration", self.still_duration).into());
        }

        if self.processing_threads == 0 {
            return Err(invalid("video.processing_threads", self.processing_threads).into());
        }

        Ok(())
    }
}

/// How clips are joined, plus the optional end card and trim
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Join body clips with crossfades instead of hard cuts
    pub crossfade: bool,

    /// Crossfade duration between clips (seconds)
    pub crossfade_duration: f64,

    /// Caption for the trailing end card, if any
    pub end_card_text: Option<String>,

    /// Trim the finished timeline to this many seconds
    pub max_duration: Option<f64>,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            crossfade: true,
            crossfade_duration: 0.5,
            end_card_text: None,
            max_duration: None,
        }
    }
}

impl CompositionConfig {
    fn validate(&self) -> Result<()> {
        if self.crossfade && !(self.crossfade_duration.is_finite() && self.crossfade_duration > 0.0) {
            return Err(invalid("composition.crossfade_duration", self.crossfade_duration).into());
        }

        if let Some(max) = self.max_duration {
            if !(max.is_finite() && max > 0.0) {
                return Err(invalid("composition.max_duration", max).into());
            }
        }

        Ok(())
    }
}

/// End card appearance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndCardConfig {
    /// Card duration in seconds
    pub duration: f64,

    /// Background fill (RGB)
    pub background: [u8; 3],

    /// Caption color (RGB)
    pub text_color: [u8; 3],

    /// Starting font size in pixels; shrunk if the caption does not fit
    pub font_size: f32,

    /// TrueType/OpenType font; common system fonts are searched when unset
    pub font_path: Option<PathBuf>,

    /// Horizontal and vertical padding kept free of text, in pixels
    pub margin: u32,
}

impl Default for EndCardConfig {
    fn default() -> Self {
        Self {
            duration: 3.0,
            background: [0, 0, 0],
            text_color: [255, 255, 255],
            font_size: 60.0,
            font_path: None,
            margin: 40,
        }
    }
}

impl EndCardConfig {
    fn validate(&self) -> Result<()> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(invalid("end_card.duration", self.duration).into());
        }

        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(invalid("end_card.font_size", self.font_size).into());
        }

        Ok(())
    }
}

/// Encoder settings passed to ffmpeg
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeParams {
    /// ffmpeg video codec name
    pub codec: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Encoder preset
    pub preset: String,

    /// Output pixel format
    pub pixel_format: String,

    /// Move the container index ahead of the media data
    pub faststart: bool,

    /// Source audio is always discarded; only `false` is accepted
    pub has_audio: bool,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            crf: 23,
            preset: "slow".to_string(),
            pixel_format: "yuv420p".to_string(),
            faststart: true,
            has_audio: false,
        }
    }
}

impl EncodeParams {
    fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(invalid("export.crf", self.crf).into());
        }

        if self.codec.trim().is_empty() {
            return Err(ConfigError::MissingKey { key: "export.codec".to_string() }.into());
        }

        if self.has_audio {
            return Err(invalid("export.has_audio", "true (audio export is not supported)").into());
        }

        Ok(())
    }
}

/// Generation service polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Seconds between status polls
    pub poll_interval_secs: u64,

    /// Give up after this many polls
    pub max_polls: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_polls: 360,
        }
    }
}
