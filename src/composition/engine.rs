use tracing::{debug, info};

use crate::{
    composition::{
        exporter::Exporter,
        timeline::{Compositor, Timeline, Transition},
    },
    config::Config,
    error::Result,
    video::{
        ClipListing, ClipNormalizer, EncodedVideo, EndCardSynthesizer, ExportSettings, FrameSink,
        SkippedClip, SourceLoader,
    },
    video::types::Clip,
};

/// Outcome of one assembly run
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    /// Final duration in seconds
    pub duration: f64,
    pub frame_count: u64,
    pub clips_used: usize,
    pub skipped: Vec<SkippedClip>,
    /// Present when the run wrote a file
    pub encoded: Option<EncodedVideo>,
}

/// Main engine that runs the assembly pipeline
///
/// The pipeline is a fixed sequence of stages:
/// 1. Loading - open the configured clips, skipping missing ones
/// 2. Normalization - crop and scale every clip to the canonical size
/// 3. Composition - join clips with hard cuts or crossfades
/// 4. End card - append the caption card with a hard cut
/// 5. Trim - cut the timeline to the maximum duration
/// 6. Export - encode the result
pub struct AssemblyEngine {
    config: Config,
}

impl AssemblyEngine {
    /// Create an engine; the configuration is validated up front
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Report size and duration of each configured clip
    pub fn list_clips(&self) -> Vec<ClipListing> {
        let loader = SourceLoader::new(&self.config.video);
        loader.list(&self.config.resolved_clip_paths())
    }

    /// Run every stage and encode to the configured output path
    pub fn assemble(&self) -> Result<AssemblyReport> {
        let (mut timeline, report) = self.build_timeline()?;

        let exporter = Exporter::new(ExportSettings::from_config(&self.config));
        let result = exporter.export(&mut timeline, &self.config.output);
        timeline.close();
        let encoded = result?;

        info!("🎉 Assembly complete! Output saved to: {}", encoded.path.display());
        Ok(AssemblyReport {
            frame_count: encoded.frame_count,
            encoded: Some(encoded),
            ..report
        })
    }

    /// Run every stage but hand the frames to `sink` instead of an encoder
    pub fn assemble_into<S: FrameSink + ?Sized>(&self, sink: &mut S) -> Result<AssemblyReport> {
        let (mut timeline, report) = self.build_timeline()?;

        let exporter = Exporter::new(ExportSettings::from_config(&self.config));
        let result = exporter.render(&mut timeline, sink);
        timeline.close();
        let frame_count = result?;

        Ok(AssemblyReport { frame_count, ..report })
    }

    /// Stages 1 to 5: everything up to the finished timeline
    pub fn build_timeline(&self) -> Result<(Timeline, AssemblyReport)> {
        let video = &self.config.video;
        let composition = &self.config.composition;

        info!("📹 Step 1: Loading and normalizing clips...");
        let loader = SourceLoader::new(video);
        let loaded = loader.load(&self.config.resolved_clip_paths())?;

        let normalizer = ClipNormalizer::new(video.canonical_size(), video.crop_anchor, video.resize_filter);
        let mut clips: Vec<Box<dyn Clip>> = Vec::with_capacity(loaded.clips.len());
        for clip in loaded.clips {
            clips.push(Box::new(normalizer.normalize(clip)?));
        }
        let clips_used = clips.len();

        info!("🎞️  Step 2: Assembling sequence...");
        let compositor = if composition.crossfade {
            info!("   Mode: Crossfades ({}s)", composition.crossfade_duration);
            Compositor::crossfade(composition.crossfade_duration, video.fps)
        } else {
            info!("   Mode: Hard cuts");
            Compositor::hard_cuts(video.fps)
        };
        let mut timeline = compositor.compose(clips)?;
        info!("   Total duration: {:.1}s", timeline.duration());

        match composition.end_card_text.as_deref() {
            Some(text) => {
                info!("🪧 Step 3: Adding end card: \"{}\"", text);
                let synthesizer =
                    EndCardSynthesizer::new(self.config.end_card.clone(), video.canonical_size(), video.fps);
                let card = synthesizer.synthesize(text)?;
                // The card is always a hard cut, whatever the body uses
                timeline.append(Box::new(card), Transition::Cut)?;
            }
            None => info!("🪧 Step 3: No end card"),
        }

        let timeline = match composition.max_duration {
            Some(max) if timeline.duration() > max => {
                info!("✂️  Step 4: Trimming to {}s...", max);
                timeline.trim(max)?
            }
            _ => {
                info!("✂️  Step 4: Final duration: {:.1}s", timeline.duration());
                timeline
            }
        };

        for segment in timeline.segments() {
            debug!(
                "   {:.3}s..{:.3}s {} (fade in {:.2}s)",
                segment.start(),
                segment.end(),
                segment.label(),
                segment.fade_in()
            );
        }

        let report = AssemblyReport {
            duration: timeline.duration(),
            frame_count: 0,
            clips_used,
            skipped: loaded.skipped,
            encoded: None,
        };

        Ok((timeline, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{AssemblerError, CompositionError, ConfigError};
    use crate::video::{Frame, ListingStatus};
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(color)).save(path).unwrap();
    }

    fn small_config(dir: &Path, clips: &[&str]) -> Config {
        let mut config = Config::default();
        config.source_dir = dir.to_path_buf();
        config.clips = clips.iter().map(PathBuf::from).collect();
        config.output = dir.join("out.mp4");
        config.video.width = 32;
        config.video.height = 18;
        config.video.fps = 10.0;
        config.video.still_duration = 2.0;
        config.video.processing_threads = 2;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.video.fps = 0.0;
        assert!(AssemblyEngine::new(config).is_err());
    }

    #[test]
    fn test_crossfade_timeline_with_skipped_clip() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 64, 36, [255, 0, 0]);
        write_png(&dir.path().join("c.png"), 36, 64, [0, 0, 255]);

        let config = small_config(dir.path(), &["a.png", "b_missing.mp4", "c.png"]);
        let engine = AssemblyEngine::new(config).unwrap();
        let (timeline, report) = engine.build_timeline().unwrap();

        assert_eq!(report.clips_used, 2);
        assert_eq!(report.skipped.len(), 1);
        assert!((timeline.duration() - 3.5).abs() < 1e-9);
        assert_eq!(timeline.info().size(), (32, 18));
    }

    #[test]
    fn test_no_existing_clips_fails() {
        let dir = tempdir().unwrap();
        let engine = AssemblyEngine::new(small_config(dir.path(), &["x.mp4"])).unwrap();
        let err = engine.build_timeline().err().unwrap();
        assert!(matches!(
            err,
            AssemblerError::Composition(CompositionError::NoClipsFound { .. })
        ));
    }

    #[test]
    fn test_fade_longer_than_clip_fails() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 64, 36, [255, 0, 0]);
        write_png(&dir.path().join("b.png"), 64, 36, [0, 255, 0]);

        let mut config = small_config(dir.path(), &["a.png", "b.png"]);
        config.composition.crossfade_duration = 2.5;
        let engine = AssemblyEngine::new(config).unwrap();
        let err = engine.build_timeline().err().unwrap();
        assert!(matches!(err, AssemblerError::Config(ConfigError::FadeTooLong { .. })));
    }

    #[test]
    fn test_blank_end_card_and_trim() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 64, 36, [255, 0, 0]);
        write_png(&dir.path().join("b.png"), 64, 36, [0, 255, 0]);

        let mut config = small_config(dir.path(), &["a.png", "b.png"]);
        config.composition.end_card_text = Some(String::new());
        config.end_card.duration = 1.5;
        config.end_card.background = [9, 9, 9];
        config.composition.max_duration = Some(4.2);

        let engine = AssemblyEngine::new(config).unwrap();
        let mut frames: Vec<Frame> = Vec::new();
        let report = engine.assemble_into(&mut frames).unwrap();

        // body 3.5s + card 1.5s = 5.0s, trimmed to 4.2s
        assert_eq!(report.duration, 4.2);
        assert_eq!(report.frame_count, 42);
        assert_eq!(frames.len(), 42);
        assert_eq!(frames[41].get_pixel(0, 0), [9, 9, 9]);
        assert_eq!(frames[34].get_pixel(0, 0), [0, 255, 0]);
        assert_eq!(frames[35].get_pixel(0, 0), [9, 9, 9]);
    }

    #[test]
    fn test_listing_mode() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("a.png"), 64, 36, [255, 0, 0]);

        let engine = AssemblyEngine::new(small_config(dir.path(), &["a.png", "gone.mp4"])).unwrap();
        let listing = engine.list_clips();
        assert!(matches!(listing[0].status, ListingStatus::Ready(_)));
        assert_eq!(listing[1].status, ListingStatus::Missing);
    }
}
