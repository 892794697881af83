use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::video::encoder::{EncodedVideo, ExportSettings, FfmpegEncoder, FrameSink};
use crate::video::types::Clip;

/// Log progress every this many frames
const PROGRESS_INTERVAL: u64 = 240;

/// Number of output frames for `duration` seconds at `fps`
pub fn frame_count(duration: f64, fps: f64) -> u64 {
    if duration <= 0.0 {
        return 0;
    }
    (duration * fps - 1e-6).ceil().max(1.0) as u64
}

/// Walks a finished timeline at the output frame rate and hands every frame to a sink
pub struct Exporter {
    settings: ExportSettings,
}

impl Exporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Pull frames from `clip` in increasing time order; returns the number written
    pub fn render<S: FrameSink + ?Sized>(&self, clip: &mut dyn Clip, sink: &mut S) -> Result<u64> {
        let info = clip.info();
        assert_eq!(
            info.size(),
            self.settings.target_size(),
            "timeline is not at the export size"
        );

        let total = frame_count(info.duration, self.settings.fps);
        debug!(
            "Rendering {} frames ({:.3}s at {}fps)",
            total, info.duration, self.settings.fps
        );

        for index in 0..total {
            let t = index as f64 / self.settings.fps;
            let frame = clip.frame_at(t)?;
            sink.write_frame(&frame)?;

            if (index + 1) % PROGRESS_INTERVAL == 0 {
                info!(
                    "   Rendered {}/{} frames ({:.0}%)",
                    index + 1,
                    total,
                    (index + 1) as f64 * 100.0 / total as f64
                );
            }
        }

        Ok(total)
    }

    /// Encode `clip` to `output`.
    ///
    /// The file only appears at `output` once ffmpeg has finished cleanly; on
    /// any failure the partial file is removed and the error returned.
    pub fn export(&self, clip: &mut dyn Clip, output: &Path) -> Result<EncodedVideo> {
        let duration = clip.duration();
        info!(
            "Exporting {:.2}s to {} ({}, CRF {}, {}x{} @ {}fps)",
            duration,
            output.display(),
            self.settings.params.codec,
            self.settings.params.crf,
            self.settings.width,
            self.settings.height,
            self.settings.fps
        );

        let mut encoder = FfmpegEncoder::new(&self.settings, output)?;
        self.render(clip, &mut encoder)?;
        encoder.finish(duration)
    }
}
