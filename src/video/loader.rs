use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::VideoConfig;
use crate::error::{AssemblerError, CompositionError, Result, VideoError};
use crate::video::probe::is_ffprobe_on_path;
use crate::video::source::{is_video_file, open_source};
use crate::video::types::{Clip, ClipInfo};

/// A configured clip that was left out of the run
#[derive(Debug, Clone)]
pub struct SkippedClip {
    pub path: PathBuf,
    pub reason: String,
}

/// Sources that opened, in configured order, plus the ones that were skipped
pub struct LoadedSources {
    pub clips: Vec<Box<dyn Clip>>,
    pub skipped: Vec<SkippedClip>,
}

/// What listing mode reports for one configured clip
#[derive(Debug, Clone, PartialEq)]
pub enum ListingStatus {
    Ready(ClipInfo),
    Missing,
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct ClipListing {
    pub path: PathBuf,
    pub status: ListingStatus,
}

/// Opens the configured source clips
pub struct SourceLoader {
    fps: f64,
    still_duration: f64,
    threads: usize,
}

impl SourceLoader {
    pub fn new(video: &VideoConfig) -> Self {
        Self {
            fps: video.fps,
            still_duration: video.still_duration,
            threads: video.processing_threads.max(1),
        }
    }

    /// Open every path, probing in parallel. Results keep the input order.
    fn open_all(&self, paths: &[PathBuf]) -> Vec<Result<Box<dyn Clip>>> {
        let open = |path: &PathBuf| open_source(path, self.fps, self.still_duration).and_then(verify_decodes);

        match rayon::ThreadPoolBuilder::new().num_threads(self.threads).build() {
            Ok(pool) => pool.install(|| paths.par_iter().map(open).collect()),
            Err(e) => {
                debug!("Probing sequentially, thread pool unavailable: {}", e);
                paths.iter().map(open).collect()
            }
        }
    }

    /// Open the configured clips, skipping the missing and undecodable ones.
    ///
    /// Fails when nothing is left; any other error aborts immediately.
    pub fn load(&self, paths: &[PathBuf]) -> Result<LoadedSources> {
        let mut clips = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();

        if paths.iter().any(|p| is_video_file(p)) && !is_ffprobe_on_path() {
            warn!("ffprobe was not found on PATH; video clips cannot be probed and will be skipped");
        }

        for (path, result) in paths.iter().zip(self.open_all(paths)) {
            match result {
                Ok(clip) => {
                    let info = clip.info();
                    info!(
                        "   ✓ {}: {}x{}, {:.1}s",
                        display_name(path),
                        info.width,
                        info.height,
                        info.duration
                    );
                    if info.is_portrait() {
                        debug!("   {} is portrait and will be cropped", display_name(path));
                    }
                    clips.push(clip);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("{} skipped: {}", display_name(path), e);
                    skipped.push(SkippedClip {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if clips.is_empty() {
            return Err(CompositionError::NoClipsFound {
                configured: paths.len(),
            }
            .into());
        }

        Ok(LoadedSources { clips, skipped })
    }

    /// Size and duration of every configured clip, without running anything
    pub fn list(&self, paths: &[PathBuf]) -> Vec<ClipListing> {
        paths
            .iter()
            .zip(self.open_all(paths))
            .map(|(path, result)| {
                let status = match result {
                    Ok(clip) => ListingStatus::Ready(clip.info()),
                    Err(AssemblerError::Video(VideoError::SourceUnavailable { .. })) => ListingStatus::Missing,
                    Err(e) => ListingStatus::Unreadable(e.to_string()),
                };
                ClipListing {
                    path: path.clone(),
                    status,
                }
            })
            .collect()
    }
}

/// Decode the first frame so files that probe fine but cannot be decoded are
/// skipped at load instead of failing the export.
fn verify_decodes(mut clip: Box<dyn Clip>) -> Result<Box<dyn Clip>> {
    let checked = clip.frame_at(0.0).map(|_| ());
    clip.close();
    checked.map(|()| clip)
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
