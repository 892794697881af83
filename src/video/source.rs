use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::probe::{probe_video, VideoMetadata};
use crate::video::stderr::StderrTail;
use crate::video::types::{Clip, ClipInfo, Frame, StaticClip};

/// Frames read and thrown away before a forward jump re-seeks instead
const MAX_FORWARD_SKIP: u64 = 48;

pub fn is_image_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "tiff" | "webp"
        )
    )
}

pub fn is_video_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if matches!(
            ext.to_lowercase().as_str(),
            "mp4" | "avi" | "mov" | "mkv" | "webm" | "m4v" | "flv"
        )
    )
}

/// Open a source clip, choosing the variant from the file extension.
///
/// Still images become a [`StaticClip`] lasting `still_duration` seconds.
pub fn open_source(path: &Path, fps: f64, still_duration: f64) -> Result<Box<dyn Clip>> {
    if !path.exists() {
        return Err(VideoError::SourceUnavailable {
            path: path.display().to_string(),
        }
        .into());
    }

    if is_image_file(path) {
        Ok(Box::new(open_still(path, fps, still_duration)?))
    } else if is_video_file(path) {
        Ok(Box::new(FileClip::open(path)?))
    } else {
        Err(VideoError::UnsupportedFormat {
            path: path.display().to_string(),
        }
        .into())
    }
}

/// Load an image file as a static clip
pub fn open_still(path: &Path, fps: f64, duration: f64) -> Result<StaticClip> {
    let image = image::open(path).map_err(|e| VideoError::DecodeFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(VideoError::DecodeFailed {
            path: path.display().to_string(),
            reason: "image has no pixels".to_string(),
        }
        .into());
    }

    Ok(StaticClip::new(path.display().to_string(), Frame::new(rgb), fps, duration))
}

/// A video file decoded lazily through an `ffmpeg` child process.
///
/// Frames are streamed as raw RGB24. Sequential reads reuse the running
/// decoder; seeking backwards or far ahead restarts it at the new position.
pub struct FileClip {
    path: PathBuf,
    metadata: VideoMetadata,
    reader: Option<FrameReader>,
}

impl FileClip {
    /// Probe `path`. No decoder is started until the first frame is requested.
    pub fn open(path: &Path) -> Result<Self> {
        let metadata = probe_video(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            reader: None,
        })
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn frame_count(&self) -> u64 {
        ((self.metadata.duration * self.metadata.fps - 1e-6).ceil() as u64).max(1)
    }

    fn frame_index(&self, t: f64) -> u64 {
        let t = t.clamp(0.0, self.metadata.duration);
        let index = (t * self.metadata.fps + 1e-6).floor() as u64;
        index.min(self.frame_count() - 1)
    }

    fn decode_failed(&self, reason: impl Into<String>) -> VideoError {
        VideoError::DecodeFailed {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl Clip for FileClip {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn info(&self) -> ClipInfo {
        ClipInfo {
            width: self.metadata.width,
            height: self.metadata.height,
            fps: self.metadata.fps,
            duration: self.metadata.duration,
        }
    }

    fn frame_at(&mut self, t: f64) -> Result<Frame> {
        let index = self.frame_index(t);

        let needs_seek = match &self.reader {
            None => true,
            Some(reader) => match &reader.current {
                Some((current, _)) if *current == index => false,
                Some((current, _)) if *current > index => true,
                _ if index < reader.next_index => true,
                _ => !reader.exhausted && index >= reader.next_index + MAX_FORWARD_SKIP,
            },
        };

        if needs_seek {
            debug!("Starting decoder for {} at frame {}", self.path.display(), index);
            self.reader = Some(FrameReader::spawn(&self.path, &self.metadata, index)?);
        }

        let frame_bytes = self.metadata.width as usize * self.metadata.height as usize * 3;
        let (width, height) = (self.metadata.width, self.metadata.height);

        let Some(reader) = self.reader.as_mut() else {
            return Err(self.decode_failed("decoder not running").into());
        };

        while !reader.exhausted && reader.next_index <= index {
            match reader.read_frame(frame_bytes, width, height) {
                Ok(Some(frame)) => {
                    reader.current = Some((reader.next_index, frame));
                    reader.next_index += 1;
                }
                Ok(None) => {
                    // Probed durations often overshoot the last decodable frame;
                    // the last frame is held from here on.
                    debug!(
                        "{} ended at frame {} (wanted {})",
                        self.path.display(),
                        reader.next_index,
                        index
                    );
                    reader.exhausted = true;
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.reader = None;
                    return Err(self.decode_failed(reason).into());
                }
            }
        }

        if let Some((_, frame)) = &reader.current {
            return Ok(frame.clone());
        }

        let stderr = reader.take_stderr();
        self.reader = None;
        Err(self
            .decode_failed(format!("no frames decoded at {:.3}s: {}", t, stderr))
            .into())
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

struct FrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr: StderrTail,
    next_index: u64,
    current: Option<(u64, Frame)>,
    exhausted: bool,
}

impl FrameReader {
    fn spawn(path: &Path, metadata: &VideoMetadata, start_index: u64) -> Result<Self> {
        let start = start_index as f64 / metadata.fps;

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-ss", &format!("{:.6}", start), "-i"])
            .arg(path)
            .args([
                "-an",
                "-sn",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", metadata.width, metadata.height),
                "-r",
                &metadata.fps.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VideoError::DecodeFailed {
                path: path.display().to_string(),
                reason: format!("failed to spawn ffmpeg (is it installed and on PATH?): {}", e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| VideoError::DecodeFailed {
            path: path.display().to_string(),
            reason: "failed to open ffmpeg stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| VideoError::DecodeFailed {
            path: path.display().to_string(),
            reason: "failed to open ffmpeg stderr".to_string(),
        })?;

        Ok(Self {
            child,
            stdout,
            stderr: StderrTail::spawn(stderr),
            next_index: start_index,
            current: None,
            exhausted: false,
        })
    }

    /// `Ok(None)` at end of stream, including a truncated final frame
    fn read_frame(&mut self, frame_bytes: usize, width: u32, height: u32) -> std::io::Result<Option<Frame>> {
        let mut data = vec![0u8; frame_bytes];
        match self.stdout.read_exact(&mut data) {
            Ok(()) => Ok(Frame::from_rgb_bytes(width, height, data)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Called once stdout is exhausted, so ffmpeg is already on its way out
    fn take_stderr(&mut self) -> String {
        let _ = self.child.wait();
        let message = self.stderr.finish();
        if message.is_empty() {
            "ffmpeg produced no output".to_string()
        } else {
            message
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            if e.kind() != ErrorKind::InvalidInput {
                warn!("Failed to stop ffmpeg decoder: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}
