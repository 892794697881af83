use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tempfile::{Builder as TempFileBuilder, NamedTempFile};
use tracing::{debug, info, warn};

use crate::config::{Config, EncodeParams};
use crate::error::{Result, VideoError};
use crate::video::stderr::StderrTail;
use crate::video::types::Frame;

/// Everything the exporter needs to produce the output file
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub params: EncodeParams,
}

impl ExportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            width: config.video.width,
            height: config.video.height,
            fps: config.video.fps,
            params: config.export.clone(),
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Output arguments after `-i pipe:0`
    pub fn output_args(&self) -> Vec<String> {
        let mut args = vec!["-an".to_string(), "-c:v".to_string(), self.params.codec.clone()];

        if !self.params.preset.is_empty() {
            args.push("-preset".to_string());
            args.push(self.params.preset.clone());
        }

        args.push("-crf".to_string());
        args.push(self.params.crf.to_string());
        args.push("-pix_fmt".to_string());
        args.push(self.params.pixel_format.clone());

        if self.params.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }

        args
    }
}

/// Consumer of rendered frames, in presentation order
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}

/// Collects frames in memory
impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Represents an encoded video output
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub duration: f64,
    pub frame_count: u64,
    pub file_size: u64,
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Hidden temporary sibling of `output` that the encoder writes to.
///
/// The extension is kept so ffmpeg still picks the right container. The file
/// is deleted when dropped unless it is persisted.
pub fn partial_file(output: &Path) -> std::io::Result<NamedTempFile> {
    let dir = match output.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let suffix = match output.extension() {
        Some(ext) => format!(".partial.{}", ext.to_string_lossy()),
        None => ".partial".to_string(),
    };

    TempFileBuilder::new()
        .prefix(&format!(".{}.", stem))
        .suffix(&suffix)
        .tempfile_in(dir)
}

/// Streams raw RGB24 frames into an `ffmpeg` child process.
///
/// Output goes to a [`partial_file`] that [`FfmpegEncoder::finish`] persists
/// at the output path. Dropping an unfinished encoder kills ffmpeg and the
/// partial file goes with it.
pub struct FfmpegEncoder {
    width: u32,
    height: u32,
    output: PathBuf,
    partial: Option<NamedTempFile>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: StderrTail,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn new(settings: &ExportSettings, output: &Path) -> Result<Self> {
        if !is_ffmpeg_on_path() {
            return Err(VideoError::EncodingFailed {
                reason: "ffmpeg is required for encoding, but was not found on PATH".to_string(),
            }
            .into());
        }

        let partial = partial_file(output).map_err(|e| VideoError::EncodingFailed {
            reason: format!("could not create a temporary file next to {}: {}", output.display(), e),
        })?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args([
                "-y",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", settings.width, settings.height),
                "-r",
                &settings.fps.to_string(),
                "-i",
                "pipe:0",
            ])
            .args(settings.output_args())
            .arg(partial.path());

        debug!("Encoder command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| VideoError::EncodingFailed {
            reason: format!("failed to spawn ffmpeg: {}", e),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "failed to open ffmpeg stdin".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "failed to open ffmpeg stderr".to_string(),
        })?;

        Ok(Self {
            width: settings.width,
            height: settings.height,
            output: output.to_path_buf(),
            partial: Some(partial),
            child: Some(child),
            stdin: Some(stdin),
            stderr: StderrTail::spawn(stderr),
            frames_written: 0,
        })
    }

    /// Close the input, wait for ffmpeg and move the file into place
    pub fn finish(mut self, duration: f64) -> Result<EncodedVideo> {
        drop(self.stdin.take());

        let mut child = self.child.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "encoder already finished".to_string(),
        })?;

        let status = child.wait().map_err(|e| VideoError::EncodingFailed {
            reason: format!("failed to wait for ffmpeg: {}", e),
        })?;
        let stderr = self.stderr.finish();

        if !status.success() {
            return Err(VideoError::EncodingFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr),
            }
            .into());
        }

        let partial = self.partial.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "encoder output already persisted".to_string(),
        })?;
        partial.persist(&self.output).map_err(|e| VideoError::EncodingFailed {
            reason: format!("could not move the encoded file to {}: {}", self.output.display(), e.error),
        })?;
        // Temporary files are created owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.output, std::fs::Permissions::from_mode(0o644))?;
        }

        let file_size = std::fs::metadata(&self.output)?.len();
        info!(
            "Encoded {} frames to {} ({:.1} MB)",
            self.frames_written,
            self.output.display(),
            file_size as f64 / 1024.0 / 1024.0
        );

        Ok(EncodedVideo {
            path: self.output.clone(),
            duration,
            frame_count: self.frames_written,
            file_size,
        })
    }

    /// Reap ffmpeg after a failed write and collect what it reported
    fn failure_detail(&mut self) -> String {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stderr.finish()
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.size() != (self.width, self.height) {
            return Err(VideoError::EncodingFailed {
                reason: format!(
                    "frame size mismatch: got {}x{}, expected {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            }
            .into());
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VideoError::EncodingFailed {
                reason: "encoder is already finished".to_string(),
            }
            .into());
        };

        if let Err(e) = stdin.write_all(frame.as_rgb_bytes()) {
            // A broken pipe means ffmpeg died; its stderr says why
            drop(self.stdin.take());
            let detail = self.failure_detail();
            return Err(VideoError::EncodingFailed {
                reason: format!("failed to write frame {}: {} {}", self.frames_written, e, detail),
            }
            .into());
        }

        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(partial) = self.partial.take() {
            let path = partial.path().to_path_buf();
            match partial.close() {
                Ok(()) => warn!("Removed incomplete output {}", path.display()),
                Err(e) => warn!("Failed to remove incomplete output {}: {}", path.display(), e),
            }
        }
    }
}
