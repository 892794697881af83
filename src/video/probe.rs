use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VideoError};

/// Properties of a video file as reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Display width, after applying rotation
    pub width: u32,
    /// Display height, after applying rotation
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    /// Rotation in degrees as stored in the container
    pub rotation: i32,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub fn is_ffprobe_on_path() -> bool {
    Command::new("ffprobe")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Run ffprobe on `path` and read back the first video stream
pub fn probe_video(path: &Path) -> Result<VideoMetadata> {
    let decode_failed = |reason: String| VideoError::DecodeFailed {
        path: path.display().to_string(),
        reason,
    };

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,duration:stream_tags=rotate:stream_side_data=rotation:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| decode_failed(format!("could not run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(decode_failed(format!("ffprobe failed: {}", stderr.trim())).into());
    }

    let json = String::from_utf8_lossy(&output.stdout);
    let metadata = parse_probe_json(&json).map_err(decode_failed)?;

    debug!(
        "Probed {}: {}x{} @ {:.3}fps, {:.3}s, rotation {}",
        path.display(),
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.duration,
        metadata.rotation
    );

    Ok(metadata)
}

/// Parse `ffprobe -of json` output into [`VideoMetadata`]
pub fn parse_probe_json(json: &str) -> std::result::Result<VideoMetadata, String> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| format!("invalid ffprobe output: {}", e))?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (coded_width, coded_height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        (w, h) => {
            return Err(format!(
                "invalid frame size {}x{}",
                w.unwrap_or(0),
                h.unwrap_or(0)
            ))
        }
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
        .ok_or_else(|| "unknown frame rate".to_string())?;

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| "unknown duration".to_string())?;

    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .map(|r| r.round() as i32)
        .or_else(|| {
            stream
                .tags
                .as_ref()
                .and_then(|t| t.rotate.as_deref())
                .and_then(|r| r.trim().parse::<i32>().ok())
        })
        .unwrap_or(0);

    // ffmpeg autorotates on decode, so quarter turns swap the display size
    let (width, height) = if rotation.rem_euclid(180) == 90 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    Ok(VideoMetadata {
        width,
        height,
        fps,
        duration,
        rotation,
    })
}

/// Parse an ffprobe rate like `30000/1001`; `0/0` yields `None`
fn parse_rational(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}
