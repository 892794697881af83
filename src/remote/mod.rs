//! # Generation Services
//!
//! Blocking clients for hosted generation APIs that produce source footage.
//! Every service follows the same shape: submit a job, poll it until it
//! settles, then download the result.

pub mod replicate;
pub mod runway;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{ConfigError, RemoteError, Result};

pub use replicate::{ReplicateClient, ReplicateModel};
pub use runway::RunwayClient;

/// Inputs for one generation job
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: Option<String>,
    /// Image to animate: an http(s) URL or a `data:` URI, see [`image_reference`]
    pub image: Option<String>,
    /// Requested length in seconds, for services that take one
    pub duration: Option<u32>,
}

/// State of a submitted job
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Still queued or running; carries the service's own status word
    Pending(String),
    Succeeded { output_url: String },
    Failed { reason: String },
}

/// A hosted service that runs generation jobs asynchronously
pub trait GenerationService {
    fn name(&self) -> &str;

    /// Start a job and return its id
    fn submit(&self, request: &GenerationRequest) -> Result<String>;

    fn status(&self, job_id: &str) -> Result<JobStatus>;
}

/// A finished generation saved to disk
#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    pub job_id: String,
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Read an API key from the environment
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingKey { key: var.to_string() }.into()),
    }
}

/// Turn an image argument into something the services accept.
///
/// URLs and `data:` URIs pass through; a local file is inlined as a base64
/// `data:` URI so it needs no public hosting.
pub fn image_reference(input: &str) -> Result<String> {
    let lower = input.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
        return Ok(input.to_string());
    }

    let path = Path::new(input);
    let unreadable = |reason: String| RemoteError::ImageUnreadable {
        path: input.to_string(),
        reason,
    };

    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => return Err(unreadable("expected a .png, .jpg, .webp or .gif file".to_string()).into()),
    };

    let bytes = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
    debug!("Inlining {} ({} bytes) as {}", path.display(), bytes.len(), mime);
    Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
}

/// Submit `request`, wait for it and download the result to `dest`
pub fn run_job(
    service: &dyn GenerationService,
    request: &GenerationRequest,
    config: &RemoteConfig,
    dest: &Path,
) -> Result<GeneratedAsset> {
    info!("[1/3] Starting {} generation...", service.name());
    let job_id = service.submit(request)?;
    info!("   Task ID: {}", job_id);

    info!("[2/3] Processing...");
    let interval = Duration::from_secs(config.poll_interval_secs);
    let url = poll_until_done(service, &job_id, config.max_polls, |_| std::thread::sleep(interval))?;

    info!("[3/3] Downloading result...");
    let bytes = download(&url, dest)?;
    info!("   Saved {} ({:.1} MB)", dest.display(), bytes as f64 / 1024.0 / 1024.0);

    Ok(GeneratedAsset {
        job_id,
        url,
        path: dest.to_path_buf(),
        bytes,
    })
}

/// Poll `job_id` until it succeeds or fails, calling `wait` between polls.
///
/// Returns the output URL of a successful job.
pub fn poll_until_done<W>(
    service: &dyn GenerationService,
    job_id: &str,
    max_polls: u32,
    mut wait: W,
) -> Result<String>
where
    W: FnMut(u32),
{
    for poll in 1..=max_polls {
        match service.status(job_id)? {
            JobStatus::Succeeded { output_url } => {
                debug!("Job {} succeeded after {} polls", job_id, poll);
                return Ok(output_url);
            }
            JobStatus::Failed { reason } => {
                return Err(RemoteError::JobFailed {
                    job_id: job_id.to_string(),
                    reason,
                }
                .into());
            }
            JobStatus::Pending(state) => {
                debug!("   Status: {} (poll {}/{})", state, poll, max_polls);
                if poll < max_polls {
                    wait(poll);
                }
            }
        }
    }

    Err(RemoteError::TimedOut {
        job_id: job_id.to_string(),
        polls: max_polls,
    }
    .into())
}

/// Stream `url` into `dest`; a partial file is removed on failure
pub fn download(url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let response = ureq::get(url).call().map_err(|e| RemoteError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let mut reader = response.into_body().into_reader();
    let mut file = File::create(dest)?;

    match copy_body(&mut reader, &mut file) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(file);
            if let Err(remove) = std::fs::remove_file(dest) {
                warn!("Failed to remove partial download {}: {}", dest.display(), remove);
            }
            Err(RemoteError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
            .into())
        }
    }
}

fn copy_body<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let bytes = io::copy(reader, writer)?;
    writer.flush()?;
    Ok(bytes)
}

/// Map a transport or HTTP status failure onto the crate error
pub(crate) fn request_failed(service: &str, error: ureq::Error) -> crate::error::AssemblerError {
    RemoteError::RequestFailed {
        service: service.to_string(),
        reason: error.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblerError;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct ScriptedService {
        statuses: RefCell<Vec<JobStatus>>,
        polls: RefCell<u32>,
    }

    impl ScriptedService {
        fn new(mut statuses: Vec<JobStatus>) -> Self {
            statuses.reverse();
            Self {
                statuses: RefCell::new(statuses),
                polls: RefCell::new(0),
            }
        }
    }

    impl GenerationService for ScriptedService {
        fn name(&self) -> &str {
            "scripted"
        }

        fn submit(&self, _request: &GenerationRequest) -> Result<String> {
            Ok("job-1".to_string())
        }

        fn status(&self, _job_id: &str) -> Result<JobStatus> {
            *self.polls.borrow_mut() += 1;
            Ok(self
                .statuses
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| JobStatus::Pending("RUNNING".to_string())))
        }
    }

    #[test]
    fn test_poll_waits_until_success() {
        let service = ScriptedService::new(vec![
            JobStatus::Pending("PENDING".to_string()),
            JobStatus::Pending("RUNNING".to_string()),
            JobStatus::Succeeded {
                output_url: "https://example.com/out.mp4".to_string(),
            },
        ]);

        let mut waits = Vec::new();
        let url = poll_until_done(&service, "job-1", 10, |poll| waits.push(poll)).unwrap();

        assert_eq!(url, "https://example.com/out.mp4");
        assert_eq!(waits, vec![1, 2]);
        assert_eq!(*service.polls.borrow(), 3);
    }

    #[test]
    fn test_failed_job_reports_reason() {
        let service = ScriptedService::new(vec![JobStatus::Failed {
            reason: "content moderation".to_string(),
        }]);

        let err = poll_until_done(&service, "job-1", 10, |_| {}).unwrap_err();
        match err {
            AssemblerError::Remote(RemoteError::JobFailed { job_id, reason }) => {
                assert_eq!(job_id, "job-1");
                assert_eq!(reason, "content moderation");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_poll_gives_up_after_limit() {
        let service = ScriptedService::new(Vec::new());
        let mut waits = 0;
        let err = poll_until_done(&service, "job-1", 4, |_| waits += 1).unwrap_err();

        assert!(matches!(
            err,
            AssemblerError::Remote(RemoteError::TimedOut { polls: 4, .. })
        ));
        assert_eq!(*service.polls.borrow(), 4);
        assert_eq!(waits, 3);
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = api_key("CLIP_ASSEMBLER_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, AssemblerError::Config(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn test_image_urls_pass_through() {
        let url = "https://example.com/still.png";
        assert_eq!(image_reference(url).unwrap(), url);
        let inline = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(image_reference(inline).unwrap(), inline);
    }

    #[test]
    fn test_local_image_becomes_data_uri() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Still.PNG");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let uri = image_reference(path.to_str().unwrap()).unwrap();
        let encoded = uri.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), b"\x89PNG fake");
    }

    #[test]
    fn test_local_image_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone.jpg");
        let err = image_reference(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AssemblerError::Remote(RemoteError::ImageUnreadable { .. })));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hi").unwrap();
        assert!(image_reference(text.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_copy_body_counts_bytes() {
        let mut reader = io::Cursor::new(vec![7u8; 1000]);
        let mut out = Vec::new();
        assert_eq!(copy_body(&mut reader, &mut out).unwrap(), 1000);
        assert_eq!(out.len(), 1000);
    }
}
