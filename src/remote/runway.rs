use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{api_key, request_failed, GenerationRequest, GenerationService, JobStatus};
use crate::error::{ConfigError, RemoteError, Result};

const API_BASE: &str = "https://api.dev.runwayml.com/v1";
const API_VERSION: &str = "2024-11-06";

pub const API_KEY_VAR: &str = "RUNWAY_API_KEY";
pub const TEXT_MODEL: &str = "veo3.1_fast";
pub const IMAGE_MODEL: &str = "gen4_turbo";
pub const RATIO: &str = "1280:720";
pub const DURATIONS: [u32; 3] = [4, 6, 8];
pub const DEFAULT_DURATION: u32 = 6;

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    status: String,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
}

/// Runway text-to-video and image-to-video client
pub struct RunwayClient {
    api_key: String,
    base_url: String,
}

impl RunwayClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Build a client from `RUNWAY_API_KEY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(api_key(API_KEY_VAR)?))
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

/// Endpoint and JSON body for a request: image-to-video when an image is given
fn task_body(request: &GenerationRequest) -> Result<(&'static str, Value)> {
    let prompt = request
        .prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "prompt".to_string(),
            value: String::new(),
        })?;

    let duration = request.duration.unwrap_or(DEFAULT_DURATION);
    if !DURATIONS.contains(&duration) {
        return Err(ConfigError::InvalidValue {
            key: "duration".to_string(),
            value: duration.to_string(),
        }
        .into());
    }

    Ok(match request.image.as_deref() {
        Some(image) => (
            "image_to_video",
            json!({
                "model": IMAGE_MODEL,
                "promptImage": image,
                "promptText": prompt,
                "duration": duration,
                "ratio": RATIO,
            }),
        ),
        None => (
            "text_to_video",
            json!({
                "model": TEXT_MODEL,
                "promptText": prompt,
                "duration": duration,
                "ratio": RATIO,
            }),
        ),
    })
}

fn task_status(task: Task) -> Result<JobStatus> {
    match task.status.as_str() {
        "SUCCEEDED" => {
            let output_url = task
                .output
                .and_then(|urls| urls.into_iter().next())
                .ok_or_else(|| RemoteError::UnexpectedResponse {
                    service: "runway".to_string(),
                    details: "task succeeded without output".to_string(),
                })?;
            Ok(JobStatus::Succeeded { output_url })
        }
        "FAILED" | "CANCELLED" => Ok(JobStatus::Failed {
            reason: task
                .failure
                .or(task.failure_code)
                .unwrap_or_else(|| task.status.to_lowercase()),
        }),
        other => Ok(JobStatus::Pending(other.to_string())),
    }
}

impl GenerationService for RunwayClient {
    fn name(&self) -> &str {
        "runway"
    }

    fn submit(&self, request: &GenerationRequest) -> Result<String> {
        let (endpoint, body) = task_body(request)?;
        debug!("POST {}/{} {}", self.base_url, endpoint, body);

        let mut response = ureq::post(&format!("{}/{}", self.base_url, endpoint))
            .header("Authorization", &self.authorization())
            .header("X-Runway-Version", API_VERSION)
            .send_json(&body)
            .map_err(|e| request_failed(self.name(), e))?;

        let created: CreatedTask = response
            .body_mut()
            .read_json()
            .map_err(|e| RemoteError::UnexpectedResponse {
                service: self.name().to_string(),
                details: e.to_string(),
            })?;

        Ok(created.id)
    }

    fn status(&self, job_id: &str) -> Result<JobStatus> {
        let mut response = ureq::get(&format!("{}/tasks/{}", self.base_url, job_id))
            .header("Authorization", &self.authorization())
            .header("X-Runway-Version", API_VERSION)
            .call()
            .map_err(|e| request_failed(self.name(), e))?;

        let task: Task = response
            .body_mut()
            .read_json()
            .map_err(|e| RemoteError::UnexpectedResponse {
                service: self.name().to_string(),
                details: e.to_string(),
            })?;

        task_status(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: Some(prompt.to_string()),
            ..GenerationRequest::default()
        }
    }

    fn parse(json: &str) -> JobStatus {
        task_status(serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn test_text_to_video_body() {
        let (endpoint, body) = task_body(&request("drone over a jobsite")).unwrap();
        assert_eq!(endpoint, "text_to_video");
        assert_eq!(body["model"], TEXT_MODEL);
        assert_eq!(body["duration"], 6);
        assert_eq!(body["ratio"], "1280:720");
    }

    #[test]
    fn test_image_url_selects_image_to_video() {
        let mut req = request("slow push in");
        req.image = Some("https://example.com/still.png".to_string());
        req.duration = Some(4);

        let (endpoint, body) = task_body(&req).unwrap();
        assert_eq!(endpoint, "image_to_video");
        assert_eq!(body["model"], IMAGE_MODEL);
        assert_eq!(body["promptImage"], "https://example.com/still.png");
        assert_eq!(body["duration"], 4);
    }

    #[test]
    fn test_local_image_sent_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.jpg");
        std::fs::write(&path, [0xFFu8, 0xD8, 0xFF, 0xE0]).unwrap();

        let mut req = request("slow push in");
        req.image = Some(crate::remote::image_reference(path.to_str().unwrap()).unwrap());

        let (endpoint, body) = task_body(&req).unwrap();
        assert_eq!(endpoint, "image_to_video");
        assert_eq!(body["promptImage"], "data:image/jpeg;base64,/9j/4A==");
    }

    #[test]
    fn test_rejects_unsupported_duration_and_empty_prompt() {
        let mut req = request("anything");
        req.duration = Some(10);
        assert!(task_body(&req).is_err());
        assert!(task_body(&request("  ")).is_err());
    }

    #[test]
    fn test_task_status_mapping() {
        assert_eq!(
            parse(r#"{"id":"t","status":"THROTTLED"}"#),
            JobStatus::Pending("THROTTLED".to_string())
        );
        assert_eq!(
            parse(r#"{"id":"t","status":"SUCCEEDED","output":["https://cdn/x.mp4"]}"#),
            JobStatus::Succeeded {
                output_url: "https://cdn/x.mp4".to_string()
            }
        );
        assert_eq!(
            parse(r#"{"id":"t","status":"FAILED","failure":"bad prompt","failureCode":"INPUT"}"#),
            JobStatus::Failed {
                reason: "bad prompt".to_string()
            }
        );
        assert_eq!(
            parse(r#"{"id":"t","status":"CANCELLED","output":null}"#),
            JobStatus::Failed {
                reason: "cancelled".to_string()
            }
        );
    }

    #[test]
    fn test_success_without_output_is_unexpected() {
        let task: Task = serde_json::from_str(r#"{"status":"SUCCEEDED","output":[]}"#).unwrap();
        assert!(task_status(task).is_err());
    }
}
