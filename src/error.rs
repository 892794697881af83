use thiserror::Error;

/// Main error type for the clip assembler
#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Generation service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and parameter errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("No clips to compose")]
    EmptyInput,

    #[error("Crossfade of {fade:.3}s is longer than clip {index} ({duration:.3}s)")]
    FadeTooLong {
        fade: f64,
        index: usize,
        duration: f64,
    },

    #[error("No usable font for end card text (searched: {searched})")]
    FontUnavailable { searched: String },
}

/// Per-clip and encoder errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Source clip not found: {path}")]
    SourceUnavailable { path: String },

    #[error("Failed to decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Unsupported source format: {path}")]
    UnsupportedFormat { path: String },
}

/// Pipeline-level failures
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("None of the {configured} configured clips could be loaded")]
    NoClipsFound { configured: usize },
}

/// External generation service errors
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Request to {service} failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("Job {job_id} did not finish after {polls} polls")]
    TimedOut { job_id: String, polls: u32 },

    #[error("Unexpected response from {service}: {details}")]
    UnexpectedResponse { service: String, details: String },

    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Cannot read input image {path}: {reason}")]
    ImageUnreadable { path: String, reason: String },
}

/// Convenience type alias for Results using AssemblerError
pub type Result<T> = std::result::Result<T, AssemblerError>;

impl AssemblerError {
    /// Whether a clip that failed with this error can simply be left out of the timeline
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Video(VideoError::SourceUnavailable { .. })
                | Self::Video(VideoError::DecodeFailed { .. })
                | Self::Video(VideoError::UnsupportedFormat { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Composition(CompositionError::NoClipsFound { configured }) => {
                format!(
                    "None of the {} configured clips exist or could be decoded. Check the clip paths with the `list` command.",
                    configured
                )
            }
            Self::Config(ConfigError::FadeTooLong { fade, index, duration }) => {
                format!(
                    "The {:.2}s crossfade does not fit clip #{} which is only {:.2}s long. Shorten the fade or use --no-crossfades.",
                    fade,
                    index + 1,
                    duration
                )
            }
            Self::Config(ConfigError::FontUnavailable { .. }) => {
                "No font found for the end card. Set end_card.font_path in the configuration file.".to_string()
            }
            Self::Video(VideoError::EncodingFailed { reason }) => {
                format!("Could not write the output video: {}. Is ffmpeg installed and on PATH?", reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
