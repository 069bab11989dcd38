use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5001";
pub const DEFAULT_PLACEHOLDER_TOKEN: &str = "[Recording...]";
pub const DEFAULT_TRANSCRIPTION_ERROR_MARKER: &str = "[Transcription failed]";
const BACKEND_URL_ENV: &str = "KEFI_BACKEND_URL";

const MIN_SUCCESS_DISPLAY_MS: u64 = 50;
const MAX_SUCCESS_DISPLAY_MS: u64 = 5_000;
const MIN_LEVEL_BUCKETS: usize = 1;
const MAX_LEVEL_BUCKETS: usize = 128;
const MIN_LEVEL_INTERVAL_MS: u64 = 10;
const MAX_LEVEL_INTERVAL_MS: u64 = 1_000;
const MAX_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Read(String),
    #[error("failed to parse settings file: {0}")]
    Parse(String),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreSettings {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_success_display_ms")]
    pub success_display_ms: u64,
    #[serde(default = "default_toolbar_padding_px")]
    pub toolbar_padding_px: f64,
    #[serde(default = "default_toolbar_gap_px")]
    pub toolbar_gap_px: f64,
    #[serde(default = "default_level_bucket_count")]
    pub level_bucket_count: usize,
    #[serde(default = "default_level_interval_ms")]
    pub level_interval_ms: u64,
    #[serde(default = "default_placeholder_token")]
    pub placeholder_token: String,
    #[serde(default = "default_transcription_error_marker")]
    pub transcription_error_marker: String,
    #[serde(default = "default_max_recording_secs")]
    pub max_recording_secs: u64,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            success_display_ms: default_success_display_ms(),
            toolbar_padding_px: default_toolbar_padding_px(),
            toolbar_gap_px: default_toolbar_gap_px(),
            level_bucket_count: default_level_bucket_count(),
            level_interval_ms: default_level_interval_ms(),
            placeholder_token: default_placeholder_token(),
            transcription_error_marker: default_transcription_error_marker(),
            max_recording_secs: default_max_recording_secs(),
        }
    }
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_success_display_ms() -> u64 {
    300
}

fn default_toolbar_padding_px() -> f64 {
    8.0
}

fn default_toolbar_gap_px() -> f64 {
    10.0
}

fn default_level_bucket_count() -> usize {
    16
}

fn default_level_interval_ms() -> u64 {
    50
}

fn default_placeholder_token() -> String {
    DEFAULT_PLACEHOLDER_TOKEN.to_string()
}

fn default_transcription_error_marker() -> String {
    DEFAULT_TRANSCRIPTION_ERROR_MARKER.to_string()
}

fn default_max_recording_secs() -> u64 {
    600
}

impl CoreSettings {
    /// Loads settings from `path`, falling back to defaults when the file does
    /// not exist. Out-of-range values are reset rather than rejected.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = if path.exists() {
            let content =
                fs::read_to_string(path).map_err(|err| ConfigError::Read(err.to_string()))?;
            serde_json::from_str::<CoreSettings>(&content)
                .map_err(|err| ConfigError::Parse(err.to_string()))?
        } else {
            CoreSettings::default()
        };

        let mut settings = normalize_loaded_settings(settings);
        if let Some(url) = read_backend_url_from_environment() {
            settings.backend_url = url;
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let validated = self.clone().validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ConfigError::Read(err.to_string()))?;
        }
        let serialized = serde_json::to_string_pretty(&validated)
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        fs::write(path, serialized).map_err(|err| ConfigError::Read(err.to_string()))
    }

    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.backend_url = normalize_backend_url(&self.backend_url);
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "backendUrl must start with http:// or https://, got `{}`",
                self.backend_url
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "requestTimeoutSecs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.connect_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "connectTimeoutSecs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        if !(MIN_SUCCESS_DISPLAY_MS..=MAX_SUCCESS_DISPLAY_MS).contains(&self.success_display_ms) {
            return Err(ConfigError::Invalid(format!(
                "successDisplayMs must be between {MIN_SUCCESS_DISPLAY_MS} and {MAX_SUCCESS_DISPLAY_MS}"
            )));
        }
        if !self.toolbar_padding_px.is_finite() || self.toolbar_padding_px < 0.0 {
            return Err(ConfigError::Invalid(
                "toolbarPaddingPx must be a non-negative number".to_string(),
            ));
        }
        if !self.toolbar_gap_px.is_finite() || self.toolbar_gap_px < 0.0 {
            return Err(ConfigError::Invalid(
                "toolbarGapPx must be a non-negative number".to_string(),
            ));
        }
        if !(MIN_LEVEL_BUCKETS..=MAX_LEVEL_BUCKETS).contains(&self.level_bucket_count) {
            return Err(ConfigError::Invalid(format!(
                "levelBucketCount must be between {MIN_LEVEL_BUCKETS} and {MAX_LEVEL_BUCKETS}"
            )));
        }
        if !(MIN_LEVEL_INTERVAL_MS..=MAX_LEVEL_INTERVAL_MS).contains(&self.level_interval_ms) {
            return Err(ConfigError::Invalid(format!(
                "levelIntervalMs must be between {MIN_LEVEL_INTERVAL_MS} and {MAX_LEVEL_INTERVAL_MS}"
            )));
        }
        if self.placeholder_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "placeholderToken cannot be empty".to_string(),
            ));
        }
        if self.transcription_error_marker.contains(&self.placeholder_token) {
            return Err(ConfigError::Invalid(
                "transcriptionErrorMarker must not contain the placeholder token".to_string(),
            ));
        }
        if self.max_recording_secs == 0 {
            return Err(ConfigError::Invalid(
                "maxRecordingSecs must be greater than 0".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }

    pub fn level_interval(&self) -> Duration {
        Duration::from_millis(self.level_interval_ms)
    }

    pub fn max_recording(&self) -> Duration {
        Duration::from_secs(self.max_recording_secs)
    }
}

fn read_backend_url_from_environment() -> Option<String> {
    let value = std::env::var(BACKEND_URL_ENV).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(normalize_backend_url(trimmed))
}

fn normalize_backend_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return default_backend_url();
    }
    trimmed.to_string()
}

fn normalize_loaded_settings(mut settings: CoreSettings) -> CoreSettings {
    let defaults = CoreSettings::default();
    settings.backend_url = normalize_backend_url(&settings.backend_url);

    if !(1..=MAX_TIMEOUT_SECS).contains(&settings.request_timeout_secs) {
        warn!(
            request_timeout_secs = settings.request_timeout_secs,
            "loaded request timeout is out of range; resetting to default"
        );
        settings.request_timeout_secs = defaults.request_timeout_secs;
    }

    if !(1..=MAX_TIMEOUT_SECS).contains(&settings.connect_timeout_secs) {
        warn!(
            connect_timeout_secs = settings.connect_timeout_secs,
            "loaded connect timeout is out of range; resetting to default"
        );
        settings.connect_timeout_secs = defaults.connect_timeout_secs;
    }

    if !(MIN_SUCCESS_DISPLAY_MS..=MAX_SUCCESS_DISPLAY_MS).contains(&settings.success_display_ms) {
        warn!(
            success_display_ms = settings.success_display_ms,
            "loaded success display window is out of range; resetting to default"
        );
        settings.success_display_ms = defaults.success_display_ms;
    }

    if !settings.toolbar_padding_px.is_finite() || settings.toolbar_padding_px < 0.0 {
        settings.toolbar_padding_px = defaults.toolbar_padding_px;
    }
    if !settings.toolbar_gap_px.is_finite() || settings.toolbar_gap_px < 0.0 {
        settings.toolbar_gap_px = defaults.toolbar_gap_px;
    }

    if !(MIN_LEVEL_BUCKETS..=MAX_LEVEL_BUCKETS).contains(&settings.level_bucket_count) {
        warn!(
            level_bucket_count = settings.level_bucket_count,
            "loaded level bucket count is out of range; resetting to default"
        );
        settings.level_bucket_count = defaults.level_bucket_count;
    }

    if !(MIN_LEVEL_INTERVAL_MS..=MAX_LEVEL_INTERVAL_MS).contains(&settings.level_interval_ms) {
        warn!(
            level_interval_ms = settings.level_interval_ms,
            "loaded level interval is out of range; resetting to default"
        );
        settings.level_interval_ms = defaults.level_interval_ms;
    }

    if settings.placeholder_token.trim().is_empty() {
        settings.placeholder_token = defaults.placeholder_token;
    }
    if settings.transcription_error_marker.contains(&settings.placeholder_token) {
        warn!("loaded error marker contains the placeholder token; resetting both to defaults");
        settings.placeholder_token = default_placeholder_token();
        settings.transcription_error_marker = default_transcription_error_marker();
    }

    if settings.max_recording_secs == 0 {
        settings.max_recording_secs = defaults.max_recording_secs;
    }

    settings
}
