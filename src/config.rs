//! Configuration types for record-sweep

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Remote lookup API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Lookup endpoint that receives the POSTed query
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Timeout for a single lookup request (default: 10 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Proxy pool and validation settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Requests each proxy may carry per window (default: 150)
    #[serde(default = "default_quota_per_window")]
    pub quota_per_window: u32,

    /// Length of the rolling quota window (default: 1 hour)
    #[serde(default = "default_window", with = "duration_serde")]
    pub window: Duration,

    /// URL fetched through each candidate proxy during validation
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Timeout for a single validation probe (default: 5 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Maximum number of probes in flight at once (default: 10)
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            quota_per_window: default_quota_per_window(),
            window: default_window(),
            probe_url: default_probe_url(),
            probe_timeout: default_probe_timeout(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

/// Retry configuration for a single subject
///
/// Every attempt counts toward `max_retries`, including rounds where the pool
/// had no proxy under quota. Each retryable classification has its own delay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per subject (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay after an HTTP 429 response (default: 5 seconds)
    #[serde(default = "default_rate_limit_delay", with = "duration_serde")]
    pub rate_limit_delay: Duration,

    /// Delay after an HTTP 5xx response (default: 30 seconds)
    #[serde(default = "default_server_error_delay", with = "duration_serde")]
    pub server_error_delay: Duration,

    /// Delay before asking an exhausted pool again (default: 60 seconds)
    #[serde(default = "default_unavailable_backoff", with = "duration_serde")]
    pub unavailable_backoff: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            rate_limit_delay: default_rate_limit_delay(),
            server_error_delay: default_server_error_delay(),
            unavailable_backoff: default_unavailable_backoff(),
            jitter: false,
        }
    }
}

/// Worker pool and pacing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of subjects processed concurrently (default: 5)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause between two submissions (default: 1 second)
    #[serde(default = "default_submit_pacing", with = "duration_serde")]
    pub submit_pacing: Duration,

    /// How often in-flight work is drained once everything is submitted (default: 1 second)
    #[serde(default = "default_drain_interval", with = "duration_serde")]
    pub drain_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            submit_pacing: default_submit_pacing(),
            drain_interval: default_drain_interval(),
        }
    }
}

/// Result persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Destination of the JSON result array (default: "./results.json")
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Minimum time between two periodic checkpoints (default: 5 minutes)
    #[serde(default = "default_checkpoint_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            interval: default_checkpoint_interval(),
        }
    }
}

/// Main configuration for a sweep run
///
/// Fields are organized into sub-configs:
/// - [`api`](ApiConfig) — lookup endpoint and request timeout
/// - [`proxy`](ProxyConfig) — quota accounting and validation probes
/// - [`retry`](RetryConfig) — per-subject retry budget and delays
/// - [`dispatch`](DispatchConfig) — worker count and pacing
/// - [`checkpoint`](CheckpointConfig) — output path and checkpoint cadence
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Proxy pool settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Checkpoint settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the dispatcher stall or never run
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.api.url).is_err() {
            return Err(Error::config("api.url", format!("not a URL: {}", self.api.url)));
        }
        if self.proxy.quota_per_window == 0 {
            return Err(Error::config(
                "proxy.quota_per_window",
                "quota must allow at least one request per window",
            ));
        }
        if self.proxy.window.is_zero() {
            return Err(Error::config("proxy.window", "window must be non-zero"));
        }
        if self.proxy.probe_concurrency == 0 {
            return Err(Error::config(
                "proxy.probe_concurrency",
                "probe concurrency must be at least 1",
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(Error::config(
                "retry.max_retries",
                "each subject needs at least one attempt",
            ));
        }
        if self.dispatch.workers == 0 {
            return Err(Error::config("dispatch.workers", "need at least one worker"));
        }
        if self.dispatch.drain_interval.is_zero() {
            return Err(Error::config(
                "dispatch.drain_interval",
                "drain interval must be non-zero",
            ));
        }
        Ok(())
    }
}

fn default_api_url() -> String {
    "https://notariat.ru/api/probate-cases".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_quota_per_window() -> u32 {
    150
}

fn default_window() -> Duration {
    Duration::from_secs(3600)
}

fn default_probe_url() -> String {
    "https://httpbin.org/ip".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_concurrency() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_rate_limit_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_server_error_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_unavailable_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_workers() -> usize {
    5
}

fn default_submit_pacing() -> Duration {
    Duration::from_secs(1)
}

fn default_drain_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./results.json")
}

fn default_checkpoint_interval() -> Duration {
    Duration::from_secs(300)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_match_documented_values() {
        let config = Config::default();
        config.validate().expect("defaults must validate");

        assert_eq!(config.proxy.quota_per_window, 150);
        assert_eq!(config.proxy.window, Duration::from_secs(3600));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.dispatch.workers, 5);
        assert_eq!(config.checkpoint.interval, Duration::from_secs(300));
        assert_eq!(config.api.request_timeout, Duration::from_secs(10));
        assert!(!config.retry.jitter);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{
            "proxy": { "quota_per_window": 2, "window": 60 },
            "dispatch": { "workers": 3 }
        }"#;

        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.proxy.quota_per_window, 2);
        assert_eq!(config.proxy.window, Duration::from_secs(60));
        assert_eq!(config.proxy.probe_concurrency, 10);
        assert_eq!(config.dispatch.workers, 3);
        assert_eq!(config.dispatch.submit_pacing, Duration::from_secs(1));
        assert_eq!(config.retry.server_error_delay, Duration::from_secs(30));
    }

    #[test]
    fn durations_serialize_as_whole_seconds() {
        let json = serde_json::to_value(RetryConfig::default()).expect("serialize failed");
        assert_eq!(json["rate_limit_delay"], 5);
        assert_eq!(json["server_error_delay"], 30);
        assert_eq!(json["unavailable_backoff"], 60);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.dispatch.workers = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("dispatch.workers")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_quota_and_zero_retries() {
        let mut config = Config::default();
        config.proxy.quota_per_window = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_api_url() {
        let mut config = Config::default();
        config.api.url = "not a url".to_string();

        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("api.url")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn from_json_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        std::fs::write(&path, r#"{ "retry": { "max_retries": 5 } }"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.retry.max_retries, 5);

        std::fs::write(&path, r#"{ "dispatch": { "workers": 0 } }"#).unwrap();
        assert!(Config::from_json_file(&path).is_err());
    }

    #[test]
    fn from_json_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");

        match Config::from_json_file(&missing) {
            Err(Error::Input { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected input error, got {other:?}"),
        }
    }
}
