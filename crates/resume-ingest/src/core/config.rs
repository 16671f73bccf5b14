//! Configuration loading and management.
//!
//! [`IngestConfig`] is the flat, file-friendly configuration surface. Components take
//! typed option structs derived from it ([`IngestConfig::validation_options`] and
//! friends) so they never see settings they do not use.

use crate::core::batch::BatchOptions;
use crate::core::detection::DetectionOptions;
use crate::core::formats::{
    DOCX_MIME_TYPE, FormatCatalog, LEGACY_WORD_MIME_TYPE, PDF_MIME_TYPE, PLAIN_TEXT_MIME_TYPE, RTF_MIME_TYPE,
};
use crate::core::validation::ValidationOptions;
use crate::error::{ParserError, Result};
use crate::recovery::{CircuitBreakerConfig, PartialRecoveryConfig, RecoveryConfig, RetryPolicy};
use crate::types::Confidence;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name looked up by [`IngestConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "resume-ingest.toml";

/// Main ingestion configuration.
///
/// Every field has a default, so a configuration file only needs the settings it
/// changes.
///
/// # Example
///
/// ```rust
/// use resume_ingest::IngestConfig;
///
/// let config = IngestConfig {
///     max_file_size: 1024 * 1024,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Largest accepted input, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Deadline for a single decode attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum decode attempts per strategy, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Master switch for retries and fallback decoders.
    #[serde(default = "default_true")]
    pub enable_recovery: bool,

    /// Try fallback decoders when the primary fails. Ignored without `enable_recovery`.
    #[serde(default = "default_true")]
    pub enable_degradation: bool,

    #[serde(default = "default_true")]
    pub allow_partial_recovery: bool,

    /// Minimum salvaged share of the expected text, 0..=1.
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f64,

    /// Minimum salvaged characters.
    #[serde(default = "default_partial_min_chars")]
    pub partial_min_chars: usize,

    #[serde(default)]
    pub circuit_breaker_enabled: bool,

    /// Consecutive failures that open a breaker.
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    #[serde(default = "default_circuit_breaker_reset_ms")]
    pub circuit_breaker_reset_ms: u64,

    /// Consecutive half-open successes that close a breaker.
    #[serde(default = "default_circuit_breaker_success_threshold")]
    pub circuit_breaker_success_threshold: u32,

    #[serde(default = "default_circuit_breaker_monitor_window_ms")]
    pub circuit_breaker_monitor_window_ms: u64,

    /// Accepted MIME types.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,

    #[serde(default = "default_true")]
    pub check_magic_numbers: bool,

    #[serde(default)]
    pub require_magic_number: bool,

    #[serde(default)]
    pub strict_detection: bool,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: Confidence,

    /// Batch window size.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub stop_on_error: bool,

    /// Minimum time between two delivered progress updates.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_retry_multiplier() -> f64 {
    2.0
}
fn default_retry_max_delay_ms() -> u64 {
    10_000
}
fn default_partial_threshold() -> f64 {
    0.3
}
fn default_partial_min_chars() -> usize {
    50
}
fn default_circuit_breaker_threshold() -> u32 {
    5
}
fn default_circuit_breaker_reset_ms() -> u64 {
    60_000
}
fn default_circuit_breaker_success_threshold() -> u32 {
    2
}
fn default_circuit_breaker_monitor_window_ms() -> u64 {
    120_000
}
fn default_allowed_types() -> Vec<String> {
    [
        PDF_MIME_TYPE,
        DOCX_MIME_TYPE,
        LEGACY_WORD_MIME_TYPE,
        RTF_MIME_TYPE,
        PLAIN_TEXT_MIME_TYPE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_min_confidence() -> Confidence {
    Confidence::Low
}
fn default_concurrency() -> usize {
    3
}
fn default_progress_interval_ms() -> u64 {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            enable_recovery: true,
            enable_degradation: true,
            allow_partial_recovery: true,
            partial_threshold: default_partial_threshold(),
            partial_min_chars: default_partial_min_chars(),
            circuit_breaker_enabled: false,
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_reset_ms: default_circuit_breaker_reset_ms(),
            circuit_breaker_success_threshold: default_circuit_breaker_success_threshold(),
            circuit_breaker_monitor_window_ms: default_circuit_breaker_monitor_window_ms(),
            allowed_types: default_allowed_types(),
            check_magic_numbers: true,
            require_magic_number: false,
            strict_detection: false,
            min_confidence: default_min_confidence(),
            concurrency: default_concurrency(),
            stop_on_error: false,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::Configuration` if the file cannot be read or is invalid TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config(path)?;
        toml::from_str(&content).map_err(|e| {
            ParserError::configuration_with_source(format!("Invalid TOML in {}", path.display()), e)
        })
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config(path)?;
        serde_yaml_ng::from_str(&content).map_err(|e| {
            ParserError::configuration_with_source(format!("Invalid YAML in {}", path.display()), e)
        })
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_config(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ParserError::configuration_with_source(format!("Invalid JSON in {}", path.display()), e)
        })
    }

    /// Load configuration, choosing the format from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("toml") => Self::from_toml_file(path),
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            other => Err(ParserError::configuration(format!(
                "Unsupported config file format '{}': expected .toml, .yaml, .yml or .json",
                other.unwrap_or("")
            ))),
        }
    }

    /// Discover configuration file in parent directories.
    ///
    /// Searches for `resume-ingest.toml` in the current directory and its parents.
    pub fn discover() -> Result<Option<Self>> {
        let current = std::env::current_dir()
            .map_err(|e| ParserError::configuration_with_source("Cannot determine current directory", e))?;
        Self::discover_from(&current)
    }

    /// Like [`IngestConfig::discover`], starting at `start`.
    pub fn discover_from(start: &Path) -> Result<Option<Self>> {
        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Discovered configuration file");
                return Ok(Some(Self::from_toml_file(candidate)?));
            }
        }
        Ok(None)
    }

    /// Reject impossible settings, checking allowed types against the built-in formats.
    pub fn validate(&self) -> Result<()> {
        self.validate_with_catalog(&FormatCatalog::builtin())
    }

    /// Reject impossible settings, checking allowed types against `catalog`.
    pub fn validate_with_catalog(&self, catalog: &FormatCatalog) -> Result<()> {
        let mut problems = Vec::new();

        if self.max_file_size == 0 {
            problems.push("max_file_size must be greater than zero".to_string());
        }
        if self.timeout_ms == 0 {
            problems.push("timeout_ms must be greater than zero".to_string());
        }
        if self.retry_attempts == 0 {
            problems.push("retry_attempts must be at least 1".to_string());
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            problems.push(format!("retry_multiplier must be >= 1.0, got {}", self.retry_multiplier));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            problems.push("retry_max_delay_ms must not be smaller than retry_base_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.partial_threshold) {
            problems.push(format!(
                "partial_threshold must be between 0 and 1, got {}",
                self.partial_threshold
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            problems.push("circuit_breaker_threshold must be at least 1".to_string());
        }
        if self.circuit_breaker_success_threshold == 0 {
            problems.push("circuit_breaker_success_threshold must be at least 1".to_string());
        }
        if self.circuit_breaker_reset_ms == 0 {
            problems.push("circuit_breaker_reset_ms must be greater than zero".to_string());
        }
        if self.concurrency == 0 {
            problems.push("concurrency must be at least 1".to_string());
        }
        if self.allowed_types.is_empty() {
            problems.push("allowed_types must not be empty".to_string());
        }
        for mime_type in &self.allowed_types {
            if !catalog.is_supported(mime_type) {
                problems.push(format!("allowed_types contains unknown MIME type '{}'", mime_type));
            }
        }

        if problems.is_empty() {
            return Ok(());
        }
        let mut err = ParserError::configuration(format!("Invalid configuration: {}", problems.join("; ")));
        err.context_mut().details = problems;
        Err(err)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn detection_options(&self) -> DetectionOptions {
        DetectionOptions {
            require_magic_number: self.require_magic_number,
            strict: self.strict_detection,
            min_confidence: self.min_confidence,
        }
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            max_size: self.max_file_size,
            allowed_types: self.allowed_types.clone(),
            check_magic_numbers: self.check_magic_numbers,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            timeout: self.timeout(),
            enable_retry: self.enable_recovery,
            retry: self.retry_policy(),
            partial: PartialRecoveryConfig {
                enabled: self.allow_partial_recovery,
                threshold: self.partial_threshold,
                min_chars: self.partial_min_chars,
            },
            circuit_breaker: self.circuit_breaker_enabled.then(|| CircuitBreakerConfig {
                failure_threshold: self.circuit_breaker_threshold,
                reset_timeout: Duration::from_millis(self.circuit_breaker_reset_ms),
                success_threshold: self.circuit_breaker_success_threshold,
                monitor_window: Duration::from_millis(self.circuit_breaker_monitor_window_ms),
            }),
            enable_degradation: self.enable_recovery && self.enable_degradation,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            stop_on_error: self.stop_on_error,
        }
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ParserError::configuration_with_source(format!("Failed to read config file {}", path.display()), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.concurrency, 3);
        assert!(!config.circuit_breaker_enabled);
        assert_eq!(config.allowed_types.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resume-ingest.toml");
        fs::write(
            &path,
            r#"
max_file_size = 1048576
retry_attempts = 2
circuit_breaker_enabled = true
allowed_types = ["application/pdf"]
        "#,
        )
        .unwrap();

        let config = IngestConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.max_file_size, 1_048_576);
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.allowed_types, vec!["application/pdf"]);
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.recovery_config().circuit_breaker.is_some());
    }

    #[test]
    fn test_from_file_dispatches_on_extension() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("config.yml");
        fs::write(&yaml, "timeout_ms: 5000\nstop_on_error: true\n").unwrap();
        let json = dir.path().join("config.json");
        fs::write(&json, r#"{"concurrency": 8, "min_confidence": "high"}"#).unwrap();

        let from_yaml = IngestConfig::from_file(&yaml).unwrap();
        assert_eq!(from_yaml.timeout_ms, 5000);
        assert!(from_yaml.batch_options().stop_on_error);

        let from_json = IngestConfig::from_file(&json).unwrap();
        assert_eq!(from_json.concurrency, 8);
        assert_eq!(from_json.detection_options().min_confidence, Confidence::High);

        let err = IngestConfig::from_file(dir.path().join("config.ini")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "max_file_size = \"lots\"").unwrap();
        let err = IngestConfig::from_toml_file(&path).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
        assert!(err.cause_chain().len() >= 1);
    }

    #[test]
    fn test_discover_from_nested_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "concurrency = 9\n").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = IngestConfig::discover_from(&nested).unwrap();
        assert_eq!(config.map(|c| c.concurrency), Some(9));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let config = IngestConfig {
            timeout_ms: 0,
            partial_threshold: 1.5,
            concurrency: 0,
            allowed_types: vec!["application/x-unknown".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.context().details.len(), 4);
    }

    #[test]
    fn test_recovery_switch_disables_retry_and_degradation() {
        let config = IngestConfig {
            enable_recovery: false,
            ..Default::default()
        };
        let recovery = config.recovery_config();
        assert!(!recovery.enable_retry);
        assert!(!recovery.enable_degradation);
        assert!(recovery.partial.enabled);
        assert_eq!(recovery.timeout, Duration::from_secs(30));
    }
}
