//! Error types for resume-ingest.
//!
//! Every failure that leaves the crate is a [`ParserError`]. The taxonomy is closed:
//! each variant maps to exactly one [`ErrorKind`], and every kind has a fixed machine
//! code, a severity and a default retry policy.
//!
//! - `Parse` - decoder failed on content it otherwise accepted
//! - `Validation` - input rejected before decoding (empty, disallowed type, spoofed content)
//! - `Timeout` - a decode attempt exceeded its deadline
//! - `UnsupportedFormat` - no supported type could be determined, or no decoder is registered
//! - `FileSize` - input larger than the configured or type-specific limit
//! - `Corrupted` - input is structurally broken for its declared format
//! - `Configuration` - invalid options or plugin declarations
//!
//! Errors carry two audiences: [`ParserError::context`] and the `source()` chain are for
//! developers and logs, while [`ParserError::user_message`] is a short sentence that is
//! safe to show to the person who uploaded the file.
//!
//! # Example
//!
//! ```rust
//! use resume_ingest::{ParserError, Result};
//!
//! fn check(content: &[u8]) -> Result<()> {
//!     if content.is_empty() {
//!         return Err(ParserError::validation("File is empty"));
//!     }
//!     Ok(())
//! }
//!
//! let err = check(b"").unwrap_err();
//! assert_eq!(err.code(), "VALIDATION_FAILED");
//! assert!(!err.is_retryable());
//! ```
use crate::core::formats::ParserKind;
use crate::utils::{format_limit, format_size};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `ParserError`.
pub type Result<T> = std::result::Result<T, ParserError>;

/// Shared, cloneable error source.
///
/// Sources are reference counted so a `ParserError` can be cloned into batch result
/// slots and aggregated error lists without losing the cause chain.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Validation,
    Timeout,
    UnsupportedFormat,
    FileSize,
    Corrupted,
    Configuration,
}

impl ErrorKind {
    /// Machine-readable error code.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::Parse => "PARSE_FAILED",
            ErrorKind::Validation => "VALIDATION_FAILED",
            ErrorKind::Timeout => "PARSE_TIMEOUT",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::FileSize => "FILE_SIZE_EXCEEDED",
            ErrorKind::Corrupted => "CORRUPTED_FILE",
            ErrorKind::Configuration => "INVALID_CONFIGURATION",
        }
    }

    pub const fn severity(self) -> Severity {
        match self {
            ErrorKind::Validation | ErrorKind::UnsupportedFormat | ErrorKind::FileSize => Severity::Low,
            ErrorKind::Timeout => Severity::Medium,
            ErrorKind::Parse | ErrorKind::Corrupted => Severity::High,
            ErrorKind::Configuration => Severity::Critical,
        }
    }

    /// Whether errors of this kind may be retried at all.
    ///
    /// Individual errors of a retryable kind can still opt out through
    /// [`ParserError::non_retryable`]; the reverse is not possible.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Parse | ErrorKind::Timeout | ErrorKind::Corrupted)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// How bad a failure is for the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured, developer-oriented context attached to every error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_kind: Option<ParserKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Input size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Limit that was exceeded, for `FileSize` errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Decode attempts made before the error surfaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_types: Vec<String>,
    /// Individual findings, e.g. every validation error or every failed strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Per-error retry opt-out. Only honored for retryable kinds.
    #[serde(skip)]
    pub retryable: Option<bool>,
}

/// Main error type for all resume-ingest operations.
#[derive(Debug, Clone, Error)]
pub enum ParserError {
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },

    #[error("Timeout: {message}")]
    Timeout {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },

    #[error("Unsupported format: {message}")]
    UnsupportedFormat {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },

    #[error("File size error: {message}")]
    FileSize {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },

    #[error("Corrupted file: {message}")]
    Corrupted {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        context: Box<ErrorContext>,
        #[source]
        source: Option<ErrorSource>,
    },
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    context: Box::default(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    context: Box::default(),
                    source: Some(Arc::new(source)),
                }
            }
        }
    };
}

impl ParserError {
    error_constructor!(parse, Parse);
    error_constructor!(validation, Validation);
    error_constructor!(timeout, Timeout);
    error_constructor!(unsupported_format, UnsupportedFormat);
    error_constructor!(file_size, FileSize);
    error_constructor!(corrupted, Corrupted);
    error_constructor!(configuration, Configuration);

    /// Input exceeds `max_size` bytes.
    pub fn file_too_large(size: u64, max_size: u64) -> Self {
        let mut err = Self::file_size(format!(
            "File size {} exceeds maximum of {}",
            format_size(size),
            format_limit(max_size)
        ));
        let ctx = err.context_mut();
        ctx.size = Some(size);
        ctx.max_size = Some(max_size);
        err
    }

    /// No supported type matched; lists what would have been accepted.
    pub fn unsupported_type<S: Into<String>>(detail: S, supported: Vec<String>) -> Self {
        let detail = detail.into();
        let mut err = Self::unsupported_format(format!("{}. Supported types: {}", detail, supported.join(", ")));
        err.context_mut().supported_types = supported;
        err
    }

    /// A decode attempt exceeded `limit`.
    pub fn deadline_exceeded(limit: Duration) -> Self {
        let mut err = Self::timeout(format!("Decoding did not finish within {}ms", limit.as_millis()));
        err.context_mut().elapsed_ms = Some(limit.as_millis() as u64);
        err
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ParserError::Parse { .. } => ErrorKind::Parse,
            ParserError::Validation { .. } => ErrorKind::Validation,
            ParserError::Timeout { .. } => ErrorKind::Timeout,
            ParserError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ParserError::FileSize { .. } => ErrorKind::FileSize,
            ParserError::Corrupted { .. } => ErrorKind::Corrupted,
            ParserError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn severity(&self) -> Severity {
        self.kind().severity()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable() && self.context().retryable.unwrap_or(true)
    }

    /// The developer-facing message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ParserError::Parse { message, .. }
            | ParserError::Validation { message, .. }
            | ParserError::Timeout { message, .. }
            | ParserError::UnsupportedFormat { message, .. }
            | ParserError::FileSize { message, .. }
            | ParserError::Corrupted { message, .. }
            | ParserError::Configuration { message, .. } => message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            ParserError::Parse { context, .. }
            | ParserError::Validation { context, .. }
            | ParserError::Timeout { context, .. }
            | ParserError::UnsupportedFormat { context, .. }
            | ParserError::FileSize { context, .. }
            | ParserError::Corrupted { context, .. }
            | ParserError::Configuration { context, .. } => context,
        }
    }

    pub fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            ParserError::Parse { context, .. }
            | ParserError::Validation { context, .. }
            | ParserError::Timeout { context, .. }
            | ParserError::UnsupportedFormat { context, .. }
            | ParserError::FileSize { context, .. }
            | ParserError::Corrupted { context, .. }
            | ParserError::Configuration { context, .. } => context,
        }
    }

    pub fn with_parser_kind(mut self, kind: ParserKind) -> Self {
        self.context_mut().parser_kind = Some(kind);
        self
    }

    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.context_mut().filename = Some(filename.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.context_mut().size = Some(size);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.context_mut().elapsed_ms = Some(elapsed.as_millis() as u64);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.context_mut().attempts = Some(attempts);
        self
    }

    pub fn with_detail<S: Into<String>>(mut self, detail: S) -> Self {
        self.context_mut().details.push(detail.into());
        self
    }

    /// Fill in call-level context without overwriting what an inner layer already set.
    pub fn with_call_context(mut self, kind: Option<&ParserKind>, filename: Option<&str>, size: u64) -> Self {
        let ctx = self.context_mut();
        if ctx.parser_kind.is_none() {
            ctx.parser_kind = kind.cloned();
        }
        if ctx.filename.is_none() {
            ctx.filename = filename.map(str::to_string);
        }
        if ctx.size.is_none() {
            ctx.size = Some(size);
        }
        self
    }

    /// Opt this particular error out of retries.
    pub fn non_retryable(mut self) -> Self {
        self.context_mut().retryable = Some(false);
        self
    }

    /// Short, sanitized sentence suitable for end users.
    ///
    /// Never includes source-error text or internal details beyond sizes and
    /// supported type names.
    pub fn user_message(&self) -> String {
        let ctx = self.context();
        match self.kind() {
            ErrorKind::Parse => {
                "We couldn't read the text in this document. Please try again or upload a different file.".to_string()
            }
            ErrorKind::Validation => match ctx.details.first() {
                Some(first) => format!("The file could not be accepted: {}.", first.trim_end_matches('.')),
                None => format!("The file could not be accepted: {}.", self.message().trim_end_matches('.')),
            },
            ErrorKind::Timeout => match ctx.elapsed_ms {
                Some(ms) => format!(
                    "Processing took too long ({:.1}s). Please try again with a smaller or simpler file.",
                    ms as f64 / 1000.0
                ),
                None => "Processing took too long. Please try again with a smaller or simpler file.".to_string(),
            },
            ErrorKind::UnsupportedFormat => {
                if ctx.supported_types.is_empty() {
                    "This file type is not supported.".to_string()
                } else {
                    format!(
                        "This file type is not supported. Supported types: {}.",
                        ctx.supported_types.join(", ")
                    )
                }
            }
            ErrorKind::FileSize => match (ctx.size, ctx.max_size) {
                (Some(size), Some(max)) => format!(
                    "File is too large ({}). Maximum allowed is {}.",
                    format_size(size),
                    format_limit(max)
                ),
                _ => "File is too large.".to_string(),
            },
            ErrorKind::Corrupted => {
                "The file appears to be damaged or incomplete. Please re-save it and upload it again.".to_string()
            }
            ErrorKind::Configuration => {
                "The document service is not configured correctly. Please contact support.".to_string()
            }
        }
    }

    /// Every message in the `source()` chain, outermost first.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }

    /// Structured report; includes the cause chain only in development builds.
    pub fn report(&self) -> ErrorReport {
        self.report_with_chain(cfg!(debug_assertions))
    }

    pub fn report_with_chain(&self, include_chain: bool) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            kind: self.kind(),
            severity: self.severity(),
            retryable: self.is_retryable(),
            message: self.message().to_string(),
            user_message: self.user_message(),
            context: self.context().clone(),
            cause_chain: include_chain.then(|| self.cause_chain()),
        }
    }
}

/// Serializable snapshot of an error for logs and API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub retryable: bool,
    pub message: String,
    pub user_message: String,
    pub context: ErrorContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_chain: Option<Vec<String>>,
}

impl From<std::io::Error> for ParserError {
    fn from(err: std::io::Error) -> Self {
        ParserError::parse_with_source(format!("I/O failure while decoding: {}", err), err)
    }
}

impl From<serde_json::Error> for ParserError {
    fn from(err: serde_json::Error) -> Self {
        ParserError::configuration_with_source(err.to_string(), err)
    }
}

impl From<toml::de::Error> for ParserError {
    fn from(err: toml::de::Error) -> Self {
        ParserError::configuration_with_source(err.to_string(), err)
    }
}

impl From<serde_yaml_ng::Error> for ParserError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ParserError::configuration_with_source(err.to_string(), err)
    }
}

impl From<tokio::time::error::Elapsed> for ParserError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ParserError::timeout_with_source("Operation deadline elapsed", err)
    }
}

impl From<tokio::task::JoinError> for ParserError {
    fn from(err: tokio::task::JoinError) -> Self {
        let message = if err.is_panic() {
            "Decoder task panicked".to_string()
        } else {
            "Decoder task was cancelled".to_string()
        };
        ParserError::parse_with_source(message, err)
    }
}
