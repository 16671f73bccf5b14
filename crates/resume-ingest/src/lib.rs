//! Resume Ingest - resilient document ingestion for résumé uploads.
//!
//! Given untrusted bytes that claim to be a résumé, the crate determines the real file
//! type from the content, validates it, and extracts plain text plus structural hints
//! through a format-specific decoder, surviving timeouts, corrupt files and flaky
//! decoders along the way.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resume_ingest::{DocumentParser, IngestConfig, RawInput};
//!
//! # fn main() -> resume_ingest::Result<()> {
//! let parser = DocumentParser::new(IngestConfig::default())?;
//! let bytes = b"JANE DOE\n\nEXPERIENCE\nRust engineer";
//! let result = parser.parse_sync(&RawInput::new(bytes).with_filename("cv.txt"))?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Error taxonomy** (`error`): one typed error per failure class, with severity,
//!   retryability and a user-safe message
//! - **Core** (`core`): detection, validation, the parser entry point, batching,
//!   progress and configuration
//! - **Plugins** (`plugins`): the `DecoderCapability` trait and the decoder registry
//! - **Recovery** (`recovery`): timeouts, retries, graceful degradation, partial
//!   recovery and circuit breaking
//! - **Decoders** (`decoders`): built-in plain text, RTF, PDF and DOCX decoders
//!
//! # Extending
//!
//! New formats are added by implementing [`plugins::DecoderCapability`] (together with
//! [`resume_ingest::plugins::Plugin`](plugins::Plugin)) and registering it with a
//! [`DecoderRegistry`]. Decoders return a [`resume_ingest::types::RawContent`](types::RawContent);
//! detection picks up their declared MIME types, extensions and magic numbers.

#![deny(unsafe_code)]

pub mod core;
pub mod decoders;
pub mod error;
pub mod plugins;
pub mod recovery;
pub mod text;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, ErrorReport, ParserError, Result, Severity};
pub use types::*;

pub use core::batch::{BatchCoordinator, BatchOptions, BatchOutcome};
pub use core::config::IngestConfig;
pub use core::detection::{DetectionOptions, TypeDetector};
pub use core::formats::{
    DOCX_MIME_TYPE, FormatCatalog, LEGACY_WORD_MIME_TYPE, PDF_MIME_TYPE, PLAIN_TEXT_MIME_TYPE, ParserKind,
    RTF_MIME_TYPE,
};
pub use core::parser::DocumentParser;
pub use core::progress::{ProgressEvent, ProgressReporter};
pub use core::validation::{ValidationOptions, Validator};

pub use plugins::{DecoderCapability, DecoderRegistry, Plugin};
pub use recovery::{CircuitBreakerConfig, CircuitState, RecoveryConfig, RecoveryEngine, RetryPolicy};
