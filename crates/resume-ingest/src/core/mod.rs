//! Core ingestion pipeline.
//!
//! - **Formats**: parser kinds, MIME constants and the magic-number catalog
//! - **Detection**: content-first type detection with consensus voting
//! - **Validation**: size, allow-list and signature checks
//! - **Parser**: the [`parser::DocumentParser`] entry point tying everything together
//! - **Batch** and **Progress**: bounded fan-out and throttled progress callbacks
//! - **Configuration**: the file-friendly [`config::IngestConfig`]

pub mod batch;
pub mod config;
pub mod detection;
pub mod formats;
pub mod parser;
pub mod progress;
pub mod validation;

pub use batch::{BatchCoordinator, BatchOptions, BatchOutcome};
pub use config::IngestConfig;
pub use detection::{DetectionOptions, TypeDetector};
pub use formats::{FormatCatalog, FormatSpec, MagicPattern, ParserKind};
pub use parser::DocumentParser;
pub use progress::{ProgressCallback, ProgressEvent, ProgressReporter, ProgressStage};
pub use validation::{ValidationOptions, Validator};
