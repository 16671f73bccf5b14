//! Document parsing entry point.
//!
//! [`DocumentParser`] runs the whole pipeline for one input: validation (fail fast),
//! type detection, decoder resolution, recovery-wrapped decoding, then text cleanup,
//! structure inference and statistics.
//!
//! # Example
//!
//! ```rust,no_run
//! use resume_ingest::{DocumentParser, IngestConfig, RawInput};
//!
//! # async fn example() -> resume_ingest::Result<()> {
//! let parser = DocumentParser::new(IngestConfig::default())?;
//! let result = parser
//!     .parse(&RawInput::new(b"Jane Doe\nRust engineer").with_filename("cv.txt"))
//!     .await?;
//! println!("{} words", result.statistics.words);
//! # Ok(())
//! # }
//! ```

use crate::core::batch::{BatchCoordinator, BatchOutcome};
use crate::core::config::IngestConfig;
use crate::core::detection::{DetectionOptions, TypeDetector};
use crate::core::formats::ParserKind;
use crate::core::progress::{ProgressReporter, parse_stages};
use crate::core::validation::{ValidationOptions, Validator};
use crate::error::Result;
use crate::plugins::{DecoderRegistry, Plugin};
use crate::recovery::{CircuitState, Recovered, RecoveryEngine, RetryObserver};
use crate::text::{infer_structure, normalize_text, statistics};
use crate::types::{DetectionResult, OwnedInput, ParseResult, ParserStatistics, RawInput, StructuralHints, ValidationReport};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Global Tokio runtime for the synchronous wrappers.
///
/// Built on first use and shared by every `*_sync` call.
static GLOBAL_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create global Tokio runtime - system may be out of resources")
});

#[derive(Debug, Default)]
struct Counters {
    files_processed: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    partial_results: AtomicU64,
    total_processing_time_ms: AtomicU64,
}

/// Résumé document parser.
///
/// Clones share the decoder registry, circuit-breaker state and statistics, so a
/// parser can be handed to spawned tasks cheaply.
#[derive(Clone)]
pub struct DocumentParser {
    config: IngestConfig,
    detection: DetectionOptions,
    validation: ValidationOptions,
    registry: Arc<DecoderRegistry>,
    recovery: Arc<RecoveryEngine>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for DocumentParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentParser")
            .field("config", &self.config)
            .field("decoders", &self.registry.list())
            .finish()
    }
}

impl DocumentParser {
    /// Parser with its own registry holding the built-in decoders.
    ///
    /// # Errors
    ///
    /// `Configuration` when `config` fails [`IngestConfig::validate`].
    pub fn new(config: IngestConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(DecoderRegistry::new()))
    }

    /// Parser using a caller-provided registry.
    ///
    /// `allowed_types` is checked against the registry's catalog, so types contributed
    /// by registered decoders are accepted.
    pub fn with_registry(config: IngestConfig, registry: Arc<DecoderRegistry>) -> Result<Self> {
        config.validate_with_catalog(&registry.catalog())?;
        let recovery = RecoveryEngine::new(config.recovery_config());
        Ok(Self {
            detection: config.detection_options(),
            validation: config.validation_options(),
            config,
            registry,
            recovery: Arc::new(recovery),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Install an observer called before every decode retry.
    ///
    /// Replaces the recovery engine, so circuit-breaker state starts fresh.
    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        let engine = RecoveryEngine::new(self.config.recovery_config()).with_retry_observer(observer);
        self.recovery = Arc::new(engine);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DecoderRegistry> {
        &self.registry
    }

    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    /// Breaker state for `kind`; always closed when circuit breaking is disabled.
    pub fn circuit_state(&self, kind: &ParserKind) -> CircuitState {
        self.recovery.circuit_state(kind)
    }

    fn detector(&self) -> TypeDetector {
        TypeDetector::new(self.registry.catalog(), self.detection)
    }

    fn validator(&self) -> Validator {
        Validator::new(self.detector(), self.validation.clone())
    }

    /// Detect the type of `input` from its content and filename hint.
    #[tracing::instrument(skip(self, input), fields(size = input.size(), filename = input.filename))]
    pub fn detect(&self, input: &RawInput<'_>) -> Result<DetectionResult> {
        self.detector()
            .detect(input)
            .map_err(|err| err.with_call_context(None, input.filename, input.size()))
    }

    /// Validate `input` and report every finding without decoding.
    #[tracing::instrument(skip(self, input), fields(size = input.size(), filename = input.filename))]
    pub fn validate(&self, input: &RawInput<'_>) -> ValidationReport {
        self.validator().validate(input)
    }

    /// Parse one document.
    pub async fn parse(&self, input: &RawInput<'_>) -> Result<ParseResult> {
        self.parse_with_progress(input, &ProgressReporter::silent()).await
    }

    /// Parse one document, reporting the validating, detecting, decoding and
    /// finalizing stages through `progress`.
    #[tracing::instrument(
        skip(self, input, progress),
        fields(size = input.size(), filename = input.filename, parser_kind = tracing::field::Empty)
    )]
    pub async fn parse_with_progress(&self, input: &RawInput<'_>, progress: &ProgressReporter) -> Result<ParseResult> {
        let started = Instant::now();
        let outcome = self.run_pipeline(input, progress).await;
        let elapsed = started.elapsed();
        self.record(&outcome, elapsed);

        match outcome {
            Ok(mut result) => {
                result.processing_time_ms = elapsed.as_millis() as u64;
                tracing::debug!(
                    decoder = %result.decoder,
                    partial = result.partial,
                    attempts = result.attempts,
                    elapsed_ms = result.processing_time_ms,
                    "Parsed document"
                );
                Ok(result)
            }
            Err(err) => {
                let err = err
                    .with_call_context(None, input.filename, input.size())
                    .with_elapsed(elapsed);
                tracing::warn!(code = err.code(), error = %err, "Parse failed");
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, input: &RawInput<'_>, progress: &ProgressReporter) -> Result<ParseResult> {
        let progress = progress.clone().with_stages(parse_stages())?;

        let validating = progress.stage("validating")?;
        validating.update(0.0, "Validating input");
        let report = self.validator().ensure_valid(input)?;
        validating.finish("Input validated");

        let detecting = progress.stage("detecting")?;
        let detection = match report.detected_type.clone() {
            Some(detection) => detection,
            None => self.detector().detect(input)?,
        };
        tracing::Span::current().record("parser_kind", detection.parser_kind.as_str());
        detecting.finish(format!("Detected {}", detection.mime_type));

        let decoding = progress.stage("decoding")?;
        let handle = self
            .registry
            .create_decoder(&detection.parser_kind)
            .map_err(|err| err.with_call_context(Some(&detection.parser_kind), input.filename, input.size()))?;
        decoding.update(0.0, format!("Decoding with {}", handle.primary().name()));
        let recovered = self
            .recovery
            .decode(&handle, input.content)
            .await
            .map_err(|err| err.with_call_context(Some(&detection.parser_kind), input.filename, input.size()))?;
        decoding.finish(format!("Decoded by {}", recovered.decoder));

        let finalizing = progress.stage("finalizing")?;
        let result = assemble(detection, report, recovered);
        finalizing.finish("Parse complete");
        Ok(result)
    }

    /// Parse many documents with the configured concurrency and stop-on-error policy.
    ///
    /// Results keep input order.
    pub async fn parse_batch(&self, inputs: Vec<OwnedInput>) -> Result<BatchOutcome<ParseResult>> {
        self.run_batch(inputs, BatchCoordinator::new(self.config.batch_options()))
            .await
    }

    /// [`DocumentParser::parse_batch`] reporting completed documents through `progress`.
    pub async fn parse_batch_with_progress(
        &self,
        inputs: Vec<OwnedInput>,
        progress: ProgressReporter,
    ) -> Result<BatchOutcome<ParseResult>> {
        let coordinator = BatchCoordinator::new(self.config.batch_options()).with_progress(progress);
        self.run_batch(inputs, coordinator).await
    }

    async fn run_batch(
        &self,
        inputs: Vec<OwnedInput>,
        coordinator: BatchCoordinator,
    ) -> Result<BatchOutcome<ParseResult>> {
        let parser = self.clone();
        coordinator
            .process_all(inputs, move |_, input: OwnedInput| {
                let parser = parser.clone();
                async move { parser.parse(&input.as_raw()).await }
            })
            .await
    }

    /// Synchronous wrapper for [`DocumentParser::parse`].
    ///
    /// Must not be called from inside an async runtime.
    pub fn parse_sync(&self, input: &RawInput<'_>) -> Result<ParseResult> {
        GLOBAL_RUNTIME.block_on(self.parse(input))
    }

    /// Synchronous wrapper for [`DocumentParser::parse_batch`].
    pub fn parse_batch_sync(&self, inputs: Vec<OwnedInput>) -> Result<BatchOutcome<ParseResult>> {
        GLOBAL_RUNTIME.block_on(self.parse_batch(inputs))
    }

    /// Cumulative counters since construction or the last reset.
    pub fn statistics(&self) -> ParserStatistics {
        let files_processed = self.counters.files_processed.load(Ordering::Relaxed);
        let total_processing_time_ms = self.counters.total_processing_time_ms.load(Ordering::Relaxed);
        ParserStatistics {
            files_processed,
            successes: self.counters.successes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            partial_results: self.counters.partial_results.load(Ordering::Relaxed),
            total_processing_time_ms,
            average_processing_time_ms: if files_processed > 0 {
                total_processing_time_ms as f64 / files_processed as f64
            } else {
                0.0
            },
        }
    }

    pub fn reset_statistics(&self) {
        self.counters.files_processed.store(0, Ordering::Relaxed);
        self.counters.successes.store(0, Ordering::Relaxed);
        self.counters.errors.store(0, Ordering::Relaxed);
        self.counters.partial_results.store(0, Ordering::Relaxed);
        self.counters.total_processing_time_ms.store(0, Ordering::Relaxed);
    }

    fn record(&self, outcome: &Result<ParseResult>, elapsed: Duration) {
        let counters = &self.counters;
        counters.files_processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(result) => {
                counters.successes.fetch_add(1, Ordering::Relaxed);
                if result.partial {
                    counters.partial_results.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(_) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        counters
            .total_processing_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }
}

fn assemble(detection: DetectionResult, report: ValidationReport, recovered: Recovered) -> ParseResult {
    let Recovered {
        content,
        decoder,
        fallback_used,
        partial,
        attempts,
    } = recovered;

    let text = normalize_text(&content.text);
    let structure = merge_structure(content.structure, &text);

    let mut warnings = report.warnings;
    warnings.extend(content.warnings);

    ParseResult {
        statistics: statistics(&text),
        text,
        structure,
        metadata: content.metadata,
        warnings,
        partial,
        detection,
        decoder,
        fallback_used,
        attempts,
        processing_time_ms: 0,
    }
}

/// Decoder hints win; missing or table-only hints are completed from the text.
fn merge_structure(decoded: Option<StructuralHints>, text: &str) -> StructuralHints {
    match decoded {
        Some(hints) if !hints.is_empty() => {
            if hints.headings.is_empty() && hints.paragraphs == 0 && hints.list_items.is_empty() {
                let inferred = infer_structure(text);
                StructuralHints {
                    tables: hints.tables,
                    ..inferred
                }
            } else {
                hints
            }
        }
        _ => infer_structure(text),
    }
}
