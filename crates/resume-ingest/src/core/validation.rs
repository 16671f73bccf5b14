//! Input validation.
//!
//! Every rule runs independently so callers see the complete list of problems. The
//! only short circuit is empty input, which is rejected before detection runs.

use crate::core::detection::TypeDetector;
use crate::core::formats::{FormatSpec, extension_of};
use crate::error::{ParserError, Result};
use crate::types::{Confidence, DetectionMethod, DetectionResult, RawInput, ValidationFailure, ValidationReport};
use crate::utils::{format_limit, format_size};
use serde::{Deserialize, Serialize};

/// Limits and checks applied by [`Validator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOptions {
    pub max_size: u64,
    /// Accepted MIME types. Empty accepts everything the catalog knows.
    pub allowed_types: Vec<String>,
    pub check_magic_numbers: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            allowed_types: Vec::new(),
            check_magic_numbers: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    detector: TypeDetector,
    options: ValidationOptions,
}

impl Validator {
    pub fn new(detector: TypeDetector, options: ValidationOptions) -> Self {
        Self { detector, options }
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    pub fn detector(&self) -> &TypeDetector {
        &self.detector
    }

    /// Validate `input` and report every finding.
    pub fn validate(&self, input: &RawInput<'_>) -> ValidationReport {
        let mut report = ValidationReport {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            detected_type: None,
            size: input.size(),
            failures: Vec::new(),
        };

        if input.content.is_empty() {
            push_error(&mut report, "File is empty", ValidationFailure::Empty);
            report.valid = false;
            return report;
        }

        let size = report.size;
        if size > self.options.max_size {
            push_error(
                &mut report,
                format!(
                    "File size {} exceeds maximum of {}",
                    format_size(size),
                    format_limit(self.options.max_size)
                ),
                ValidationFailure::TooLarge {
                    size,
                    max_size: self.options.max_size,
                },
            );
        }

        match self.detector.detect(input) {
            Ok(detection) => {
                self.check_detected(input, &detection, &mut report);
                report.detected_type = Some(detection);
            }
            Err(err) => {
                let supported = err.context().supported_types.clone();
                push_error(&mut report, err.message(), ValidationFailure::UnsupportedType { supported });
            }
        }

        if self.options.check_magic_numbers {
            self.check_extension_magic(input, &mut report);
        }

        report.valid = report.errors.is_empty();
        if !report.valid {
            tracing::debug!(size, errors = ?report.errors, "Validation failed");
        }
        report
    }

    /// Validate and convert a failing report into the matching error.
    pub fn ensure_valid(&self, input: &RawInput<'_>) -> Result<ValidationReport> {
        let report = self.validate(input);
        match report.to_error() {
            Some(err) => {
                let kind = report.detected_type.as_ref().map(|d| &d.parser_kind);
                Err(err.with_call_context(kind, input.filename, report.size))
            }
            None => Ok(report),
        }
    }

    fn check_detected(&self, input: &RawInput<'_>, detection: &DetectionResult, report: &mut ValidationReport) {
        let catalog = self.detector.catalog();
        let Some(spec) = catalog.by_mime(&detection.mime_type) else {
            return;
        };
        let size = report.size;

        if let Some(type_max) = spec.max_size
            && type_max < self.options.max_size
            && size > type_max
            && size <= self.options.max_size
        {
            push_error(
                report,
                format!(
                    "File size {} exceeds the {} limit of {}",
                    format_size(size),
                    spec.description,
                    format_limit(type_max)
                ),
                ValidationFailure::TooLarge {
                    size,
                    max_size: type_max,
                },
            );
        }

        if !self.is_allowed(spec) {
            push_error(
                report,
                format!("File type {} is not allowed", spec.mime_type),
                ValidationFailure::DisallowedType {
                    mime_type: spec.mime_type.clone(),
                },
            );
        }

        let matched_by_magic = detection
            .signals
            .iter()
            .any(|s| s.method == DetectionMethod::MagicNumber && s.mime_type == spec.mime_type);
        if self.options.check_magic_numbers
            && spec.has_magic()
            && !matched_by_magic
            && !spec.matches_magic_prefix(input.content)
        {
            push_error(
                report,
                format!("File content does not match the {} signature", spec.description),
                ValidationFailure::MagicMismatch {
                    expected: spec.mime_type.clone(),
                },
            );
        }

        if detection.confidence == Confidence::Low {
            report.warnings.push(format!(
                "Detected type {} with low confidence",
                detection.mime_type
            ));
        }
    }

    /// The extension may only claim a binary format the bytes actually carry.
    fn check_extension_magic(&self, input: &RawInput<'_>, report: &mut ValidationReport) {
        let Some(filename) = input.filename else {
            return;
        };
        let Some(claimed) = self.detector.spec_for_filename(filename) else {
            return;
        };
        if !claimed.has_magic() {
            if let Some(detected) = &report.detected_type
                && !claimed.answers_to(&detected.mime_type)
            {
                let ext = extension_of(filename).unwrap_or_default();
                report.warnings.push(format!(
                    "File content is {} despite its .{} extension",
                    detected.mime_type, ext
                ));
            }
            return;
        }
        if claimed.matches_magic_prefix(input.content) {
            return;
        }
        let already_reported = report
            .failures
            .iter()
            .any(|f| matches!(f, ValidationFailure::MagicMismatch { expected } if *expected == claimed.mime_type));
        if already_reported {
            return;
        }
        let ext = extension_of(filename).unwrap_or_default();
        push_error(
            report,
            format!("File content does not match its .{} extension", ext),
            ValidationFailure::MagicMismatch {
                expected: claimed.mime_type.clone(),
            },
        );
    }

    fn is_allowed(&self, spec: &FormatSpec) -> bool {
        self.options.allowed_types.is_empty() || self.options.allowed_types.iter().any(|allowed| spec.answers_to(allowed))
    }
}

fn push_error<S: Into<String>>(report: &mut ValidationReport, message: S, failure: ValidationFailure) {
    report.errors.push(message.into());
    report.failures.push(failure);
}

impl ValidationReport {
    /// The error a failed validation surfaces as, or `None` when valid.
    ///
    /// Empty input maps to `Validation`, any size violation to `FileSize`, an
    /// undetectable type to `UnsupportedFormat`, and everything else to `Validation`
    /// listing every error.
    pub fn to_error(&self) -> Option<ParserError> {
        if self.errors.is_empty() {
            return None;
        }

        if self.failures.iter().any(|f| matches!(f, ValidationFailure::Empty)) {
            return Some(ParserError::validation("File is empty").with_detail("File is empty"));
        }

        let mut err = if let Some((size, max_size)) = self.failures.iter().find_map(|f| match f {
            ValidationFailure::TooLarge { size, max_size } => Some((*size, *max_size)),
            _ => None,
        }) {
            ParserError::file_too_large(size, max_size)
        } else if let Some((index, supported)) = self.failures.iter().enumerate().find_map(|(i, f)| match f {
            ValidationFailure::UnsupportedType { supported } => Some((i, supported.clone())),
            _ => None,
        }) {
            let detail = self.errors.get(index).cloned().unwrap_or_default();
            let detail = detail.split(". Supported types:").next().unwrap_or_default().to_string();
            ParserError::unsupported_type(detail, supported)
        } else {
            ParserError::validation(format!("Validation failed: {}", self.errors.join("; ")))
        };

        err.context_mut().details = self.errors.clone();
        Some(err)
    }
}
