//! Content-based type detection.
//!
//! Three independent methods each propose at most one candidate:
//!
//! 1. magic-number scan against the [`FormatCatalog`] signatures (confidence high)
//! 2. content sniffing with the `infer` crate, falling back to a printable-UTF-8 check
//!    that proposes plain text (confidence medium, or low for the text heuristic)
//! 3. the filename extension (confidence medium)
//!
//! A magic match decides the type on its own with high confidence, whatever the other
//! methods say. Without one, candidates are reconciled by voting.

use crate::core::formats::{FormatCatalog, FormatSpec, PLAIN_TEXT_MIME_TYPE, extension_of};
use crate::error::{ParserError, Result};
use crate::types::{Confidence, DetectionMethod, DetectionResult, DetectionSignal, RawInput};
use serde::{Deserialize, Serialize};

/// How many leading bytes the text heuristic inspects.
const TEXT_SNIFF_WINDOW: usize = 8 * 1024;

/// Maximum share of control characters tolerated in text.
const MAX_CONTROL_RATIO: f64 = 0.05;

/// Detection behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionOptions {
    /// Fail detection when no signature matches.
    #[serde(default)]
    pub require_magic_number: bool,
    /// Reject results whose final confidence is below `min_confidence`.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Confidence,
}

fn default_min_confidence() -> Confidence {
    Confidence::Low
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            require_magic_number: false,
            strict: false,
            min_confidence: default_min_confidence(),
        }
    }
}

/// Determines the real type of an input from its bytes and filename hint.
///
/// Stateless apart from its catalog and options; every call produces a fresh
/// [`DetectionResult`].
#[derive(Debug, Clone, Default)]
pub struct TypeDetector {
    catalog: FormatCatalog,
    options: DetectionOptions,
}

impl TypeDetector {
    pub fn new(catalog: FormatCatalog, options: DetectionOptions) -> Self {
        Self { catalog, options }
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    /// Detect the type of `input`.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` when no method yields a supported type, when
    /// `require_magic_number` is set and no signature matches, or in strict mode
    /// when the final confidence is below the configured minimum.
    pub fn detect(&self, input: &RawInput<'_>) -> Result<DetectionResult> {
        let signals = self.signals(input);

        // A signature match cannot be outvoted.
        if let Some(magic) = signals.iter().find(|s| s.method == DetectionMethod::MagicNumber) {
            let mime_type = magic.mime_type.clone();
            let disagreeing: Vec<&DetectionSignal> = signals.iter().filter(|s| s.mime_type != mime_type).collect();
            if !disagreeing.is_empty() {
                tracing::warn!(
                    mime_type = %mime_type,
                    disagreeing = ?disagreeing.iter().map(|s| s.mime_type.as_str()).collect::<Vec<_>>(),
                    "Signature match overrides disagreeing detection methods"
                );
            }
            let method = if signals.len() > 1 && !self.options.require_magic_number {
                DetectionMethod::Consensus
            } else {
                DetectionMethod::MagicNumber
            };
            return self.build_result(mime_type, Confidence::High, method, signals);
        }

        if self.options.require_magic_number {
            return Err(self.unsupported("No known magic number matched the content", input));
        }

        let Some((mime_type, confidence, method)) = reconcile(&signals) else {
            return Err(self.unsupported("Could not determine file type", input));
        };

        if self.options.strict && confidence < self.options.min_confidence {
            tracing::debug!(
                mime_type = %mime_type,
                ?confidence,
                min_confidence = ?self.options.min_confidence,
                "Rejecting low-confidence detection in strict mode"
            );
            let mut err = self.unsupported(
                format!(
                    "Detected type {} with {:?} confidence, below the required {:?}",
                    mime_type, confidence, self.options.min_confidence
                ),
                input,
            );
            err.context_mut().details.push(format!("method: {:?}", method));
            return Err(err);
        }

        self.build_result(mime_type, confidence, method, signals)
    }

    /// Every candidate the individual methods propose, in method order.
    pub fn signals(&self, input: &RawInput<'_>) -> Vec<DetectionSignal> {
        let mut signals = Vec::with_capacity(3);
        if let Some(signal) = self.detect_magic(input.content) {
            signals.push(signal);
        }
        if let Some(signal) = self.detect_content(input.content) {
            signals.push(signal);
        }
        if let Some(signal) = input.filename.and_then(|name| self.detect_extension(name)) {
            signals.push(signal);
        }
        signals
    }

    pub fn detect_magic(&self, content: &[u8]) -> Option<DetectionSignal> {
        self.catalog.match_magic(content).map(|spec| DetectionSignal {
            method: DetectionMethod::MagicNumber,
            mime_type: spec.mime_type.clone(),
            confidence: Confidence::High,
        })
    }

    /// Generic sniffing; only supported types are accepted.
    pub fn detect_content(&self, content: &[u8]) -> Option<DetectionSignal> {
        if let Some(kind) = infer::get(content) {
            return match self.catalog.by_mime(kind.mime_type()) {
                Some(spec) => Some(DetectionSignal {
                    method: DetectionMethod::ContentLibrary,
                    mime_type: spec.mime_type.clone(),
                    confidence: Confidence::Medium,
                }),
                None => {
                    tracing::debug!(sniffed = kind.mime_type(), "Content sniffer found an unsupported type");
                    None
                }
            };
        }

        if looks_like_text(content) {
            return self.catalog.by_mime(PLAIN_TEXT_MIME_TYPE).map(|spec| DetectionSignal {
                method: DetectionMethod::ContentLibrary,
                mime_type: spec.mime_type.clone(),
                confidence: Confidence::Low,
            });
        }

        None
    }

    pub fn detect_extension(&self, filename: &str) -> Option<DetectionSignal> {
        let spec = self.spec_for_filename(filename)?;
        Some(DetectionSignal {
            method: DetectionMethod::Extension,
            mime_type: spec.mime_type.clone(),
            confidence: Confidence::Medium,
        })
    }

    /// Catalog entry the filename's extension claims, if any.
    ///
    /// Falls back to `mime_guess` for extensions the catalog does not list directly.
    pub fn spec_for_filename(&self, filename: &str) -> Option<&FormatSpec> {
        let ext = extension_of(filename)?;
        if let Some(spec) = self.catalog.by_extension(&ext) {
            return Some(spec);
        }
        mime_guess::from_ext(&ext)
            .iter()
            .find_map(|guess| self.catalog.by_mime(guess.essence_str()))
    }

    fn build_result(
        &self,
        mime_type: String,
        confidence: Confidence,
        method: DetectionMethod,
        signals: Vec<DetectionSignal>,
    ) -> Result<DetectionResult> {
        let spec = self.catalog.by_mime(&mime_type).ok_or_else(|| {
            ParserError::unsupported_type(
                format!("Type {} is not in the format catalog", mime_type),
                self.catalog.supported_mime_types(),
            )
        })?;
        Ok(DetectionResult {
            mime_type: spec.mime_type.clone(),
            parser_kind: spec.kind.clone(),
            confidence,
            method,
            signals,
        })
    }

    fn unsupported<S: Into<String>>(&self, detail: S, input: &RawInput<'_>) -> ParserError {
        let mut err = ParserError::unsupported_type(detail, self.catalog.supported_mime_types()).with_size(input.size());
        if let Some(name) = input.filename {
            err = err.with_filename(name);
            if let Some(ext) = extension_of(name) {
                err = err.with_detail(format!("extension: .{}", ext));
            }
        }
        err
    }
}

/// Group candidates by MIME type and pick the winner.
///
/// Most votes wins; ties go to the group holding the highest-confidence candidate and
/// then to the best method rank. Two or more agreeing methods raise confidence to high.
fn reconcile(signals: &[DetectionSignal]) -> Option<(String, Confidence, DetectionMethod)> {
    struct Group<'a> {
        mime_type: &'a str,
        votes: usize,
        best_confidence: Confidence,
        best_rank: u8,
        best_method: DetectionMethod,
    }

    let mut groups: Vec<Group<'_>> = Vec::new();
    for signal in signals {
        let mime = signal.mime_type.as_str();
        match groups.iter_mut().find(|g| g.mime_type == mime) {
            Some(group) => {
                group.votes += 1;
                group.best_confidence = group.best_confidence.max(signal.confidence);
                if signal.method.rank() > group.best_rank {
                    group.best_rank = signal.method.rank();
                    group.best_method = signal.method;
                }
            }
            None => groups.push(Group {
                mime_type: mime,
                votes: 1,
                best_confidence: signal.confidence,
                best_rank: signal.method.rank(),
                best_method: signal.method,
            }),
        }
    }

    let winner = groups
        .iter()
        .max_by(|a, b| {
            a.votes
                .cmp(&b.votes)
                .then(a.best_confidence.cmp(&b.best_confidence))
                .then(a.best_rank.cmp(&b.best_rank))
        })?;

    let confidence = if winner.votes >= 2 {
        Confidence::High
    } else {
        winner.best_confidence
    };
    let method = if signals.len() > 1 {
        DetectionMethod::Consensus
    } else {
        winner.best_method
    };

    if groups.len() > 1 {
        tracing::debug!(
            winner = winner.mime_type,
            candidates = groups.len(),
            "Detection methods disagreed, resolved by vote"
        );
    }

    Some((winner.mime_type.to_string(), confidence, method))
}

/// Printable UTF-8 heuristic over the first few kilobytes.
fn looks_like_text(content: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }
    let window = &content[..content.len().min(TEXT_SNIFF_WINDOW)];
    let text = match std::str::from_utf8(window) {
        Ok(text) => text,
        // A multi-byte sequence cut by the window edge is still text.
        Err(err) if err.error_len().is_none() => match std::str::from_utf8(&window[..err.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    let mut total = 0usize;
    let mut control = 0usize;
    for ch in text.chars() {
        total += 1;
        if ch.is_control() && !matches!(ch, '\n' | '\r' | '\t' | '\u{0C}') {
            control += 1;
        }
    }
    total > 0 && (control as f64 / total as f64) <= MAX_CONTROL_RATIO
}
