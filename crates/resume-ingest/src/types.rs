use crate::core::formats::ParserKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Inputs
// ============================================================================

/// Untrusted document bytes plus an optional client-supplied filename.
///
/// The filename is only a hint; detection never trusts it over the content.
#[derive(Debug, Clone, Copy)]
pub struct RawInput<'a> {
    pub content: &'a [u8],
    pub filename: Option<&'a str>,
}

impl<'a> RawInput<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        Self {
            content,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: &'a str) -> Self {
        self.filename = Some(filename);
        self
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Owned counterpart of [`RawInput`] for work that outlives the caller's borrow,
/// such as batch processing on spawned tasks.
#[derive(Debug, Clone)]
pub struct OwnedInput {
    pub content: Arc<[u8]>,
    pub filename: Option<String>,
}

impl OwnedInput {
    pub fn new<B: Into<Arc<[u8]>>>(content: B) -> Self {
        Self {
            content: content.into(),
            filename: None,
        }
    }

    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn as_raw(&self) -> RawInput<'_> {
        RawInput {
            content: &self.content,
            filename: self.filename.as_deref(),
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Qualitative trust in a detection signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Which detection method produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    MagicNumber,
    ContentLibrary,
    Extension,
    Consensus,
}

impl DetectionMethod {
    /// Tie-break rank when votes and confidence are equal; higher wins.
    pub(crate) fn rank(self) -> u8 {
        match self {
            DetectionMethod::MagicNumber => 3,
            DetectionMethod::ContentLibrary => 2,
            DetectionMethod::Extension => 1,
            DetectionMethod::Consensus => 0,
        }
    }
}

/// One independent opinion about the input's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub method: DetectionMethod,
    pub mime_type: String,
    pub confidence: Confidence,
}

/// Outcome of type detection. Created fresh for every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub mime_type: String,
    pub parser_kind: ParserKind,
    pub confidence: Confidence,
    pub method: DetectionMethod,
    /// Every signal that was considered, in method order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<DetectionSignal>,
}

// ============================================================================
// Validation
// ============================================================================

/// Machine-readable reason behind a validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationFailure {
    Empty,
    TooLarge { size: u64, max_size: u64 },
    UnsupportedType { supported: Vec<String> },
    DisallowedType { mime_type: String },
    MagicMismatch { expected: String },
}

/// Structured result of [`crate::core::validation::Validator::validate`].
///
/// `valid` is true exactly when `errors` is empty. Warnings never block processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_type: Option<DetectionResult>,
    pub size: u64,
    /// One entry per error, in the same order.
    #[serde(default)]
    pub failures: Vec<ValidationFailure>,
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1 for top-level headings.
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHint {
    pub rows: usize,
    pub columns: usize,
}

/// Layout cues a decoder could recover, used downstream to segment résumé sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralHints {
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub paragraphs: usize,
    #[serde(default)]
    pub list_items: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableHint>,
}

impl StructuralHints {
    pub fn is_empty(&self) -> bool {
        self.headings.is_empty() && self.paragraphs == 0 && self.list_items.is_empty() && self.tables.is_empty()
    }
}

/// Document properties reported by the decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Creation timestamp as reported by the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph_count: Option<usize>,
    /// Decoder-specific extras.
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

/// What a decoder hands back before the crate assembles a [`ParseResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructuralHints>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RawContent {
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Best-effort output of a partial decode.
///
/// `expected_chars` is the decoder's estimate of how much text the intact document
/// would have produced; partial recovery compares the salvage against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Salvage {
    pub content: RawContent,
    pub expected_chars: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStatistics {
    pub characters: usize,
    pub words: usize,
    pub lines: usize,
}

/// Successful parse outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub text: String,
    pub structure: StructuralHints,
    pub metadata: DocumentMetadata,
    pub statistics: TextStatistics,
    pub warnings: Vec<String>,
    /// True when recovery salvaged less than the whole document.
    pub partial: bool,
    pub detection: DetectionResult,
    /// Name of the decoder that produced the text.
    pub decoder: String,
    /// Set when a fallback decoder had to be used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,
    pub attempts: u32,
    pub processing_time_ms: u64,
}

/// Cumulative counters for one parser instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParserStatistics {
    pub files_processed: u64,
    pub successes: u64,
    pub errors: u64,
    pub partial_results: u64,
    pub total_processing_time_ms: u64,
    pub average_processing_time_ms: f64,
}
