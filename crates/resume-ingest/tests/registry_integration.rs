//! Decoder registry integration tests.
//!
//! A decoder registered at runtime contributes its MIME type, extension and
//! signature to detection and validation, and its output flows through the parser.

use async_trait::async_trait;
use resume_ingest::core::formats::MagicPattern;
use resume_ingest::plugins::{DecoderCapability, DecoderRegistry, Plugin};
use resume_ingest::{
    Confidence, DocumentParser, ErrorKind, IngestConfig, ParserError, ParserKind, RawContent, RawInput, Result,
    StructuralHints,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod helpers;
use helpers::*;

const RESUME_JSON_MIME: &str = "application/x-resume+json";

/// Decodes `{"resume": {...}}` documents by flattening their string values.
struct ResumeJsonDecoder {
    shut_down: AtomicBool,
}

impl ResumeJsonDecoder {
    fn new() -> Self {
        Self {
            shut_down: AtomicBool::new(false),
        }
    }
}

impl Plugin for ResumeJsonDecoder {
    fn name(&self) -> &str {
        "resume-json-decoder"
    }

    fn version(&self) -> String {
        "1.0.0".to_string()
    }

    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn description(&self) -> &str {
        "JSON Resume document"
    }
}

#[async_trait]
impl DecoderCapability for ResumeJsonDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        let value: serde_json::Value = serde_json::from_slice(content)
            .map_err(|e| ParserError::corrupted_with_source("Invalid resume JSON", e))?;
        let resume = value
            .get("resume")
            .and_then(|r| r.as_object())
            .ok_or_else(|| ParserError::parse("Missing 'resume' object"))?;

        let lines: Vec<String> = resume
            .values()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let mut raw = RawContent::from_text(lines.join("\n"));
        raw.structure = Some(StructuralHints {
            paragraphs: lines.len(),
            ..Default::default()
        });
        Ok(raw)
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[RESUME_JSON_MIME]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["rjson"]
    }

    fn magic_numbers(&self) -> Vec<MagicPattern> {
        vec![MagicPattern::prefix(b"{\"resume\"")]
    }
}

fn resume_json_registry() -> Arc<DecoderRegistry> {
    let registry = Arc::new(DecoderRegistry::new());
    registry
        .register(ParserKind::new("resume-json"), Arc::new(ResumeJsonDecoder::new()))
        .unwrap();
    registry
}

fn allowing_resume_json() -> IngestConfig {
    let mut config = fast_config();
    config.allowed_types.push(RESUME_JSON_MIME.to_string());
    config
}

const RESUME: &[u8] = br#"{"resume": {"name": "Jane Doe", "title": "Senior Rust Engineer"}}"#;

#[tokio::test]
async fn test_registered_decoder_parses_its_format() {
    let parser = DocumentParser::with_registry(allowing_resume_json(), resume_json_registry()).unwrap();

    let result = parser
        .parse(&RawInput::new(RESUME).with_filename("cv.rjson"))
        .await
        .unwrap();

    assert_eq!(result.detection.mime_type, RESUME_JSON_MIME);
    assert_eq!(result.detection.parser_kind, ParserKind::new("resume-json"));
    assert_eq!(result.detection.confidence, Confidence::High);
    assert_eq!(result.decoder, "resume-json-decoder");
    assert!(result.text.contains("Jane Doe"));
    assert!(result.text.contains("Senior Rust Engineer"));
    assert_eq!(result.structure.paragraphs, 2);
}

#[tokio::test]
async fn test_registered_signature_detected_without_filename() {
    let parser = DocumentParser::with_registry(allowing_resume_json(), resume_json_registry()).unwrap();

    let detection = parser.detect(&RawInput::new(RESUME)).unwrap();

    assert_eq!(detection.mime_type, RESUME_JSON_MIME);
    assert_eq!(detection.confidence, Confidence::High);
}

#[test]
fn test_allowed_type_must_be_known() {
    let err = DocumentParser::new(allowing_resume_json()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.message().contains(RESUME_JSON_MIME));

    assert!(DocumentParser::with_registry(allowing_resume_json(), resume_json_registry()).is_ok());
}

#[tokio::test]
async fn test_registered_type_still_subject_to_allow_list() {
    let parser = DocumentParser::with_registry(fast_config(), resume_json_registry()).unwrap();

    let err = parser
        .parse(&RawInput::new(RESUME).with_filename("cv.rjson"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_unregistered_kind_becomes_unsupported() {
    let registry = resume_json_registry();
    let parser = DocumentParser::with_registry(fast_config(), Arc::clone(&registry)).unwrap();
    let input = RawInput::new(b"Jane Doe\nRust engineer").with_filename("cv.txt");

    parser.parse(&input).await.unwrap();

    registry.unregister(&ParserKind::TEXT).unwrap();
    let err = parser.parse(&input).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(err.context().parser_kind, Some(ParserKind::TEXT));
}

#[test]
fn test_unregister_shuts_decoder_down() {
    let registry = DecoderRegistry::new_empty();
    let decoder = Arc::new(ResumeJsonDecoder::new());
    registry
        .register(ParserKind::new("resume-json"), Arc::clone(&decoder) as Arc<dyn DecoderCapability>)
        .unwrap();
    assert_eq!(registry.list(), vec!["resume-json-decoder".to_string()]);

    registry.unregister(&ParserKind::new("resume-json")).unwrap();

    assert!(decoder.shut_down.load(Ordering::SeqCst));
    assert!(registry.list().is_empty());
}

#[tokio::test]
async fn test_higher_priority_decoder_becomes_primary() {
    let registry = Arc::new(DecoderRegistry::new());
    let custom = Arc::new(
        ScriptedDecoder::new("custom-text", &["text/plain"], &["txt"])
            .with_priority(100)
            .with_text("custom output"),
    );
    registry.register(ParserKind::TEXT, Arc::clone(&custom) as Arc<dyn DecoderCapability>).unwrap();
    let parser = DocumentParser::with_registry(fast_config(), registry).unwrap();

    let result = parser
        .parse(&RawInput::new(b"Jane Doe").with_filename("cv.txt"))
        .await
        .unwrap();

    assert_eq!(result.decoder, "custom-text");
    assert_eq!(result.text, "custom output");
    assert_eq!(custom.calls(), 1);
}
