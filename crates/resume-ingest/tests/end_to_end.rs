//! End-to-end parsing tests through [`DocumentParser`].
//!
//! Covers the acceptance scenarios for uploads: a well-formed document, an oversized
//! file, an unknown type, spoofed extensions, and real PDF, DOCX and RTF files.

use resume_ingest::plugins::DecoderRegistry;
use resume_ingest::{
    CircuitState, Confidence, DetectionMethod, DocumentParser, ErrorKind, IngestConfig, OwnedInput, ParserKind,
    RawInput,
};
use std::sync::Arc;
use std::time::Duration;

mod helpers;
use helpers::*;

fn mock_pdf_parser(decoder: Arc<ScriptedDecoder>, config: IngestConfig) -> DocumentParser {
    let registry = Arc::new(DecoderRegistry::new_empty());
    registry.register(ParserKind::PDF, decoder).unwrap();
    DocumentParser::with_registry(config, registry).unwrap()
}

#[tokio::test]
async fn test_valid_pdf_upload_parses() {
    let decoder = Arc::new(ScriptedDecoder::pdf("mock-pdf"));
    let config = IngestConfig {
        max_file_size: MB,
        ..fast_config()
    };
    let parser = mock_pdf_parser(Arc::clone(&decoder), config);

    let content = pdf_header_bytes(50);
    assert_eq!(content.len(), 50);
    let result = parser
        .parse(&RawInput::new(&content).with_filename("r.pdf"))
        .await
        .expect("valid PDF upload should parse");

    assert_eq!(result.detection.mime_type, "application/pdf");
    assert_eq!(result.detection.parser_kind, ParserKind::PDF);
    assert_eq!(result.detection.confidence, Confidence::High);
    assert!(
        result
            .detection
            .signals
            .iter()
            .any(|s| s.method == DetectionMethod::MagicNumber)
    );
    assert_eq!(result.decoder, "mock-pdf");
    assert_eq!(result.fallback_used, None);
    assert!(!result.partial);
    assert_eq!(result.attempts, 1);
    assert!(result.text.contains("Senior Rust Engineer"));
    assert_eq!(result.statistics.words, 6);
    assert_eq!(decoder.calls(), 1);
}

#[tokio::test]
async fn test_oversized_upload_rejected_before_decoding() {
    let decoder = Arc::new(ScriptedDecoder::pdf("mock-pdf"));
    let config = IngestConfig {
        max_file_size: MB,
        ..fast_config()
    };
    let parser = mock_pdf_parser(Arc::clone(&decoder), config);

    let content = vec![b'a'; 2 * MB as usize];
    let err = parser.parse(&RawInput::new(&content)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FileSize);
    let user_message = err.user_message();
    assert!(user_message.contains("2.0MB"), "got: {}", user_message);
    assert!(user_message.contains("1MB"), "got: {}", user_message);
    assert_eq!(err.context().size, Some(2 * MB));
    assert_eq!(err.context().max_size, Some(MB));
    assert_eq!(decoder.calls(), 0);
}

#[tokio::test]
async fn test_unknown_type_lists_supported_types() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let content = garbage(512);

    let err = parser
        .parse(&RawInput::new(&content).with_filename("file.xyz"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(
        err.context()
            .supported_types
            .iter()
            .any(|t| t == "application/pdf")
    );
    let user_message = err.user_message();
    assert!(user_message.contains("Supported types:"), "got: {}", user_message);
    assert!(user_message.contains("application/pdf"), "got: {}", user_message);
    assert_eq!(err.context().filename.as_deref(), Some("file.xyz"));
}

#[tokio::test]
async fn test_spoofed_extension_rejected() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let docx = build_docx("Jane Doe", &["Rust engineer"]);

    let err = parser
        .parse(&RawInput::new(&docx).with_filename("cv.pdf"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!err.context().details.is_empty());
}

#[tokio::test]
async fn test_executable_renamed_to_pdf_rejected() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let mut content = b"MZ\x90\x00\x03\x00\x00\x00".to_vec();
    content.extend(garbage(256));

    let err = parser
        .parse(&RawInput::new(&content).with_filename("resume.pdf"))
        .await
        .unwrap_err();

    assert!(
        matches!(err.kind(), ErrorKind::Validation | ErrorKind::UnsupportedFormat),
        "got: {:?}",
        err
    );
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let err = parser
        .parse(&RawInput::new(b"").with_filename("empty.pdf"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.user_message().contains("empty"));
}

#[tokio::test]
async fn test_plain_text_upload() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let content = "EXPERIENCE\r\nRust engineer at Example Corp\r\n\r\n\r\n\r\nEDUCATION\r\nTU Berlin";

    let result = parser
        .parse(&RawInput::new(content.as_bytes()).with_filename("cv.txt"))
        .await
        .unwrap();

    assert_eq!(result.detection.parser_kind, ParserKind::TEXT);
    assert!(!result.text.contains('\r'));
    assert!(!result.text.contains("\n\n\n"));
    assert!(result.text.starts_with("EXPERIENCE\nRust engineer"));
    assert!(
        result
            .structure
            .headings
            .iter()
            .any(|h| h.text == "EXPERIENCE")
    );
}

#[cfg(feature = "pdf")]
#[tokio::test]
async fn test_real_pdf_upload() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let pdf = build_pdf(&["Jane Doe", "Senior Rust Engineer"]);

    let result = parser
        .parse(&RawInput::new(&pdf).with_filename("cv.pdf"))
        .await
        .unwrap();

    assert_eq!(result.decoder, "pdf-decoder");
    assert!(result.text.contains("Jane Doe"));
    assert!(result.text.contains("Senior Rust Engineer"));
    assert_eq!(result.metadata.title.as_deref(), Some("Curriculum Vitae"));
    assert_eq!(result.metadata.author.as_deref(), Some("Jane Doe"));
    assert_eq!(result.metadata.page_count, Some(1));
}

#[cfg(feature = "office")]
#[tokio::test]
async fn test_real_docx_upload() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let docx = build_docx("Jane Doe", &["Rust engineer based in Berlin", "Open source maintainer"]);

    let result = parser
        .parse(&RawInput::new(&docx).with_filename("cv.docx"))
        .await
        .unwrap();

    assert_eq!(result.detection.parser_kind, ParserKind::DOCX);
    assert_eq!(result.detection.confidence, Confidence::High);
    assert_eq!(result.decoder, "docx-decoder");
    assert!(result.text.contains("Open source maintainer"));
    assert_eq!(result.structure.headings[0].text, "Jane Doe");
    assert_eq!(result.structure.headings[0].level, 1);
}

#[cfg(feature = "office")]
#[tokio::test]
async fn test_truncated_docx_recovered_by_fallback() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let docx = build_docx("Jane Doe", &["Rust engineer based in Berlin"]);
    let central = docx
        .windows(4)
        .position(|w| w == b"PK\x01\x02")
        .expect("package has a central directory");
    let truncated = &docx[..central];

    let result = parser
        .parse(&RawInput::new(truncated).with_filename("cv.docx"))
        .await
        .unwrap();

    assert_eq!(result.fallback_used.as_deref(), Some("docx-xml-scan"));
    assert!(result.text.contains("Rust engineer based in Berlin"));
    assert!(result.warnings.iter().any(|w| w.contains("fallback")));
    assert!(result.attempts > 1);
}

#[tokio::test]
async fn test_rtf_upload() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let rtf = build_rtf(&["Jane Doe", "Experienced engineer"]);

    let result = parser
        .parse(&RawInput::new(&rtf).with_filename("cv.rtf"))
        .await
        .unwrap();

    assert_eq!(result.detection.parser_kind, ParserKind::RTF);
    assert!(result.text.contains("Jane Doe"));
    assert!(result.text.contains("Experienced engineer"));
    assert!(!result.text.contains("Times New Roman"));
}

#[tokio::test]
async fn test_legacy_word_detected_but_unsupported() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let mut content = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    content.resize(1024, 0);

    let detection = parser
        .detect(&RawInput::new(&content).with_filename("cv.doc"))
        .unwrap();
    assert_eq!(detection.parser_kind, ParserKind::DOC);

    let err = parser
        .parse(&RawInput::new(&content).with_filename("cv.doc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(err.context().parser_kind, Some(ParserKind::DOC));
}

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let parser = DocumentParser::new(fast_config()).unwrap();
    let inputs = vec![
        OwnedInput::new(b"Jane Doe\nRust engineer".to_vec()).with_filename("a.txt"),
        OwnedInput::new(garbage(128)).with_filename("b.xyz"),
        OwnedInput::new(b"John Roe\nGo engineer".to_vec()).with_filename("c.txt"),
    ];

    let outcome = parser.parse_batch(inputs).await.unwrap();

    assert_eq!(outcome.total(), 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert!(outcome.results[0].as_ref().unwrap().text.starts_with("Jane Doe"));
    assert_eq!(
        outcome.results[1].as_ref().unwrap_err().kind(),
        ErrorKind::UnsupportedFormat
    );
    assert!(outcome.results[2].as_ref().unwrap().text.starts_with("John Roe"));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].0, 1);

    let stats = parser.statistics();
    assert_eq!(stats.files_processed, 3);
    assert_eq!(stats.successes, 2);
    assert_eq!(stats.errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_parse_leaves_breaker_closed() {
    let decoder = Arc::new(ScriptedDecoder::pdf("slow-pdf").with_delay(Duration::from_secs(10)));
    let config = IngestConfig {
        timeout_ms: 30_000,
        circuit_breaker_enabled: true,
        circuit_breaker_threshold: 1,
        ..fast_config()
    };
    let parser = mock_pdf_parser(Arc::clone(&decoder), config);
    let content = pdf_header_bytes(64);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        parser.parse(&RawInput::new(&content).with_filename("r.pdf")),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(decoder.calls(), 1);
    assert_eq!(parser.circuit_state(&ParserKind::PDF), CircuitState::Closed);
}

#[test]
fn test_parse_sync_outside_runtime() {
    let parser = DocumentParser::new(IngestConfig::default()).unwrap();
    let result = parser
        .parse_sync(&RawInput::new(b"Jane Doe\nRust engineer").with_filename("cv.txt"))
        .unwrap();
    assert_eq!(result.text, "Jane Doe\nRust engineer");
}
