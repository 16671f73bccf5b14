//! Content-based type detection integration tests.
//!
//! The client-supplied filename is only a hint: a binary signature outweighs a disagreeing extension.

use resume_ingest::plugins::DecoderRegistry;
use resume_ingest::{
    Confidence, DOCX_MIME_TYPE, DetectionMethod, DocumentParser, ErrorKind, IngestConfig, PDF_MIME_TYPE,
    PLAIN_TEXT_MIME_TYPE, ParserKind, RTF_MIME_TYPE, RawInput,
};
use std::sync::Arc;

mod helpers;
use helpers::*;

fn parser() -> DocumentParser {
    DocumentParser::new(IngestConfig::default()).unwrap()
}

const CVX_MIME: &str = "application/x-cvx";

/// Parser whose registry also knows a text-like format introduced by `CVX1`.
fn parser_with_cvx() -> DocumentParser {
    let registry = Arc::new(DecoderRegistry::new());
    registry
        .register(
            ParserKind::new("cvx"),
            Arc::new(ScriptedDecoder::new("cvx-decoder", &[CVX_MIME], &["cvx"]).with_magic(b"CVX1")),
        )
        .unwrap();
    let mut config = IngestConfig::default();
    config.allowed_types.push(CVX_MIME.to_string());
    DocumentParser::with_registry(config, registry).unwrap()
}

#[test]
fn test_pdf_signature_wins_over_any_filename() {
    let parser = parser();
    let content = pdf_header_bytes(128);
    let filenames = [
        None,
        Some("cv.pdf"),
        Some("cv.docx"),
        Some("cv.rtf"),
        Some("cv.txt"),
        Some("cv.xyz"),
        Some("cv"),
    ];

    for filename in filenames {
        let mut input = RawInput::new(&content);
        if let Some(name) = filename {
            input = input.with_filename(name);
        }
        let detection = parser.detect(&input).unwrap();
        assert_eq!(detection.mime_type, PDF_MIME_TYPE, "named {:?}", filename);
        assert_eq!(detection.confidence, Confidence::High);
    }
}

#[test]
fn test_signature_beats_disagreeing_extension() {
    let parser = parser();
    let fixtures: Vec<(Vec<u8>, &str)> = vec![
        (build_docx("Jane Doe", &["Rust engineer"]), DOCX_MIME_TYPE),
        (build_rtf(&["Jane Doe"]), RTF_MIME_TYPE),
    ];

    for (content, expected) in &fixtures {
        let detection = parser
            .detect(&RawInput::new(content).with_filename("cv.pdf"))
            .unwrap();
        assert_eq!(detection.mime_type, *expected);
        assert_eq!(detection.confidence, Confidence::High);
        assert!(
            detection
                .signals
                .iter()
                .any(|s| s.method == DetectionMethod::MagicNumber && s.mime_type == *expected)
        );
    }
}

#[test]
fn test_plain_text_confidence_depends_on_agreement() {
    let parser = parser();
    let content = b"Jane Doe\nSenior Rust Engineer\njane@example.com";

    let alone = parser.detect(&RawInput::new(content)).unwrap();
    assert_eq!(alone.mime_type, PLAIN_TEXT_MIME_TYPE);
    assert_eq!(alone.parser_kind, ParserKind::TEXT);
    assert_eq!(alone.confidence, Confidence::Low);
    assert_eq!(alone.method, DetectionMethod::ContentLibrary);

    let agreed = parser.detect(&RawInput::new(content).with_filename("cv.txt")).unwrap();
    assert_eq!(agreed.mime_type, PLAIN_TEXT_MIME_TYPE);
    assert_eq!(agreed.confidence, Confidence::High);
    assert_eq!(agreed.method, DetectionMethod::Consensus);
    assert_eq!(agreed.signals.len(), 2);
}

#[test]
fn test_extension_is_last_resort() {
    let parser = parser();
    let content = garbage(64);

    let detection = parser
        .detect(&RawInput::new(&content).with_filename("cv.pdf"))
        .unwrap();
    assert_eq!(detection.mime_type, PDF_MIME_TYPE);
    assert_eq!(detection.method, DetectionMethod::Extension);
    assert_eq!(detection.confidence, Confidence::Medium);
}

#[test]
fn test_unrecognized_content_is_unsupported() {
    let parser = parser();
    let content = garbage(64);

    let err = parser.detect(&RawInput::new(&content)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(!err.context().supported_types.is_empty());
}

#[test]
fn test_zip_without_word_part_is_not_docx() {
    use std::io::{Cursor, Write};

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file("photos/portrait.bin", options).unwrap();
    zip.write_all(&garbage(64)).unwrap();
    let archive = zip.finish().unwrap().into_inner();

    let parser = parser();
    let result = parser.detect(&RawInput::new(&archive));
    match result {
        Ok(detection) => assert_ne!(detection.mime_type, DOCX_MIME_TYPE),
        Err(err) => assert_eq!(err.kind(), ErrorKind::UnsupportedFormat),
    }
}

#[test]
fn test_strict_mode_rejects_low_confidence() {
    let config = IngestConfig {
        strict_detection: true,
        min_confidence: Confidence::Medium,
        ..Default::default()
    };
    let parser = DocumentParser::new(config).unwrap();
    let content = b"Jane Doe\nRust engineer";

    let err = parser.detect(&RawInput::new(content)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

    let detection = parser.detect(&RawInput::new(content).with_filename("cv.txt")).unwrap();
    assert_eq!(detection.mime_type, PLAIN_TEXT_MIME_TYPE);
}

#[test]
fn test_require_magic_number_rejects_text() {
    let config = IngestConfig {
        require_magic_number: true,
        ..Default::default()
    };
    let parser = DocumentParser::new(config).unwrap();

    let err = parser
        .detect(&RawInput::new(b"Jane Doe").with_filename("cv.txt"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

    let pdf = pdf_header_bytes(64);
    let detection = parser.detect(&RawInput::new(&pdf)).unwrap();
    assert_eq!(detection.method, DetectionMethod::MagicNumber);
}

#[test]
fn test_registered_signature_wins_over_text_extension() {
    let parser = parser_with_cvx();
    let content = b"CVX1 name: Jane Doe\nrole: engineer\n";
    let input = RawInput::new(content).with_filename("resume.txt");

    let detection = parser.detect(&input).unwrap();
    assert_eq!(detection.mime_type, CVX_MIME);
    assert_eq!(detection.parser_kind, ParserKind::new("cvx"));
    assert_eq!(detection.confidence, Confidence::High);
    assert!(
        detection
            .signals
            .iter()
            .any(|s| s.mime_type == PLAIN_TEXT_MIME_TYPE)
    );

    let report = parser.validate(&input);
    assert!(report.valid, "{:?}", report.errors);
    assert!(report.warnings.iter().any(|w| w.contains(".txt")), "{:?}", report.warnings);
}

#[test]
fn test_every_signature_beats_a_conflicting_extension() {
    let parser = parser_with_cvx();
    let catalog = parser.registry().catalog();
    let body = b"Jane Doe\nSenior Rust Engineer\nBerlin\n";
    let mut checked = 0;

    for spec in catalog.formats() {
        for pattern in &spec.magic {
            let mut content = vec![b' '; pattern.offset];
            content.extend_from_slice(&pattern.bytes);
            if let Some(marker) = &pattern.marker {
                content.extend_from_slice(marker);
            }
            content.extend_from_slice(body);

            let ext = ["txt", "pdf", "docx", "rtf"]
                .into_iter()
                .find(|ext| !spec.extensions.iter().any(|own| own == ext))
                .unwrap();
            let filename = format!("resume.{}", ext);

            let detection = parser
                .detect(&RawInput::new(&content).with_filename(&filename))
                .unwrap();
            assert_eq!(detection.mime_type, spec.mime_type, "{} named {}", spec.description, filename);
            assert_eq!(detection.confidence, Confidence::High, "{} named {}", spec.description, filename);
            checked += 1;
        }
    }

    assert!(checked >= 5, "only {} signatures checked", checked);
}
