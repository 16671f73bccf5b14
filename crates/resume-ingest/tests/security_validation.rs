//! Upload validation tests: size limits, allowed types and signature checks.

use resume_ingest::{
    DocumentParser, ErrorKind, IngestConfig, PDF_MIME_TYPE, PLAIN_TEXT_MIME_TYPE, RawInput, ValidationFailure,
};

mod helpers;
use helpers::*;

#[test]
fn test_valid_pdf_report() {
    let parser = DocumentParser::new(IngestConfig::default()).unwrap();
    let content = pdf_header_bytes(256);

    let report = parser.validate(&RawInput::new(&content).with_filename("cv.pdf"));

    assert!(report.valid);
    assert!(report.errors.is_empty());
    assert_eq!(report.size, 256);
    assert_eq!(report.detected_type.unwrap().mime_type, PDF_MIME_TYPE);
}

#[test]
fn test_every_problem_reported() {
    let config = IngestConfig {
        max_file_size: 1024,
        allowed_types: vec![PDF_MIME_TYPE.to_string()],
        ..Default::default()
    };
    let parser = DocumentParser::new(config).unwrap();
    let content = "Jane Doe, Rust engineer. ".repeat(100);

    let report = parser.validate(&RawInput::new(content.as_bytes()).with_filename("cv.txt"));

    assert!(!report.valid);
    assert_eq!(report.errors.len(), 2, "errors: {:?}", report.errors);
    assert!(
        report
            .failures
            .iter()
            .any(|f| matches!(f, ValidationFailure::TooLarge { max_size: 1024, .. }))
    );
    assert!(
        report
            .failures
            .iter()
            .any(|f| matches!(f, ValidationFailure::DisallowedType { mime_type } if mime_type == PLAIN_TEXT_MIME_TYPE))
    );

    let err = report.to_error().unwrap();
    assert_eq!(err.kind(), ErrorKind::FileSize);
    assert_eq!(err.context().details.len(), 2);
}

#[test]
fn test_type_specific_limit_applies_below_global_limit() {
    let parser = DocumentParser::new(IngestConfig::default()).unwrap();
    let content = vec![b'a'; 3 * MB as usize];

    let report = parser.validate(&RawInput::new(&content).with_filename("cv.txt"));
    assert!(!report.valid);

    let err = report.to_error().unwrap();
    assert_eq!(err.kind(), ErrorKind::FileSize);
    assert_eq!(err.context().max_size, Some(2 * MB));
    assert!(err.user_message().contains("Maximum allowed is 2MB"));
}

#[test]
fn test_disallowed_type_is_validation_error() {
    let config = IngestConfig {
        allowed_types: vec![PDF_MIME_TYPE.to_string()],
        ..Default::default()
    };
    let parser = DocumentParser::new(config).unwrap();
    let rtf = build_rtf(&["Jane Doe"]);

    let err = parser
        .validate(&RawInput::new(&rtf).with_filename("cv.rtf"))
        .to_error()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.user_message().starts_with("The file could not be accepted"));
}

#[test]
fn test_extension_claiming_binary_format_needs_signature() {
    let parser = DocumentParser::new(IngestConfig::default()).unwrap();

    for filename in ["cv.pdf", "cv.docx", "cv.doc", "cv.rtf"] {
        let report = parser.validate(&RawInput::new(b"Jane Doe, Rust engineer").with_filename(filename));
        assert!(!report.valid, "{} with text content must be rejected", filename);
        assert!(
            report
                .failures
                .iter()
                .any(|f| matches!(f, ValidationFailure::MagicMismatch { .. })),
            "{}: {:?}",
            filename,
            report.failures
        );
    }
}

#[test]
fn test_signature_check_can_be_disabled() {
    let config = IngestConfig {
        check_magic_numbers: false,
        ..Default::default()
    };
    let parser = DocumentParser::new(config).unwrap();

    let report = parser.validate(&RawInput::new(b"Jane Doe, Rust engineer").with_filename("cv.rtf"));

    assert!(
        !report
            .failures
            .iter()
            .any(|f| matches!(f, ValidationFailure::MagicMismatch { .. }))
    );
}

#[test]
fn test_empty_input_short_circuits() {
    let parser = DocumentParser::new(IngestConfig::default()).unwrap();

    let report = parser.validate(&RawInput::new(b"").with_filename("cv.pdf"));

    assert!(!report.valid);
    assert_eq!(report.errors, vec!["File is empty".to_string()]);
    assert!(report.detected_type.is_none());
    assert_eq!(report.to_error().unwrap().kind(), ErrorKind::Validation);
}

#[test]
fn test_low_confidence_detection_warns() {
    let parser = DocumentParser::new(IngestConfig::default()).unwrap();

    let report = parser.validate(&RawInput::new(b"Jane Doe\nRust engineer"));

    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("low confidence")));
}
