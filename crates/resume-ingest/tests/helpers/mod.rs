//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resume_ingest::core::formats::MagicPattern;
use resume_ingest::plugins::{DecoderCapability, Plugin};
use resume_ingest::{IngestConfig, ParserError, RawContent, Result, Salvage};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const MB: u64 = 1024 * 1024;

/// Single-page PDF whose content stream shows one line per entry.
pub fn build_pdf(lines: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 11.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Curriculum Vitae"),
        "Author" => Object::string_literal("Jane Doe"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Minimal DOCX package with a title heading followed by body paragraphs.
pub fn build_docx(title: &str, paragraphs: &[&str]) -> Vec<u8> {
    let mut body = format!(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>{}</w:t></w:r></w:p>"#,
        title
    );
    for paragraph in paragraphs {
        body.push_str(&format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", paragraph));
    }
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

pub fn build_rtf(paragraphs: &[&str]) -> Vec<u8> {
    let mut rtf = String::from(r"{\rtf1\ansi\deff0{\fonttbl{\f0 Times New Roman;}}");
    for paragraph in paragraphs {
        rtf.push_str(paragraph);
        rtf.push_str(r"\par ");
    }
    rtf.push('}');
    rtf.into_bytes()
}

/// Binary noise matching no known signature and failing UTF-8 decoding.
pub fn garbage(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| match i % 4 {
            0 => 0x00,
            1 => 0x9C,
            2 => 0x07,
            _ => 0xC3,
        })
        .collect()
}

/// `%PDF-1.4` header padded to `len` bytes.
pub fn pdf_header_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.resize(len.max(bytes.len()), b' ');
    bytes
}

/// Defaults with short retry delays and a short timeout.
pub fn fast_config() -> IngestConfig {
    IngestConfig {
        timeout_ms: 1_000,
        retry_attempts: 3,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 50,
        ..Default::default()
    }
}

/// Mock decoder with scripted failures, latency and salvage output.
pub struct ScriptedDecoder {
    name: String,
    mime_types: &'static [&'static str],
    extensions: &'static [&'static str],
    priority: i32,
    failures: u32,
    error: fn() -> ParserError,
    delay: Option<Duration>,
    salvage: Option<(String, usize)>,
    magic: Vec<MagicPattern>,
    text: String,
    calls: AtomicU32,
    partial_calls: AtomicU32,
}

impl ScriptedDecoder {
    pub fn pdf(name: &str) -> Self {
        Self::new(name, &["application/pdf"], &["pdf"])
    }

    pub fn new(name: &str, mime_types: &'static [&'static str], extensions: &'static [&'static str]) -> Self {
        Self {
            name: name.to_string(),
            mime_types,
            extensions,
            priority: 50,
            failures: 0,
            error: || ParserError::corrupted("cross-reference table damaged"),
            delay: None,
            salvage: None,
            magic: Vec::new(),
            text: "Jane Doe\nSenior Rust Engineer\nBerlin".to_string(),
            calls: AtomicU32::new(0),
            partial_calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `failures` calls.
    pub fn failing(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    pub fn always_failing(self) -> Self {
        self.failing(u32::MAX)
    }

    pub fn with_error(mut self, error: fn() -> ParserError) -> Self {
        self.error = error;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_salvage(mut self, text: &str, expected_chars: usize) -> Self {
        self.salvage = Some((text.to_string(), expected_chars));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Declare a prefix signature for the decoder's format.
    pub fn with_magic(mut self, bytes: &'static [u8]) -> Self {
        self.magic.push(MagicPattern::prefix(bytes));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn partial_calls(&self) -> u32 {
        self.partial_calls.load(Ordering::SeqCst)
    }
}

impl Plugin for ScriptedDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> String {
        "1.0.0".to_string()
    }

    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DecoderCapability for ScriptedDecoder {
    async fn decode(&self, _content: &[u8]) -> Result<RawContent> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call <= self.failures {
            return Err((self.error)());
        }
        Ok(RawContent::from_text(self.text.clone()))
    }

    fn supported_mime_types(&self) -> &[&str] {
        self.mime_types
    }

    fn supported_extensions(&self) -> &[&str] {
        self.extensions
    }

    fn magic_numbers(&self) -> Vec<MagicPattern> {
        self.magic.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports_partial(&self) -> bool {
        self.salvage.is_some()
    }

    async fn decode_partial(&self, _content: &[u8]) -> Result<Salvage> {
        self.partial_calls.fetch_add(1, Ordering::SeqCst);
        match &self.salvage {
            Some((text, expected_chars)) => Ok(Salvage {
                content: RawContent::from_text(text.clone()),
                expected_chars: *expected_chars,
            }),
            None => Err(ParserError::parse("nothing to salvage")),
        }
    }
}
