//! PDF decoders.
//!
//! [`PdfDecoder`] reads the document through `lopdf`. When the object structure is too
//! damaged for that, [`PdfStreamScanDecoder`] scans the raw bytes for content streams
//! and pulls the text-showing operators out of them, which also works on truncated
//! files. Partial recovery uses both: readable pages first, raw scan otherwise.

use crate::Result;
use crate::error::ParserError;
use crate::plugins::{DecoderCapability, Plugin};
use crate::types::{DocumentMetadata, RawContent, Salvage};
use async_trait::async_trait;
use lopdf::{Document, Object};
use memchr::memmem;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::io::Read;

static TEXT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s-u)BT\s(.*?)\sET").expect("Text block regex pattern is valid and should compile"));
static LITERAL_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s-u)\(((?:[^()\\]|\\.)*)\)").expect("Literal string regex pattern is valid and should compile")
});
static PAGE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)/Count\s+(\d+)").expect("Page count regex pattern is valid and should compile"));
static PAGE_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)/Type\s*/Page(?:[^s]|\z)").expect("Page object regex pattern is valid and should compile")
});

/// How far back from a `stream` keyword the stream dictionary is searched.
const DICT_LOOKBEHIND: usize = 1024;

/// Kerning adjustments at or below this (thousandths of an em) are read as a space.
const WORD_GAP: f64 = -200.0;
/// Upper bound on declared pages per page object found when estimating lost text.
const MAX_PAGE_SCALE: usize = 64;

/// PDF decoder backed by `lopdf`.
pub struct PdfDecoder;

impl PdfDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for PdfDecoder {
    fn name(&self) -> &str {
        "pdf-decoder"
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn description(&self) -> &str {
        "Extracts page text and document info from PDF résumés"
    }
}

#[async_trait]
impl DecoderCapability for PdfDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        let bytes = content.to_vec();
        tokio::task::spawn_blocking(move || decode_document(&bytes)).await?
    }

    fn supported_mime_types(&self) -> &[&str] {
        &["application/pdf"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn priority(&self) -> i32 {
        60
    }

    fn supports_partial(&self) -> bool {
        true
    }

    async fn decode_partial(&self, content: &[u8]) -> Result<Salvage> {
        let bytes = content.to_vec();
        tokio::task::spawn_blocking(move || salvage_document(&bytes)).await?
    }
}

/// Fallback PDF decoder scanning raw content streams.
pub struct PdfStreamScanDecoder;

impl PdfStreamScanDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfStreamScanDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for PdfStreamScanDecoder {
    fn name(&self) -> &str {
        "pdf-stream-scan"
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn description(&self) -> &str {
        "Recovers PDF text by scanning content streams without parsing the object graph"
    }
}

#[async_trait]
impl DecoderCapability for PdfStreamScanDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        let bytes = content.to_vec();
        tokio::task::spawn_blocking(move || {
            let text = scan_streams(&bytes);
            if text.trim().is_empty() {
                return Err(ParserError::parse("No text operators found in PDF content streams"));
            }
            let mut raw = RawContent::from_text(text);
            raw.warnings
                .push("Text recovered by scanning content streams; layout may be lost".to_string());
            Ok(raw)
        })
        .await?
    }

    fn supported_mime_types(&self) -> &[&str] {
        &["application/pdf"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn priority(&self) -> i32 {
        20
    }
}

fn load(bytes: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(bytes).map_err(|e| ParserError::corrupted(format!("Invalid PDF structure: {}", e)))?;
    if doc.is_encrypted() {
        return Err(ParserError::validation("PDF is password-protected"));
    }
    Ok(doc)
}

fn decode_document(bytes: &[u8]) -> Result<RawContent> {
    let doc = load(bytes)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ParserError::corrupted("PDF has no pages"));
    }

    let mut page_texts = Vec::with_capacity(pages.len());
    for &number in pages.keys() {
        let text = doc.extract_text(&[number]).map_err(|e| {
            ParserError::corrupted(format!("Failed to extract text from page {}: {}", number, e))
        })?;
        page_texts.push(text.trim().to_string());
    }

    let mut raw = RawContent::from_text(page_texts.join("\n\n"));
    raw.metadata = document_metadata(&doc);
    raw.metadata.page_count = Some(pages.len());
    if raw.text.trim().is_empty() {
        raw.warnings
            .push("PDF contains no extractable text; it may be a scanned image".to_string());
    }
    Ok(raw)
}

fn salvage_document(bytes: &[u8]) -> Result<Salvage> {
    if let Ok(doc) = load(bytes) {
        let pages = doc.get_pages();
        let readable: Vec<String> = pages
            .keys()
            .filter_map(|&number| doc.extract_text(&[number]).ok())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        if !readable.is_empty() {
            let text = readable.join("\n\n");
            let salvaged = text.chars().count();
            let expected = salvaged * pages.len() / readable.len();
            let mut content = RawContent::from_text(text);
            content.metadata = document_metadata(&doc);
            content.metadata.page_count = Some(pages.len());
            content.warnings.push(format!(
                "Only {} of {} pages could be read",
                readable.len(),
                pages.len()
            ));
            return Ok(Salvage {
                content,
                expected_chars: expected,
            });
        }
    }

    let text = scan_streams(bytes);
    if text.trim().is_empty() {
        return Err(ParserError::corrupted("No readable text could be salvaged from the PDF"));
    }
    let salvaged = text.chars().count();
    Ok(Salvage {
        content: RawContent::from_text(text),
        expected_chars: estimate_expected_chars(bytes, salvaged),
    })
}

/// Scale the salvaged length by declared pages over page objects actually present.
fn estimate_expected_chars(bytes: &[u8], salvaged: usize) -> usize {
    let declared = PAGE_COUNT
        .captures_iter(bytes)
        .filter_map(|caps| std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?.parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    let seen = PAGE_OBJECT.find_iter(bytes).count();
    if seen == 0 || declared <= seen {
        return salvaged;
    }
    let declared = declared.min(seen.saturating_mul(MAX_PAGE_SCALE));
    (salvaged.saturating_mul(declared) / seen).max(salvaged)
}

fn document_metadata(doc: &Document) -> DocumentMetadata {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|obj| obj.as_dict().ok());

    let Some(info) = info else {
        return DocumentMetadata::default();
    };

    let get_string = |key: &[u8]| -> Option<String> {
        match info.get(key).ok()? {
            Object::String(bytes, _) => {
                let value = decode_pdf_string(bytes);
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            }
            _ => None,
        }
    };

    DocumentMetadata {
        title: get_string(b"Title"),
        author: get_string(b"Author"),
        producer: get_string(b"Producer"),
        created_at: get_string(b"CreationDate").map(|d| pdf_date_to_iso(&d)),
        modified_at: get_string(b"ModDate").map(|d| pdf_date_to_iso(&d)),
        ..Default::default()
    }
}

/// Text strings are UTF-16BE with a BOM, or PDFDocEncoding (close enough to Latin-1).
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// `D:20240305093000Z` → `2024-03-05T09:30:00Z`. Unparseable dates pass through.
fn pdf_date_to_iso(value: &str) -> String {
    let digits: String = value
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() < 8 {
        return value.to_string();
    }
    let part = |range: std::ops::Range<usize>, default: &'static str| digits.get(range).unwrap_or(default).to_string();
    format!(
        "{}-{}-{}T{}:{}:{}Z",
        part(0..4, "0000"),
        part(4..6, "01"),
        part(6..8, "01"),
        part(8..10, "00"),
        part(10..12, "00"),
        part(12..14, "00")
    )
}

/// Text from every content stream found in the raw bytes, in file order.
fn scan_streams(bytes: &[u8]) -> String {
    let mut blocks = Vec::new();

    for position in memmem::find_iter(bytes, b"stream") {
        if position >= 3 && &bytes[position - 3..position] == b"end" {
            continue;
        }
        let mut start = position + b"stream".len();
        if bytes.get(start) == Some(&b'\r') {
            start += 1;
        }
        if bytes.get(start) == Some(&b'\n') {
            start += 1;
        }
        if start >= bytes.len() {
            continue;
        }
        let end = memmem::find(&bytes[start..], b"endstream")
            .map(|offset| start + offset)
            .unwrap_or(bytes.len());
        let data = &bytes[start..end];

        let dict = &bytes[position.saturating_sub(DICT_LOOKBEHIND)..position];
        let dict = match memmem::rfind(dict, b"obj") {
            Some(offset) => &dict[offset..],
            None => dict,
        };
        if memmem::find(dict, b"/Image").is_some() {
            continue;
        }

        let decoded;
        let stream: &[u8] = if memmem::find(dict, b"/FlateDecode").is_some() {
            decoded = inflate_lossy(data);
            &decoded
        } else {
            data
        };

        let text = text_operators(stream);
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    blocks.join("\n")
}

/// Inflate as much of a zlib stream as possible; truncated input yields its prefix.
fn inflate_lossy(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        match decoder.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buffer[..n]),
        }
    }
    out
}

fn text_operators(stream: &[u8]) -> String {
    let mut lines = Vec::new();

    for block in TEXT_BLOCK.captures_iter(stream) {
        let Some(body) = block.get(1) else {
            continue;
        };
        let body = body.as_bytes();
        let mut line = String::new();
        let mut previous_end = 0;

        for literal in LITERAL_STRING.captures_iter(body) {
            let (Some(whole), Some(inner)) = (literal.get(0), literal.get(1)) else {
                continue;
            };
            if !line.is_empty() {
                let gap = String::from_utf8_lossy(&body[previous_end..whole.start()]);
                if gap.contains("Td") || gap.contains("TD") || gap.contains("T*") || gap.contains('\'') {
                    lines.push(std::mem::take(&mut line));
                } else if gap
                    .split(|c: char| c.is_whitespace() || c == '[' || c == ']')
                    .filter_map(|token| token.parse::<f64>().ok())
                    .any(|kern| kern <= WORD_GAP)
                {
                    line.push(' ');
                }
            }
            line.push_str(&unescape_literal(inner.as_bytes()));
            previous_end = whole.end();
        }

        if !line.trim().is_empty() {
            lines.push(line);
        }
    }

    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_literal(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        if byte != b'\\' || i + 1 >= raw.len() {
            out.push(byte);
            i += 1;
            continue;
        }
        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\r' | b'\n' => {}
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                let mut taken = 1;
                while taken < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                    value = value * 8 + u32::from(raw[i] - b'0');
                    i += 1;
                    taken += 1;
                }
                out.push((value & 0xFF) as u8);
            }
            other => out.push(other),
        }
    }
    decode_pdf_string(&out)
}
