//! DOCX decoders.
//!
//! [`DocxDecoder`] opens the package with `zip` and walks `word/document.xml` with
//! `roxmltree`, keeping paragraph styles, numbering and tables as structural hints.
//! [`DocxXmlScanDecoder`] finds the document part through local file headers instead
//! of the central directory and streams it with `quick-xml`, so it still reads
//! packages whose directory is missing and XML that stops mid-element.

use crate::Result;
use crate::core::formats::DOCX_MIME_TYPE;
use crate::error::ParserError;
use crate::plugins::{DecoderCapability, Plugin};
use crate::types::{DocumentMetadata, Heading, RawContent, Salvage, StructuralHints, TableHint};
use async_trait::async_trait;
use memchr::memmem;
use quick_xml::Reader;
use quick_xml::events::Event;
use roxmltree::Node;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const CORE_PART: &str = "docProps/core.xml";
const APP_PART: &str = "docProps/app.xml";

const LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const CENTRAL_HEADER: &[u8] = b"PK\x01\x02";
const LOCAL_HEADER_LEN: usize = 30;
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;
const FLAG_DATA_DESCRIPTOR: u16 = 0x08;
/// Upper bound on declared over recovered XML size when estimating lost text.
const MAX_SIZE_SCALE: usize = 64;

/// DOCX decoder using `zip` + `roxmltree`.
pub struct DocxDecoder;

impl DocxDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DocxDecoder {
    fn name(&self) -> &str {
        "docx-decoder"
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
        "Extracts paragraphs, headings, lists and tables from Word documents"
    }
}

#[async_trait]
impl DecoderCapability for DocxDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        let bytes = content.to_vec();
        tokio::task::spawn_blocking(move || decode_package(&bytes)).await?
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[DOCX_MIME_TYPE]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }

    fn supports_partial(&self) -> bool {
        true
    }

    async fn decode_partial(&self, content: &[u8]) -> Result<Salvage> {
        let bytes = content.to_vec();
        tokio::task::spawn_blocking(move || salvage_package(&bytes)).await?
    }
}

/// Fallback DOCX decoder reading `word/document.xml` straight from local file headers.
pub struct DocxXmlScanDecoder;

impl DocxXmlScanDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxXmlScanDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DocxXmlScanDecoder {
    fn name(&self) -> &str {
        "docx-xml-scan"
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
        "Streams Word document text without relying on the ZIP central directory"
    }
}

#[async_trait]
impl DecoderCapability for DocxXmlScanDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        let bytes = content.to_vec();
        tokio::task::spawn_blocking(move || {
            let scan = scan_document_part(&bytes)?;
            if scan.paragraphs.is_empty() {
                return Err(ParserError::parse("No paragraphs found in word/document.xml"));
            }
            let mut raw = RawContent::from_text(scan.paragraphs.join("\n"));
            raw.warnings
                .push("Text recovered by streaming the document part; styles were not applied".to_string());
            if scan.truncated {
                raw.warnings.push("Document XML ended unexpectedly".to_string());
            }
            Ok(raw)
        })
        .await?
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[DOCX_MIME_TYPE]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }

    fn priority(&self) -> i32 {
        20
    }
}

fn decode_package(bytes: &[u8]) -> Result<RawContent> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParserError::corrupted(format!("Failed to open DOCX as ZIP: {}", e)))?;

    let document_xml = read_part(&mut archive, DOCUMENT_PART)?
        .ok_or_else(|| ParserError::corrupted(format!("DOCX package has no {}", DOCUMENT_PART)))?;
    let document = roxmltree::Document::parse(&document_xml)
        .map_err(|e| ParserError::corrupted(format!("Failed to parse {}: {}", DOCUMENT_PART, e)))?;

    let body = document
        .root_element()
        .children()
        .find(|n| n.has_tag_name("body"))
        .ok_or_else(|| ParserError::corrupted("word/document.xml has no body element"))?;

    let mut lines = Vec::new();
    let mut structure = StructuralHints::default();

    for node in body.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "p" => {
                let text = paragraph_text(node);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if let Some(level) = heading_level(node) {
                    structure.headings.push(Heading {
                        level,
                        text: text.to_string(),
                    });
                } else if is_list_item(node) {
                    structure.list_items.push(text.to_string());
                } else {
                    structure.paragraphs += 1;
                }
                lines.push(text.to_string());
            }
            "tbl" => {
                let (rows, hint) = table_rows(node);
                if hint.rows > 0 {
                    structure.tables.push(hint);
                    lines.extend(rows);
                }
            }
            _ => {}
        }
    }

    let mut raw = RawContent::from_text(lines.join("\n"));
    raw.metadata = package_metadata(&mut archive);
    raw.structure = Some(structure);
    if raw.text.is_empty() {
        raw.warnings.push("Word document contains no text".to_string());
    }
    Ok(raw)
}

fn read_part<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(_) => return Ok(None),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| ParserError::corrupted(format!("Failed to read {}: {}", name, e)))?;
    Ok(Some(content))
}

fn paragraph_text(paragraph: Node) -> String {
    let mut text = String::new();
    for node in paragraph.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "t" => text.push_str(node.text().unwrap_or("")),
            "tab" if !node.ancestors().any(|a| a.has_tag_name("pPr")) => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn paragraph_style(paragraph: Node) -> Option<String> {
    paragraph
        .children()
        .find(|n| n.has_tag_name("pPr"))?
        .children()
        .find(|n| n.has_tag_name("pStyle"))?
        .attributes()
        .find(|a| a.name() == "val")
        .map(|a| a.value().to_string())
}

/// `Title` → 1, `Heading2` / `heading 2` → 2.
fn heading_level(paragraph: Node) -> Option<u8> {
    let style = paragraph_style(paragraph)?.to_ascii_lowercase();
    if style == "title" {
        return Some(1);
    }
    let level = style.strip_prefix("heading")?.trim();
    match level.parse::<u8>() {
        Ok(level) if (1..=9).contains(&level) => Some(level),
        _ => None,
    }
}

fn is_list_item(paragraph: Node) -> bool {
    paragraph
        .children()
        .find(|n| n.has_tag_name("pPr"))
        .is_some_and(|ppr| ppr.children().any(|n| n.has_tag_name("numPr")))
        || paragraph_style(paragraph).is_some_and(|style| style.to_ascii_lowercase().starts_with("list"))
}

fn table_rows(table: Node) -> (Vec<String>, TableHint) {
    let mut lines = Vec::new();
    let mut columns = 0;

    for row in table.children().filter(|n| n.has_tag_name("tr")) {
        let cells: Vec<String> = row
            .children()
            .filter(|n| n.has_tag_name("tc"))
            .map(|cell| {
                cell.descendants()
                    .filter(|n| n.has_tag_name("p"))
                    .map(|p| paragraph_text(p).trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        columns = columns.max(cells.len());
        lines.push(cells.join("\t"));
    }

    let hint = TableHint {
        rows: lines.len(),
        columns,
    };
    (lines, hint)
}

fn xml_text(root: Node, name: &str) -> Option<String> {
    root.descendants()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Metadata is best effort; unreadable property parts leave fields empty.
fn package_metadata<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();

    if let Ok(Some(core)) = read_part(archive, CORE_PART)
        && let Ok(doc) = roxmltree::Document::parse(&core)
    {
        let root = doc.root_element();
        metadata.title = xml_text(root, "title");
        metadata.author = xml_text(root, "creator");
        metadata.created_at = xml_text(root, "created");
        metadata.modified_at = xml_text(root, "modified");
    }

    if let Ok(Some(app)) = read_part(archive, APP_PART)
        && let Ok(doc) = roxmltree::Document::parse(&app)
    {
        let root = doc.root_element();
        metadata.producer = xml_text(root, "Application");
        metadata.page_count = xml_text(root, "Pages").and_then(|v| v.parse().ok());
        metadata.paragraph_count = xml_text(root, "Paragraphs").and_then(|v| v.parse().ok());
    }

    metadata
}

fn salvage_package(bytes: &[u8]) -> Result<Salvage> {
    let scan = scan_document_part(bytes)?;
    let text = scan.paragraphs.join("\n");
    if text.trim().is_empty() {
        return Err(ParserError::corrupted("No readable text could be salvaged from the DOCX package"));
    }

    let salvaged = text.chars().count();
    let expected_chars = estimate_expected_chars(&scan, salvaged);

    let mut content = RawContent::from_text(text);
    if scan.truncated {
        content.warnings.push("Document XML ended unexpectedly".to_string());
    }
    Ok(Salvage {
        content,
        expected_chars,
    })
}

/// Scale the salvaged length by the declared XML size over the size recovered.
fn estimate_expected_chars(scan: &PartScan, salvaged: usize) -> usize {
    match scan.declared_xml_len {
        Some(declared) if scan.xml_len > 0 && declared > scan.xml_len => {
            let declared = declared.min(scan.xml_len.saturating_mul(MAX_SIZE_SCALE));
            (salvaged.saturating_mul(declared) / scan.xml_len).max(salvaged)
        }
        _ if scan.truncated => salvaged.saturating_add(salvaged / 2),
        _ => salvaged,
    }
}

struct PartScan {
    paragraphs: Vec<String>,
    /// Bytes of XML actually recovered.
    xml_len: usize,
    /// Uncompressed size recorded in the local header, when present.
    declared_xml_len: Option<usize>,
    truncated: bool,
}

struct LocalEntry<'a> {
    method: u16,
    data: &'a [u8],
    uncompressed_size: Option<usize>,
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn find_local_entry<'a>(bytes: &'a [u8], wanted: &str) -> Option<LocalEntry<'a>> {
    for position in memmem::find_iter(bytes, LOCAL_HEADER) {
        let (Some(flags), Some(method), Some(compressed), Some(uncompressed), Some(name_len), Some(extra_len)) = (
            read_u16(bytes, position + 6),
            read_u16(bytes, position + 8),
            read_u32(bytes, position + 18),
            read_u32(bytes, position + 22),
            read_u16(bytes, position + 26),
            read_u16(bytes, position + 28),
        ) else {
            continue;
        };

        let name_start = position + LOCAL_HEADER_LEN;
        let name_end = name_start + name_len as usize;
        if bytes.get(name_start..name_end) != Some(wanted.as_bytes()) {
            continue;
        }

        let data_start = (name_end + extra_len as usize).min(bytes.len());
        let sizes_known = flags & FLAG_DATA_DESCRIPTOR == 0 && compressed > 0;
        let data_end = if sizes_known {
            (data_start + compressed as usize).min(bytes.len())
        } else {
            let rest = &bytes[data_start..];
            [memmem::find(rest, LOCAL_HEADER), memmem::find(rest, CENTRAL_HEADER)]
                .into_iter()
                .flatten()
                .min()
                .map(|offset| data_start + offset)
                .unwrap_or(bytes.len())
        };

        return Some(LocalEntry {
            method,
            data: &bytes[data_start..data_end],
            uncompressed_size: (sizes_known && uncompressed > 0).then_some(uncompressed as usize),
        });
    }
    None
}

/// Inflate as much of a raw deflate stream as possible.
fn inflate_lossy(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::DeflateDecoder::new(data);
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

fn scan_document_part(bytes: &[u8]) -> Result<PartScan> {
    let entry = find_local_entry(bytes, DOCUMENT_PART)
        .ok_or_else(|| ParserError::corrupted(format!("No {} entry found in package", DOCUMENT_PART)))?;

    let xml = match entry.method {
        METHOD_STORED => entry.data.to_vec(),
        METHOD_DEFLATED => inflate_lossy(entry.data),
        other => {
            return Err(ParserError::corrupted(format!(
                "Unsupported ZIP compression method {} for {}",
                other, DOCUMENT_PART
            )));
        }
    };

    let (paragraphs, malformed) = stream_paragraphs(&xml);
    let short = entry.uncompressed_size.is_some_and(|declared| xml.len() < declared);
    Ok(PartScan {
        paragraphs,
        xml_len: xml.len(),
        declared_xml_len: entry.uncompressed_size,
        truncated: malformed || short,
    })
}

/// Paragraph texts from WordprocessingML, stopping quietly at the first XML error.
fn stream_paragraphs(xml: &[u8]) -> (Vec<String>, bool) {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut depth: usize = 0;
    let mut malformed = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::GeneralRef(r)) if in_text => {
                if let Some(ch) = resolve_entity(r.as_ref()) {
                    current.push(ch);
                }
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" => flush_paragraph(&mut current, &mut paragraphs),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => {
                malformed = true;
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    flush_paragraph(&mut current, &mut paragraphs);
    (paragraphs, malformed || depth > 0)
}

fn flush_paragraph(current: &mut String, paragraphs: &mut Vec<String>) {
    let text = current.trim();
    if !text.is_empty() {
        paragraphs.push(text.to_string());
    }
    current.clear();
}

fn resolve_entity(name: &[u8]) -> Option<char> {
    match name {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => {
            let name = std::str::from_utf8(name).ok()?.strip_prefix('#')?;
            let code = match name.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
