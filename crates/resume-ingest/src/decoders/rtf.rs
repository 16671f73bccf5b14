//! RTF (Rich Text Format) decoder.
//!
//! Walks the group structure, keeping body text and the `\info` properties and
//! dropping every other destination (font and color tables, stylesheets, pictures,
//! ignorable `\*` groups). Paragraph and line breaks are kept so the heuristic
//! structure pass can find headings and bullets.

use crate::Result;
use crate::error::ParserError;
use crate::plugins::{DecoderCapability, Plugin};
use crate::types::{DocumentMetadata, RawContent, StructuralHints, TableHint};
use async_trait::async_trait;

/// Most fallback characters a `\uc` word may announce after each `\u`.
const MAX_UNICODE_SKIP: i32 = 8;

/// Destinations whose content is never body text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "listtable",
    "listoverridetable",
    "revtbl",
    "rsidtbl",
    "generator",
    "pict",
    "object",
    "themedata",
    "colorschememapping",
    "datastore",
    "latentstyles",
    "xmlnstbl",
    "header",
    "footer",
    "footnote",
    "fldinst",
];

pub struct RtfDecoder;

impl RtfDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RtfDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for RtfDecoder {
    fn name(&self) -> &str {
        "rtf-decoder"
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
        "Decodes RTF résumés with native Rust parsing"
    }
}

#[async_trait]
impl DecoderCapability for RtfDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        if !content.starts_with(b"{\\rtf") {
            return Err(ParserError::corrupted("Missing RTF header"));
        }
        let source = String::from_utf8_lossy(content);
        let parsed = parse_rtf(&source);

        let mut raw = RawContent::from_text(parsed.text);
        raw.metadata = parsed.metadata;
        if parsed.depth != 0 {
            raw.warnings
                .push(format!("RTF group structure is unbalanced ({} unclosed groups)", parsed.depth));
        }
        if !parsed.tables.is_empty() {
            // Headings and paragraphs are filled in by the heuristic pass.
            raw.structure = Some(StructuralHints {
                tables: parsed.tables,
                ..Default::default()
            });
        }
        Ok(raw)
    }

    fn supported_mime_types(&self) -> &[&str] {
        &["application/rtf", "text/rtf"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["rtf"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum InfoField {
    Title,
    Author,
    Created,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Destination {
    Body,
    Skip,
    Info,
    Field(InfoField),
}

#[derive(Debug, Clone, Copy)]
struct Group {
    destination: Destination,
    /// Fallback characters following a `\u` escape.
    unicode_skip: usize,
}

#[derive(Debug, Default)]
struct DateParts {
    year: Option<i32>,
    month: Option<i32>,
    day: Option<i32>,
    hour: Option<i32>,
    minute: Option<i32>,
}

impl DateParts {
    fn to_iso(&self) -> Option<String> {
        let year = self.year?;
        Some(format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:00Z",
            year,
            self.month.unwrap_or(1).max(1),
            self.day.unwrap_or(1).max(1),
            self.hour.unwrap_or(0).max(0),
            self.minute.unwrap_or(0).max(0)
        ))
    }
}

struct ParsedRtf {
    text: String,
    metadata: DocumentMetadata,
    tables: Vec<TableHint>,
    depth: usize,
}

#[derive(Default)]
struct TableTracker {
    rows: usize,
    columns: usize,
    cells_in_row: usize,
    in_row: bool,
}

fn parse_rtf(source: &str) -> ParsedRtf {
    let mut text = String::new();
    let mut title = String::new();
    let mut author = String::new();
    let mut created = DateParts::default();
    let mut modified = DateParts::default();
    let mut tables = Vec::new();
    let mut table = TableTracker::default();

    let mut stack: Vec<Group> = Vec::new();
    let mut current = Group {
        destination: Destination::Body,
        unicode_skip: 1,
    };
    let mut pending_skip = 0usize;
    let mut chars = source.chars().peekable();

    let emit = |c: char, group: &Group, text: &mut String, title: &mut String, author: &mut String| match group.destination {
        Destination::Body => text.push(c),
        Destination::Field(InfoField::Title) => title.push(c),
        Destination::Field(InfoField::Author) => author.push(c),
        _ => {}
    };

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                stack.push(current);
                pending_skip = 0;
            }
            '}' => {
                if let Some(group) = stack.pop() {
                    current = group;
                }
                pending_skip = 0;
            }
            '\r' | '\n' => {}
            '\\' => {
                let Some(&next) = chars.peek() else {
                    break;
                };
                if !next.is_ascii_alphabetic() {
                    chars.next();
                    let symbol = match next {
                        '\\' | '{' | '}' => Some(next),
                        '~' => Some(' '),
                        '_' => Some('-'),
                        '\'' => {
                            let high = chars.next();
                            let low = chars.next();
                            match (high, low) {
                                (Some(h), Some(l)) => parse_hex_byte(h, l).map(cp1252_char),
                                _ => None,
                            }
                        }
                        '*' => {
                            current.destination = Destination::Skip;
                            None
                        }
                        '\n' | '\r' => Some('\n'),
                        _ => None,
                    };
                    if let Some(c) = symbol {
                        if pending_skip > 0 {
                            pending_skip -= 1;
                        } else {
                            emit(c, &current, &mut text, &mut title, &mut author);
                        }
                    }
                    continue;
                }

                let (word, value) = parse_control_word(&mut chars);
                if SKIPPED_DESTINATIONS.contains(&word.as_str()) {
                    current.destination = Destination::Skip;
                    continue;
                }
                match word.as_str() {
                    "info" if current.destination == Destination::Body => current.destination = Destination::Info,
                    "title" if current.destination == Destination::Info => {
                        current.destination = Destination::Field(InfoField::Title)
                    }
                    "author" if current.destination == Destination::Info => {
                        current.destination = Destination::Field(InfoField::Author)
                    }
                    "creatim" if current.destination == Destination::Info => {
                        current.destination = Destination::Field(InfoField::Created)
                    }
                    "revtim" if current.destination == Destination::Info => {
                        current.destination = Destination::Field(InfoField::Modified)
                    }
                    "yr" | "mo" | "dy" | "hr" | "min" => {
                        let parts = match current.destination {
                            Destination::Field(InfoField::Created) => Some(&mut created),
                            Destination::Field(InfoField::Modified) => Some(&mut modified),
                            _ => None,
                        };
                        if let (Some(parts), Some(v)) = (parts, value) {
                            match word.as_str() {
                                "yr" => parts.year = Some(v),
                                "mo" => parts.month = Some(v),
                                "dy" => parts.day = Some(v),
                                "hr" => parts.hour = Some(v),
                                _ => parts.minute = Some(v),
                            }
                        }
                    }
                    "uc" => current.unicode_skip = value.unwrap_or(1).clamp(0, MAX_UNICODE_SKIP) as usize,
                    "u" => {
                        if let Some(code) = value {
                            let code = if code < 0 { (code + 65536) as u32 } else { code as u32 };
                            if let Some(c) = char::from_u32(code) {
                                emit(c, &current, &mut text, &mut title, &mut author);
                            }
                            pending_skip = current.unicode_skip;
                        }
                    }
                    "par" | "line" | "sect" | "page" => {
                        if current.destination == Destination::Body {
                            text.push('\n');
                            if table.rows > 0 && !table.in_row {
                                finish_table(&mut table, &mut tables);
                            }
                        }
                    }
                    "tab" => emit('\t', &current, &mut text, &mut title, &mut author),
                    "bullet" => emit('•', &current, &mut text, &mut title, &mut author),
                    "lquote" => emit('\u{2018}', &current, &mut text, &mut title, &mut author),
                    "rquote" => emit('\u{2019}', &current, &mut text, &mut title, &mut author),
                    "ldblquote" => emit('\u{201C}', &current, &mut text, &mut title, &mut author),
                    "rdblquote" => emit('\u{201D}', &current, &mut text, &mut title, &mut author),
                    "endash" => emit('\u{2013}', &current, &mut text, &mut title, &mut author),
                    "emdash" => emit('\u{2014}', &current, &mut text, &mut title, &mut author),
                    "trowd" if current.destination == Destination::Body => {
                        table.in_row = true;
                        table.cells_in_row = 0;
                    }
                    "cell" if current.destination == Destination::Body => {
                        table.cells_in_row += 1;
                        text.push('\t');
                    }
                    "row" if current.destination == Destination::Body => {
                        table.rows += 1;
                        table.columns = table.columns.max(table.cells_in_row);
                        table.in_row = false;
                        if text.ends_with('\t') {
                            text.pop();
                        }
                        text.push('\n');
                    }
                    _ => {}
                }
            }
            _ => {
                if pending_skip > 0 {
                    pending_skip -= 1;
                    continue;
                }
                emit(ch, &current, &mut text, &mut title, &mut author);
            }
        }
    }

    if table.rows > 0 {
        finish_table(&mut table, &mut tables);
    }

    let metadata = DocumentMetadata {
        title: non_empty(title),
        author: non_empty(author),
        created_at: created.to_iso(),
        modified_at: modified.to_iso(),
        ..Default::default()
    };

    ParsedRtf {
        text: tidy(&text),
        metadata,
        tables,
        depth: stack.len(),
    }
}

fn finish_table(table: &mut TableTracker, tables: &mut Vec<TableHint>) {
    tables.push(TableHint {
        rows: table.rows,
        columns: table.columns,
    });
    *table = TableTracker::default();
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Collapse runs of spaces and trim every line, keeping line breaks.
fn tidy(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
        .collect();
    lines.join("\n").trim().to_string()
}

fn parse_control_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> (String, Option<i32>) {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphabetic() {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }

    let mut digits = String::new();
    if chars.peek() == Some(&'-') {
        digits.push('-');
        chars.next();
    }
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }

    // A single space delimits the control word and is not text.
    if chars.peek() == Some(&' ') {
        chars.next();
    }

    (word, digits.parse::<i32>().ok())
}

#[inline]
fn parse_hex_byte(high: char, low: char) -> Option<u8> {
    let high = high.to_digit(16)?;
    let low = low.to_digit(16)?;
    Some(((high << 4) | low) as u8)
}

/// Windows-1252 byte to char; differs from Latin-1 only in 0x80..=0x9F.
fn cp1252_char(byte: u8) -> char {
    match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => '?',
        _ => byte as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = r"{\rtf1\ansi\deff0{\fonttbl{\f0 Times New Roman;}}{\colortbl;\red0\green0\blue0;}
{\info{\title Jane Doe CV}{\author Jane Doe}{\creatim\yr2024\mo3\dy5\hr9\min30}}
{\*\generator Writer;}
\pard\b EXPERIENCE\b0\par
Caf\'e9 owner \endash  2019\par
\bullet  Managed \u8364? budgets\par
}";

    #[tokio::test]
    async fn test_body_text_and_info() {
        let raw = RtfDecoder::new().decode(SAMPLE.as_bytes()).await.unwrap();
        assert_eq!(raw.text, "EXPERIENCE\nCafé owner \u{2013} 2019\n• Managed € budgets");
        assert_eq!(raw.metadata.title.as_deref(), Some("Jane Doe CV"));
        assert_eq!(raw.metadata.author.as_deref(), Some("Jane Doe"));
        assert_eq!(raw.metadata.created_at.as_deref(), Some("2024-03-05T09:30:00Z"));
        assert!(raw.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_tables_counted() {
        let rtf = r"{\rtf1 \trowd\cellx1000\cellx2000 A\cell B\cell\row \trowd C\cell D\cell\row \par After}";
        let raw = RtfDecoder::new().decode(rtf.as_bytes()).await.unwrap();
        let structure = raw.structure.unwrap();
        assert_eq!(structure.tables, vec![TableHint { rows: 2, columns: 2 }]);
        assert!(raw.text.contains("A\tB\nC\tD"));
        assert!(raw.text.ends_with("After"));
    }

    #[tokio::test]
    async fn test_unbalanced_groups_warn() {
        let raw = RtfDecoder::new().decode(br"{\rtf1 {\b truncated").await.unwrap();
        assert_eq!(raw.text, "truncated");
        assert_eq!(raw.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_unicode_skip_is_capped() {
        let rtf = br"{\rtf1 \uc2147483647 Jane \u8364?? Doe, Senior Rust Engineer, Berlin}";
        let raw = RtfDecoder::new().decode(rtf).await.unwrap();
        assert!(raw.text.starts_with("Jane \u{20AC}"), "{}", raw.text);
        assert!(raw.text.ends_with("Rust Engineer, Berlin"), "{}", raw.text);
    }

    #[tokio::test]
    async fn test_missing_header_is_corrupted() {
        let err = RtfDecoder::new().decode(b"plain text").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }
}
