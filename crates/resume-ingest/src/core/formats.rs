//! Format catalog: MIME types, parser kinds, extensions, magic numbers and size limits.
//!
//! The catalog is the single table consulted by detection and validation. The built-in
//! table covers the document types résumés arrive in; decoders registered at runtime can
//! extend it (see [`crate::plugins::DecoderRegistry::catalog`]).

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::path::Path;

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const DOCX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const LEGACY_WORD_MIME_TYPE: &str = "application/msword";
pub const RTF_MIME_TYPE: &str = "application/rtf";
pub const PLAIN_TEXT_MIME_TYPE: &str = "text/plain";

const MB: u64 = 1024 * 1024;

/// Identifier for a family of decoders.
///
/// Built-in kinds are available as associated constants; plugins may introduce
/// their own with [`ParserKind::new`]. Kinds compare case-insensitively because they
/// are normalized to lowercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParserKind(Cow<'static, str>);

impl ParserKind {
    pub const PDF: ParserKind = ParserKind(Cow::Borrowed("pdf"));
    pub const DOCX: ParserKind = ParserKind(Cow::Borrowed("docx"));
    pub const DOC: ParserKind = ParserKind(Cow::Borrowed("doc"));
    pub const RTF: ParserKind = ParserKind(Cow::Borrowed("rtf"));
    pub const TEXT: ParserKind = ParserKind(Cow::Borrowed("text"));

    pub fn new<S: Into<String>>(name: S) -> Self {
        ParserKind(Cow::Owned(name.into().trim().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParserKind {
    fn from(value: &str) -> Self {
        ParserKind::new(value)
    }
}

impl Serialize for ParserKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ParserKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ParserKind::new(name))
    }
}

/// A byte signature identifying a binary format.
///
/// `bytes` must appear at `offset`. When `marker` is set, the marker must also occur
/// somewhere in the content; this separates container formats that share a prefix
/// (every OOXML file is a ZIP archive, but only Word documents carry `word/` entries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicPattern {
    pub offset: usize,
    pub bytes: Cow<'static, [u8]>,
    pub marker: Option<Cow<'static, [u8]>>,
}

impl MagicPattern {
    pub const fn prefix(bytes: &'static [u8]) -> Self {
        Self {
            offset: 0,
            bytes: Cow::Borrowed(bytes),
            marker: None,
        }
    }

    pub fn with_marker(mut self, marker: &'static [u8]) -> Self {
        self.marker = Some(Cow::Borrowed(marker));
        self
    }

    /// Owned pattern, used for signatures declared by plugins.
    pub fn owned(bytes: Vec<u8>) -> Self {
        Self {
            offset: 0,
            bytes: Cow::Owned(bytes),
            marker: None,
        }
    }

    /// Only the positional signature, ignoring the marker.
    pub fn matches_prefix(&self, content: &[u8]) -> bool {
        content
            .get(self.offset..self.offset + self.bytes.len())
            .is_some_and(|window| window == self.bytes.as_ref())
    }

    pub fn matches(&self, content: &[u8]) -> bool {
        if !self.matches_prefix(content) {
            return false;
        }
        match &self.marker {
            Some(marker) => memchr::memmem::find(content, marker).is_some(),
            None => true,
        }
    }
}

/// Everything the crate knows about one document type.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    pub mime_type: String,
    pub kind: ParserKind,
    pub description: String,
    /// Lowercase extensions without the leading dot.
    pub extensions: Vec<String>,
    /// Alternative MIME spellings that resolve to this format.
    pub aliases: Vec<String>,
    pub magic: Vec<MagicPattern>,
    /// Type-specific size limit, applied in addition to the global one.
    pub max_size: Option<u64>,
}

impl FormatSpec {
    pub fn new<M: Into<String>, D: Into<String>>(mime_type: M, kind: ParserKind, description: D) -> Self {
        Self {
            mime_type: mime_type.into(),
            kind,
            description: description.into(),
            extensions: Vec::new(),
            aliases: Vec::new(),
            magic: Vec::new(),
            max_size: None,
        }
    }

    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| normalize_extension(e)).collect();
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_ascii_lowercase()).collect();
        self
    }

    pub fn magic(mut self, pattern: MagicPattern) -> Self {
        self.magic.push(pattern);
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn has_magic(&self) -> bool {
        !self.magic.is_empty()
    }

    pub fn matches_magic(&self, content: &[u8]) -> bool {
        self.magic.iter().any(|pattern| pattern.matches(content))
    }

    /// Positional check only; used for consistency checks where a container marker
    /// may legitimately sit outside a truncated buffer.
    pub fn matches_magic_prefix(&self, content: &[u8]) -> bool {
        self.magic.iter().any(|pattern| pattern.matches_prefix(content))
    }

    pub fn answers_to(&self, mime_type: &str) -> bool {
        let mime = normalize_mime(mime_type);
        self.mime_type == mime || self.aliases.iter().any(|alias| *alias == mime)
    }
}

static BUILTIN_FORMATS: Lazy<Vec<FormatSpec>> = Lazy::new(|| {
    vec![
        FormatSpec::new(PDF_MIME_TYPE, ParserKind::PDF, "PDF document")
            .extensions(&["pdf"])
            .aliases(&["application/x-pdf"])
            .magic(MagicPattern::prefix(b"%PDF-"))
            .max_size(10 * MB),
        FormatSpec::new(DOCX_MIME_TYPE, ParserKind::DOCX, "Word document")
            .extensions(&["docx"])
            .magic(MagicPattern::prefix(b"PK\x03\x04").with_marker(b"word/"))
            .max_size(10 * MB),
        FormatSpec::new(LEGACY_WORD_MIME_TYPE, ParserKind::DOC, "Legacy Word document")
            .extensions(&["doc"])
            .magic(MagicPattern::prefix(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]))
            .max_size(10 * MB),
        FormatSpec::new(RTF_MIME_TYPE, ParserKind::RTF, "Rich Text document")
            .extensions(&["rtf"])
            .aliases(&["text/rtf"])
            .magic(MagicPattern::prefix(b"{\\rtf"))
            .max_size(5 * MB),
        FormatSpec::new(PLAIN_TEXT_MIME_TYPE, ParserKind::TEXT, "Plain text")
            .extensions(&["txt", "text"])
            .max_size(2 * MB),
    ]
});

/// Ordered table of known formats. Earlier entries win magic-number ties.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatCatalog {
    formats: Vec<FormatSpec>,
}

impl FormatCatalog {
    pub fn builtin() -> Self {
        Self {
            formats: BUILTIN_FORMATS.clone(),
        }
    }

    pub fn empty() -> Self {
        Self { formats: Vec::new() }
    }

    /// Add a format, merging extensions, aliases and signatures into an existing entry
    /// answering to the same MIME type (directly or through an alias).
    pub fn insert(&mut self, spec: FormatSpec) {
        if let Some(existing) = self.formats.iter_mut().find(|f| f.answers_to(&spec.mime_type)) {
            for ext in spec.extensions {
                if !existing.extensions.contains(&ext) {
                    existing.extensions.push(ext);
                }
            }
            for alias in spec.aliases {
                if !existing.aliases.contains(&alias) {
                    existing.aliases.push(alias);
                }
            }
            for pattern in spec.magic {
                if !existing.magic.contains(&pattern) {
                    existing.magic.push(pattern);
                }
            }
            if existing.max_size.is_none() {
                existing.max_size = spec.max_size;
            }
        } else {
            self.formats.push(spec);
        }
    }

    pub fn formats(&self) -> &[FormatSpec] {
        &self.formats
    }

    pub fn by_mime(&self, mime_type: &str) -> Option<&FormatSpec> {
        self.formats.iter().find(|f| f.answers_to(mime_type))
    }

    pub fn by_extension(&self, extension: &str) -> Option<&FormatSpec> {
        let ext = normalize_extension(extension);
        self.formats.iter().find(|f| f.extensions.contains(&ext))
    }

    pub fn by_kind(&self, kind: &ParserKind) -> Option<&FormatSpec> {
        self.formats.iter().find(|f| &f.kind == kind)
    }

    /// First format whose signature matches.
    pub fn match_magic(&self, content: &[u8]) -> Option<&FormatSpec> {
        self.formats.iter().find(|f| f.matches_magic(content))
    }

    pub fn supported_mime_types(&self) -> Vec<String> {
        self.formats.iter().map(|f| f.mime_type.clone()).collect()
    }

    pub fn is_supported(&self, mime_type: &str) -> bool {
        self.by_mime(mime_type).is_some()
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercased MIME essence without parameters (`text/plain; charset=utf-8` → `text/plain`).
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Lowercase extension of a filename hint, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}
