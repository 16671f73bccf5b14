//! Plain text decoder.

use crate::Result;
use crate::plugins::{DecoderCapability, Plugin};
use crate::types::RawContent;
use async_trait::async_trait;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Plain text decoder.
///
/// Accepts UTF-8 (with or without BOM) and BOM-marked UTF-16. Invalid UTF-8 is decoded
/// lossily and reported as a warning instead of failing.
pub struct PlainTextDecoder;

impl PlainTextDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for PlainTextDecoder {
    fn name(&self) -> &str {
        "plain-text-decoder"
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
        "Decodes plain text résumés"
    }
}

#[async_trait]
impl DecoderCapability for PlainTextDecoder {
    async fn decode(&self, content: &[u8]) -> Result<RawContent> {
        let (text, warning) = decode_text(content);
        let mut raw = RawContent::from_text(text);
        raw.warnings.extend(warning);
        Ok(raw)
    }

    fn supported_mime_types(&self) -> &[&str] {
        &["text/plain"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "text"]
    }
}

/// Decode text bytes, returning a warning when bytes had to be replaced.
pub(crate) fn decode_text(content: &[u8]) -> (String, Option<String>) {
    if let Some(rest) = content.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = content.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes);
    }

    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    match validate_utf8(content) {
        Some(text) => (text.to_string(), None),
        None => (
            String::from_utf8_lossy(content).into_owned(),
            Some("Text is not valid UTF-8; undecodable bytes were replaced".to_string()),
        ),
    }
}

#[cfg(feature = "simd-utf8")]
fn validate_utf8(content: &[u8]) -> Option<&str> {
    simdutf8::basic::from_utf8(content).ok()
}

#[cfg(not(feature = "simd-utf8"))]
fn validate_utf8(content: &[u8]) -> Option<&str> {
    std::str::from_utf8(content).ok()
}

fn decode_utf16(content: &[u8], to_unit: fn([u8; 2]) -> u16) -> (String, Option<String>) {
    let units: Vec<u16> = content.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]])).collect();
    let mut warning = None;
    let text: String = char::decode_utf16(units)
        .map(|unit| {
            unit.unwrap_or_else(|_| {
                warning = Some("Text contains invalid UTF-16; undecodable units were replaced".to_string());
                char::REPLACEMENT_CHARACTER
            })
        })
        .collect();
    if content.len() % 2 != 0 && warning.is_none() {
        warning = Some("UTF-16 text has a dangling trailing byte".to_string());
    }
    (text, warning)
}
