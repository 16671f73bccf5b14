//! Decoder capability trait.
//!
//! A decoder turns the bytes of one family of formats into [`RawContent`]. The crate
//! never inspects format internals itself; everything format-specific lives behind
//! this trait.

use crate::core::formats::MagicPattern;
use crate::error::{ParserError, Result};
use crate::plugins::Plugin;
use crate::types::{RawContent, Salvage};
use async_trait::async_trait;

/// Default decoder priority.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Per-format text and structure extraction.
///
/// Decoders must declare at least one MIME type and one extension; the registry
/// rejects a decoder that does not. Signatures from [`magic_numbers`](Self::magic_numbers)
/// extend content-based detection for the declared MIME types.
///
/// `decode` may be abandoned at any await point when a deadline fires or the caller
/// drops the parse future. CPU-heavy decoders should run their work on
/// `tokio::task::spawn_blocking` so that abandoning the future frees the executor.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use resume_ingest::plugins::{DecoderCapability, Plugin};
/// use resume_ingest::types::RawContent;
/// use resume_ingest::Result;
///
/// struct UpperDecoder;
///
/// impl Plugin for UpperDecoder {
///     fn name(&self) -> &str { "upper-decoder" }
///     fn version(&self) -> String { "1.0.0".to_string() }
///     fn initialize(&self) -> Result<()> { Ok(()) }
///     fn shutdown(&self) -> Result<()> { Ok(()) }
/// }
///
/// #[async_trait]
/// impl DecoderCapability for UpperDecoder {
///     async fn decode(&self, content: &[u8]) -> Result<RawContent> {
///         Ok(RawContent::from_text(String::from_utf8_lossy(content).to_uppercase()))
///     }
///
///     fn supported_mime_types(&self) -> &[&str] {
///         &["text/plain"]
///     }
///
///     fn supported_extensions(&self) -> &[&str] {
///         &["txt"]
///     }
/// }
/// ```
#[async_trait]
pub trait DecoderCapability: Plugin {
    /// Decode the complete document.
    ///
    /// Structurally broken input should surface as `Corrupted`, other decoder
    /// failures as `Parse`.
    async fn decode(&self, content: &[u8]) -> Result<RawContent>;

    fn supported_mime_types(&self) -> &[&str];

    /// Lowercase extensions without the leading dot.
    fn supported_extensions(&self) -> &[&str];

    /// Signatures identifying the declared MIME types.
    fn magic_numbers(&self) -> Vec<MagicPattern> {
        Vec::new()
    }

    /// Higher priority decoders are tried first; the rest become fallbacks.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Whether [`decode_partial`](Self::decode_partial) is implemented.
    fn supports_partial(&self) -> bool {
        false
    }

    /// Best-effort extraction from damaged input.
    ///
    /// Returns whatever could be salvaged plus an estimate of the intact document's
    /// text length, which partial recovery uses to judge the salvage.
    async fn decode_partial(&self, _content: &[u8]) -> Result<Salvage> {
        Err(ParserError::parse(format!(
            "Decoder '{}' does not support partial recovery",
            self.name()
        ))
        .non_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PlainDecoder;

    impl Plugin for PlainDecoder {
        fn name(&self) -> &str {
            "plain"
        }

        fn version(&self) -> String {
            "0.1.0".to_string()
        }

        fn initialize(&self) -> Result<()> {
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl DecoderCapability for PlainDecoder {
        async fn decode(&self, content: &[u8]) -> Result<RawContent> {
            Ok(RawContent::from_text(String::from_utf8_lossy(content)))
        }

        fn supported_mime_types(&self) -> &[&str] {
            &["text/plain"]
        }

        fn supported_extensions(&self) -> &[&str] {
            &["txt"]
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let decoder = PlainDecoder;
        assert_eq!(decoder.priority(), DEFAULT_PRIORITY);
        assert!(!decoder.supports_partial());
        assert!(decoder.magic_numbers().is_empty());

        let err = decoder.decode_partial(b"abc").await.unwrap_err();
        assert_eq!(err.code(), "PARSE_FAILED");
        assert!(!err.is_retryable());

        let content = decoder.decode(b"hello").await.unwrap();
        assert_eq!(content.text, "hello");
    }
}
