//! Built-in decoders.
//!
//! Every decoder implements [`crate::plugins::DecoderCapability`]. Format-specific
//! decoders sit behind the `pdf` and `office` features; plain text and RTF need no
//! extra dependencies and are always available.

use crate::Result;
use crate::core::formats::ParserKind;
use crate::plugins::DecoderRegistry;
use std::sync::Arc;

pub mod rtf;
pub mod text;

#[cfg(feature = "office")]
pub mod docx;

#[cfg(feature = "pdf")]
pub mod pdf;

pub use rtf::RtfDecoder;
pub use text::PlainTextDecoder;

#[cfg(feature = "office")]
pub use docx::{DocxDecoder, DocxXmlScanDecoder};

#[cfg(feature = "pdf")]
pub use pdf::{PdfDecoder, PdfStreamScanDecoder};

/// Register the built-in decoders with `registry`.
///
/// Called by [`DecoderRegistry::new`]. Legacy Word (`.doc`) has no built-in decoder:
/// such files are detected and validated, then rejected as unsupported unless a
/// decoder is registered for [`ParserKind::DOC`].
pub fn register_default_decoders(registry: &DecoderRegistry) -> Result<()> {
    registry.register(ParserKind::TEXT, Arc::new(PlainTextDecoder::new()))?;
    registry.register(ParserKind::RTF, Arc::new(RtfDecoder::new()))?;

    #[cfg(feature = "pdf")]
    {
        registry.register(ParserKind::PDF, Arc::new(PdfDecoder::new()))?;
        registry.register(ParserKind::PDF, Arc::new(PdfStreamScanDecoder::new()))?;
    }

    #[cfg(feature = "office")]
    {
        registry.register(ParserKind::DOCX, Arc::new(DocxDecoder::new()))?;
        registry.register(ParserKind::DOCX, Arc::new(DocxXmlScanDecoder::new()))?;
    }

    Ok(())
}
