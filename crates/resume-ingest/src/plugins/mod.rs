//! Plugin system for decoders.
//!
//! - [`Plugin`] - identification and lifecycle hooks shared by every plugin
//! - [`DecoderCapability`] - per-format text and structure extraction
//! - [`DecoderRegistry`] - maps parser kinds to prioritized decoders
//!
//! New formats are added by implementing [`DecoderCapability`] and registering it;
//! detection picks up the declared MIME types, extensions and magic numbers through
//! [`DecoderRegistry::catalog`].

mod decoder;
pub mod registry;
mod traits;

pub use decoder::{DEFAULT_PRIORITY, DecoderCapability};
pub use registry::{DecoderHandle, DecoderRegistry};
pub use traits::Plugin;
