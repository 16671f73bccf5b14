//! Base plugin trait definition.
//!
//! Every decoder implements [`Plugin`], which provides identification and lifecycle
//! hooks called by the [`crate::plugins::DecoderRegistry`].

use crate::Result;

/// Base trait that all plugins must implement.
///
/// # Thread Safety
///
/// Plugins are shared as `Arc<dyn ...>` across concurrent parse calls and must be
/// `Send + Sync`. Lifecycle hooks take `&self`; plugins that hold state across
/// `initialize`/`shutdown` use interior mutability.
///
/// # Example
///
/// ```rust
/// use resume_ingest::plugins::Plugin;
/// use resume_ingest::Result;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct WarmDecoder {
///     ready: AtomicBool,
/// }
///
/// impl Plugin for WarmDecoder {
///     fn name(&self) -> &str {
///         "warm-decoder"
///     }
///
///     fn version(&self) -> String {
///         "1.0.0".to_string()
///     }
///
///     fn initialize(&self) -> Result<()> {
///         self.ready.store(true, Ordering::Release);
///         Ok(())
///     }
///
///     fn shutdown(&self) -> Result<()> {
///         self.ready.store(false, Ordering::Release);
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// Unique, whitespace-free identifier, e.g. `"pdf-decoder"`.
    fn name(&self) -> &str;

    /// Semantic version of the plugin.
    fn version(&self) -> String;

    /// Called once on registration. Returning an error aborts the registration.
    fn initialize(&self) -> Result<()>;

    /// Called on unregistration and on [`crate::plugins::DecoderRegistry::shutdown_all`].
    ///
    /// Errors are logged; they never keep a plugin registered.
    fn shutdown(&self) -> Result<()>;

    fn description(&self) -> &str {
        ""
    }
}
