//! Decoder registration and lookup.
//!
//! The [`DecoderRegistry`] maps a [`ParserKind`] to the decoders able to serve it,
//! ordered by priority. It is an explicit value: construct one, share it as
//! `Arc<DecoderRegistry>`, and hand it to every [`crate::DocumentParser`] that should
//! see the same decoders.

use crate::core::formats::{FormatCatalog, FormatSpec, ParserKind};
use crate::error::{ParserError, Result};
use crate::plugins::{DecoderCapability, Plugin};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Validate a plugin name before registration.
///
/// Names cannot be empty or contain whitespace.
fn validate_plugin_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ParserError::configuration("Plugin name cannot be empty"));
    }

    if name.contains(char::is_whitespace) {
        return Err(ParserError::configuration(format!(
            "Plugin name '{}' cannot contain whitespace",
            name
        )));
    }

    Ok(())
}

/// Decoders resolved for one parser kind.
///
/// `primary` is the highest-priority decoder; `fallbacks` hold the rest in descending
/// priority and serve as graceful-degradation strategies.
#[derive(Clone)]
pub struct DecoderHandle {
    kind: ParserKind,
    primary: Arc<dyn DecoderCapability>,
    fallbacks: Vec<Arc<dyn DecoderCapability>>,
}

impl DecoderHandle {
    pub fn kind(&self) -> &ParserKind {
        &self.kind
    }

    pub fn primary(&self) -> &Arc<dyn DecoderCapability> {
        &self.primary
    }

    pub fn fallbacks(&self) -> &[Arc<dyn DecoderCapability>] {
        &self.fallbacks
    }

    /// Primary first, then every fallback.
    pub fn strategies(&self) -> impl Iterator<Item = &Arc<dyn DecoderCapability>> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    /// Keep only the primary decoder.
    pub fn without_fallbacks(mut self) -> Self {
        self.fallbacks.clear();
        self
    }
}

impl std::fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("kind", &self.kind)
            .field("primary", &self.primary.name())
            .field(
                "fallbacks",
                &self.fallbacks.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    decoders: HashMap<ParserKind, BTreeMap<i32, Vec<Arc<dyn DecoderCapability>>>>,
    name_index: HashMap<String, (ParserKind, i32)>,
}

impl RegistryState {
    fn take(&mut self, name: &str) -> Option<Arc<dyn DecoderCapability>> {
        let (kind, priority) = self.name_index.remove(name)?;
        let priority_map = self.decoders.get_mut(&kind)?;
        let bucket = priority_map.get_mut(&priority)?;
        let position = bucket.iter().position(|d| d.name() == name)?;
        let decoder = bucket.remove(position);
        if bucket.is_empty() {
            priority_map.remove(&priority);
        }
        if priority_map.is_empty() {
            self.decoders.remove(&kind);
        }
        Some(decoder)
    }
}

/// Registry of decoder capabilities keyed by parser kind.
///
/// # Thread Safety
///
/// Registration and removal take an exclusive lock; lookups share a read lock.
/// Plugin lifecycle hooks run outside the lock.
pub struct DecoderRegistry {
    state: RwLock<RegistryState>,
}

impl DecoderRegistry {
    /// Registry with the built-in decoders for the enabled features.
    pub fn new() -> Self {
        let registry = Self::new_empty();
        if let Err(err) = crate::decoders::register_default_decoders(&registry) {
            tracing::warn!(error = %err, "Failed to register a built-in decoder");
        }
        registry
    }

    /// Registry without any decoder, for full control over registration.
    pub fn new_empty() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register `decoder` for `kind`.
    ///
    /// A decoder registered again under the same name replaces the earlier one.
    ///
    /// # Errors
    ///
    /// `Configuration` when the name is invalid, the decoder declares no MIME types
    /// or no extensions, or one of its MIME types already belongs to another kind.
    /// Errors from [`crate::plugins::Plugin::initialize`] propagate and leave the
    /// registry unchanged.
    pub fn register(&self, kind: ParserKind, decoder: Arc<dyn DecoderCapability>) -> Result<()> {
        let name = decoder.name().to_string();
        validate_plugin_name(&name)?;

        if decoder.supported_mime_types().is_empty() {
            return Err(ParserError::configuration(format!(
                "Decoder '{}' must declare at least one supported MIME type",
                name
            ))
            .with_parser_kind(kind));
        }
        if decoder.supported_extensions().is_empty() {
            return Err(ParserError::configuration(format!(
                "Decoder '{}' must declare at least one supported extension",
                name
            ))
            .with_parser_kind(kind));
        }

        let catalog = self.catalog();
        for mime in decoder.supported_mime_types() {
            if let Some(owner) = catalog.by_mime(mime)
                && owner.kind != kind
            {
                return Err(ParserError::configuration(format!(
                    "Decoder '{}' declares {} which is already handled by '{}'",
                    name, mime, owner.kind
                ))
                .with_parser_kind(kind));
            }
        }

        decoder.initialize()?;

        let priority = decoder.priority();
        let replaced = {
            let mut state = self.state.write();
            let replaced = state.take(&name);
            state
                .decoders
                .entry(kind.clone())
                .or_default()
                .entry(priority)
                .or_default()
                .push(Arc::clone(&decoder));
            state.name_index.insert(name.clone(), (kind.clone(), priority));
            replaced
        };

        if let Some(old) = replaced {
            shutdown_quietly(old.as_ref());
        }

        tracing::debug!(decoder = %name, kind = %kind, priority, "Registered decoder");
        Ok(())
    }

    /// Remove every decoder registered for `kind`, shutting each down.
    pub fn unregister(&self, kind: &ParserKind) -> Result<()> {
        let removed: Vec<Arc<dyn DecoderCapability>> = {
            let mut state = self.state.write();
            let Some(priority_map) = state.decoders.remove(kind) else {
                return Ok(());
            };
            let removed: Vec<_> = priority_map.into_values().flatten().collect();
            for decoder in &removed {
                state.name_index.remove(decoder.name());
            }
            removed
        };

        for decoder in &removed {
            shutdown_quietly(decoder.as_ref());
        }
        tracing::debug!(kind = %kind, count = removed.len(), "Unregistered decoders");
        Ok(())
    }

    /// Remove a single decoder by name.
    pub fn remove(&self, name: &str) -> Result<()> {
        let removed = self.state.write().take(name);
        if let Some(decoder) = removed {
            decoder.shutdown()?;
        }
        Ok(())
    }

    /// Resolve the decoders for `kind`.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` when nothing is registered for the kind.
    pub fn create_decoder(&self, kind: &ParserKind) -> Result<DecoderHandle> {
        let ordered: Vec<Arc<dyn DecoderCapability>> = {
            let state = self.state.read();
            state
                .decoders
                .get(kind)
                .into_iter()
                .flat_map(|priority_map| priority_map.iter().rev())
                .flat_map(|(_, bucket)| bucket.iter().cloned())
                .collect()
        };

        let mut ordered = ordered.into_iter();
        let Some(primary) = ordered.next() else {
            return Err(ParserError::unsupported_type(
                format!("No decoder registered for '{}'", kind),
                self.supported_mime_types(),
            )
            .with_parser_kind(kind.clone()));
        };

        Ok(DecoderHandle {
            kind: kind.clone(),
            primary,
            fallbacks: ordered.collect(),
        })
    }

    /// Kinds with at least one decoder, sorted.
    pub fn supported_kinds(&self) -> Vec<ParserKind> {
        let mut kinds: Vec<ParserKind> = self.state.read().decoders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// MIME types some registered decoder declares, sorted and deduplicated.
    pub fn supported_mime_types(&self) -> Vec<String> {
        let state = self.state.read();
        let mut mimes: Vec<String> = state
            .decoders
            .values()
            .flat_map(|priority_map| priority_map.values().flatten())
            .flat_map(|decoder| decoder.supported_mime_types().iter().map(|m| m.to_string()))
            .collect();
        mimes.sort();
        mimes.dedup();
        mimes
    }

    /// Registered decoder names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().name_index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Built-in format table extended with every registered decoder's declarations.
    pub fn catalog(&self) -> FormatCatalog {
        let mut catalog = FormatCatalog::builtin();
        let state = self.state.read();
        for (kind, priority_map) in &state.decoders {
            for decoder in priority_map.values().flatten() {
                let magic = decoder.magic_numbers();
                for mime in decoder.supported_mime_types() {
                    let mut spec = FormatSpec::new(*mime, kind.clone(), decoder.description())
                        .extensions(decoder.supported_extensions());
                    for pattern in &magic {
                        spec = spec.magic(pattern.clone());
                    }
                    catalog.insert(spec);
                }
            }
        }
        catalog
    }

    /// Shut down and remove every decoder.
    pub fn shutdown_all(&self) -> Result<()> {
        let removed: Vec<Arc<dyn DecoderCapability>> = {
            let mut state = self.state.write();
            state.name_index.clear();
            state
                .decoders
                .drain()
                .flat_map(|(_, priority_map)| priority_map.into_values().flatten())
                .collect()
        };
        for decoder in &removed {
            shutdown_quietly(decoder.as_ref());
        }
        Ok(())
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn shutdown_quietly(decoder: &dyn DecoderCapability) {
    if let Err(err) = decoder.shutdown() {
        tracing::warn!(decoder = decoder.name(), error = %err, "Decoder shutdown failed");
    }
}
