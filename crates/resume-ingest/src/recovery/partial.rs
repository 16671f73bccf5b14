//! Partial-content recovery from damaged input.

use crate::error::ParserError;
use crate::plugins::{DecoderCapability, Plugin};
use crate::recovery::timeout::with_timeout;
use crate::types::{RawContent, Salvage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// When a salvage is good enough to return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialRecoveryConfig {
    pub enabled: bool,
    /// Minimum share of the expected text length, 0..=1.
    pub threshold: f64,
    /// Minimum salvaged characters regardless of the expected length.
    pub min_chars: usize,
}

impl Default for PartialRecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.3,
            min_chars: 50,
        }
    }
}

impl PartialRecoveryConfig {
    /// Both the absolute and the relative minimum must hold.
    pub fn accepts(&self, salvage: &Salvage) -> bool {
        let salvaged = salvaged_chars(&salvage.content);
        let required = self.threshold * salvage.expected_chars as f64;
        salvaged >= self.min_chars && salvaged as f64 >= required
    }
}

fn salvaged_chars(content: &RawContent) -> usize {
    content.text.trim().chars().count()
}

/// Try each partial-capable decoder in order and return the first acceptable salvage,
/// tagged with an explanatory warning, together with the salvaging decoder's name.
pub async fn recover_partial(
    config: &PartialRecoveryConfig,
    decoders: &[&Arc<dyn DecoderCapability>],
    content: &[u8],
    limit: Duration,
    original: &ParserError,
) -> Option<(RawContent, String)> {
    if !config.enabled {
        return None;
    }

    for decoder in decoders.iter().filter(|d| d.supports_partial()) {
        let salvage = match with_timeout(limit, decoder.decode_partial(content)).await {
            Ok(salvage) => salvage,
            Err(err) => {
                tracing::debug!(decoder = decoder.name(), error = %err, "Partial decode failed");
                continue;
            }
        };

        let salvaged = salvaged_chars(&salvage.content);
        if !config.accepts(&salvage) {
            tracing::info!(
                decoder = decoder.name(),
                salvaged,
                expected = salvage.expected_chars,
                min_chars = config.min_chars,
                threshold = config.threshold,
                "Partial recovery rejected: too little content"
            );
            continue;
        }

        tracing::info!(
            decoder = decoder.name(),
            salvaged,
            expected = salvage.expected_chars,
            "Partial recovery accepted"
        );
        let mut recovered = salvage.content;
        recovered.warnings.push(format!(
            "Document was only partially recovered ({} of an estimated {} characters) after: {}",
            salvaged,
            salvage.expected_chars.max(salvaged),
            original.message()
        ));
        return Some((recovered, decoder.name().to_string()));
    }

    None
}
