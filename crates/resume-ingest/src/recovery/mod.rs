//! Recovery engine wrapping decoder calls.
//!
//! One decode call goes through, from the outside in:
//!
//! 1. the circuit breaker for the parser kind (when enabled)
//! 2. graceful degradation over the primary decoder and its fallbacks
//! 3. retry with exponential backoff for each strategy
//! 4. a deadline on every single attempt
//!
//! and, once every strategy is exhausted, partial recovery from the decoders that
//! support it. The breaker records exactly one outcome per call.

pub mod circuit_breaker;
pub mod degradation;
pub mod partial;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakers, CircuitSnapshot, CircuitState};
pub use degradation::{Degraded, run_strategies};
pub use partial::PartialRecoveryConfig;
pub use retry::{RetryObserver, RetryPolicy, retry};
pub use timeout::with_timeout;

use crate::core::formats::ParserKind;
use crate::error::Result;
use crate::plugins::{DecoderCapability, DecoderHandle, Plugin};
use crate::types::RawContent;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Everything the engine needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Deadline for a single decode attempt.
    pub timeout: Duration,
    /// Retry failed attempts. When false every strategy runs exactly once.
    pub enable_retry: bool,
    pub retry: RetryPolicy,
    pub partial: PartialRecoveryConfig,
    /// `None` disables the breaker.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Fall back to lower-priority decoders when the primary fails.
    pub enable_degradation: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            enable_retry: true,
            retry: RetryPolicy::default(),
            partial: PartialRecoveryConfig::default(),
            circuit_breaker: None,
            enable_degradation: true,
        }
    }
}

/// Decoder output after recovery.
#[derive(Debug, Clone)]
pub struct Recovered {
    pub content: RawContent,
    /// Decoder that produced `content`.
    pub decoder: String,
    /// Set when a fallback decoder produced `content`.
    pub fallback_used: Option<String>,
    pub partial: bool,
    /// Decode attempts across all strategies.
    pub attempts: u32,
}

/// Applies timeout, retry, degradation, partial recovery and circuit breaking.
///
/// Breaker state is owned by the engine; share one engine (through the parser that
/// owns it) to share breaker state between callers.
pub struct RecoveryEngine {
    config: RecoveryConfig,
    breakers: Option<CircuitBreakers>,
    observer: Option<RetryObserver>,
}

impl RecoveryEngine {
    pub fn new(config: RecoveryConfig) -> Self {
        let breakers = config.circuit_breaker.map(CircuitBreakers::new);
        Self {
            config,
            breakers,
            observer: None,
        }
    }

    /// Observer invoked before every retry.
    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn circuit_breakers(&self) -> Option<&CircuitBreakers> {
        self.breakers.as_ref()
    }

    /// Breaker state for `kind`; always closed when breaking is disabled.
    pub fn circuit_state(&self, kind: &ParserKind) -> CircuitState {
        self.breakers
            .as_ref()
            .map(|b| b.state(kind))
            .unwrap_or(CircuitState::Closed)
    }

    fn policy(&self) -> RetryPolicy {
        if self.config.enable_retry {
            self.config.retry.clone()
        } else {
            RetryPolicy::no_retry()
        }
    }

    /// Run any fallible operation under the breaker for `kind`, with retries and a
    /// per-attempt deadline.
    pub async fn execute<T, F, Fut>(&self, kind: &ParserKind, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = match &self.breakers {
            Some(breakers) => Some(breakers.get(kind).acquire()?),
            None => None,
        };

        let policy = self.policy();
        let limit = self.config.timeout;
        let outcome = retry(&policy, self.observer.as_ref(), || with_timeout(limit, operation()))
            .await
            .map(|(value, _)| value);

        if let Some(permit) = permit {
            match &outcome {
                Ok(_) => permit.record_success(),
                Err(err) if err.kind().is_retryable() => permit.record_failure(),
                Err(_) => {}
            }
        }
        outcome
    }

    /// Decode `content` with the decoders in `handle`.
    pub async fn decode(&self, handle: &DecoderHandle, content: &[u8]) -> Result<Recovered> {
        let kind = handle.kind();
        let permit = match &self.breakers {
            Some(breakers) => Some(breakers.get(kind).acquire()?),
            None => None,
        };

        let outcome = self.decode_with_recovery(handle, content).await;

        if let Some(permit) = permit {
            match &outcome {
                Ok(_) => permit.record_success(),
                // Input-level errors say nothing about decoder health.
                Err(err) if err.kind().is_retryable() => permit.record_failure(),
                Err(_) => {}
            }
        }
        outcome
    }

    async fn decode_with_recovery(&self, handle: &DecoderHandle, content: &[u8]) -> Result<Recovered> {
        let strategies: Vec<&Arc<dyn DecoderCapability>> = if self.config.enable_degradation {
            handle.strategies().collect()
        } else {
            vec![handle.primary()]
        };

        let policy = self.policy();
        let policy = &policy;
        let observer = self.observer.as_ref();
        let limit = self.config.timeout;

        let outcome = run_strategies(
            &strategies,
            |decoder| decoder.name().to_string(),
            |decoder| async move { retry(policy, observer, || with_timeout(limit, decoder.decode(content))).await },
        )
        .await;

        match outcome {
            Ok(degraded) => {
                let earlier: u32 = degraded
                    .failures
                    .iter()
                    .map(|(_, err)| err.context().attempts.unwrap_or(1))
                    .sum();
                let (mut content, attempts) = degraded.value;
                let fallback_used = if degraded.index > 0 {
                    let primary = handle.primary().name();
                    content.warnings.push(format!(
                        "Primary decoder '{}' failed; text produced by fallback '{}'",
                        primary, degraded.strategy
                    ));
                    Some(degraded.strategy.clone())
                } else {
                    None
                };
                Ok(Recovered {
                    content,
                    decoder: degraded.strategy,
                    fallback_used,
                    partial: false,
                    attempts: earlier + attempts,
                })
            }
            Err(err) => {
                if !err.kind().is_retryable() || !self.config.partial.enabled {
                    return Err(err);
                }
                let attempts = err.context().attempts.unwrap_or(1);
                match partial::recover_partial(&self.config.partial, &strategies, content, limit, &err).await {
                    Some((content, decoder)) => Ok(Recovered {
                        content,
                        fallback_used: (decoder != handle.primary().name()).then(|| decoder.clone()),
                        decoder,
                        partial: true,
                        attempts,
                    }),
                    None => Err(err),
                }
            }
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}
