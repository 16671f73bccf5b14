//! Per-kind circuit breaker.
//!
//! State lives in atomics and every transition is a compare-and-swap, so concurrent
//! calls for the same parser kind never observe a torn state. Outcomes are recorded
//! through a [`CallPermit`]; a permit dropped without an outcome (the caller abandoned
//! the call) leaves the counters untouched and hands a half-open probe slot back.

use crate::core::formats::ParserKind;
use crate::error::{ParserError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Sentinel for "no failure recorded yet".
const NEVER: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub reset_timeout: Duration,
    /// Consecutive probe successes needed to close again.
    pub success_threshold: u32,
    /// Failures further apart than this do not accumulate.
    pub monitor_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(60_000),
            success_threshold: 2,
            monitor_window: Duration::from_millis(120_000),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    /// Milliseconds since the last recorded failure.
    pub since_last_failure_ms: Option<u64>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    kind: ParserKind,
    config: CircuitBreakerConfig,
    epoch: Instant,
    state: AtomicU8,
    failures: AtomicU32,
    successes: AtomicU32,
    opened_at_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(kind: ParserKind, config: CircuitBreakerConfig) -> Self {
        Self {
            kind,
            config,
            epoch: Instant::now(),
            state: AtomicU8::new(CLOSED),
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(NEVER),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let last = self.last_failure_ms.load(Ordering::Acquire);
        CircuitSnapshot {
            state: self.state(),
            consecutive_failures: self.failures.load(Ordering::Acquire),
            half_open_successes: self.successes.load(Ordering::Acquire),
            since_last_failure_ms: (last != NEVER).then(|| self.now_ms().saturating_sub(last)),
        }
    }

    /// Force the breaker back to closed with clean counters.
    pub fn reset(&self) {
        self.state.store(CLOSED, Ordering::Release);
        self.failures.store(0, Ordering::Release);
        self.successes.store(0, Ordering::Release);
        self.last_failure_ms.store(NEVER, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Ask permission to call the decoder.
    ///
    /// # Errors
    ///
    /// A non-retryable `Parse` error while the circuit is open, or while a half-open
    /// probe is already in flight.
    pub fn acquire(self: &Arc<Self>) -> Result<CallPermit> {
        loop {
            match self.state.load(Ordering::Acquire) {
                CLOSED => return Ok(CallPermit::new(Arc::clone(self), false)),
                OPEN => {
                    let opened_at = self.opened_at_ms.load(Ordering::Acquire);
                    let elapsed = self.now_ms().saturating_sub(opened_at);
                    let reset_ms = self.config.reset_timeout.as_millis() as u64;
                    if elapsed < reset_ms {
                        return Err(self.open_error(reset_ms - elapsed));
                    }
                    if self
                        .state
                        .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.successes.store(0, Ordering::Release);
                        tracing::info!(kind = %self.kind, "Circuit half-open, allowing a probe");
                    }
                }
                _ => {
                    return if self
                        .probe_in_flight
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        Ok(CallPermit::new(Arc::clone(self), true))
                    } else {
                        Err(self.open_error(0))
                    };
                }
            }
        }
    }

    fn open_error(&self, retry_after_ms: u64) -> ParserError {
        let message = if retry_after_ms > 0 {
            format!(
                "Circuit breaker is open for '{}'; calls resume in {}ms",
                self.kind, retry_after_ms
            )
        } else {
            format!("Circuit breaker for '{}' is probing; call rejected", self.kind)
        };
        ParserError::parse(message)
            .non_retryable()
            .with_parser_kind(self.kind.clone())
    }

    fn on_success(&self, probe: bool) {
        if probe {
            let successes = self.successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.config.success_threshold
                && self
                    .state
                    .compare_exchange(HALF_OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.failures.store(0, Ordering::Release);
                self.successes.store(0, Ordering::Release);
                tracing::info!(kind = %self.kind, "Circuit closed after successful probes");
            }
            self.probe_in_flight.store(false, Ordering::Release);
        } else {
            self.failures.store(0, Ordering::Release);
        }
    }

    fn on_failure(&self, probe: bool) {
        let now = self.now_ms();
        if probe {
            // Timestamp before state: `acquire` reads it as soon as it sees OPEN.
            self.opened_at_ms.store(now, Ordering::Release);
            if self
                .state
                .compare_exchange(HALF_OPEN, OPEN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.successes.store(0, Ordering::Release);
                tracing::warn!(kind = %self.kind, "Probe failed, circuit reopened");
            }
            self.last_failure_ms.store(now, Ordering::Release);
            self.probe_in_flight.store(false, Ordering::Release);
            return;
        }

        let last = self.last_failure_ms.swap(now, Ordering::AcqRel);
        let window_ms = self.config.monitor_window.as_millis() as u64;
        if last != NEVER && now.saturating_sub(last) > window_ms {
            self.failures.store(0, Ordering::Release);
        }
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures < self.config.failure_threshold || self.state.load(Ordering::Acquire) != CLOSED {
            return;
        }
        self.opened_at_ms.store(now, Ordering::Release);
        if self
            .state
            .compare_exchange(CLOSED, OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::warn!(
                kind = %self.kind,
                failures,
                reset_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit opened"
            );
        }
    }
}

/// Permission for one call. Consume it with [`record_success`](Self::record_success)
/// or [`record_failure`](Self::record_failure); dropping it records nothing.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl CallPermit {
    fn new(breaker: Arc<CircuitBreaker>, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.probe_in_flight.store(false, Ordering::Release);
        }
    }
}

/// Lazily created breakers, one per parser kind.
#[derive(Debug, Default)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: DashMap<ParserKind, Arc<CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get(&self, kind: &ParserKind) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(kind) {
            return Arc::clone(existing.value());
        }
        let breaker = self
            .breakers
            .entry(kind.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(kind.clone(), self.config)));
        Arc::clone(breaker.value())
    }

    pub fn state(&self, kind: &ParserKind) -> CircuitState {
        self.breakers
            .get(kind)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}
