//! Throttled progress reporting.
//!
//! A [`ProgressReporter`] owns a slice of the overall `[0, 100]` range. Child reporters
//! created with [`ProgressReporter::child`] or [`ProgressReporter::stage`] remap their own
//! `[0, 100]` into a slice of the parent, so multi-step pipelines compose without
//! knowing where they sit in the whole.
//!
//! All reporters derived from one root share a sink and one throttle: an update is
//! delivered only when overall progress moved by at least [`MIN_STEP_PERCENT`] or the
//! throttle interval passed since the last delivered update. Overall 0% and 100% are
//! always delivered.

use crate::error::{ParserError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Minimum change in overall progress that bypasses the time throttle.
pub const MIN_STEP_PERCENT: f64 = 5.0;

/// Default minimum time between two delivered updates.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// One delivered progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Overall progress, 0..=100.
    pub percent: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Name of the stage that produced the update, when reporting through a stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Receives delivered updates.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// A named slice of a reporter's range.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStage {
    pub name: String,
    pub start: f64,
    pub end: f64,
}

impl ProgressStage {
    pub fn new<S: Into<String>>(name: S, start: f64, end: f64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }
}

/// Stages of a single `parse` call.
pub fn parse_stages() -> Vec<ProgressStage> {
    vec![
        ProgressStage::new("validating", 0.0, 10.0),
        ProgressStage::new("detecting", 10.0, 20.0),
        ProgressStage::new("decoding", 20.0, 90.0),
        ProgressStage::new("finalizing", 90.0, 100.0),
    ]
}

#[derive(Debug, Default)]
struct Throttle {
    last_percent: Option<f64>,
    last_at: Option<Instant>,
}

struct Shared {
    sink: Option<ProgressCallback>,
    interval: Duration,
    throttle: Mutex<Throttle>,
}

/// Throttled, composable progress reporter.
///
/// Cloning is cheap; clones share sink and throttle.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<Shared>,
    /// Overall range covered by this reporter.
    start: f64,
    end: f64,
    stage: Option<String>,
    stages: Arc<[ProgressStage]>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("stage", &self.stage)
            .field("interval", &self.shared.interval)
            .finish()
    }
}

impl ProgressReporter {
    /// Reporter delivering to `callback`, throttled by `interval`.
    pub fn new(callback: ProgressCallback, interval: Duration) -> Self {
        Self::with_sink(Some(callback), interval)
    }

    /// Reporter that delivers nothing.
    pub fn silent() -> Self {
        Self::with_sink(None, DEFAULT_INTERVAL)
    }

    /// Reporter paired with a receiver of every delivered event.
    pub fn channel(interval: Duration) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: ProgressCallback = Arc::new(move |event: &ProgressEvent| {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(event.clone());
        });
        (Self::new(callback, interval), rx)
    }

    fn with_sink(sink: Option<ProgressCallback>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                interval,
                throttle: Mutex::new(Throttle::default()),
            }),
            start: 0.0,
            end: 100.0,
            stage: None,
            stages: Arc::from(Vec::new()),
        }
    }

    /// Declare named stages over this reporter's own `[0, 100]` range.
    ///
    /// Stages must lie within `[0, 100]` and have `start <= end`.
    pub fn with_stages(mut self, stages: Vec<ProgressStage>) -> Result<Self> {
        for stage in &stages {
            if !(0.0..=100.0).contains(&stage.start) || !(0.0..=100.0).contains(&stage.end) || stage.start > stage.end {
                return Err(ParserError::configuration(format!(
                    "Invalid progress stage '{}': range {}..{}",
                    stage.name, stage.start, stage.end
                )));
            }
        }
        self.stages = Arc::from(stages);
        Ok(self)
    }

    pub fn is_silent(&self) -> bool {
        self.shared.sink.is_none()
    }

    /// Overall range covered by this reporter.
    pub fn range(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    pub fn stage_name(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    /// Map a local percentage into the overall range.
    pub fn map_percent(&self, percent: f64) -> f64 {
        let local = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        self.start + (self.end - self.start) * local / 100.0
    }

    /// Child reporter covering `[start, end]` of this reporter's local range.
    pub fn child(&self, start: f64, end: f64) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            shared: Arc::clone(&self.shared),
            start: self.map_percent(start),
            end: self.map_percent(end),
            stage: self.stage.clone(),
            stages: Arc::from(Vec::new()),
        }
    }

    /// Child reporter for a declared stage. Its updates carry the stage name.
    pub fn stage(&self, name: &str) -> Result<Self> {
        let stage = self
            .stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ParserError::configuration(format!("Unknown progress stage '{}'", name)))?;
        let mut child = self.child(stage.start, stage.end);
        child.stage = Some(stage.name.clone());
        Ok(child)
    }

    /// Report `percent` (0..=100 of this reporter's range). Returns whether the update was delivered.
    pub fn update<M: Into<String>>(&self, percent: f64, message: M) -> bool {
        self.deliver(percent, message.into(), None)
    }

    pub fn update_with_details<M: Into<String>, D: Into<String>>(&self, percent: f64, message: M, details: D) -> bool {
        self.deliver(percent, message.into(), Some(details.into()))
    }

    /// Report the end of this reporter's range.
    pub fn finish<M: Into<String>>(&self, message: M) -> bool {
        self.update(100.0, message)
    }

    fn deliver(&self, percent: f64, message: String, details: Option<String>) -> bool {
        let Some(sink) = &self.shared.sink else {
            return false;
        };

        let overall = self.map_percent(percent);
        let now = Instant::now();
        {
            let mut throttle = self.shared.throttle.lock();
            let boundary = overall <= 0.0 || overall >= 100.0;
            let stepped = throttle
                .last_percent
                .map(|last| (overall - last).abs() >= MIN_STEP_PERCENT)
                .unwrap_or(true);
            let waited = throttle
                .last_at
                .map(|at| now.duration_since(at) >= self.shared.interval)
                .unwrap_or(true);
            if !(boundary || stepped || waited) {
                return false;
            }
            throttle.last_percent = Some(overall);
            throttle.last_at = Some(now);
        }

        let event = ProgressEvent {
            percent: overall,
            message,
            details,
            stage: self.stage.clone(),
        };
        sink(&event);
        true
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}
