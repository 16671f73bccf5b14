//! Windowed batch processing.
//!
//! Inputs are split into windows of `concurrency` items. Every item of a window runs
//! as its own task on a [`JoinSet`]; the next window starts once the whole window has
//! finished. Results land in input order regardless of completion order.

use crate::core::progress::ProgressReporter;
use crate::error::{ParserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use tokio::task::JoinSet;

/// Default number of items processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Window size.
    pub concurrency: usize,
    /// Abort the batch on the first failure instead of collecting it.
    pub stop_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            stop_on_error: false,
        }
    }
}

/// Result of a batch that ran to completion.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// One entry per input, in input order.
    pub results: Vec<Result<T>>,
    /// Failed inputs by index, in input order.
    pub errors: Vec<(usize, ParserError)>,
    pub succeeded: usize,
    pub failed: usize,
}

impl<T> BatchOutcome<T> {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs an async operation over many inputs in windows.
#[derive(Debug, Clone, Default)]
pub struct BatchCoordinator {
    options: BatchOptions,
    progress: Option<ProgressReporter>,
}

impl BatchCoordinator {
    pub fn new(options: BatchOptions) -> Self {
        Self { options, progress: None }
    }

    /// Report completed items through `progress`.
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run `operation` once per input.
    ///
    /// `operation` receives the input's index and the input. With `stop_on_error` the
    /// first failure to complete aborts the rest of its window, skips all later windows
    /// and is returned with the failing index attached as a detail. A panicking task
    /// counts as a `Parse` failure for its input.
    pub async fn process_all<I, T, F, Fut>(&self, inputs: Vec<I>, operation: F) -> Result<BatchOutcome<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = inputs.len();
        let window_size = self.options.concurrency.max(1);
        let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;

        if let Some(progress) = &self.progress {
            progress.update(0.0, format!("Processing {} documents", total));
        }

        let mut pending = inputs.into_iter().enumerate().peekable();
        let mut window = 0usize;
        while pending.peek().is_some() {
            window += 1;
            let mut tasks = JoinSet::new();
            let mut ids = HashMap::with_capacity(window_size);
            for (index, input) in pending.by_ref().take(window_size) {
                let handle = tasks.spawn(operation(index, input));
                ids.insert(handle.id(), index);
            }
            tracing::debug!(window, size = ids.len(), total, "Batch window started");

            while let Some(joined) = tasks.join_next_with_id().await {
                let (index, outcome) = match joined {
                    Ok((id, outcome)) => (ids.get(&id).copied(), outcome),
                    Err(join_err) => {
                        let index = ids.get(&join_err.id()).copied();
                        tracing::warn!(?index, error = %join_err, "Batch task panicked");
                        (index, Err(ParserError::from(join_err)))
                    }
                };
                let Some(index) = index else {
                    continue;
                };

                if let Err(err) = &outcome
                    && self.options.stop_on_error
                {
                    tracing::warn!(index, code = err.code(), "Stopping batch on first error");
                    tasks.abort_all();
                    return Err(err.clone().with_detail(format!("batch item: {}", index)));
                }

                completed += 1;
                slots[index] = Some(outcome);
                if let Some(progress) = &self.progress {
                    let percent = completed as f64 * 100.0 / total as f64;
                    progress.update(percent, format!("Processed {} of {} documents", completed, total));
                }
            }
        }

        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = slot.unwrap_or_else(|| Err(ParserError::parse("Batch item produced no result")));
            if let Err(err) = &outcome {
                errors.push((index, err.clone()));
            }
            results.push(outcome);
        }
        let failed = errors.len();
        tracing::info!(total, succeeded = total - failed, failed, "Batch finished");

        Ok(BatchOutcome {
            results,
            errors,
            succeeded: total - failed,
            failed,
        })
    }
}
