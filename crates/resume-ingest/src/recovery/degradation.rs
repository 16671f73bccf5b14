//! Graceful degradation across ordered strategies.

use crate::error::{ParserError, Result};
use std::future::Future;

/// Successful outcome of [`run_strategies`].
#[derive(Debug)]
pub struct Degraded<T> {
    pub value: T,
    /// Position of the winning strategy; 0 is the primary.
    pub index: usize,
    pub strategy: String,
    /// Failures of the strategies tried before the winner.
    pub failures: Vec<(String, ParserError)>,
}

impl<T> Degraded<T> {
    pub fn used_fallback(&self) -> bool {
        self.index > 0
    }
}

/// Try `strategies` in order until one succeeds.
///
/// A single failing strategy returns its own error unchanged. When several strategies
/// all fail, their errors are aggregated into one non-retryable `Parse` error whose
/// details name every strategy and whose source is the primary's error.
pub async fn run_strategies<'a, S, T, N, F, Fut>(strategies: &'a [S], name_of: N, mut run: F) -> Result<Degraded<T>>
where
    N: Fn(&S) -> String,
    F: FnMut(&'a S) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures: Vec<(String, ParserError)> = Vec::new();

    for (index, strategy) in strategies.iter().enumerate() {
        let name = name_of(strategy);
        match run(strategy).await {
            Ok(value) => {
                if index > 0 {
                    tracing::info!(strategy = %name, index, "Fallback strategy succeeded");
                }
                return Ok(Degraded {
                    value,
                    index,
                    strategy: name,
                    failures,
                });
            }
            Err(err) => {
                if index + 1 < strategies.len() {
                    tracing::warn!(strategy = %name, code = err.code(), "Strategy failed, degrading to next");
                }
                failures.push((name, err));
            }
        }
    }

    Err(aggregate(failures))
}

fn aggregate(mut failures: Vec<(String, ParserError)>) -> ParserError {
    match failures.len() {
        0 => ParserError::configuration("No decoding strategy available"),
        1 => failures.remove(0).1,
        count => {
            let details: Vec<String> = failures
                .iter()
                .map(|(name, err)| format!("{}: {}", name, err))
                .collect();
            let attempts: u32 = failures
                .iter()
                .map(|(_, err)| err.context().attempts.unwrap_or(1))
                .sum();
            let (_, primary) = failures.remove(0);
            let mut err = ParserError::parse_with_source(format!("All {} decoding strategies failed", count), primary)
                .non_retryable()
                .with_attempts(attempts);
            err.context_mut().details = details;
            err
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_first_success_wins() {
        let strategies = ["primary", "secondary", "tertiary"];
        let degraded = run_strategies(
            &strategies,
            |s| s.to_string(),
            |s| async move {
                if *s == "primary" {
                    Err(ParserError::corrupted("broken"))
                } else {
                    Ok(s.len())
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(degraded.strategy, "secondary");
        assert_eq!(degraded.value, 9);
        assert!(degraded.used_fallback());
        assert_eq!(degraded.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_single_failure_passes_through() {
        let strategies = ["only"];
        let err = run_strategies::<_, (), _, _, _>(&strategies, |s| s.to_string(), |_| async {
            Err(ParserError::timeout("slow"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_all_failures_aggregated() {
        let strategies = ["a", "b"];
        let err = run_strategies::<_, (), _, _, _>(&strategies, |s| s.to_string(), |s| async move {
            Err(ParserError::parse(format!("{} failed", s)).with_attempts(2))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!err.is_retryable());
        assert_eq!(err.context().details.len(), 2);
        assert!(err.context().details[1].contains("b failed"));
        assert_eq!(err.context().attempts, Some(4));
        assert_eq!(err.cause_chain()[0], "Parse error: a failed");
    }
}
