use crate::error::{CatalogError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff applied to every gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`; `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32, error: &CatalogError) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = exp.min(self.max_delay);
        match error {
            CatalogError::RateLimited {
                retry_after: Some(after),
            } => delay.max((*after).min(self.max_delay)),
            _ => delay,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. `before_attempt` runs ahead of every attempt
    /// (the gateway takes a rate-limit token there).
    pub async fn run<T, Op, Fut, Gate, GateFut>(
        &self,
        operation: &str,
        mut before_attempt: Gate,
        mut op: Op,
    ) -> Result<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        Gate: FnMut() -> GateFut,
        GateFut: Future<Output = ()>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            before_attempt().await;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt >= max_attempts {
                        warn!("{} failed after {} attempts: {}", operation, attempt, e);
                        return Err(CatalogError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.backoff(attempt, &e);
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        operation, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        let err = CatalogError::Transient("x".into());
        assert_eq!(policy.backoff(1, &err), Duration::from_millis(100));
        assert_eq!(policy.backoff(2, &err), Duration::from_millis(200));
        assert_eq!(policy.backoff(3, &err), Duration::from_millis(400));
        assert_eq!(policy.backoff(4, &err), Duration::from_millis(500));
    }

    #[test]
    fn retry_after_wins_when_longer() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        };
        let err = CatalogError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.backoff(1, &err), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast()
            .run("op", || async {}, move || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(CatalogError::RateLimited { retry_after: None }),
                    _ => Ok(7),
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_at_the_cap() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = fast()
            .run("op", || async {}, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CatalogError::Transient("timeout".into()))
            })
            .await;

        assert!(matches!(
            result,
            Err(CatalogError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_and_not_found_are_not_retried() {
        for err in [
            CatalogError::Authentication("expired".into()),
            CatalogError::NotFound("playlist".into()),
        ] {
            let calls = AtomicU32::new(0);
            let result: Result<()> = fast()
                .run("op", || async {}, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let err = err.clone();
                    async move { Err(err) }
                })
                .await;

            assert_eq!(result, Err(err.clone()));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
