use std::future::Future;
use std::time::Duration;

use tracing::warn;

use zenflow_core::config::RetryConfig;
use zenflow_core::error::{Result, ZenflowError};

/// Transient failures worth another attempt.
pub fn is_retryable(e: &ZenflowError) -> bool {
    match e {
        ZenflowError::AgentRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

/// Exponential backoff capped at `max_backoff_ms`, with 0.8x to 1.2x jitter.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let ms = config
        .initial_backoff_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms);
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = config.max_retries;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < max_retries => {
                let backoff = calculate_backoff(attempt, config);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying agent request"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&ZenflowError::AgentRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&ZenflowError::AgentRequest("connection reset".into())));
        assert!(!is_retryable(&ZenflowError::AgentRequest("HTTP 401 Unauthorized".into())));
        assert!(!is_retryable(&ZenflowError::Cancelled));
    }

    #[test]
    fn test_backoff_bounds() {
        let cfg = config(3);
        let first = calculate_backoff(0, &cfg).as_millis();
        assert!((80..=120).contains(&first));

        let capped = calculate_backoff(10, &cfg).as_millis();
        assert!((800..=1200).contains(&capped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&config(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ZenflowError::AgentRequest("HTTP 503".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&config(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ZenflowError::AgentRequest("HTTP 500".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&config(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ZenflowError::AgentRequest("HTTP 400".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
