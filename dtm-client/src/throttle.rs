//! Four-attempt doubling backoff ladder guarding the transmission mutex:
//! write failures escalate through a throttle ladder before surfacing a
//! connection error.
//!
//! Grounded on `layer-client/src/retry.rs`'s `AutoSleep`/`ControlFlow` shape:
//! a small sans-IO decision type driving the actual sleeping from the async
//! caller.

use std::time::Duration;

/// Number of attempts the ladder makes before giving up.
pub const MAX_ATTEMPTS: u32 = 4;
/// Backoff after the first failed attempt; doubles on each subsequent one.
pub const BASE_BACKOFF: Duration = Duration::from_millis(50);

/// Run `write` up to [`MAX_ATTEMPTS`] times, doubling the backoff between
/// attempts, returning the first success or the last failure once attempts
/// are exhausted.
pub async fn with_backoff<F, Fut, T, E>(mut write: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut backoff = BASE_BACKOFF;
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match write().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if attempt < MAX_ATTEMPTS {
                    tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, "transmission attempt failed, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_sleeping() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("would-block") } else { Ok(99) } }
        })
        .await;
        assert_eq!(result, Ok(99));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still down") }
        })
        .await;
        assert_eq!(result, Err("still down"));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
