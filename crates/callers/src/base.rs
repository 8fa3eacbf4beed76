//! Retry-with-backoff wrapper shared by every caller.
//!
//! Auth errors short-circuit: a credential the upstream already rejected
//! will not be accepted on a repeat attempt. Classification prefers the
//! structured HTTP status where the adapter recorded one and falls back
//! to substring matching, a policy decision rather than an invariant
//! (see [`px_domain::error::Error::is_auth_error`]).

use std::time::Duration;

use px_domain::credentials::EnrichedRequest;
use px_domain::error::{Error, Result};
use px_domain::tool::ToolResponse;

use crate::traits::Caller;

/// The retry budget applied to a caller without an override.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts per call.
    pub max_retries: u32,
    /// Base backoff in milliseconds; attempt `n` sleeps `base * 2^(n-1)`
    /// before running.
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

/// Run `caller` under the retry policy. At most
/// `caller.max_retries().unwrap_or(policy.max_retries)` attempts, with
/// exponential backoff between them. Performs no credential
/// manipulation of its own.
pub async fn execute_with_retry(
    caller: &dyn Caller,
    req: &EnrichedRequest,
    policy: &RetryPolicy,
) -> Result<ToolResponse> {
    let max_attempts = caller.max_retries().unwrap_or(policy.max_retries).max(1);
    let mut last_err: Option<Error> = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let backoff =
                Duration::from_millis(policy.retry_delay_ms * 2u64.pow(attempt - 1));
            tracing::debug!(
                caller = caller.name(),
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "retrying after backoff"
            );
            tokio::time::sleep(backoff).await;
        }

        match caller.execute(req).await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_auth_error() => {
                // Retrying a rejected credential cannot succeed.
                tracing::warn!(
                    caller = caller.name(),
                    error = %e.summary(),
                    "auth error from upstream; not retrying"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    caller = caller.name(),
                    attempt,
                    error = %e.summary(),
                    "attempt failed"
                );
                last_err = Some(e);
            }
        }
    }

    let last = last_err.expect("at least one attempt ran");
    Err(Error::RetryExhausted {
        attempts: max_attempts,
        last: last.summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedCaller;
    use px_domain::credentials::Credentials;
    use serde_json::Map;

    fn req() -> EnrichedRequest {
        EnrichedRequest::new(
            "gemini_generate",
            Map::new(),
            Credentials::new("key".into(), "bot"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_succeed() {
        let caller = ScriptedCaller::new(vec![
            Err(Error::Http("500 Internal Server Error".into())),
            Err(Error::Http("500 Internal Server Error".into())),
            Ok(ToolResponse::text("ok")),
        ]);

        let start = tokio::time::Instant::now();
        let resp = execute_with_retry(&caller, &req(), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(resp, ToolResponse::text("ok"));
        assert_eq!(caller.attempts(), 3);
        // Backoffs of 1000 ms and 2000 ms under the paused clock.
        assert_eq!(start.elapsed(), Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_error_short_circuits() {
        let caller = ScriptedCaller::new(vec![
            Err(Error::Http("401 Unauthorized".into())),
            Ok(ToolResponse::text("never reached")),
        ]);

        let start = tokio::time::Instant::now();
        let err = execute_with_retry(&caller, &req(), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(caller.attempts(), 1);
        // No backoff was observed.
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_final_attempt() {
        let caller = ScriptedCaller::new(vec![
            Err(Error::Http("500".into())),
            Err(Error::Http("502".into())),
            Err(Error::Http("503 final".into())),
        ]);

        let err = execute_with_retry(&caller, &req(), &RetryPolicy::default())
            .await
            .unwrap_err();
        match err {
            Error::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("503 final"));
            }
            other => panic!("expected RetryExhausted, got {other}"),
        }
        assert_eq!(caller.attempts(), 3);
    }

    #[tokio::test]
    async fn caller_override_caps_attempts() {
        let caller = ScriptedCaller::new(vec![
            Err(Error::Http("500".into())),
            Ok(ToolResponse::text("never reached")),
        ])
        .with_max_retries(1);

        let err = execute_with_retry(&caller, &req(), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 1, .. }));
        assert_eq!(caller.attempts(), 1);
    }
}
