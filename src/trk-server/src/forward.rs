// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Delivery of accepted fixes to the downstream ingest endpoint.
//!
//! Each fix is POSTed as JSON with a bounded number of attempts. A 4xx
//! response is terminal (retrying a malformed or unauthorized request
//! cannot succeed); timeouts, transport errors and any other status are
//! retried after a fixed pause until the attempt budget is spent.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, warn};

use trk_core::Fix;

use crate::config::SinkConfig;

/// Final disposition of one fix handed to [`SinkClient::forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The sink created the record (2xx).
    Accepted,
    /// The sink refused the request (4xx); dropped without retry.
    Rejected4xx(u16),
    /// Every attempt failed; the fix is lost.
    Failed,
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone)]
enum Attempt {
    Status(u16),
    Transport(String),
}

/// Retry budget and pacing.
#[derive(Debug, Clone, Copy)]
struct RetryPlan {
    attempts: u32,
    pause: Duration,
}

/// Drive `attempt` under `plan` until a terminal disposition.
///
/// Returns the outcome and how many attempts were made; factored out of
/// the HTTP path so the retry policy is testable without a sink.
async fn run_attempts<F, Fut>(plan: RetryPlan, mut attempt: F) -> (ForwardOutcome, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut made = 0;
    for n in 1..=plan.attempts {
        made = n;
        match attempt(n).await {
            Attempt::Status(status) if (200..300).contains(&status) => {
                return (ForwardOutcome::Accepted, made);
            }
            Attempt::Status(status) if (400..500).contains(&status) => {
                return (ForwardOutcome::Rejected4xx(status), made);
            }
            Attempt::Status(status) => {
                warn!("Sink attempt {}/{} failed with HTTP {}", n, plan.attempts, status);
            }
            Attempt::Transport(err) => {
                warn!("Sink attempt {}/{} failed: {}", n, plan.attempts, err);
            }
        }
        if n < plan.attempts {
            time::sleep(plan.pause).await;
        }
    }
    (ForwardOutcome::Failed, made)
}

/// Forwarding counters reported by the stats tick.
#[derive(Debug, Default)]
pub struct ForwardStats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
}

impl ForwardStats {
    pub fn summary(&self) -> String {
        format!(
            "forwarded={}, rejected={}, failed={}",
            self.accepted.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed)
        )
    }
}

/// HTTP client for the ingest endpoint.
pub struct SinkClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    plan: RetryPlan,
    stats: Arc<ForwardStats>,
}

impl SinkClient {
    pub fn new(cfg: &SinkConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            plan: RetryPlan {
                attempts: cfg.retry_attempts.max(1),
                pause: Duration::from_millis(cfg.retry_delay_ms),
            },
            stats: Arc::new(ForwardStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<ForwardStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver one accepted fix. Never returns an error: every failure
    /// mode collapses into the outcome, which the caller logs against
    /// the owning session.
    pub async fn forward(&self, fix: &Fix) -> ForwardOutcome {
        let (outcome, attempts) = run_attempts(self.plan, |_| {
            let mut request = self.http.post(&self.url).json(fix);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            async move {
                match request.send().await {
                    Ok(response) => Attempt::Status(response.status().as_u16()),
                    Err(err) => Attempt::Transport(err.to_string()),
                }
            }
        })
        .await;

        match outcome {
            ForwardOutcome::Accepted => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Fix for {} forwarded to sink ({} attempt(s))",
                    fix.device_id, attempts
                );
            }
            ForwardOutcome::Rejected4xx(status) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Sink rejected fix for {} with HTTP {}; dropping without retry",
                    fix.device_id, status
                );
            }
            ForwardOutcome::Failed => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Sink unavailable after {} attempt(s); fix for {} dropped",
                    attempts, fix.device_id
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn plan(attempts: u32) -> RetryPlan {
        RetryPlan {
            attempts,
            pause: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn client_error_aborts_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let (outcome, attempts) = run_attempts(plan(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Status(400) }
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Rejected4xx(400));
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_exhaust_the_attempt_budget() {
        let calls = AtomicU32::new(0);
        let (outcome, attempts) = run_attempts(plan(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Status(500) }
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Failed);
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_then_created_succeeds_on_the_second_attempt() {
        let (outcome, attempts) = run_attempts(plan(3), |n| async move {
            if n == 1 {
                Attempt::Transport("operation timed out".to_string())
            } else {
                Attempt::Status(201)
            }
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Accepted);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn created_on_first_attempt_makes_exactly_one_call() {
        let (outcome, attempts) = run_attempts(plan(3), |_| async { Attempt::Status(201) }).await;
        assert_eq!(outcome, ForwardOutcome::Accepted);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn transport_errors_exhaust_the_attempt_budget() {
        let (outcome, attempts) = run_attempts(plan(3), |_| async {
            Attempt::Transport("connection refused".to_string())
        })
        .await;
        assert_eq!(outcome, ForwardOutcome::Failed);
        assert_eq!(attempts, 3);
    }
}
