//! Phase waiter
//!
//! The single polling primitive underlying every asynchronous operation:
//! cluster creation, node creation, node-pool synchronisation, add-on
//! install, parent readiness, and floating-IP provisioning. A refresh
//! closure (binding the client and resource identifier) is invoked until it
//! reports a target phase, the deadline elapses, or it fails hard.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::ApiError;

/// Sentinel phase a refresh closure reports when the resource is gone
/// (usually by catching the cloud's not-found error)
pub const DELETED: &str = "DELETED";

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {waited:?}; last observed phase: {last_phase}")]
    Timeout { waited: Duration, last_phase: String },

    #[error("unexpected phase {phase:?} (pending: {pending:?}, target: {target:?})")]
    UnexpectedPhase {
        phase: String,
        pending: Vec<String>,
        target: Vec<String>,
    },

    #[error("refresh failed: {0}")]
    Refresh(#[from] ApiError),
}

/// Waiter configuration
#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    /// Time to let pass before the first refresh
    pub delay: Duration,
    /// Time between refreshes
    pub poll_interval: Duration,
    /// Total budget including the initial delay
    pub timeout: Duration,
}

impl WaitConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            timeout,
        }
    }
}

/// Drive a resource from `pending` phases into a `target` phase.
///
/// `refresh` returns the current object together with its phase. Phases in
/// neither set are soft errors and abort the wait; a refresh error aborts
/// immediately. Returns the last refreshed object on success.
pub async fn wait_for_phase<T, F, Fut>(
    refresh: F,
    pending: &[&str],
    target: &[&str],
    config: WaitConfig,
) -> Result<T, WaitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(T, String), ApiError>>,
{
    let started = Instant::now();
    let deadline = started + config.timeout;

    tokio::time::sleep(config.delay.min(config.timeout)).await;

    let mut last_phase = String::new();
    loop {
        if Instant::now() >= deadline {
            return Err(WaitError::Timeout {
                waited: started.elapsed(),
                last_phase,
            });
        }

        let (object, phase) = refresh().await?;
        if target.contains(&phase.as_str()) {
            return Ok(object);
        }
        if !pending.contains(&phase.as_str()) {
            return Err(WaitError::UnexpectedPhase {
                phase,
                pending: pending.iter().map(|s| s.to_string()).collect(),
                target: target.iter().map(|s| s.to_string()).collect(),
            });
        }
        log::debug!("still waiting: phase {:?} in pending set", phase);
        last_phase = phase;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(WaitError::Timeout {
                waited: started.elapsed(),
                last_phase,
            });
        }
        tokio::time::sleep(config.poll_interval.min(remaining)).await;
    }
}

/// Map a not-found refresh error to the [`DELETED`] sentinel phase
pub fn deleted_on_404<T: Default>(
    result: Result<(T, String), ApiError>,
) -> Result<(T, String), ApiError> {
    match result {
        Err(e) if e.is_not_found() => Ok((T::default(), DELETED.to_string())),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn fast() -> WaitConfig {
        WaitConfig {
            delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn reaches_target_after_pending_phases() {
        let calls = AtomicUsize::new(0);
        let result = wait_for_phase(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let phase = if n < 3 { "Creating" } else { "Available" };
                    Ok((n, phase.to_string()))
                }
            },
            &["Creating"],
            &["Available"],
            fast(),
        )
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn unexpected_phase_aborts() {
        let result = wait_for_phase(
            || async { Ok(((), "Error".to_string())) },
            &["Creating"],
            &["Available"],
            fast(),
        )
        .await;

        match result {
            Err(WaitError::UnexpectedPhase { phase, .. }) => assert_eq!(phase, "Error"),
            other => panic!("expected UnexpectedPhase, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_reports_last_phase() {
        let config = WaitConfig {
            delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(30),
        };
        let result = wait_for_phase(
            || async { Ok(((), "Creating".to_string())) },
            &["Creating"],
            &["Available"],
            config,
        )
        .await;

        match result {
            Err(WaitError::Timeout { last_phase, .. }) => assert_eq!(last_phase, "Creating"),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn hard_refresh_error_aborts() {
        let result: Result<(), _> = wait_for_phase(
            || async {
                Err(ApiError::Http {
                    status: 500,
                    url: "https://cce.example".to_string(),
                    body: "boom".to_string(),
                })
            },
            &["Creating"],
            &["Available"],
            fast(),
        )
        .await;

        assert!(matches!(result, Err(WaitError::Refresh(_))));
    }

    #[tokio::test]
    async fn deleted_sentinel_satisfies_target() {
        let phases = Mutex::new(vec!["Deleting", "Deleting"]);
        let result = wait_for_phase(
            || {
                let next = phases.lock().unwrap().pop();
                async move {
                    match next {
                        Some(phase) => Ok(((), phase.to_string())),
                        None => deleted_on_404(Err(ApiError::Http {
                            status: 404,
                            url: "https://cce.example".to_string(),
                            body: "gone".to_string(),
                        })),
                    }
                }
            },
            &["Deleting"],
            &[DELETED],
            fast(),
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn empty_string_is_a_valid_target_phase() {
        // Node pools express "steady" as an empty phase.
        let calls = AtomicUsize::new(0);
        let result = wait_for_phase(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let phase = if n == 0 { "Synchronizing" } else { "" };
                    Ok(((), phase.to_string()))
                }
            },
            &["Synchronizing", "Synchronized"],
            &[""],
            fast(),
        )
        .await;

        assert!(result.is_ok());
    }
}
