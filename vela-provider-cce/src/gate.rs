//! Parent-readiness gate
//!
//! Child mutations (node, node pool, add-on) are rejected while the parent
//! cluster is not `Available`. The gate waits for readiness first; because
//! the cluster can leave `Available` between the check and the mutation,
//! the mutation is retried exactly once when the cloud answers with the
//! CCE-authorisation sentinel. One retry is sufficient in practice and
//! avoids unbounded loops.

use std::future::Future;
use std::time::Duration;

use crate::client::ApiError;
use crate::wait::{WaitConfig, WaitError, wait_for_phase};

/// Cluster phases that may precede `Available` without being errors
pub const CLUSTER_PENDING: [&str; 6] = [
    "Creating",
    "Upgrading",
    "Resizing",
    "ScalingUp",
    "ScalingDown",
    "Empty",
];

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("parent cluster not ready: {0}")]
    NotReady(#[from] WaitError),

    #[error(transparent)]
    Call(#[from] ApiError),
}

/// Wait until the parent cluster reports `Available`.
///
/// `fetch_phase` binds the CCE client and cluster id.
pub async fn wait_cluster_available<F, Fut>(
    fetch_phase: F,
    timeout: Duration,
) -> Result<(), WaitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String, ApiError>>,
{
    wait_for_phase(
        || {
            let fetch = fetch_phase();
            async move {
                let phase = fetch.await?;
                Ok(((), phase))
            }
        },
        &CLUSTER_PENDING,
        &["Available"],
        WaitConfig {
            delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(15),
            timeout,
        },
    )
    .await
}

/// Gate a child mutation on parent readiness, retrying exactly once when the
/// cloud rejects it with the authorisation sentinel.
///
/// Any other error is surfaced to the caller untouched.
pub async fn gated_call<W, WFut, C, CFut, T>(wait_ready: W, call: C) -> Result<T, GateError>
where
    W: Fn() -> WFut,
    WFut: Future<Output = Result<(), WaitError>>,
    C: Fn() -> CFut,
    CFut: Future<Output = Result<T, ApiError>>,
{
    wait_ready().await?;
    match call().await {
        Err(e) if e.is_auth_pending() => {
            log::warn!("cluster rejected call while authorising CCE; re-gating and retrying once");
            wait_ready().await?;
            Ok(call().await?)
        }
        other => Ok(other?),
    }
}
