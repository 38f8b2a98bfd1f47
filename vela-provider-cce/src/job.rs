//! Job resolver
//!
//! The node-create endpoint returns a job handle, not the node identifier.
//! The identifier sits on a grandchild of the root job, and the cloud
//! populates the child list asynchronously even after the root reports
//! `Running` — so the walk is: root, then poll its sole sub-job out of
//! `Initializing`, then scan that sub-job's children. Codified here once;
//! never inlined at call sites.

use std::future::Future;

use crate::api::job::{self, Job};
use crate::client::ApiError;
use crate::wait::{WaitConfig, WaitError, wait_for_phase};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {job_id} has {count} sub-jobs, expected exactly one")]
    SubJobCount { job_id: String, count: usize },

    #[error(
        "job {job_id} (phase {phase}, reason {reason:?}) produced no {wanted} sub-job: {message}"
    )]
    MissingResource {
        job_id: String,
        phase: String,
        reason: String,
        message: String,
        wanted: &'static str,
    },

    #[error("fetching job failed: {0}")]
    Fetch(#[from] ApiError),

    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Resolve the created node's identifier from a node-create job handle.
///
/// `fetch_job` binds the CCE client; it is invoked with the root job id and
/// then repeatedly with the sub-job id while the sub-job initialises.
pub async fn resolve_node_id<F, Fut>(
    fetch_job: F,
    job_id: &str,
    config: WaitConfig,
) -> Result<String, JobError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Job, ApiError>>,
{
    let root = fetch_job(job_id.to_string()).await?;

    let sub_jobs = root.spec.sub_jobs.as_deref().unwrap_or_default();
    if sub_jobs.len() != 1 {
        return Err(JobError::SubJobCount {
            job_id: job_id.to_string(),
            count: sub_jobs.len(),
        });
    }
    let sub_id = sub_jobs[0].metadata.id.clone();

    // The sub-job's own children appear once it leaves Initializing.
    let sub_job = wait_for_phase(
        || {
            let fetch = fetch_job(sub_id.clone());
            async move {
                let job = fetch.await?;
                let phase = job.status.phase.clone();
                Ok((job, phase))
            }
        },
        &["Initializing"],
        &["Running", "Success", "ResourceCreated"],
        config,
    )
    .await?;

    sub_job
        .spec
        .sub_jobs
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|child| child.spec.job_type == job::CREATE_NODE_VM)
        .and_then(|child| child.spec.resource_id.clone())
        .ok_or_else(|| JobError::MissingResource {
            job_id: job_id.to_string(),
            phase: sub_job.status.phase.clone(),
            reason: sub_job.status.reason.clone(),
            message: sub_job.status.message.clone(),
            wanted: job::CREATE_NODE_VM,
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::api::job::{JobMetadata, JobSpec, JobStatus};

    fn fast() -> WaitConfig {
        WaitConfig {
            delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(500),
        }
    }

    fn job(id: &str, phase: &str, sub_jobs: Option<Vec<Job>>) -> Job {
        Job {
            metadata: JobMetadata { id: id.to_string() },
            spec: JobSpec {
                job_type: "CreateNode".to_string(),
                cluster_uid: None,
                resource_id: None,
                sub_jobs,
            },
            status: JobStatus {
                phase: phase.to_string(),
                reason: String::new(),
                message: String::new(),
            },
        }
    }

    fn child(job_type: &str, resource_id: Option<&str>) -> Job {
        Job {
            spec: JobSpec {
                job_type: job_type.to_string(),
                resource_id: resource_id.map(|s| s.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Fake job store: each fetch of an id pops the next snapshot, holding
    /// the last one, so late population of children can be simulated.
    struct JobStore {
        snapshots: Mutex<HashMap<String, Vec<Job>>>,
    }

    impl JobStore {
        fn new(snapshots: Vec<(&str, Vec<Job>)>) -> Self {
            let map = snapshots
                .into_iter()
                .map(|(id, mut jobs)| {
                    jobs.reverse();
                    (id.to_string(), jobs)
                })
                .collect();
            Self {
                snapshots: Mutex::new(map),
            }
        }

        fn fetch(&self, id: String) -> Result<Job, ApiError> {
            let mut snapshots = self.snapshots.lock().unwrap();
            let versions = snapshots.get_mut(&id).ok_or_else(|| ApiError::Http {
                status: 404,
                url: format!("https://cce.example/jobs/{}", id),
                body: "not found".to_string(),
            })?;
            let job = if versions.len() > 1 {
                versions.pop().unwrap()
            } else {
                versions.last().cloned().unwrap()
            };
            Ok(job)
        }
    }

    #[tokio::test]
    async fn resolves_node_id_after_children_populate() {
        let store = JobStore::new(vec![
            (
                "root",
                vec![job(
                    "root",
                    "Running",
                    Some(vec![job("sub", "Initializing", None)]),
                )],
            ),
            (
                "sub",
                vec![
                    job("sub", "Initializing", None),
                    job(
                        "sub",
                        "Running",
                        Some(vec![
                            child("InstallNode", None),
                            child("CreateNodeVM", Some("node-42")),
                        ]),
                    ),
                ],
            ),
        ]);

        let id = resolve_node_id(|id| async { store.fetch(id) }, "root", fast())
            .await
            .unwrap();
        assert_eq!(id, "node-42");
    }

    #[tokio::test]
    async fn rejects_root_without_exactly_one_sub_job() {
        let store = JobStore::new(vec![("root", vec![job("root", "Running", Some(vec![]))])]);

        let err = resolve_node_id(|id| async { store.fetch(id) }, "root", fast())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::SubJobCount { count: 0, .. }));
    }

    #[tokio::test]
    async fn missing_create_node_vm_child_is_reported_with_context() {
        let store = JobStore::new(vec![
            (
                "root",
                vec![job(
                    "root",
                    "Running",
                    Some(vec![job("sub", "Running", None)]),
                )],
            ),
            (
                "sub",
                vec![job(
                    "sub",
                    "Running",
                    Some(vec![child("InstallNode", None)]),
                )],
            ),
        ]);

        let err = resolve_node_id(|id| async { store.fetch(id) }, "root", fast())
            .await
            .unwrap_err();
        match err {
            JobError::MissingResource { job_id, phase, .. } => {
                assert_eq!(job_id, "root");
                assert_eq!(phase, "Running");
            }
            other => panic!("expected MissingResource, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_sub_job_phase_aborts() {
        let store = JobStore::new(vec![
            (
                "root",
                vec![job(
                    "root",
                    "Running",
                    Some(vec![job("sub", "Initializing", None)]),
                )],
            ),
            ("sub", vec![job("sub", "Failed", None)]),
        ]);

        let err = resolve_node_id(|id| async { store.fetch(id) }, "root", fast())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::Wait(WaitError::UnexpectedPhase { .. })
        ));
    }
}
