//! CCE v3 job objects
//!
//! Jobs form a two-level tree: a root job with one sub-job, whose own
//! children carry the identifiers of the resources the job produced.

use serde::{Deserialize, Serialize};

use crate::client::{ApiResult, ServiceClient};

/// Child job type whose `resource_id` is the created node's identifier
pub const CREATE_NODE_VM: &str = "CreateNodeVM";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub metadata: JobMetadata,
    #[serde(default)]
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(
        rename = "clusterUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_uid: Option<String>,
    #[serde(
        rename = "resourceID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_id: Option<String>,
    #[serde(rename = "subJobs", default, skip_serializing_if = "Option::is_none")]
    pub sub_jobs: Option<Vec<Job>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

pub async fn get(client: &ServiceClient, job_id: &str) -> ApiResult<Job> {
    client.get(&format!("jobs/{}", job_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_tree_deserialises() {
        let raw = serde_json::json!({
            "metadata": { "id": "job-root" },
            "spec": {
                "type": "CreateNode",
                "subJobs": [
                    { "metadata": { "id": "job-sub" },
                      "spec": { "type": "InstallNode" },
                      "status": { "phase": "Running" } }
                ]
            },
            "status": { "phase": "Running", "reason": "", "message": "" }
        });

        let job: Job = serde_json::from_value(raw).unwrap();
        let subs = job.spec.sub_jobs.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].metadata.id, "job-sub");
    }
}
