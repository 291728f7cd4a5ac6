//! Jobs - the logical units of work clients submit
//!
//! A job is immutable once created; execution state lives on its contracts.
//! Jobs form a DAG through dependency edges: a parent cannot be claimed
//! until every child's latest contract succeeded.

mod submission;
mod view;

pub use submission::{DependencySpec, JobSubmission, PlannedJob, SubmissionPlan};
pub use view::{assemble_job_view, ContractSummary, JobView};

use crate::shared_kernel::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A client-submitted description of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    /// Workers subscribe by this type.
    pub job_type: String,
    /// Opaque structured payload handed to the executing worker.
    pub request_body: serde_json::Value,
    /// Deterministic hash of `request_body`; the idempotency key content.
    pub request_hash: Uuid,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub job_name: Option<String>,
    /// Groups equivalent jobs. Defaults to the job's own id.
    pub fungibility_group_id: Uuid,
    /// Immediate parent when the job was submitted as part of a tree.
    pub parent_job_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
}

/// Deterministic hash of a request body, rendered as a UUID.
///
/// `serde_json::Map` keeps keys sorted, so serialising the value yields the
/// same bytes for structurally equal bodies across processes and versions.
pub fn request_hash(body: &serde_json::Value) -> Uuid {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_hash_is_stable_across_key_order() {
        let a = serde_json::from_str::<serde_json::Value>(r#"{"x": 1, "y": [2, 3]}"#).unwrap();
        let b = serde_json::from_str::<serde_json::Value>(r#"{"y": [2, 3], "x": 1}"#).unwrap();
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn request_hash_distinguishes_bodies() {
        assert_ne!(
            request_hash(&json!({"v": 1})),
            request_hash(&json!({"v": 2}))
        );
    }
}
