//! Job submission payloads and the submission planner
//!
//! `put-job!` accepts a tree of job descriptions: each dependency is either a
//! full payload of its own or a reference to an already-existing job. The
//! planner flattens that tree into rows the store inserts in one
//! transaction, and is reused verbatim for dependencies added mid-run
//! through `add-dependencies`.

use super::{request_hash, Job};
use crate::shared_kernel::{DomainError, JobId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Wire payload of a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Optional inside dependency payloads; a fresh id is generated when
    /// absent. For the root job the path id wins and this must match it if
    /// present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub job_type: String,
    #[serde(default)]
    pub request_body: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fungibility_group_id: Option<Uuid>,
}

impl JobSubmission {
    pub fn new(job_type: impl Into<String>, request_body: serde_json::Value) -> Self {
        Self {
            job_id: None,
            job_type: job_type.into(),
            request_body,
            tags: Vec::new(),
            notes: None,
            job_name: None,
            dependencies: Vec::new(),
            fungibility_group_id: None,
        }
    }

    pub fn with_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_dependency(mut self, dep: DependencySpec) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A declared dependency: an inline job payload or a reference to an
/// existing job.
///
/// Untagged, so `{"job_id": "..."}` alone reads as a reference while any
/// payload carrying `job_type` reads as an inline submission. `Inline` is
/// listed first: a reference lacks `job_type` and falls through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Inline(JobSubmission),
    Reference { job_id: JobId },
}

impl DependencySpec {
    pub fn on_existing(job_id: JobId) -> Self {
        DependencySpec::Reference { job_id }
    }

    pub fn inline(submission: JobSubmission) -> Self {
        DependencySpec::Inline(submission)
    }
}

/// One job row the store will insert, with the ids it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJob {
    pub job: Job,
    /// Ids of every dependency (inline and referenced) of this job.
    pub dependency_ids: Vec<JobId>,
}

/// Flattened form of a submission tree, ready for transactional insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    /// Jobs to insert, root first.
    pub jobs: Vec<PlannedJob>,
    /// Edges `(parent, child)` across the whole plan, including edges to
    /// referenced existing jobs.
    pub edges: Vec<(JobId, JobId)>,
    /// Referenced jobs that must already exist in the store.
    pub references: Vec<JobId>,
}

impl SubmissionPlan {
    /// Flatten a submission tree rooted at `root_id`.
    ///
    /// Validates payloads as it walks: every node needs a non-empty
    /// `job_type`, ids may not repeat inside the tree, and a root payload
    /// carrying its own `job_id` must agree with `root_id`.
    pub fn build(
        root_id: JobId,
        submission: &JobSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionPlan> {
        if let Some(declared) = submission.job_id {
            if declared != root_id {
                return Err(DomainError::invalid_payload(
                    "job_id",
                    format!("payload id {} does not match submitted id {}", declared, root_id),
                ));
            }
        }

        let mut plan = SubmissionPlan {
            jobs: Vec::new(),
            edges: Vec::new(),
            references: Vec::new(),
        };
        let mut seen = HashSet::new();
        Self::walk(root_id, submission, None, now, &mut plan, &mut seen)?;
        Ok(plan)
    }

    /// Plan dependencies added to `parent_id` while its contract is live.
    pub fn build_additions(
        parent_id: JobId,
        requests: &[DependencySpec],
        now: DateTime<Utc>,
    ) -> Result<SubmissionPlan> {
        let mut plan = SubmissionPlan {
            jobs: Vec::new(),
            edges: Vec::new(),
            references: Vec::new(),
        };
        let mut seen = HashSet::new();
        seen.insert(parent_id);
        for spec in requests {
            Self::walk_dependency(parent_id, spec, now, &mut plan, &mut seen)?;
        }
        Ok(plan)
    }

    fn walk(
        job_id: JobId,
        submission: &JobSubmission,
        parent: Option<JobId>,
        now: DateTime<Utc>,
        plan: &mut SubmissionPlan,
        seen: &mut HashSet<JobId>,
    ) -> Result<()> {
        if submission.job_type.trim().is_empty() {
            return Err(DomainError::invalid_payload(
                "job_type",
                "must not be empty",
            ));
        }
        if !seen.insert(job_id) {
            return Err(DomainError::invalid_payload(
                "dependencies",
                format!("job {} appears twice in the submission", job_id),
            ));
        }

        let job_index = plan.jobs.len();
        plan.jobs.push(PlannedJob {
            job: Job {
                job_id,
                job_type: submission.job_type.clone(),
                request_body: submission.request_body.clone(),
                request_hash: request_hash(&submission.request_body),
                tags: submission.tags.clone(),
                notes: submission.notes.clone(),
                job_name: submission.job_name.clone(),
                fungibility_group_id: submission.fungibility_group_id.unwrap_or(job_id.0),
                parent_job_id: parent,
                created_at: now,
            },
            dependency_ids: Vec::new(),
        });

        for spec in &submission.dependencies {
            let child_id = Self::walk_dependency(job_id, spec, now, plan, seen)?;
            plan.jobs[job_index].dependency_ids.push(child_id);
        }
        Ok(())
    }

    fn walk_dependency(
        parent_id: JobId,
        spec: &DependencySpec,
        now: DateTime<Utc>,
        plan: &mut SubmissionPlan,
        seen: &mut HashSet<JobId>,
    ) -> Result<JobId> {
        let child_id = match spec {
            DependencySpec::Reference { job_id } => {
                if *job_id == parent_id {
                    return Err(DomainError::invalid_payload(
                        "dependencies",
                        "a job cannot depend on itself",
                    ));
                }
                plan.references.push(*job_id);
                *job_id
            }
            DependencySpec::Inline(child) => {
                let child_id = child.job_id.unwrap_or_else(JobId::new);
                Self::walk(child_id, child, Some(parent_id), now, plan, seen)?;
                child_id
            }
        };
        plan.edges.push((parent_id, child_id));
        Ok(child_id)
    }
}
