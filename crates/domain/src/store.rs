//! Persistence port for the dispatch engine
//!
//! Every method is one atomic unit: implementations run each call inside a
//! single database transaction (or an equivalent exclusive section), so no
//! caller ever observes a torn job graph or a half-applied completion.

use crate::agents::AgentDetails;
use crate::commitments::HeartbeatInstruction;
use crate::contracts::{ContractOutcome, ContractView, WorkFilter, WorkResult};
use crate::jobs::{JobView, SubmissionPlan};
use crate::shared_kernel::{AgentId, CommitmentId, JobId, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a `put-job!` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PutJobOutcome {
    /// The job tree was inserted.
    Created,
    /// The root job already existed with an identical request hash.
    Unchanged,
}

/// One row of the paged job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub job_type: String,
    pub job_name: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<ContractOutcome>,
}

/// Transactional storage of jobs, contracts, commitments and agents.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Idempotent upsert keyed on `(hostname, system_name, system_version)`.
    async fn upsert_agent(&self, details: &AgentDetails) -> Result<AgentId>;

    /// Insert a planned job tree and open a `waiting` contract for every new
    /// job whose dependencies are already satisfied.
    ///
    /// When the root job exists: an identical `request_hash` is a no-op
    /// ([`PutJobOutcome::Unchanged`]), a different one fails with
    /// `conflict`. Referenced jobs in `plan.references` must exist.
    async fn put_job(&self, plan: &SubmissionPlan) -> Result<PutJobOutcome>;

    /// Fetch a job with contract history and nested dependencies.
    async fn get_job(&self, job_id: JobId) -> Result<Option<JobView>>;

    /// Page over all jobs, newest first. Returns the page and total count.
    async fn list_jobs(&self, limit: usize, offset: usize) -> Result<(Vec<JobSummary>, usize)>;

    /// Cancel the job's open contract and every open descendant contract.
    async fn pause_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()>;

    /// Open a fresh `waiting` contract for every job in the subtree whose
    /// latest contract is `cancelled` or `error`.
    async fn retry_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()>;

    /// Atomically claim the oldest eligible `waiting` contract matching the
    /// filter: `due <= now`, dependencies satisfied, FIFO by job
    /// `created_at` with ties broken by `job_id` text order.
    ///
    /// A `commitment_id` seen before returns the prior claim's view without
    /// touching anything.
    async fn claim_work(
        &self,
        commitment_id: CommitmentId,
        filter: &WorkFilter,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Option<ContractView>>;

    /// Record a heartbeat (monotonically) and report whether the worker
    /// should continue or stop.
    async fn heartbeat(
        &self,
        commitment_id: CommitmentId,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatInstruction>;

    /// Apply a completion to the committed contract. Fails with
    /// `stale-commitment` unless the contract is still `running`.
    /// `add-dependencies` requests are planned and inserted inside the same
    /// transaction that re-opens the contract.
    async fn complete_work(
        &self,
        commitment_id: CommitmentId,
        result: WorkResult,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Reaper hook: mark running contracts whose commitment heartbeat is
    /// older than `cutoff` as `error`. Returns the affected job ids.
    async fn expire_silent_commitments(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>>;
}
