//! Dispatch service facade
//!
//! The operations transport adapters call, one store transaction each.
//! Transient database conflicts are retried here a bounded number of times
//! before surfacing as an internal error.

use charter_domain::agents::AgentDetails;
use charter_domain::commitments::{HeartbeatInstruction, HeartbeatResponse};
use charter_domain::contracts::{ContractView, WorkFilter, WorkResult};
use charter_domain::jobs::{JobSubmission, JobView, SubmissionPlan};
use charter_domain::shared_kernel::{AgentId, CommitmentId, DomainError, JobId, Result};
use charter_domain::store::{DispatchStore, JobSummary, PutJobOutcome};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts per operation before a transient conflict is surfaced.
const MAX_TRANSIENT_RETRIES: u32 = 3;

/// The external surface of the dispatch engine.
#[derive(Clone)]
pub struct DispatchService {
    store: Arc<dyn DispatchStore>,
}

impl DispatchService {
    pub fn new(store: Arc<dyn DispatchStore>) -> Self {
        Self { store }
    }

    /// Register a worker agent, returning the same id for the same
    /// `(hostname, system_name, system_version)` triple every time.
    pub async fn register_agent(&self, details: &AgentDetails) -> Result<AgentId> {
        if details.hostname.trim().is_empty() {
            return Err(DomainError::invalid_payload("hostname", "must not be empty"));
        }
        let agent_id = self.store.upsert_agent(details).await?;
        debug!(%agent_id, hostname = %details.hostname, "agent registered");
        Ok(agent_id)
    }

    /// Submit a job tree. Resubmitting an identical payload is a no-op;
    /// a different payload under the same id fails with `conflict`.
    pub async fn put_job(
        &self,
        job_id: JobId,
        submission: &JobSubmission,
    ) -> Result<PutJobOutcome> {
        let plan = SubmissionPlan::build(job_id, submission, Utc::now())?;

        let mut attempt = 0;
        let outcome = loop {
            match self.store.put_job(&plan).await {
                Err(DomainError::TransientConflict { message }) => {
                    attempt += 1;
                    if attempt >= MAX_TRANSIENT_RETRIES {
                        break Err(DomainError::infrastructure(message));
                    }
                    warn!(%job_id, attempt, "retrying job submission after transient conflict");
                }
                other => break other,
            }
        }?;

        match outcome {
            PutJobOutcome::Created => {
                info!(%job_id, job_type = %submission.job_type, jobs = plan.jobs.len(), "job tree created")
            }
            PutJobOutcome::Unchanged => debug!(%job_id, "job resubmitted unchanged"),
        }
        Ok(outcome)
    }

    /// Fetch a job with its contract history and nested dependencies.
    pub async fn get_job(&self, job_id: JobId) -> Result<Option<JobView>> {
        self.store.get_job(job_id).await
    }

    /// Page over all jobs, newest first.
    pub async fn list_jobs(&self, limit: usize, offset: usize) -> Result<(Vec<JobSummary>, usize)> {
        self.store.list_jobs(limit.min(500), offset).await
    }

    /// Cancel the job's open contract and every open descendant contract.
    /// Running workers learn of it on their next heartbeat.
    pub async fn pause_job(&self, job_id: JobId) -> Result<()> {
        self.store.pause_job(job_id, Utc::now()).await?;
        info!(%job_id, "job paused");
        Ok(())
    }

    /// Re-open `waiting` contracts for every cancelled or errored job in
    /// the subtree. Successful descendants are not re-executed.
    pub async fn retry_job(&self, job_id: JobId) -> Result<()> {
        self.store.retry_job(job_id, Utc::now()).await?;
        info!(%job_id, "job retried");
        Ok(())
    }

    /// Claim the oldest eligible contract matching the filter, registering
    /// the agent on the way. Returns `None` when nothing qualifies; replays
    /// of a known `commitment_id` return the prior claim.
    pub async fn request_work(
        &self,
        commitment_id: CommitmentId,
        filter: &WorkFilter,
        agent: &AgentDetails,
    ) -> Result<Option<ContractView>> {
        if filter.job_type.trim().is_empty() {
            return Err(DomainError::invalid_payload("job_type", "must not be empty"));
        }
        let agent_id = self.register_agent(agent).await?;

        let mut attempt = 0;
        let view = loop {
            match self
                .store
                .claim_work(commitment_id, filter, agent_id, Utc::now())
                .await
            {
                Err(DomainError::TransientConflict { message }) => {
                    attempt += 1;
                    if attempt >= MAX_TRANSIENT_RETRIES {
                        break Err(DomainError::infrastructure(message));
                    }
                    warn!(%commitment_id, attempt, "retrying claim after transient conflict");
                }
                other => break other,
            }
        }?;

        if let Some(view) = &view {
            info!(%commitment_id, job_id = %view.job_id, job_type = %view.job_type, "contract claimed");
        }
        Ok(view)
    }

    /// Record a heartbeat. The reply is the only channel carrying the
    /// cancel instruction back to a running worker.
    pub async fn heartbeat(&self, commitment_id: CommitmentId) -> Result<HeartbeatResponse> {
        let instruction = self.store.heartbeat(commitment_id, Utc::now()).await?;
        if instruction == HeartbeatInstruction::Cancel {
            debug!(%commitment_id, "heartbeat answered with cancel");
        }
        Ok(HeartbeatResponse { instruction })
    }

    /// Apply a worker's completion result to its contract.
    pub async fn complete_work(
        &self,
        commitment_id: CommitmentId,
        result: WorkResult,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self
                .store
                .complete_work(commitment_id, result.clone(), Utc::now())
                .await
            {
                Err(DomainError::TransientConflict { message }) => {
                    attempt += 1;
                    if attempt >= MAX_TRANSIENT_RETRIES {
                        return Err(DomainError::infrastructure(message));
                    }
                    warn!(%commitment_id, attempt, "retrying completion after transient conflict");
                }
                Ok(()) => {
                    debug!(%commitment_id, "work completed");
                    return Ok(());
                }
                Err(other) => return Err(other),
            }
        }
    }
}
