//! In-memory dispatch store
//!
//! Backs unit and scenario tests without a database. One mutex over the
//! whole state stands in for the per-call transaction: every trait method
//! takes the lock once, so callers observe the same atomicity the Postgres
//! store provides.

use async_trait::async_trait;
use charter_domain::agents::{Agent, AgentDetails};
use charter_domain::commitments::{Commitment, HeartbeatInstruction};
use charter_domain::contracts::{
    Contract, ContractOutcome, ContractView, DependencyResult, WorkFilter, WorkResult,
};
use charter_domain::jobs::{assemble_job_view, ContractSummary, Job, JobView, SubmissionPlan};
use charter_domain::shared_kernel::{
    AgentId, CommitmentId, ContractId, DomainError, JobId, Result,
};
use charter_domain::store::{DispatchStore, JobSummary, PutJobOutcome};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    agents: Vec<Agent>,
    jobs: HashMap<JobId, Job>,
    edges: HashSet<(JobId, JobId)>,
    contracts: HashMap<ContractId, Contract>,
    commitments: HashMap<CommitmentId, Commitment>,
}

impl State {
    fn contracts_of(&self, job_id: JobId) -> Vec<&Contract> {
        let mut contracts: Vec<&Contract> = self
            .contracts
            .values()
            .filter(|c| c.job_id == job_id)
            .collect();
        contracts.sort_by_key(|c| c.contract_number);
        contracts
    }

    fn latest_contract(&self, job_id: JobId) -> Option<&Contract> {
        self.contracts_of(job_id).into_iter().next_back()
    }

    fn open_contract_id(&self, job_id: JobId) -> Option<ContractId> {
        self.contracts
            .values()
            .find(|c| c.job_id == job_id && c.outcome.is_open())
            .map(|c| c.contract_id)
    }

    fn children_of(&self, job_id: JobId) -> Vec<JobId> {
        self.edges
            .iter()
            .filter(|(parent, _)| *parent == job_id)
            .map(|(_, child)| *child)
            .collect()
    }

    fn parents_of(&self, job_id: JobId) -> Vec<JobId> {
        self.edges
            .iter()
            .filter(|(_, child)| *child == job_id)
            .map(|(parent, _)| *parent)
            .collect()
    }

    /// All dependencies' latest contracts succeeded. Vacuously true for
    /// jobs without dependencies; false while any dependency has no
    /// contract yet.
    fn deps_satisfied(&self, job_id: JobId) -> bool {
        self.children_of(job_id).into_iter().all(|child| {
            self.latest_contract(child)
                .is_some_and(|c| c.outcome == ContractOutcome::Success)
        })
    }

    /// The job and every job reachable through dependency edges.
    fn subtree(&self, root: JobId) -> Vec<JobId> {
        let mut seen = HashSet::from([root]);
        let mut order = vec![root];
        let mut queue = VecDeque::from([root]);
        while let Some(job_id) = queue.pop_front() {
            for child in self.children_of(job_id) {
                if seen.insert(child) {
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }
        order
    }

    fn next_contract_number(&self, job_id: JobId) -> i32 {
        self.latest_contract(job_id)
            .map(|c| c.contract_number + 1)
            .unwrap_or(1)
    }

    fn push_waiting(&mut self, job_id: JobId, now: DateTime<Utc>) {
        let contract = Contract::waiting(job_id, self.next_contract_number(job_id), now);
        self.contracts.insert(contract.contract_id, contract);
    }

    /// Insert the plan's jobs and edges. Existing jobs are compared by
    /// request hash; new jobs whose dependencies are already satisfied get
    /// their first contract.
    fn apply_plan(&mut self, plan: &SubmissionPlan, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        for reference in &plan.references {
            if !self.jobs.contains_key(reference) {
                return Err(DomainError::invalid_payload(
                    "dependencies",
                    format!("referenced job {} does not exist", reference),
                ));
            }
        }

        // Validate before touching anything so a failed call leaves the
        // state exactly as it was.
        for planned in &plan.jobs {
            if let Some(existing) = self.jobs.get(&planned.job.job_id) {
                if existing.request_hash != planned.job.request_hash {
                    return Err(DomainError::Conflict {
                        job_id: planned.job.job_id,
                    });
                }
            }
        }

        let mut inserted = Vec::new();
        for planned in &plan.jobs {
            let job = &planned.job;
            if !self.jobs.contains_key(&job.job_id) {
                self.jobs.insert(job.job_id, job.clone());
                inserted.push(job.job_id);
            }
        }
        for edge in &plan.edges {
            self.edges.insert(*edge);
        }
        for job_id in &inserted {
            if self.deps_satisfied(*job_id) {
                self.push_waiting(*job_id, now);
            }
        }
        Ok(inserted)
    }

    /// A child's contract succeeded: open contracts for parents that are now
    /// fully satisfied. Parents whose latest contract ended in `cancelled`
    /// or `error` stay down until an explicit retry.
    fn release_parents(&mut self, child: JobId, now: DateTime<Utc>) {
        for parent in self.parents_of(child) {
            if !self.deps_satisfied(parent) || self.open_contract_id(parent).is_some() {
                continue;
            }
            let latest = self.latest_contract(parent).map(|c| c.outcome);
            if matches!(
                latest,
                Some(ContractOutcome::Cancelled) | Some(ContractOutcome::Error)
            ) {
                continue;
            }
            self.push_waiting(parent, now);
        }
    }

    fn dependency_results(&self, job_id: JobId) -> Vec<DependencyResult> {
        self.children_of(job_id)
            .into_iter()
            .filter_map(|child| {
                let job = self.jobs.get(&child)?;
                Some(DependencyResult {
                    job_id: child,
                    job_type: job.job_type.clone(),
                    request_body: job.request_body.clone(),
                    result_body: self
                        .latest_contract(child)
                        .and_then(|c| c.result_body.clone()),
                })
            })
            .collect()
    }

    fn contract_view(&self, commitment: &Commitment) -> Result<ContractView> {
        let contract = self
            .contracts
            .get(&commitment.contract_id)
            .ok_or_else(|| DomainError::infrastructure("commitment without contract"))?;
        let job = self
            .jobs
            .get(&contract.job_id)
            .ok_or_else(|| DomainError::infrastructure("contract without job"))?;
        Ok(ContractView {
            commitment_id: commitment.commitment_id,
            contract_id: contract.contract_id,
            job_id: job.job_id,
            job_type: job.job_type.clone(),
            request_body: job.request_body.clone(),
            tags: job.tags.clone(),
            dependencies: self.dependency_results(job.job_id),
        })
    }
}

/// In-memory [`DispatchStore`].
#[derive(Clone, Default)]
pub struct InMemoryDispatchStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryDispatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DispatchStore for InMemoryDispatchStore {
    async fn upsert_agent(&self, details: &AgentDetails) -> Result<AgentId> {
        let mut state = self.state.lock().await;
        if let Some(agent) = state.agents.iter().find(|a| {
            a.hostname == details.hostname
                && a.system_name == details.system_name
                && a.system_version == details.system_version
        }) {
            return Ok(agent.agent_id);
        }
        let agent = Agent {
            agent_id: AgentId::new(),
            hostname: details.hostname.clone(),
            system_name: details.system_name.clone(),
            system_version: details.system_version.clone(),
            registered_at: Utc::now(),
        };
        let agent_id = agent.agent_id;
        state.agents.push(agent);
        Ok(agent_id)
    }

    async fn put_job(&self, plan: &SubmissionPlan) -> Result<PutJobOutcome> {
        let root = plan
            .jobs
            .first()
            .ok_or_else(|| DomainError::invalid_payload("dependencies", "empty submission"))?;
        let now = root.job.created_at;

        let mut state = self.state.lock().await;
        if let Some(existing) = state.jobs.get(&root.job.job_id) {
            return if existing.request_hash == root.job.request_hash {
                Ok(PutJobOutcome::Unchanged)
            } else {
                Err(DomainError::Conflict {
                    job_id: root.job.job_id,
                })
            };
        }
        state.apply_plan(plan, now)?;
        Ok(PutJobOutcome::Created)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobView>> {
        let state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            return Ok(None);
        }
        let subtree = state.subtree(job_id);
        let jobs: HashMap<JobId, Job> = subtree
            .iter()
            .filter_map(|id| state.jobs.get(id).map(|j| (*id, j.clone())))
            .collect();
        let contracts: HashMap<JobId, Vec<ContractSummary>> = subtree
            .iter()
            .map(|id| {
                (
                    *id,
                    state
                        .contracts_of(*id)
                        .into_iter()
                        .map(ContractSummary::from)
                        .collect(),
                )
            })
            .collect();
        let edges: Vec<(JobId, JobId)> = state
            .edges
            .iter()
            .filter(|(parent, _)| subtree.contains(parent))
            .copied()
            .collect();
        Ok(assemble_job_view(job_id, &jobs, &contracts, &edges))
    }

    async fn list_jobs(&self, limit: usize, offset: usize) -> Result<(Vec<JobSummary>, usize)> {
        let state = self.state.lock().await;
        let total = state.jobs.len();
        let mut jobs: Vec<&Job> = state.jobs.values().collect();
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        let page = jobs
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|job| JobSummary {
                job_id: job.job_id,
                job_type: job.job_type.clone(),
                job_name: job.job_name.clone(),
                tags: job.tags.clone(),
                created_at: job.created_at,
                outcome: state.latest_contract(job.job_id).map(|c| c.outcome),
            })
            .collect();
        Ok((page, total))
    }

    async fn pause_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(DomainError::JobNotFound { job_id });
        }
        let open: Vec<ContractId> = state
            .subtree(job_id)
            .into_iter()
            .filter_map(|id| state.open_contract_id(id))
            .collect();
        for contract_id in open {
            if let Some(contract) = state.contracts.get_mut(&contract_id) {
                contract.outcome = ContractOutcome::Cancelled;
                contract.finished_at = Some(now);
            }
        }
        Ok(())
    }

    async fn retry_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(DomainError::JobNotFound { job_id });
        }
        let retryable: Vec<JobId> = state
            .subtree(job_id)
            .into_iter()
            .filter(|id| {
                matches!(
                    state.latest_contract(*id).map(|c| c.outcome),
                    Some(ContractOutcome::Cancelled) | Some(ContractOutcome::Error)
                )
            })
            .collect();
        for job_id in retryable {
            state.push_waiting(job_id, now);
        }
        Ok(())
    }

    async fn claim_work(
        &self,
        commitment_id: CommitmentId,
        filter: &WorkFilter,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Option<ContractView>> {
        let mut state = self.state.lock().await;

        // Idempotent replay of a prior claim.
        if let Some(commitment) = state.commitments.get(&commitment_id) {
            let view = state.contract_view(&commitment.clone())?;
            return Ok(Some(view));
        }

        let mut candidates: Vec<(DateTime<Utc>, String, ContractId)> = state
            .contracts
            .values()
            .filter(|c| c.outcome == ContractOutcome::Waiting && c.due <= now)
            .filter_map(|c| {
                let job = state.jobs.get(&c.job_id)?;
                if job.job_type != filter.job_type {
                    return None;
                }
                if !filter.tags.iter().all(|tag| job.tags.contains(tag)) {
                    return None;
                }
                if !state.deps_satisfied(job.job_id) {
                    return None;
                }
                Some((job.created_at, job.job_id.to_string(), c.contract_id))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let Some((_, _, contract_id)) = candidates.into_iter().next() else {
            return Ok(None);
        };

        if let Some(contract) = state.contracts.get_mut(&contract_id) {
            contract.outcome = ContractOutcome::Running;
            contract.claimed_at = Some(now);
        }
        let commitment = Commitment {
            commitment_id,
            contract_id,
            agent_id,
            claimed_at: now,
            last_heartbeat: now,
        };
        let view = state.contract_view(&commitment)?;
        state.commitments.insert(commitment_id, commitment);
        Ok(Some(view))
    }

    async fn heartbeat(
        &self,
        commitment_id: CommitmentId,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatInstruction> {
        let mut state = self.state.lock().await;
        let contract_id = state
            .commitments
            .get(&commitment_id)
            .map(|c| c.contract_id)
            .ok_or(DomainError::StaleCommitment { commitment_id })?;
        let outcome = state
            .contracts
            .get(&contract_id)
            .map(|c| c.outcome)
            .ok_or(DomainError::StaleCommitment { commitment_id })?;
        match outcome {
            ContractOutcome::Running => {
                let commitment = state
                    .commitments
                    .get_mut(&commitment_id)
                    .ok_or(DomainError::StaleCommitment { commitment_id })?;
                if now > commitment.last_heartbeat {
                    commitment.last_heartbeat = now;
                }
                Ok(HeartbeatInstruction::Continue)
            }
            ContractOutcome::Cancelled => Ok(HeartbeatInstruction::Cancel),
            _ => Err(DomainError::StaleCommitment { commitment_id }),
        }
    }

    async fn complete_work(
        &self,
        commitment_id: CommitmentId,
        result: WorkResult,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let contract_id = state
            .commitments
            .get(&commitment_id)
            .map(|c| c.contract_id)
            .ok_or(DomainError::StaleCommitment { commitment_id })?;
        let (job_id, contract_number) = {
            let contract = state
                .contracts
                .get(&contract_id)
                .ok_or(DomainError::StaleCommitment { commitment_id })?;
            if contract.outcome != ContractOutcome::Running {
                // A worker acknowledging a pause it observed is not stale.
                if contract.outcome == ContractOutcome::Cancelled
                    && matches!(result, WorkResult::Cancelled)
                {
                    return Ok(());
                }
                return Err(DomainError::StaleCommitment { commitment_id });
            }
            (contract.job_id, contract.contract_number)
        };

        match result {
            WorkResult::Success { body } => {
                let contract = state.contracts.get_mut(&contract_id).ok_or(DomainError::StaleCommitment { commitment_id })?;
                contract.outcome = ContractOutcome::Success;
                contract.result_body = Some(body);
                contract.finished_at = Some(now);
                state.release_parents(job_id, now);
            }
            WorkResult::Error { message } => {
                let contract = state.contracts.get_mut(&contract_id).ok_or(DomainError::StaleCommitment { commitment_id })?;
                contract.outcome = ContractOutcome::Error;
                contract.error = Some(message);
                contract.finished_at = Some(now);
            }
            WorkResult::Cancelled => {
                let contract = state.contracts.get_mut(&contract_id).ok_or(DomainError::StaleCommitment { commitment_id })?;
                contract.outcome = ContractOutcome::Cancelled;
                contract.finished_at = Some(now);
            }
            WorkResult::TryLater { due, reason } => {
                let contract = state.contracts.get_mut(&contract_id).ok_or(DomainError::StaleCommitment { commitment_id })?;
                contract.outcome = ContractOutcome::TryLater;
                contract.error = reason;
                contract.finished_at = Some(now);
                let successor =
                    Contract::waiting_due(job_id, contract_number + 1, now, due);
                state.contracts.insert(successor.contract_id, successor);
            }
            WorkResult::AddDependencies { requests } => {
                let plan = SubmissionPlan::build_additions(job_id, &requests, now)?;
                state.apply_plan(&plan, now)?;
                let contract = state.contracts.get_mut(&contract_id).ok_or(DomainError::StaleCommitment { commitment_id })?;
                contract.outcome = ContractOutcome::Waiting;
                contract.claimed_at = None;
                // The commitment is terminated; a later claim of this
                // contract opens a fresh one.
                state.commitments.remove(&commitment_id);
            }
        }
        Ok(())
    }

    async fn expire_silent_commitments(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>> {
        let mut state = self.state.lock().await;
        let silent: Vec<ContractId> = state
            .commitments
            .values()
            .filter(|m| m.last_heartbeat < cutoff)
            .map(|m| m.contract_id)
            .collect();
        let mut expired = Vec::new();
        for contract_id in silent {
            if let Some(contract) = state.contracts.get_mut(&contract_id) {
                if contract.outcome == ContractOutcome::Running {
                    contract.outcome = ContractOutcome::Error;
                    contract.error = Some("heartbeat expired".to_string());
                    contract.finished_at = Some(now);
                    expired.push(contract.job_id);
                }
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_domain::jobs::JobSubmission;
    use serde_json::json;

    fn plan(job_id: JobId, job_type: &str, now: DateTime<Utc>) -> SubmissionPlan {
        SubmissionPlan::build(
            job_id,
            &JobSubmission::new(job_type, json!({"t": job_type})),
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn pause_and_retry_reject_unknown_jobs() {
        let store = InMemoryDispatchStore::new();
        let missing = JobId::new();
        assert!(matches!(
            store.pause_job(missing, Utc::now()).await.unwrap_err(),
            DomainError::JobNotFound { .. }
        ));
        assert!(matches!(
            store.retry_job(missing, Utc::now()).await.unwrap_err(),
            DomainError::JobNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn listing_pages_newest_first() {
        let store = InMemoryDispatchStore::new();
        let base = Utc::now();
        for offset in 0..3 {
            let job_id = JobId::new();
            store
                .put_job(&plan(job_id, "batch", base + chrono::Duration::seconds(offset)))
                .await
                .unwrap();
        }

        let (page, total) = store.list_jobs(2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at > page[1].created_at);
        assert_eq!(page[0].outcome, Some(ContractOutcome::Waiting));

        let (rest, _) = store.list_jobs(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn due_in_the_future_is_not_claimable() {
        let store = InMemoryDispatchStore::new();
        let job_id = JobId::new();
        let now = Utc::now();
        store.put_job(&plan(job_id, "defer", now)).await.unwrap();
        let agent_id = store
            .upsert_agent(&AgentDetails::new("h", "linux", "1"))
            .await
            .unwrap();

        // The default due sits just before creation.
        let too_early = now - chrono::Duration::seconds(30);
        let early = store
            .claim_work(
                CommitmentId::new(),
                &WorkFilter::job_type("defer"),
                agent_id,
                too_early,
            )
            .await
            .unwrap();
        assert!(early.is_none());

        let claimed = store
            .claim_work(
                CommitmentId::new(),
                &WorkFilter::job_type("defer"),
                agent_id,
                now,
            )
            .await
            .unwrap();
        assert!(claimed.is_some());
    }
}
