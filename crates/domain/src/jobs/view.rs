//! Read-side views of jobs and their dependency trees

use super::Job;
use crate::contracts::{Contract, ContractOutcome};
use crate::shared_kernel::{ContractId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Condensed contract record embedded in job views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub contract_id: ContractId,
    pub contract_number: i32,
    pub outcome: ContractOutcome,
    pub due: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_body: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<&Contract> for ContractSummary {
    fn from(contract: &Contract) -> Self {
        Self {
            contract_id: contract.contract_id,
            contract_number: contract.contract_number,
            outcome: contract.outcome,
            due: contract.due,
            claimed_at: contract.claimed_at,
            finished_at: contract.finished_at,
            result_body: contract.result_body.clone(),
            error: contract.error.clone(),
        }
    }
}

/// A job with its contract history and nested dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub job_type: String,
    pub request_body: serde_json::Value,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub job_name: Option<String>,
    pub fungibility_group_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Outcome of the latest contract; `None` for jobs still blocked on
    /// dependencies and never issued one.
    pub outcome: Option<ContractOutcome>,
    /// Contracts in ascending `contract_number` order.
    pub contracts: Vec<ContractSummary>,
    pub dependencies: Vec<JobView>,
}

/// Assemble a nested [`JobView`] from flat rows.
///
/// `contracts` must be sorted ascending by `contract_number` per job; `edges`
/// is the full `(parent, child)` set of the subtree. A visited set guards
/// against malformed graphs so assembly always terminates.
pub fn assemble_job_view(
    root: JobId,
    jobs: &HashMap<JobId, Job>,
    contracts: &HashMap<JobId, Vec<ContractSummary>>,
    edges: &[(JobId, JobId)],
) -> Option<JobView> {
    let mut children: HashMap<JobId, Vec<JobId>> = HashMap::new();
    for (parent, child) in edges {
        children.entry(*parent).or_default().push(*child);
    }
    let mut visited = HashSet::new();
    build_view(root, jobs, contracts, &children, &mut visited)
}

fn build_view(
    job_id: JobId,
    jobs: &HashMap<JobId, Job>,
    contracts: &HashMap<JobId, Vec<ContractSummary>>,
    children: &HashMap<JobId, Vec<JobId>>,
    visited: &mut HashSet<JobId>,
) -> Option<JobView> {
    if !visited.insert(job_id) {
        return None;
    }
    let job = jobs.get(&job_id)?;
    let job_contracts = contracts.get(&job_id).cloned().unwrap_or_default();
    let dependencies = children
        .get(&job_id)
        .map(|ids| {
            ids.iter()
                .filter_map(|child| build_view(*child, jobs, contracts, children, visited))
                .collect()
        })
        .unwrap_or_default();
    visited.remove(&job_id);

    Some(JobView {
        job_id,
        job_type: job.job_type.clone(),
        request_body: job.request_body.clone(),
        tags: job.tags.clone(),
        notes: job.notes.clone(),
        job_name: job.job_name.clone(),
        fungibility_group_id: job.fungibility_group_id,
        created_at: job.created_at,
        outcome: job_contracts.last().map(|c| c.outcome),
        contracts: job_contracts,
        dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::request_hash;
    use serde_json::json;

    fn job(job_id: JobId, job_type: &str) -> Job {
        let body = json!({"t": job_type});
        Job {
            job_id,
            job_type: job_type.to_string(),
            request_hash: request_hash(&body),
            request_body: body,
            tags: Vec::new(),
            notes: None,
            job_name: None,
            fungibility_group_id: job_id.0,
            parent_job_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn assembles_nested_tree() {
        let (p, c, g) = (JobId::new(), JobId::new(), JobId::new());
        let jobs: HashMap<_, _> = [(p, job(p, "p")), (c, job(c, "c")), (g, job(g, "g"))].into();
        let contracts = HashMap::new();
        let edges = vec![(p, c), (c, g)];

        let view = assemble_job_view(p, &jobs, &contracts, &edges).unwrap();
        assert_eq!(view.dependencies.len(), 1);
        assert_eq!(view.dependencies[0].job_id, c);
        assert_eq!(view.dependencies[0].dependencies[0].job_id, g);
        assert_eq!(view.outcome, None);
    }

    #[test]
    fn latest_contract_outcome_wins() {
        let id = JobId::new();
        let jobs: HashMap<_, _> = [(id, job(id, "solo"))].into();
        let mk = |number, outcome| ContractSummary {
            contract_id: ContractId::new(),
            contract_number: number,
            outcome,
            due: Utc::now(),
            claimed_at: None,
            finished_at: None,
            result_body: None,
            error: None,
        };
        let contracts: HashMap<_, _> = [(
            id,
            vec![mk(1, ContractOutcome::Error), mk(2, ContractOutcome::Waiting)],
        )]
        .into();

        let view = assemble_job_view(id, &jobs, &contracts, &[]).unwrap();
        assert_eq!(view.outcome, Some(ContractOutcome::Waiting));
        assert_eq!(view.contracts.len(), 2);
    }

    #[test]
    fn diamond_dependency_appears_under_both_parents() {
        let (root, a, b, shared) = (JobId::new(), JobId::new(), JobId::new(), JobId::new());
        let jobs: HashMap<_, _> = [
            (root, job(root, "root")),
            (a, job(a, "a")),
            (b, job(b, "b")),
            (shared, job(shared, "shared")),
        ]
        .into();
        let edges = vec![(root, a), (root, b), (a, shared), (b, shared)];

        let view = assemble_job_view(root, &jobs, &HashMap::new(), &edges).unwrap();
        assert_eq!(view.dependencies.len(), 2);
        for dep in &view.dependencies {
            assert_eq!(dep.dependencies.len(), 1);
            assert_eq!(dep.dependencies[0].job_id, shared);
        }
    }
}
