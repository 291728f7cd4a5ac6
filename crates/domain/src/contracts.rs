//! Contracts - execution attempts of jobs
//!
//! A contract is one attempt to execute a job. A job enters the waiting pool
//! by getting a `waiting` contract; a worker claims it, runs it, and reports
//! a [`WorkResult`]. At most one contract per job is open (waiting or
//! running) at any time; retries append contracts with increasing
//! `contract_number`.

use crate::shared_kernel::{CommitmentId, ContractId, DomainError, JobId, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grace subtracted from `created_at` to form the default `due`, so freshly
/// created contracts are eligible even across small clock skew.
pub const DEFAULT_DUE_GRACE: TimeDelta = TimeDelta::seconds(5);

/// Outcome of a contract.
///
/// `Waiting` and `Running` are the open states; everything else ends the
/// attempt. `TryLater` ends the attempt but immediately spawns a successor
/// contract with a deferred `due`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractOutcome {
    Waiting,
    Running,
    Success,
    Error,
    Cancelled,
    TryLater,
}

impl ContractOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ContractOutcome::Waiting | ContractOutcome::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractOutcome::Waiting => "waiting",
            ContractOutcome::Running => "running",
            ContractOutcome::Success => "success",
            ContractOutcome::Error => "error",
            ContractOutcome::Cancelled => "cancelled",
            ContractOutcome::TryLater => "try-later",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(ContractOutcome::Waiting),
            "running" => Ok(ContractOutcome::Running),
            "success" => Ok(ContractOutcome::Success),
            "error" => Ok(ContractOutcome::Error),
            "cancelled" => Ok(ContractOutcome::Cancelled),
            "try-later" => Ok(ContractOutcome::TryLater),
            other => Err(DomainError::infrastructure(format!(
                "Unknown contract outcome: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ContractOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution attempt of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: ContractId,
    pub job_id: JobId,
    /// 1-based; grows only through retry and try-later successors.
    pub contract_number: i32,
    pub outcome: ContractOutcome,
    /// Earliest instant the contract is eligible for claiming.
    pub due: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_body: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Contract {
    /// A fresh `waiting` contract, due immediately.
    pub fn waiting(job_id: JobId, contract_number: i32, now: DateTime<Utc>) -> Self {
        Self::waiting_due(job_id, contract_number, now, now - DEFAULT_DUE_GRACE)
    }

    /// A fresh `waiting` contract with an explicit `due` (try-later successors).
    pub fn waiting_due(
        job_id: JobId,
        contract_number: i32,
        now: DateTime<Utc>,
        due: DateTime<Utc>,
    ) -> Self {
        Self {
            contract_id: ContractId::new(),
            job_id,
            contract_number,
            outcome: ContractOutcome::Waiting,
            due,
            created_at: now,
            claimed_at: None,
            finished_at: None,
            result_body: None,
            error: None,
        }
    }
}

/// Tagged completion result reported by a worker through `complete-work!`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkResult {
    /// Work finished; `body` becomes the contract's `result_body` and parents
    /// blocked on this job may be released.
    Success { body: serde_json::Value },
    /// Work failed; the message is recorded on the contract.
    Error { message: String },
    /// The worker observed the cancel instruction and stopped.
    Cancelled,
    /// The worker defers the job; a successor contract is created with the
    /// given `due`.
    TryLater {
        due: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The worker discovered dependencies mid-run. The job's contract returns
    /// to `waiting` and becomes claimable again once every new dependency
    /// succeeds.
    AddDependencies {
        requests: Vec<crate::jobs::DependencySpec>,
    },
}

/// Filter a worker supplies when asking for work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkFilter {
    pub job_type: String,
    /// The job's tag set must contain every tag listed here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl WorkFilter {
    pub fn job_type(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            tags: Vec::new(),
        }
    }
}

/// A dependency of a claimed job, rendered with the result its latest
/// contract produced. Consumers treat the collection as a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyResult {
    pub job_id: JobId,
    pub job_type: String,
    pub request_body: serde_json::Value,
    pub result_body: Option<serde_json::Value>,
}

/// Everything a worker needs to execute a claimed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractView {
    pub commitment_id: CommitmentId,
    pub contract_id: ContractId,
    pub job_id: JobId,
    pub job_type: String,
    pub request_body: serde_json::Value,
    pub tags: Vec<String>,
    pub dependencies: Vec<DependencyResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_round_trips_through_str() {
        for outcome in [
            ContractOutcome::Waiting,
            ContractOutcome::Running,
            ContractOutcome::Success,
            ContractOutcome::Error,
            ContractOutcome::Cancelled,
            ContractOutcome::TryLater,
        ] {
            assert_eq!(ContractOutcome::parse(outcome.as_str()).unwrap(), outcome);
        }
        assert!(ContractOutcome::parse("done").is_err());
    }

    #[test]
    fn open_outcomes() {
        assert!(ContractOutcome::Waiting.is_open());
        assert!(ContractOutcome::Running.is_open());
        assert!(!ContractOutcome::TryLater.is_open());
        assert!(!ContractOutcome::Cancelled.is_open());
    }

    #[test]
    fn waiting_contract_is_due_before_creation() {
        let now = Utc::now();
        let contract = Contract::waiting(JobId::new(), 1, now);
        assert!(contract.due < now);
        assert_eq!(contract.outcome, ContractOutcome::Waiting);
        assert_eq!(contract.contract_number, 1);
    }

    #[test]
    fn work_result_serde_tags() {
        let success: WorkResult =
            serde_json::from_value(json!({"kind": "success", "body": {"v": 1}})).unwrap();
        assert!(matches!(success, WorkResult::Success { .. }));

        let later: WorkResult = serde_json::from_value(
            json!({"kind": "try-later", "due": "2026-01-01T00:00:00Z"}),
        )
        .unwrap();
        assert!(matches!(later, WorkResult::TryLater { reason: None, .. }));
    }
}
