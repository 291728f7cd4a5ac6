// Shared kernel - identifiers and errors used across the dispatch service

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a submitted job. Client-supplied on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one execution attempt of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub Uuid);

impl ContractId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContractId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a worker's claim on a contract. Client-supplied so that
/// claim requests can be retried idempotently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitmentId(pub Uuid);

impl CommitmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommitmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain errors, each carrying a stable machine-readable code via
/// [`DomainError::code`].
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("Job {job_id} already exists with a different request body")]
    Conflict { job_id: JobId },

    #[error("Commitment {commitment_id} no longer holds a running contract")]
    StaleCommitment { commitment_id: CommitmentId },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    #[error("Invalid job payload field {field}: {reason}")]
    InvalidPayload { field: String, reason: String },

    #[error("Transient database conflict: {message}")]
    TransientConflict { message: String },

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

impl DomainError {
    /// Stable error code surfaced to transport adapters.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Conflict { .. } => "conflict",
            DomainError::StaleCommitment { .. } => "stale-commitment",
            DomainError::JobNotFound { .. } => "not-found",
            DomainError::InvalidPayload { .. } => "invalid-payload",
            DomainError::TransientConflict { .. } => "internal",
            DomainError::InfrastructureError { .. } => "internal",
        }
    }

    pub fn invalid_payload(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::InvalidPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        DomainError::InfrastructureError {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(error: sqlx::Error) -> Self {
        // Serialisation failures and deadlocks are safe to retry; everything
        // else rolls up as an infrastructure error.
        if let sqlx::Error::Database(db) = &error {
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
                return Self::TransientConflict {
                    message: db.message().to_string(),
                };
            }
        }
        Self::InfrastructureError {
            message: format!("Database error: {}", error),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(error: serde_json::Error) -> Self {
        Self::InfrastructureError {
            message: format!("Serialization error: {}", error),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
