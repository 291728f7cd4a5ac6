//! Domain model of the charter dispatch service.
//!
//! Jobs are submitted as dependency trees; execution attempts are contracts;
//! a worker's claim on a contract is a commitment. The [`store`] module
//! defines the transactional persistence port the engines run against.

pub mod agents;
pub mod commitments;
pub mod contracts;
pub mod jobs;
pub mod shared_kernel;
pub mod store;

pub use agents::{Agent, AgentDetails};
pub use commitments::{Commitment, HeartbeatInstruction, HeartbeatResponse};
pub use contracts::{
    Contract, ContractOutcome, ContractView, DependencyResult, WorkFilter, WorkResult,
};
pub use jobs::{
    assemble_job_view, request_hash, ContractSummary, DependencySpec, Job, JobSubmission, JobView,
    SubmissionPlan,
};
pub use shared_kernel::{AgentId, CommitmentId, ContractId, DomainError, JobId, Result};
pub use store::{DispatchStore, JobSummary, PutJobOutcome};
