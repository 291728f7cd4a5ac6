//! Commitments - worker claims on contracts
//!
//! A commitment binds one agent to one contract for the duration of the
//! attempt. The heartbeat reply is the only channel by which a running
//! worker learns its contract was cancelled; there is no server push.

use crate::shared_kernel::{AgentId, CommitmentId, ContractId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binding of an agent to a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub commitment_id: CommitmentId,
    pub contract_id: ContractId,
    pub agent_id: AgentId,
    pub claimed_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Instruction returned on every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeartbeatInstruction {
    /// Keep working.
    Continue,
    /// The contract was cancelled; stop and report `cancelled`.
    Cancel,
}

/// Wire shape of a heartbeat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub instruction: HeartbeatInstruction,
}
