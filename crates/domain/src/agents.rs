//! Agents - worker identities
//!
//! Agents register once per `(hostname, system_name, system_version)` and
//! reuse the same id across reconnects; registration is an idempotent
//! upsert and agents are never deleted.

use crate::shared_kernel::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity a worker presents when registering or claiming work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentDetails {
    pub hostname: String,
    pub system_name: String,
    pub system_version: String,
}

impl AgentDetails {
    pub fn new(
        hostname: impl Into<String>,
        system_name: impl Into<String>,
        system_version: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            system_name: system_name.into(),
            system_version: system_version.into(),
        }
    }
}

/// A registered worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub hostname: String,
    pub system_name: String,
    pub system_version: String,
    pub registered_at: DateTime<Utc>,
}
