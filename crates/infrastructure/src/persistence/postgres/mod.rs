//! PostgreSQL dispatch store
//!
//! Production implementation of [`charter_domain::store::DispatchStore`].
//! Every trait method runs in one database transaction; claim contention is
//! resolved with `FOR UPDATE SKIP LOCKED` and all invariants are backed by
//! unique indexes in the schema below.

mod store;

use super::DatabaseConfig;
use charter_domain::shared_kernel::{DomainError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// PostgreSQL-backed [`charter_domain::store::DispatchStore`].
#[derive(Clone)]
pub struct PostgresDispatchStore {
    pool: PgPool,
}

impl PostgresDispatchStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::InfrastructureError {
                message: format!("Failed to connect to database: {}", e),
            })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the dispatch schema if it does not exist.
    pub async fn run_migrations(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                agent_id UUID PRIMARY KEY,
                hostname TEXT NOT NULL,
                system_name TEXT NOT NULL,
                system_version TEXT NOT NULL,
                registered_at TIMESTAMPTZ NOT NULL,
                UNIQUE (hostname, system_name, system_version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id UUID PRIMARY KEY,
                job_type TEXT NOT NULL,
                request_body JSONB NOT NULL,
                request_hash UUID NOT NULL,
                tags TEXT[] NOT NULL DEFAULT '{}',
                notes TEXT,
                job_name TEXT,
                fungibility_group_id UUID NOT NULL,
                parent_job_id UUID,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS job_dependencies (
                parent_job_id UUID NOT NULL REFERENCES jobs(job_id),
                child_job_id UUID NOT NULL REFERENCES jobs(job_id),
                PRIMARY KEY (parent_job_id, child_job_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS contracts (
                contract_id UUID PRIMARY KEY,
                job_id UUID NOT NULL REFERENCES jobs(job_id),
                contract_number INTEGER NOT NULL,
                outcome VARCHAR(20) NOT NULL,
                due TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                claimed_at TIMESTAMPTZ,
                finished_at TIMESTAMPTZ,
                result_body JSONB,
                error TEXT,
                UNIQUE (job_id, contract_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS commitments (
                commitment_id UUID PRIMARY KEY,
                contract_id UUID NOT NULL REFERENCES contracts(contract_id),
                agent_id UUID NOT NULL REFERENCES agents(agent_id),
                claimed_at TIMESTAMPTZ NOT NULL,
                last_heartbeat TIMESTAMPTZ NOT NULL,
                UNIQUE (contract_id)
            )
            "#,
            // At most one open contract per job.
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_contracts_one_open
                ON contracts (job_id)
                WHERE outcome IN ('waiting', 'running')
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_contracts_waiting
                ON contracts (outcome, due)
                WHERE outcome = 'waiting'
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_jobs_type_created
                ON jobs (job_type, created_at)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_job_dependencies_child
                ON job_dependencies (child_job_id)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DomainError::InfrastructureError {
                    message: format!("Failed to run dispatch schema migration: {}", e),
                })?;
        }
        info!("dispatch schema is up to date");
        Ok(())
    }
}
