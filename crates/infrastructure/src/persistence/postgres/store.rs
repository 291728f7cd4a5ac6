//! DispatchStore implementation over PostgreSQL
//!
//! Each trait method opens one transaction and commits it only after every
//! row touched by the operation is in place. Helpers below take the open
//! transaction so multi-row mutations stay atomic.

use super::PostgresDispatchStore;
use async_trait::async_trait;
use charter_domain::agents::AgentDetails;
use charter_domain::commitments::HeartbeatInstruction;
use charter_domain::contracts::{
    ContractOutcome, ContractView, DependencyResult, WorkFilter, WorkResult, DEFAULT_DUE_GRACE,
};
use charter_domain::jobs::{assemble_job_view, ContractSummary, Job, JobView, SubmissionPlan};
use charter_domain::shared_kernel::{
    AgentId, CommitmentId, ContractId, DomainError, JobId, Result,
};
use charter_domain::store::{DispatchStore, JobSummary, PutJobOutcome};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

type PgTx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

#[async_trait]
impl DispatchStore for PostgresDispatchStore {
    async fn upsert_agent(&self, details: &AgentDetails) -> Result<AgentId> {
        // The no-op DO UPDATE makes RETURNING yield the existing row on
        // conflict, so concurrent registrations converge on one id.
        let row = sqlx::query(
            r#"
            INSERT INTO agents (agent_id, hostname, system_name, system_version, registered_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (hostname, system_name, system_version)
            DO UPDATE SET hostname = EXCLUDED.hostname
            RETURNING agent_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&details.hostname)
        .bind(&details.system_name)
        .bind(&details.system_version)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;
        Ok(AgentId(row.get("agent_id")))
    }

    async fn put_job(&self, plan: &SubmissionPlan) -> Result<PutJobOutcome> {
        let root = plan
            .jobs
            .first()
            .ok_or_else(|| DomainError::invalid_payload("dependencies", "empty submission"))?;
        let now = root.job.created_at;

        let mut tx = self.pool().begin().await?;

        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT request_hash FROM jobs WHERE job_id = $1")
                .bind(root.job.job_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(hash) = existing {
            return if hash == root.job.request_hash {
                Ok(PutJobOutcome::Unchanged)
            } else {
                Err(DomainError::Conflict {
                    job_id: root.job.job_id,
                })
            };
        }

        apply_plan(&mut tx, plan, now).await?;
        tx.commit().await?;
        Ok(PutJobOutcome::Created)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobView>> {
        let mut tx = self.pool().begin().await?;

        let job_rows = sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT $1::uuid AS job_id
                UNION
                SELECT d.child_job_id
                FROM job_dependencies d
                JOIN subtree s ON d.parent_job_id = s.job_id
            )
            SELECT j.job_id, j.job_type, j.request_body, j.request_hash, j.tags,
                   j.notes, j.job_name, j.fungibility_group_id, j.parent_job_id, j.created_at
            FROM jobs j
            JOIN subtree s ON s.job_id = j.job_id
            "#,
        )
        .bind(job_id.0)
        .fetch_all(&mut *tx)
        .await?;
        if job_rows.is_empty() {
            return Ok(None);
        }

        let mut jobs = HashMap::new();
        for row in &job_rows {
            let job = map_job_row(row);
            jobs.insert(job.job_id, job);
        }
        let ids: Vec<Uuid> = jobs.keys().map(|id| id.0).collect();

        let edge_rows = sqlx::query(
            "SELECT parent_job_id, child_job_id FROM job_dependencies WHERE parent_job_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;
        let edges: Vec<(JobId, JobId)> = edge_rows
            .iter()
            .map(|row| (JobId(row.get("parent_job_id")), JobId(row.get("child_job_id"))))
            .collect();

        let contract_rows = sqlx::query(
            r#"
            SELECT contract_id, job_id, contract_number, outcome, due,
                   claimed_at, finished_at, result_body, error
            FROM contracts
            WHERE job_id = ANY($1)
            ORDER BY job_id, contract_number
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;
        let mut contracts: HashMap<JobId, Vec<ContractSummary>> = HashMap::new();
        for row in &contract_rows {
            contracts
                .entry(JobId(row.get("job_id")))
                .or_default()
                .push(map_contract_summary(row)?);
        }
        tx.commit().await?;

        Ok(assemble_job_view(job_id, &jobs, &contracts, &edges))
    }

    async fn list_jobs(&self, limit: usize, offset: usize) -> Result<(Vec<JobSummary>, usize)> {
        let mut tx = self.pool().begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&mut *tx)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT j.job_id, j.job_type, j.job_name, j.tags, j.created_at,
                   (SELECT c.outcome FROM contracts c
                    WHERE c.job_id = j.job_id
                    ORDER BY c.contract_number DESC
                    LIMIT 1) AS outcome
            FROM jobs j
            ORDER BY j.created_at DESC, j.job_id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut page = Vec::with_capacity(rows.len());
        for row in &rows {
            let outcome: Option<String> = row.get("outcome");
            page.push(JobSummary {
                job_id: JobId(row.get("job_id")),
                job_type: row.get("job_type"),
                job_name: row.get("job_name"),
                tags: row.get("tags"),
                created_at: row.get("created_at"),
                outcome: outcome.as_deref().map(ContractOutcome::parse).transpose()?,
            });
        }
        Ok((page, total as usize))
    }

    async fn pause_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        ensure_job_exists(&mut tx, job_id).await?;

        sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT $1::uuid AS job_id
                UNION
                SELECT d.child_job_id
                FROM job_dependencies d
                JOIN subtree s ON d.parent_job_id = s.job_id
            )
            UPDATE contracts
            SET outcome = 'cancelled', finished_at = $2
            WHERE job_id IN (SELECT job_id FROM subtree)
              AND outcome IN ('waiting', 'running')
            "#,
        )
        .bind(job_id.0)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn retry_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        ensure_job_exists(&mut tx, job_id).await?;

        sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT $1::uuid AS job_id
                UNION
                SELECT d.child_job_id
                FROM job_dependencies d
                JOIN subtree s ON d.parent_job_id = s.job_id
            ),
            latest AS (
                SELECT DISTINCT ON (c.job_id) c.job_id, c.contract_number, c.outcome
                FROM contracts c
                WHERE c.job_id IN (SELECT job_id FROM subtree)
                ORDER BY c.job_id, c.contract_number DESC
            )
            INSERT INTO contracts (contract_id, job_id, contract_number, outcome, due, created_at)
            SELECT gen_random_uuid(), l.job_id, l.contract_number + 1, 'waiting', $2, $3
            FROM latest l
            WHERE l.outcome IN ('cancelled', 'error')
            "#,
        )
        .bind(job_id.0)
        .bind(now - DEFAULT_DUE_GRACE)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn claim_work(
        &self,
        commitment_id: CommitmentId,
        filter: &WorkFilter,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Option<ContractView>> {
        let mut tx = self.pool().begin().await?;

        // Idempotent replay of a prior claim.
        let prior: Option<Uuid> =
            sqlx::query_scalar("SELECT contract_id FROM commitments WHERE commitment_id = $1")
                .bind(commitment_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(contract_id) = prior {
            let view = load_contract_view(&mut tx, commitment_id, ContractId(contract_id)).await?;
            tx.commit().await?;
            return Ok(Some(view));
        }

        // Oldest eligible waiting contract: due, dependencies satisfied,
        // FIFO on job creation with job id as the tie break. SKIP LOCKED
        // keeps concurrent callers from blocking on the same row.
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r#"
            WITH candidate AS (
                SELECT c.contract_id
                FROM contracts c
                JOIN jobs j ON j.job_id = c.job_id
                WHERE c.outcome = 'waiting'
                  AND c.due <= $1
                  AND j.job_type = $2
                  AND j.tags @> $3
                  AND NOT EXISTS (
                      SELECT 1
                      FROM job_dependencies d
                      WHERE d.parent_job_id = j.job_id
                        AND 'success' IS DISTINCT FROM (
                            SELECT lc.outcome
                            FROM contracts lc
                            WHERE lc.job_id = d.child_job_id
                            ORDER BY lc.contract_number DESC
                            LIMIT 1
                        )
                  )
                ORDER BY j.created_at ASC, j.job_id::text ASC
                LIMIT 1
                FOR UPDATE OF c SKIP LOCKED
            )
            UPDATE contracts
            SET outcome = 'running', claimed_at = $1
            FROM candidate
            WHERE contracts.contract_id = candidate.contract_id
            RETURNING contracts.contract_id
            "#,
        )
        .bind(now)
        .bind(&filter.job_type)
        .bind(&filter.tags)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(contract_id) = claimed else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO commitments (commitment_id, contract_id, agent_id, claimed_at, last_heartbeat)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(commitment_id.0)
        .bind(contract_id)
        .bind(agent_id.0)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let view = load_contract_view(&mut tx, commitment_id, ContractId(contract_id)).await?;
        tx.commit().await?;
        Ok(Some(view))
    }

    async fn heartbeat(
        &self,
        commitment_id: CommitmentId,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatInstruction> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query(
            r#"
            SELECT c.outcome
            FROM commitments m
            JOIN contracts c ON c.contract_id = m.contract_id
            WHERE m.commitment_id = $1
            FOR UPDATE OF m
            "#,
        )
        .bind(commitment_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DomainError::StaleCommitment { commitment_id })?;

        let outcome = ContractOutcome::parse(row.get("outcome"))?;
        let instruction = match outcome {
            ContractOutcome::Running => {
                sqlx::query(
                    r#"
                    UPDATE commitments
                    SET last_heartbeat = GREATEST(last_heartbeat, $2)
                    WHERE commitment_id = $1
                    "#,
                )
                .bind(commitment_id.0)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                HeartbeatInstruction::Continue
            }
            ContractOutcome::Cancelled => HeartbeatInstruction::Cancel,
            _ => return Err(DomainError::StaleCommitment { commitment_id }),
        };

        tx.commit().await?;
        Ok(instruction)
    }

    async fn complete_work(
        &self,
        commitment_id: CommitmentId,
        result: WorkResult,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query(
            r#"
            SELECT m.contract_id, c.job_id, c.contract_number, c.outcome
            FROM commitments m
            JOIN contracts c ON c.contract_id = m.contract_id
            WHERE m.commitment_id = $1
            FOR UPDATE OF c
            "#,
        )
        .bind(commitment_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DomainError::StaleCommitment { commitment_id })?;

        let contract_id: Uuid = row.get("contract_id");
        let job_id = JobId(row.get("job_id"));
        let contract_number: i32 = row.get("contract_number");
        let outcome = ContractOutcome::parse(row.get("outcome"))?;
        if outcome != ContractOutcome::Running {
            // A worker acknowledging a pause it observed is not stale.
            if outcome == ContractOutcome::Cancelled && matches!(result, WorkResult::Cancelled) {
                return Ok(());
            }
            return Err(DomainError::StaleCommitment { commitment_id });
        }

        match result {
            WorkResult::Success { body } => {
                sqlx::query(
                    r#"
                    UPDATE contracts
                    SET outcome = 'success', result_body = $2, finished_at = $3
                    WHERE contract_id = $1
                    "#,
                )
                .bind(contract_id)
                .bind(body)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                let parents: Vec<Uuid> = sqlx::query_scalar(
                    "SELECT parent_job_id FROM job_dependencies WHERE child_job_id = $1",
                )
                .bind(job_id.0)
                .fetch_all(&mut *tx)
                .await?;
                for parent in parents {
                    try_release(&mut tx, JobId(parent), now).await?;
                }
            }
            WorkResult::Error { message } => {
                sqlx::query(
                    r#"
                    UPDATE contracts
                    SET outcome = 'error', error = $2, finished_at = $3
                    WHERE contract_id = $1
                    "#,
                )
                .bind(contract_id)
                .bind(message)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            WorkResult::Cancelled => {
                sqlx::query(
                    r#"
                    UPDATE contracts
                    SET outcome = 'cancelled', finished_at = $2
                    WHERE contract_id = $1
                    "#,
                )
                .bind(contract_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            WorkResult::TryLater { due, reason } => {
                sqlx::query(
                    r#"
                    UPDATE contracts
                    SET outcome = 'try-later', error = $2, finished_at = $3
                    WHERE contract_id = $1
                    "#,
                )
                .bind(contract_id)
                .bind(reason)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    INSERT INTO contracts (contract_id, job_id, contract_number, outcome, due, created_at)
                    VALUES ($1, $2, $3, 'waiting', $4, $5)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(job_id.0)
                .bind(contract_number + 1)
                .bind(due)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            WorkResult::AddDependencies { requests } => {
                let plan = SubmissionPlan::build_additions(job_id, &requests, now)?;
                apply_plan(&mut tx, &plan, now).await?;

                // The contract returns to the waiting pool unclaimed; the
                // commitment is over.
                sqlx::query(
                    r#"
                    UPDATE contracts
                    SET outcome = 'waiting', claimed_at = NULL
                    WHERE contract_id = $1
                    "#,
                )
                .bind(contract_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM commitments WHERE commitment_id = $1")
                    .bind(commitment_id.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn expire_silent_commitments(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>> {
        let expired: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE contracts
            SET outcome = 'error', error = 'heartbeat expired', finished_at = $2
            FROM commitments m
            WHERE m.contract_id = contracts.contract_id
              AND contracts.outcome = 'running'
              AND m.last_heartbeat < $1
            RETURNING contracts.job_id
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(expired.into_iter().map(JobId).collect())
    }
}

async fn ensure_job_exists(tx: &mut PgTx<'_>, job_id: JobId) -> Result<()> {
    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE job_id = $1")
        .bind(job_id.0)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(DomainError::JobNotFound { job_id });
    }
    Ok(())
}

/// Latest contracts of all dependencies succeeded. Vacuously true without
/// dependencies; false while any dependency has no contract yet.
async fn deps_satisfied(tx: &mut PgTx<'_>, job_id: JobId) -> Result<bool> {
    let satisfied: bool = sqlx::query_scalar(
        r#"
        SELECT NOT EXISTS (
            SELECT 1
            FROM job_dependencies d
            WHERE d.parent_job_id = $1
              AND 'success' IS DISTINCT FROM (
                  SELECT lc.outcome
                  FROM contracts lc
                  WHERE lc.job_id = d.child_job_id
                  ORDER BY lc.contract_number DESC
                  LIMIT 1
              )
        )
        "#,
    )
    .bind(job_id.0)
    .fetch_one(&mut **tx)
    .await?;
    Ok(satisfied)
}

/// Append the next `waiting` contract for a job.
async fn insert_next_contract(
    tx: &mut PgTx<'_>,
    job_id: JobId,
    due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contracts (contract_id, job_id, contract_number, outcome, due, created_at)
        SELECT $1, $2, COALESCE(MAX(contract_number), 0) + 1, 'waiting', $3, $4
        FROM contracts
        WHERE job_id = $2
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job_id.0)
    .bind(due)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Insert a planned job tree: jobs, then edges, then first contracts for
/// new jobs whose dependencies are already satisfied.
async fn apply_plan(tx: &mut PgTx<'_>, plan: &SubmissionPlan, now: DateTime<Utc>) -> Result<()> {
    if !plan.references.is_empty() {
        let refs: Vec<Uuid> = plan.references.iter().map(|id| id.0).collect();
        let known: Vec<Uuid> = sqlx::query_scalar("SELECT job_id FROM jobs WHERE job_id = ANY($1)")
            .bind(&refs)
            .fetch_all(&mut **tx)
            .await?;
        for reference in &plan.references {
            if !known.contains(&reference.0) {
                return Err(DomainError::invalid_payload(
                    "dependencies",
                    format!("referenced job {} does not exist", reference),
                ));
            }
        }
    }

    let planned_ids: Vec<Uuid> = plan.jobs.iter().map(|p| p.job.job_id.0).collect();
    let existing_rows =
        sqlx::query("SELECT job_id, request_hash FROM jobs WHERE job_id = ANY($1)")
            .bind(&planned_ids)
            .fetch_all(&mut **tx)
            .await?;
    let existing: HashMap<Uuid, Uuid> = existing_rows
        .iter()
        .map(|row| (row.get("job_id"), row.get("request_hash")))
        .collect();

    let mut inserted = Vec::new();
    for planned in &plan.jobs {
        let job = &planned.job;
        match existing.get(&job.job_id.0) {
            Some(hash) if *hash == job.request_hash => continue,
            Some(_) => return Err(DomainError::Conflict { job_id: job.job_id }),
            None => {}
        }
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, job_type, request_body, request_hash, tags,
                              notes, job_name, fungibility_group_id, parent_job_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.job_id.0)
        .bind(&job.job_type)
        .bind(&job.request_body)
        .bind(job.request_hash)
        .bind(&job.tags)
        .bind(&job.notes)
        .bind(&job.job_name)
        .bind(job.fungibility_group_id)
        .bind(job.parent_job_id.map(|id| id.0))
        .bind(job.created_at)
        .execute(&mut **tx)
        .await?;
        inserted.push(job.job_id);
    }

    for (parent, child) in &plan.edges {
        sqlx::query(
            r#"
            INSERT INTO job_dependencies (parent_job_id, child_job_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(parent.0)
        .bind(child.0)
        .execute(&mut **tx)
        .await?;
    }

    for job_id in inserted {
        if deps_satisfied(tx, job_id).await? {
            insert_next_contract(tx, job_id, now - DEFAULT_DUE_GRACE, now).await?;
        }
    }
    Ok(())
}

/// A dependency of `parent` succeeded: open a contract for it when the whole
/// dependency set is now satisfied. Parents whose latest contract ended in
/// `cancelled` or `error` stay down until an explicit retry.
async fn try_release(tx: &mut PgTx<'_>, parent: JobId, now: DateTime<Utc>) -> Result<()> {
    let open: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM contracts WHERE job_id = $1 AND outcome IN ('waiting', 'running')",
    )
    .bind(parent.0)
    .fetch_optional(&mut **tx)
    .await?;
    if open.is_some() || !deps_satisfied(tx, parent).await? {
        return Ok(());
    }

    let latest: Option<String> = sqlx::query_scalar(
        "SELECT outcome FROM contracts WHERE job_id = $1 ORDER BY contract_number DESC LIMIT 1",
    )
    .bind(parent.0)
    .fetch_optional(&mut **tx)
    .await?;
    if matches!(latest.as_deref(), Some("cancelled") | Some("error")) {
        return Ok(());
    }

    insert_next_contract(tx, parent, now - DEFAULT_DUE_GRACE, now).await
}

/// Load the full view a worker receives for a claimed contract.
async fn load_contract_view(
    tx: &mut PgTx<'_>,
    commitment_id: CommitmentId,
    contract_id: ContractId,
) -> Result<ContractView> {
    let row = sqlx::query(
        r#"
        SELECT c.job_id, j.job_type, j.request_body, j.tags
        FROM contracts c
        JOIN jobs j ON j.job_id = c.job_id
        WHERE c.contract_id = $1
        "#,
    )
    .bind(contract_id.0)
    .fetch_one(&mut **tx)
    .await?;
    let job_id = JobId(row.get("job_id"));

    let dependency_rows = sqlx::query(
        r#"
        SELECT d.child_job_id, cj.job_type, cj.request_body, latest.result_body
        FROM job_dependencies d
        JOIN jobs cj ON cj.job_id = d.child_job_id
        LEFT JOIN LATERAL (
            SELECT lc.result_body
            FROM contracts lc
            WHERE lc.job_id = d.child_job_id
            ORDER BY lc.contract_number DESC
            LIMIT 1
        ) latest ON TRUE
        WHERE d.parent_job_id = $1
        "#,
    )
    .bind(job_id.0)
    .fetch_all(&mut **tx)
    .await?;
    let dependencies = dependency_rows
        .iter()
        .map(|dep| DependencyResult {
            job_id: JobId(dep.get("child_job_id")),
            job_type: dep.get("job_type"),
            request_body: dep.get("request_body"),
            result_body: dep.get("result_body"),
        })
        .collect();

    Ok(ContractView {
        commitment_id,
        contract_id,
        job_id,
        job_type: row.get("job_type"),
        request_body: row.get("request_body"),
        tags: row.get("tags"),
        dependencies,
    })
}

fn map_job_row(row: &sqlx::postgres::PgRow) -> Job {
    Job {
        job_id: JobId(row.get("job_id")),
        job_type: row.get("job_type"),
        request_body: row.get("request_body"),
        request_hash: row.get("request_hash"),
        tags: row.get("tags"),
        notes: row.get("notes"),
        job_name: row.get("job_name"),
        fungibility_group_id: row.get("fungibility_group_id"),
        parent_job_id: row
            .get::<Option<Uuid>, _>("parent_job_id")
            .map(JobId),
        created_at: row.get("created_at"),
    }
}

fn map_contract_summary(row: &sqlx::postgres::PgRow) -> Result<ContractSummary> {
    Ok(ContractSummary {
        contract_id: ContractId(row.get("contract_id")),
        contract_number: row.get("contract_number"),
        outcome: ContractOutcome::parse(row.get("outcome"))?,
        due: row.get("due"),
        claimed_at: row.get("claimed_at"),
        finished_at: row.get("finished_at"),
        result_body: row.get("result_body"),
        error: row.get("error"),
    })
}
