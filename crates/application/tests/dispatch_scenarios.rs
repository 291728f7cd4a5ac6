//! End-to-end scenarios over the dispatch facade and the in-memory store.

use charter_application::{CommitmentReaper, DispatchService, ReaperConfig};
use charter_domain::agents::AgentDetails;
use charter_domain::commitments::HeartbeatInstruction;
use charter_domain::contracts::{ContractOutcome, ContractView, WorkFilter, WorkResult};
use charter_domain::jobs::{DependencySpec, JobSubmission};
use charter_domain::shared_kernel::{CommitmentId, DomainError, JobId};
use charter_domain::store::{DispatchStore, PutJobOutcome};
use charter_infrastructure::InMemoryDispatchStore;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

fn setup() -> (DispatchService, Arc<InMemoryDispatchStore>) {
    let store = Arc::new(InMemoryDispatchStore::new());
    (DispatchService::new(store.clone()), store)
}

fn agent() -> AgentDetails {
    AgentDetails::new("worker-1", "linux", "6.8")
}

async fn claim(service: &DispatchService, job_type: &str) -> Option<ContractView> {
    service
        .request_work(
            CommitmentId::new(),
            &WorkFilter::job_type(job_type),
            &agent(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn fifo_claim_returns_oldest_job_first() {
    let (_, store) = setup();
    let t0 = Utc::now();
    let a = JobId::new();
    let b = JobId::new();

    let plan_a = charter_domain::jobs::SubmissionPlan::build(
        a,
        &JobSubmission::new("transcode", json!({"n": "a"})),
        t0,
    )
    .unwrap();
    let plan_b = charter_domain::jobs::SubmissionPlan::build(
        b,
        &JobSubmission::new("transcode", json!({"n": "b"})),
        t0 + Duration::milliseconds(1),
    )
    .unwrap();
    store.put_job(&plan_a).await.unwrap();
    store.put_job(&plan_b).await.unwrap();

    let agent_id = store.upsert_agent(&agent()).await.unwrap();
    let now = t0 + Duration::seconds(1);
    let filter = WorkFilter::job_type("transcode");

    let first = store
        .claim_work(CommitmentId::new(), &filter, agent_id, now)
        .await
        .unwrap()
        .expect("first claim");
    assert_eq!(first.job_id, a);

    let second = store
        .claim_work(CommitmentId::new(), &filter, agent_id, now)
        .await
        .unwrap()
        .expect("second claim");
    assert_eq!(second.job_id, b);

    let third = store
        .claim_work(CommitmentId::new(), &filter, agent_id, now)
        .await
        .unwrap();
    assert!(third.is_none());
}

#[tokio::test]
async fn concurrent_claims_take_a_job_exactly_once() {
    let (service, _) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("scan", json!({})))
        .await
        .unwrap();

    let (left, right) = tokio::join!(claim(&service, "scan"), claim(&service, "scan"));
    assert_eq!(
        left.is_some() as u8 + right.is_some() as u8,
        1,
        "exactly one concurrent claim wins"
    );
}

#[tokio::test]
async fn parent_is_released_with_dependency_results() {
    let (service, _) = setup();
    let parent = JobId::new();
    let submission = JobSubmission::new("report", json!({"q": "summary"}))
        .with_dependency(DependencySpec::inline(JobSubmission::new(
            "extract",
            json!({"idx": 1}),
        )))
        .with_dependency(DependencySpec::inline(JobSubmission::new(
            "extract",
            json!({"idx": 2}),
        )));
    service.put_job(parent, &submission).await.unwrap();

    assert!(claim(&service, "report").await.is_none());

    for _ in 0..2 {
        let view = claim(&service, "extract").await.expect("child claim");
        let idx = view.request_body["idx"].clone();
        service
            .complete_work(view.commitment_id, WorkResult::Success {
                body: json!({"v": idx}),
            })
            .await
            .unwrap();
    }

    let view = claim(&service, "report").await.expect("parent claim");
    assert_eq!(view.job_id, parent);
    let results: Vec<_> = view
        .dependencies
        .iter()
        .map(|d| d.result_body.clone().unwrap())
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results.contains(&json!({"v": 1})));
    assert!(results.contains(&json!({"v": 2})));
}

#[tokio::test]
async fn dependencies_added_mid_run_block_the_parent() {
    let (service, _) = setup();
    let parent = JobId::new();
    service
        .put_job(parent, &JobSubmission::new("ingest", json!({})))
        .await
        .unwrap();

    let view = claim(&service, "ingest").await.expect("initial claim");
    service
        .complete_work(view.commitment_id, WorkResult::AddDependencies {
            requests: vec![
                DependencySpec::inline(JobSubmission::new("fetch", json!({"part": 1}))),
                DependencySpec::inline(JobSubmission::new("fetch", json!({"part": 2}))),
            ],
        })
        .await
        .unwrap();

    // The old commitment is terminated and the parent is blocked again.
    assert!(claim(&service, "ingest").await.is_none());

    for _ in 0..2 {
        let child = claim(&service, "fetch").await.expect("child claim");
        let part = child.request_body["part"].clone();
        service
            .complete_work(child.commitment_id, WorkResult::Success {
                body: json!({"fetched": part}),
            })
            .await
            .unwrap();
    }

    let reclaimed = claim(&service, "ingest").await.expect("parent reclaim");
    assert_eq!(reclaimed.job_id, parent);
    assert_eq!(reclaimed.dependencies.len(), 2);
    assert!(reclaimed.dependencies.iter().all(|d| d.result_body.is_some()));
}

#[tokio::test]
async fn pause_cascades_to_grandchildren() {
    let (service, _) = setup();
    let parent = JobId::new();
    let grandchild = JobId::new();
    let submission = JobSubmission::new("publish", json!({})).with_dependency(
        DependencySpec::inline(JobSubmission::new("render", json!({})).with_dependency(
            DependencySpec::inline(JobSubmission::new("compile", json!({})).with_id(grandchild)),
        )),
    );
    service.put_job(parent, &submission).await.unwrap();

    service.pause_job(parent).await.unwrap();

    let view = service.get_job(grandchild).await.unwrap().unwrap();
    assert_eq!(view.outcome, Some(ContractOutcome::Cancelled));

    for job_type in ["publish", "render", "compile"] {
        assert!(claim(&service, job_type).await.is_none());
    }
}

#[tokio::test]
async fn paused_running_worker_gets_cancel_and_stale_success() {
    let (service, _) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("archive", json!({})))
        .await
        .unwrap();

    let view = claim(&service, "archive").await.expect("claim");
    assert_eq!(
        service
            .heartbeat(view.commitment_id)
            .await
            .unwrap()
            .instruction,
        HeartbeatInstruction::Continue
    );

    service.pause_job(job_id).await.unwrap();

    assert_eq!(
        service
            .heartbeat(view.commitment_id)
            .await
            .unwrap()
            .instruction,
        HeartbeatInstruction::Cancel
    );

    let err = service
        .complete_work(view.commitment_id, WorkResult::Success { body: json!({}) })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::StaleCommitment { .. }));

    // Acknowledging the cancellation is accepted.
    service
        .complete_work(view.commitment_id, WorkResult::Cancelled)
        .await
        .unwrap();

    let job = service.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(ContractOutcome::Cancelled));
}

#[tokio::test]
async fn try_later_defers_until_due() {
    let (service, store) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("poll", json!({})))
        .await
        .unwrap();

    let view = claim(&service, "poll").await.expect("claim");
    let due = Utc::now() + Duration::seconds(60);
    service
        .complete_work(view.commitment_id, WorkResult::TryLater {
            due,
            reason: Some("upstream not ready".to_string()),
        })
        .await
        .unwrap();

    // Not claimable before due.
    assert!(claim(&service, "poll").await.is_none());

    // Claimable once the clock passes due.
    let agent_id = store.upsert_agent(&agent()).await.unwrap();
    let reclaimed = store
        .claim_work(
            CommitmentId::new(),
            &WorkFilter::job_type("poll"),
            agent_id,
            due + Duration::seconds(1),
        )
        .await
        .unwrap()
        .expect("claim after due");
    assert_eq!(reclaimed.job_id, job_id);

    let job = service.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.contracts.len(), 2);
    assert_eq!(job.contracts[0].outcome, ContractOutcome::TryLater);
}

#[tokio::test]
async fn retry_reopens_paused_job_through_to_success() {
    let (service, _) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("backfill", json!({})))
        .await
        .unwrap();

    service.pause_job(job_id).await.unwrap();
    service.retry_job(job_id).await.unwrap();

    let job = service.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(ContractOutcome::Waiting));
    assert_eq!(job.contracts.len(), 2);

    let view = claim(&service, "backfill").await.expect("claim after retry");
    service
        .complete_work(view.commitment_id, WorkResult::Success {
            body: json!({"rows": 10}),
        })
        .await
        .unwrap();

    let job = service.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(ContractOutcome::Success));
}

#[tokio::test]
async fn retry_skips_successful_descendants() {
    let (service, _) = setup();
    let parent = JobId::new();
    let done = JobId::new();
    let failed = JobId::new();
    let submission = JobSubmission::new("merge", json!({}))
        .with_dependency(DependencySpec::inline(
            JobSubmission::new("left", json!({})).with_id(done),
        ))
        .with_dependency(DependencySpec::inline(
            JobSubmission::new("right", json!({})).with_id(failed),
        ));
    service.put_job(parent, &submission).await.unwrap();

    let view = claim(&service, "left").await.expect("left claim");
    service
        .complete_work(view.commitment_id, WorkResult::Success { body: json!({}) })
        .await
        .unwrap();

    let view = claim(&service, "right").await.expect("right claim");
    service
        .complete_work(view.commitment_id, WorkResult::Error {
            message: "disk full".to_string(),
        })
        .await
        .unwrap();

    service.retry_job(parent).await.unwrap();

    let left = service.get_job(done).await.unwrap().unwrap();
    assert_eq!(left.contracts.len(), 1);
    assert_eq!(left.outcome, Some(ContractOutcome::Success));

    let right = service.get_job(failed).await.unwrap().unwrap();
    assert_eq!(right.contracts.len(), 2);
    assert_eq!(right.outcome, Some(ContractOutcome::Waiting));
}

#[tokio::test]
async fn resubmission_is_idempotent_and_conflicts_on_divergence() {
    let (service, _) = setup();
    let job_id = JobId::new();
    let submission = JobSubmission::new("etl", json!({"table": "users"}));

    assert_eq!(
        service.put_job(job_id, &submission).await.unwrap(),
        PutJobOutcome::Created
    );
    assert_eq!(
        service.put_job(job_id, &submission).await.unwrap(),
        PutJobOutcome::Unchanged
    );

    let err = service
        .put_job(job_id, &JobSubmission::new("etl", json!({"table": "orders"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict { .. }));
}

#[tokio::test]
async fn claim_replays_idempotently_for_a_known_commitment() {
    let (service, _) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("resize", json!({})))
        .await
        .unwrap();

    let commitment_id = CommitmentId::new();
    let filter = WorkFilter::job_type("resize");
    let first = service
        .request_work(commitment_id, &filter, &agent())
        .await
        .unwrap()
        .expect("first claim");
    let replay = service
        .request_work(commitment_id, &filter, &agent())
        .await
        .unwrap()
        .expect("replayed claim");
    assert_eq!(first.contract_id, replay.contract_id);
    assert_eq!(first.job_id, replay.job_id);
}

#[tokio::test]
async fn heartbeat_is_monotonic_and_stale_after_completion() {
    let (service, store) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("index", json!({})))
        .await
        .unwrap();
    let view = claim(&service, "index").await.expect("claim");

    // An out-of-order timestamp does not move last_heartbeat backwards:
    // both calls succeed, the reaper cutoff below proves the newer one won.
    let future = Utc::now() + Duration::seconds(30);
    store.heartbeat(view.commitment_id, future).await.unwrap();
    store
        .heartbeat(view.commitment_id, future - Duration::seconds(29))
        .await
        .unwrap();
    let expired = store
        .expire_silent_commitments(future, Utc::now())
        .await
        .unwrap();
    assert!(expired.is_empty(), "heartbeat must not move backwards");

    service
        .complete_work(view.commitment_id, WorkResult::Success { body: json!({}) })
        .await
        .unwrap();
    let err = service.heartbeat(view.commitment_id).await.unwrap_err();
    assert!(matches!(err, DomainError::StaleCommitment { .. }));
}

#[tokio::test]
async fn heartbeat_on_unknown_commitment_is_stale() {
    let (service, _) = setup();
    let err = service.heartbeat(CommitmentId::new()).await.unwrap_err();
    assert!(matches!(err, DomainError::StaleCommitment { .. }));
}

#[tokio::test]
async fn dependency_on_already_successful_job_is_immediately_ready() {
    let (service, _) = setup();
    let existing = JobId::new();
    service
        .put_job(existing, &JobSubmission::new("seed", json!({})))
        .await
        .unwrap();
    let view = claim(&service, "seed").await.expect("seed claim");
    service
        .complete_work(view.commitment_id, WorkResult::Success {
            body: json!({"seeded": true}),
        })
        .await
        .unwrap();

    let parent = JobId::new();
    let submission = JobSubmission::new("harvest", json!({}))
        .with_dependency(DependencySpec::on_existing(existing));
    service.put_job(parent, &submission).await.unwrap();

    let view = claim(&service, "harvest").await.expect("parent claim");
    assert_eq!(view.dependencies.len(), 1);
    assert_eq!(view.dependencies[0].result_body, Some(json!({"seeded": true})));
}

#[tokio::test]
async fn reference_to_unknown_job_is_rejected() {
    let (service, _) = setup();
    let submission = JobSubmission::new("orphan", json!({}))
        .with_dependency(DependencySpec::on_existing(JobId::new()));
    let err = service.put_job(JobId::new(), &submission).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidPayload { .. }));
}

#[tokio::test]
async fn tag_filter_requires_all_tags() {
    let (service, _) = setup();
    let tagged = JobId::new();
    service
        .put_job(
            tagged,
            &JobSubmission::new("deploy", json!({}))
                .with_tags(vec!["gpu".to_string(), "eu".to_string()]),
        )
        .await
        .unwrap();

    let mut filter = WorkFilter::job_type("deploy");
    filter.tags = vec!["gpu".to_string(), "us".to_string()];
    assert!(service
        .request_work(CommitmentId::new(), &filter, &agent())
        .await
        .unwrap()
        .is_none());

    filter.tags = vec!["gpu".to_string()];
    let view = service
        .request_work(CommitmentId::new(), &filter, &agent())
        .await
        .unwrap()
        .expect("tag subset matches");
    assert_eq!(view.job_id, tagged);
}

#[tokio::test]
async fn reaper_expires_silent_commitments_only_when_enabled() {
    let (service, store) = setup();
    let job_id = JobId::new();
    service
        .put_job(job_id, &JobSubmission::new("slow", json!({})))
        .await
        .unwrap();
    let view = claim(&service, "slow").await.expect("claim");

    let disabled = CommitmentReaper::new(store.clone(), ReaperConfig::default());
    assert!(disabled.spawn().is_none());

    let reaper = CommitmentReaper::new(
        store.clone(),
        ReaperConfig {
            enabled: true,
            silence_threshold: Duration::seconds(-1),
            ..ReaperConfig::default()
        },
    );
    let expired = reaper.check_once().await.unwrap();
    assert_eq!(expired, vec![job_id]);

    let job = service.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.outcome, Some(ContractOutcome::Error));

    let err = service
        .complete_work(view.commitment_id, WorkResult::Success { body: json!({}) })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::StaleCommitment { .. }));
}

#[tokio::test]
async fn agent_registration_is_idempotent_by_identity() {
    let (service, _) = setup();
    let first = service.register_agent(&agent()).await.unwrap();
    let second = service.register_agent(&agent()).await.unwrap();
    assert_eq!(first, second);

    let other = service
        .register_agent(&AgentDetails::new("worker-2", "linux", "6.8"))
        .await
        .unwrap();
    assert_ne!(first, other);
}
