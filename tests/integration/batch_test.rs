//! Integration tests for batch seeding, execution and monitoring.

mod helpers;

use chrono::Duration;

use helpers::{TestEngine, test_config};
use runway_batch::{ElementSelector, MONITOR_JOB_TYPE, SEED_JOB_TYPE};
use runway_core::Clock;
use runway_core::types::JobId;
use runway_database::{BatchQuery, JobDefinitionQuery, JobQuery};
use runway_entity::authorization::Authentication;
use runway_entity::batch::{Batch, BatchJobConfiguration};
use runway_entity::job::Job;
use runway_worker::JobOutcome;

const TARGET: &str = "target";

fn engine(batch_jobs_per_seed: u32) -> TestEngine {
    let mut config = test_config();
    config.batch.invocations_per_batch_job = 10;
    config.batch.batch_jobs_per_seed = batch_jobs_per_seed;
    TestEngine::build(config, Vec::new())
}

/// Exhausted jobs that only become due tomorrow once their retries are reset.
async fn exhausted_targets(engine: &TestEngine, count: usize) -> Vec<JobId> {
    let tomorrow = engine.clock.now() + Duration::days(1);
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let job = engine
            .jobs
            .schedule(Job::new(TARGET, Vec::new(), 0, tomorrow))
            .await
            .unwrap();
        ids.push(job.id);
    }
    ids
}

async fn jobs_of_type(engine: &TestEngine, job_type: &str) -> Vec<Job> {
    engine
        .jobs
        .jobs(JobQuery::new().job_type(job_type))
        .await
        .unwrap()
}

async fn batch(engine: &TestEngine, batch: &Batch) -> Batch {
    engine.datastore.get(batch.id.into_uuid()).await.unwrap()
}

#[tokio::test]
async fn test_batch_over_101_jobs_completes_after_every_execution_job() {
    let engine = engine(100);
    exhausted_targets(&engine, 101).await;

    let created = engine
        .batches
        .set_job_retries_async(ElementSelector::Jobs(JobQuery::new().job_type(TARGET)), 2)
        .await
        .unwrap();
    assert_eq!(created.total_jobs, 11);
    assert_eq!(created.invocations_per_batch_job, 10);

    let seeds = jobs_of_type(&engine, SEED_JOB_TYPE).await;
    assert_eq!(seeds.len(), 1);

    // One seed run creates every execution job and the monitor.
    let outcome = engine.executor.execute_job_now(seeds[0].id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
    assert!(jobs_of_type(&engine, SEED_JOB_TYPE).await.is_empty());
    assert!(batch(&engine, &created).await.is_seeded());

    let executions = engine
        .jobs
        .jobs(JobQuery::new().job_definition_id(created.batch_job_definition_id))
        .await
        .unwrap();
    assert_eq!(executions.len(), 11);
    let sizes: Vec<usize> = executions
        .iter()
        .map(|job| {
            serde_json::from_slice::<BatchJobConfiguration>(&job.configuration)
                .unwrap()
                .ids
                .len()
        })
        .collect();
    assert_eq!(sizes.iter().sum::<usize>(), 101);
    assert_eq!(sizes.iter().filter(|&&n| n == 10).count(), 10);

    let monitors = jobs_of_type(&engine, MONITOR_JOB_TYPE).await;
    assert_eq!(monitors.len(), 1);
    let monitor = monitors[0].id;

    // Run all but one execution job; the monitor keeps waiting.
    for job in &executions[..10] {
        let outcome = engine.executor.execute_job_now(job.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed);
    }
    let outcome = engine.executor.execute_job_now(monitor).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Rescheduled(_)));
    assert!(!batch(&engine, &created).await.is_completed());

    engine.executor.execute_job_now(executions[10].id).await.unwrap();
    let outcome = engine.executor.execute_job_now(monitor).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let finished = batch(&engine, &created).await;
    assert!(finished.is_completed());
    assert!(finished.configuration.is_none());
    let definitions = engine
        .jobs
        .job_definitions(JobDefinitionQuery::new().ids(vec![
            finished.seed_job_definition_id,
            finished.monitor_job_definition_id,
            finished.batch_job_definition_id,
        ]))
        .await
        .unwrap();
    assert!(definitions.is_empty());

    let targets = jobs_of_type(&engine, TARGET).await;
    assert_eq!(targets.len(), 101);
    assert!(targets.iter().all(|job| job.retries == 2));
}

#[tokio::test]
async fn test_batch_runs_to_completion_through_acquisition() {
    let engine = engine(3);
    exhausted_targets(&engine, 101).await;

    let created = engine
        .batches
        .set_job_retries_async(ElementSelector::Jobs(JobQuery::new().job_type(TARGET)), 4)
        .await
        .unwrap();

    let poll = Duration::seconds(engine.config.batch.poll_time_seconds as i64);
    for _ in 0..5 {
        engine.run_until_idle().await;
        if batch(&engine, &created).await.is_completed() {
            break;
        }
        engine.clock.advance(poll);
    }

    assert!(batch(&engine, &created).await.is_completed());
    assert!(jobs_of_type(&engine, SEED_JOB_TYPE).await.is_empty());
    assert!(jobs_of_type(&engine, MONITOR_JOB_TYPE).await.is_empty());
    assert!(
        jobs_of_type(&engine, "set-job-retries")
            .await
            .is_empty()
    );
    assert!(
        jobs_of_type(&engine, TARGET)
            .await
            .iter()
            .all(|job| job.retries == 4)
    );
}

#[tokio::test]
async fn test_deleting_batch_removes_its_jobs() {
    let engine = engine(100);
    let targets = exhausted_targets(&engine, 25).await;

    let created = engine
        .batches
        .set_job_retries_async(ElementSelector::Jobs(JobQuery::new().job_ids(targets)), 1)
        .await
        .unwrap();
    let seed = jobs_of_type(&engine, SEED_JOB_TYPE).await[0].id;
    engine.executor.execute_job_now(seed).await.unwrap();
    assert_eq!(jobs_of_type(&engine, "set-job-retries").await.len(), 3);

    engine.batches.delete_batch(created.id).await.unwrap();

    assert!(engine.batches.batches(BatchQuery::new()).await.unwrap().is_empty());
    assert!(jobs_of_type(&engine, "set-job-retries").await.is_empty());
    assert!(jobs_of_type(&engine, MONITOR_JOB_TYPE).await.is_empty());
    // The elements themselves are untouched.
    let targets = jobs_of_type(&engine, TARGET).await;
    assert_eq!(targets.len(), 25);
    assert!(targets.iter().all(|job| job.retries == 0));
}

#[tokio::test]
async fn test_suspended_batch_holds_its_jobs() {
    let engine = engine(100);
    exhausted_targets(&engine, 5).await;

    let created = engine
        .batches
        .set_job_retries_async(ElementSelector::Jobs(JobQuery::new().job_type(TARGET)), 1)
        .await
        .unwrap();
    engine.batches.suspend_batch(created.id).await.unwrap();

    assert_eq!(engine.run_until_idle().await, 0);
    assert!(batch(&engine, &created).await.suspended);

    engine.batches.activate_batch(created.id).await.unwrap();
    let poll = Duration::seconds(engine.config.batch.poll_time_seconds as i64);
    for _ in 0..3 {
        engine.run_until_idle().await;
        engine.clock.advance(poll);
    }
    assert!(batch(&engine, &created).await.is_completed());
    assert!(
        jobs_of_type(&engine, TARGET)
            .await
            .iter()
            .all(|job| job.retries == 1)
    );
}

#[tokio::test]
async fn test_invalid_payload_is_rejected() {
    let engine = engine(100);
    let err = engine
        .batches
        .set_job_retries_async(ElementSelector::Jobs(JobQuery::new()), -1)
        .await
        .unwrap_err();
    assert_eq!(err.kind, runway_core::ErrorKind::Validation);
}

#[tokio::test]
async fn test_batch_jobs_belong_to_the_callers_tenant() {
    let engine = engine(100);
    let targets = exhausted_targets(&engine, 3).await;
    let caller = Authentication::user("admin")
        .with_groups(["runway-admin"])
        .with_tenants(["acme", "globex"]);

    let created = engine
        .batches
        .as_caller(caller)
        .set_job_retries_async(ElementSelector::Jobs(JobQuery::new().job_ids(targets)), 1)
        .await
        .unwrap();
    assert_eq!(created.tenant_id.as_deref(), Some("acme"));
    assert_eq!(created.created_by.as_deref(), Some("admin"));

    let seed = jobs_of_type(&engine, SEED_JOB_TYPE).await.remove(0);
    assert_eq!(seed.tenant_id.as_deref(), Some("acme"));
    engine.executor.execute_job_now(seed.id).await.unwrap();

    let executions = jobs_of_type(&engine, "set-job-retries").await;
    assert_eq!(executions.len(), 1);
    assert!(executions.iter().all(|job| job.tenant_id.as_deref() == Some("acme")));
}
