//! Integration tests for job acquisition, execution and failure handling.

mod helpers;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Duration;

use helpers::{CountingHandler, FailingHandler, TestEngine, test_config};
use runway_command::CommandContext;
use runway_core::{AppError, AppResult, Clock, ErrorKind};
use runway_database::{IncidentQuery, JobQuery};
use runway_entity::job::{Job, JobDefinition};
use runway_worker::{JobExecutionContext, JobHandler, JobHandlerRegistry, JobOutcome};

#[tokio::test]
async fn test_exhausted_retries_run_once_each_and_raise_one_incident() {
    let failing = Arc::new(FailingHandler::default());
    let engine = TestEngine::with_handler(failing.clone());

    let job = engine
        .jobs
        .schedule(Job::new("always-fails", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    engine.run_until_idle().await;

    assert_eq!(failing.count(), 3);
    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.retries, 0);
    assert_eq!(stored.failed_attempts, 3);
    assert_eq!(stored.exception_message.as_deref(), Some("handler exploded"));
    assert!(stored.lock_owner.is_none());

    let incidents = engine
        .jobs
        .incidents(IncidentQuery::new().job_id(job.id))
        .await
        .unwrap();
    assert_eq!(incidents.len(), 1);

    let stacktrace = engine.jobs.job_exception_stacktrace(job.id).await.unwrap();
    assert!(stacktrace.unwrap().contains("handler exploded"));
}

#[tokio::test]
async fn test_resetting_retries_resolves_incident_and_reruns() {
    let failing = Arc::new(FailingHandler::default());
    let engine = TestEngine::with_handler(failing.clone());

    let job = engine
        .jobs
        .schedule(Job::new("always-fails", Vec::new(), 1, engine.clock.now()))
        .await
        .unwrap();
    engine.run_until_idle().await;
    assert_eq!(failing.count(), 1);

    engine.jobs.reset_job_retries(job.id).await.unwrap();
    let incidents = engine
        .jobs
        .incidents(IncidentQuery::new().job_id(job.id))
        .await
        .unwrap();
    assert!(incidents.is_empty());

    engine.run_until_idle().await;
    assert_eq!(failing.count(), 1 + engine.config.job_executor.default_retries as usize);
}

#[tokio::test]
async fn test_successful_job_is_deleted() {
    let counting = Arc::new(CountingHandler::default());
    let engine = TestEngine::with_handler(counting.clone());

    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    assert_eq!(engine.run_until_idle().await, 1);
    assert_eq!(counting.count(), 1);
    assert!(engine.datastore.get::<Job>(job.id.into_uuid()).await.is_none());
}

#[tokio::test]
async fn test_two_executors_never_share_a_lease() {
    let engine = TestEngine::new();
    for _ in 0..10 {
        engine
            .jobs
            .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
            .await
            .unwrap();
    }

    let first = engine.executor_for("engine-b", JobHandlerRegistry::new());
    let second = engine.executor_for("engine-c", JobHandlerRegistry::new());
    let (a, b) = tokio::join!(first.acquire_once(), second.acquire_once());
    let (a, b) = (a.unwrap(), b.unwrap());

    let a_ids: HashSet<_> = a.iter().map(|job| job.id).collect();
    let b_ids: HashSet<_> = b.iter().map(|job| job.id).collect();
    assert!(a_ids.is_disjoint(&b_ids));
    assert_eq!(a_ids.len() + b_ids.len(), 10);
    assert!(a.iter().all(|job| job.lock_owner.as_deref() == Some("engine-b")));
    assert!(b.iter().all(|job| job.lock_owner.as_deref() == Some("engine-c")));

    // Nothing is left for a third executor while the leases are live.
    let third = engine.executor_for("engine-d", JobHandlerRegistry::new());
    assert!(third.acquire_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() {
    let engine = TestEngine::new();
    engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    let first = engine.executor_for("engine-b", JobHandlerRegistry::new());
    assert_eq!(first.acquire_once().await.unwrap().len(), 1);

    let lock_time = engine.config.job_executor.lock_time_ms as i64;
    engine.clock.advance(Duration::milliseconds(lock_time + 1));

    let second = engine.executor_for("engine-c", JobHandlerRegistry::new());
    let taken = second.acquire_once().await.unwrap();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].lock_owner.as_deref(), Some("engine-c"));
}

#[tokio::test]
async fn test_exponential_backoff_moves_due_date() {
    let mut config = test_config();
    config.job_executor.retry_backoff.strategy = "exponential".to_string();
    config.job_executor.retry_backoff.base_delay_seconds = 10;
    config.job_executor.retry_backoff.factor = 2;
    let failing = Arc::new(FailingHandler::default());
    let engine = TestEngine::build(config, vec![failing.clone() as Arc<dyn JobHandler>]);

    let start = engine.clock.now();
    let job = engine
        .jobs
        .schedule(Job::new("always-fails", Vec::new(), 5, start))
        .await
        .unwrap();

    engine.run_until_idle().await;
    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(failing.count(), 1);
    assert_eq!(stored.due_date, start + Duration::seconds(10));

    // Not due yet.
    engine.clock.advance(Duration::seconds(5));
    assert_eq!(engine.run_until_idle().await, 0);

    engine.clock.advance(Duration::seconds(5));
    engine.run_until_idle().await;
    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(failing.count(), 2);
    assert_eq!(stored.due_date, engine.clock.now() + Duration::seconds(20));
}

#[tokio::test]
async fn test_suspended_job_is_not_acquired_until_activated() {
    let counting = Arc::new(CountingHandler::default());
    let engine = TestEngine::with_handler(counting.clone());

    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();
    engine.jobs.suspend_job(job.id).await.unwrap();
    assert_eq!(engine.run_until_idle().await, 0);

    engine.jobs.activate_job(job.id).await.unwrap();
    assert_eq!(engine.run_until_idle().await, 1);
    assert_eq!(counting.count(), 1);
}

#[tokio::test]
async fn test_suspended_definition_creates_suspended_jobs() {
    let engine = TestEngine::new();
    let definition = engine
        .jobs
        .create_job_definition(JobDefinition::new("counting"))
        .await
        .unwrap();
    engine
        .jobs
        .suspend_job_definition(definition.id, false)
        .await
        .unwrap();

    let job = engine
        .jobs
        .schedule(
            Job::new("counting", Vec::new(), 3, engine.clock.now())
                .with_definition(definition.id),
        )
        .await
        .unwrap();
    assert!(job.suspended);
}

#[tokio::test]
async fn test_activating_definition_with_jobs_releases_them() {
    let counting = Arc::new(CountingHandler::default());
    let engine = TestEngine::with_handler(counting.clone());
    let definition = engine
        .jobs
        .create_job_definition(JobDefinition::new("counting"))
        .await
        .unwrap();
    for _ in 0..2 {
        engine
            .jobs
            .schedule(
                Job::new("counting", Vec::new(), 3, engine.clock.now())
                    .with_definition(definition.id),
            )
            .await
            .unwrap();
    }

    engine
        .jobs
        .suspend_job_definition(definition.id, true)
        .await
        .unwrap();
    assert_eq!(engine.run_until_idle().await, 0);

    engine
        .jobs
        .activate_job_definition(definition.id, true)
        .await
        .unwrap();
    assert_eq!(engine.run_until_idle().await, 2);
    assert_eq!(counting.count(), 2);
}

#[tokio::test]
async fn test_definition_priority_applies_to_new_and_cascaded_jobs() {
    let engine = TestEngine::new();
    let definition = engine
        .jobs
        .create_job_definition(JobDefinition::new("counting"))
        .await
        .unwrap();
    let existing = engine
        .jobs
        .schedule(
            Job::new("counting", Vec::new(), 3, engine.clock.now()).with_definition(definition.id),
        )
        .await
        .unwrap();

    engine
        .jobs
        .set_job_definition_priority(definition.id, Some(7), false)
        .await
        .unwrap();
    let stored: Job = engine.datastore.get(existing.id.into_uuid()).await.unwrap();
    assert_eq!(stored.priority, 0);

    let later = engine
        .jobs
        .schedule(
            Job::new("counting", Vec::new(), 3, engine.clock.now()).with_definition(definition.id),
        )
        .await
        .unwrap();
    assert_eq!(later.priority, 7);

    engine
        .jobs
        .set_job_definition_priority(definition.id, Some(9), true)
        .await
        .unwrap();
    let jobs = engine
        .jobs
        .jobs(JobQuery::new().job_definition_id(definition.id))
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.priority == 9));
}

#[tokio::test]
async fn test_retries_by_definition_resolve_incidents() {
    let failing = Arc::new(FailingHandler::default());
    let engine = TestEngine::with_handler(failing.clone());
    let definition = engine
        .jobs
        .create_job_definition(JobDefinition::new("always-fails"))
        .await
        .unwrap();
    for _ in 0..2 {
        engine
            .jobs
            .schedule(
                Job::new("always-fails", Vec::new(), 1, engine.clock.now())
                    .with_definition(definition.id),
            )
            .await
            .unwrap();
    }
    engine.run_until_idle().await;
    assert_eq!(
        engine.jobs.incidents(IncidentQuery::new()).await.unwrap().len(),
        2
    );

    let changed = engine
        .jobs
        .set_job_retries_by_definition(definition.id, 2)
        .await
        .unwrap();
    assert_eq!(changed, 2);
    assert!(engine.jobs.incidents(IncidentQuery::new()).await.unwrap().is_empty());

    let err = engine
        .jobs
        .set_job_retries_by_definition(definition.id, -1)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_moving_due_date_controls_acquisition() {
    let counting = Arc::new(CountingHandler::default());
    let engine = TestEngine::with_handler(counting.clone());
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    engine
        .jobs
        .set_job_due_date(job.id, engine.clock.now() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(engine.run_until_idle().await, 0);

    engine.clock.advance(Duration::minutes(5));
    assert_eq!(engine.run_until_idle().await, 1);
    assert_eq!(counting.count(), 1);
}

#[tokio::test]
async fn test_higher_priority_is_acquired_first() {
    let mut config = test_config();
    config.job_executor.max_jobs_per_acquisition = 1;
    let engine = TestEngine::build(config, Vec::new());

    let now = engine.clock.now();
    engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, now))
        .await
        .unwrap();
    let urgent = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, now).with_priority(10))
        .await
        .unwrap();

    let claimed = engine.executor.acquire_once().await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, urgent.id);
}

#[tokio::test]
async fn test_execute_job_now_ignores_due_date() {
    let counting = Arc::new(CountingHandler::default());
    let engine = TestEngine::with_handler(counting.clone());

    let job = engine
        .jobs
        .schedule(Job::new(
            "counting",
            Vec::new(),
            3,
            engine.clock.now() + Duration::hours(1),
        ))
        .await
        .unwrap();

    let outcome = engine.executor.execute_job_now(job.id).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(counting.count(), 1);
}

#[tokio::test]
async fn test_locked_job_cannot_be_deleted() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();
    engine.executor.acquire_once().await.unwrap();

    assert!(engine.jobs.delete_job(job.id).await.is_err());

    engine.jobs.unlock(job.id).await.unwrap();
    engine.jobs.delete_job(job.id).await.unwrap();
    assert!(engine.datastore.get::<Job>(job.id.into_uuid()).await.is_none());
}

#[tokio::test]
async fn test_unknown_job_type_fails_without_retries() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("nobody-handles-this", Vec::new(), 5, engine.clock.now()))
        .await
        .unwrap();

    assert_eq!(engine.run_until_idle().await, 1);

    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.retries, 0);
    let incidents = engine
        .jobs
        .incidents(IncidentQuery::new().job_id(job.id))
        .await
        .unwrap();
    assert_eq!(incidents.len(), 1);
}

#[tokio::test]
async fn test_fatal_error_is_recorded_and_propagated() {
    let handler = Arc::new(ErrorHandler::new("fatal", AppError::fatal("disk on fire")));
    let engine = TestEngine::with_handler(handler.clone());
    let job = engine
        .jobs
        .schedule(Job::new("fatal", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    let err = engine.executor.process_due_jobs().await.unwrap_err();
    assert!(err.is_fatal());

    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.retries, 0);
    assert_eq!(stored.failed_attempts, 0);
    assert_eq!(stored.exception_message.as_deref(), Some("disk on fire"));
    assert!(
        stored
            .exception_stacktrace
            .as_deref()
            .is_some_and(|trace| trace.contains("disk on fire"))
    );
    assert!(stored.lock_owner.is_none());
    let incidents = engine
        .jobs
        .incidents(IncidentQuery::new().job_id(job.id))
        .await
        .unwrap();
    assert_eq!(incidents.len(), 1);
}

#[tokio::test]
async fn test_fatal_job_is_not_picked_up_by_another_executor() {
    let handler = Arc::new(ErrorHandler::new("fatal", AppError::fatal("disk on fire")));
    let engine = TestEngine::with_handler(handler.clone());
    let job = engine
        .jobs
        .schedule(Job::new("fatal", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    assert!(engine.executor.process_due_jobs().await.unwrap_err().is_fatal());

    let mut registry = JobHandlerRegistry::new();
    registry.register(handler.clone());
    let peer = engine.executor_for("engine-peer", registry);
    assert_eq!(peer.process_due_jobs().await.unwrap(), 0);
    assert_eq!(engine.run_until_idle().await, 0);
    assert_eq!(handler.count(), 1);

    // Resetting retries hands the job back to acquisition.
    engine.jobs.reset_job_retries(job.id).await.unwrap();
    assert!(peer.process_due_jobs().await.unwrap_err().is_fatal());
    assert_eq!(handler.count(), 2);
}

#[tokio::test]
async fn test_exhausted_conflict_releases_job_without_consuming_retry() {
    let handler = Arc::new(ErrorHandler::new(
        "conflicting",
        AppError::concurrent_modification("overtaken"),
    ));
    let engine = TestEngine::with_handler(handler.clone());
    let job = engine
        .jobs
        .schedule(Job::new("conflicting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    assert_eq!(engine.executor.process_due_jobs().await.unwrap(), 1);

    // Every attempt of the retry budget re-ran the handler.
    let budget = engine.config.command.retry_budget as usize;
    assert_eq!(handler.count(), budget + 1);

    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.retries, 3);
    assert_eq!(stored.failed_attempts, 0);
    assert_eq!(stored.exception_message.as_deref(), Some("overtaken"));
    assert!(stored.lock_owner.is_none());
}

/// Handler that fails every execution with a clone of one error.
#[derive(Debug)]
struct ErrorHandler {
    job_type: &'static str,
    error: AppError,
    executions: AtomicUsize,
}

impl ErrorHandler {
    fn new(job_type: &'static str, error: AppError) -> Self {
        Self {
            job_type,
            error,
            executions: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for ErrorHandler {
    fn job_type(&self) -> &str {
        self.job_type
    }

    async fn execute(
        &self,
        _configuration: &[u8],
        _execution: &mut JobExecutionContext,
        _ctx: &mut CommandContext,
        _tenant_id: Option<&str>,
    ) -> AppResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}
