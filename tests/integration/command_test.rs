//! Integration tests for the command pipeline: nesting, conflict retries
//! and transaction listeners.

mod helpers;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use helpers::TestEngine;
use runway_command::{Command, CommandContext, CommandExecutor, TransactionPhase};
use runway_core::types::JobId;
use runway_core::{AppError, AppResult, Clock};
use runway_entity::job::Job;

struct ScheduleThenFailNested;

#[async_trait]
impl Command for ScheduleThenFailNested {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let now = ctx.now();
        ctx.insert(Job::new("counting", Vec::new(), 3, now))?;
        // Swallowed: the outer command still reports success.
        let _ = ctx.execute(&RejectNested).await;
        Ok(())
    }
}

struct RejectNested;

#[async_trait]
impl Command for RejectNested {
    type Output = ();

    async fn execute(&self, _ctx: &mut CommandContext) -> AppResult<()> {
        Err(AppError::validation("nested command rejected"))
    }
}

#[tokio::test]
async fn test_nested_failure_discards_outer_writes() {
    let engine = TestEngine::new();
    let before = engine.datastore.commit_count().await;

    let err = engine
        .commands
        .execute(&ScheduleThenFailNested)
        .await
        .unwrap_err();

    assert_eq!(err.message, "nested command rejected");
    assert!(engine.datastore.all::<Job>().await.is_empty());
    assert_eq!(engine.datastore.commit_count().await, before);
}

/// Sets the retries of a job; the first `conflicts` attempts are overtaken
/// by a competing transaction after reading the job.
struct OvertakenUpdate {
    job_id: JobId,
    conflicts: u32,
    attempts: Arc<AtomicU32>,
    competitor: CommandExecutor,
}

#[async_trait]
impl Command for OvertakenUpdate {
    type Output = u32;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<u32> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let mut job: Job = ctx.get(self.job_id.into_uuid()).await?;

        if attempt <= self.conflicts {
            self.competitor
                .execute(&BumpPriority { job_id: self.job_id })
                .await?;
        }

        job.retries = 7;
        ctx.update(job)?;
        Ok(attempt)
    }
}

struct BumpPriority {
    job_id: JobId,
}

#[async_trait]
impl Command for BumpPriority {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let mut job: Job = ctx.get(self.job_id.into_uuid()).await?;
        job.priority += 1;
        ctx.update(job)
    }
}

#[tokio::test]
async fn test_conflicts_on_first_two_attempts_commit_once() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();
    let before = engine.datastore.commit_count().await;

    let attempts = Arc::new(AtomicU32::new(0));
    let attempt = engine
        .commands
        .execute(&OvertakenUpdate {
            job_id: job.id,
            conflicts: 2,
            attempts: Arc::clone(&attempts),
            competitor: engine.commands.clone(),
        })
        .await
        .unwrap();

    assert_eq!(attempt, 3);
    // Two competitor commits and a single commit of the retried command.
    assert_eq!(engine.datastore.commit_count().await, before + 3);

    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.retries, 7);
    assert_eq!(stored.priority, 2);
}

#[tokio::test]
async fn test_exhausted_retry_budget_surfaces_conflict() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let err = engine
        .commands
        .execute(&OvertakenUpdate {
            job_id: job.id,
            conflicts: u32::MAX,
            attempts: Arc::clone(&attempts),
            competitor: engine.commands.clone(),
        })
        .await
        .unwrap_err();

    assert!(err.is_concurrent_modification());
    let budget = engine.config.command.retry_budget;
    assert_eq!(attempts.load(Ordering::SeqCst), budget + 1);

    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.retries, 3);
    assert_eq!(stored.priority, i64::from(budget + 1));
}

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let engine = TestEngine::new();
    let job = engine
        .jobs
        .schedule(Job::new("counting", Vec::new(), 3, engine.clock.now()))
        .await
        .unwrap();

    let bump = BumpPriority { job_id: job.id };
    let (first, second) = tokio::join!(
        engine.commands.execute(&bump),
        engine.commands.execute(&bump)
    );
    first.unwrap();
    second.unwrap();

    let stored: Job = engine.datastore.get(job.id.into_uuid()).await.unwrap();
    assert_eq!(stored.priority, 2);
}

struct RecordPhases {
    log: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
}

#[async_trait]
impl Command for RecordPhases {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        for (phase, label) in [
            (TransactionPhase::Committing, "committing"),
            (TransactionPhase::Committed, "committed"),
            (TransactionPhase::RolledBack, "rolled-back"),
        ] {
            let log = Arc::clone(&self.log);
            ctx.register_listener(phase, move || {
                log.lock().unwrap().push(label);
                Ok(())
            });
        }
        if self.fail {
            return Err(AppError::validation("abort"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_listeners_follow_transaction_outcome() {
    let engine = TestEngine::new();

    let log = Arc::new(Mutex::new(Vec::new()));
    engine
        .commands
        .execute(&RecordPhases {
            log: Arc::clone(&log),
            fail: false,
        })
        .await
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["committing", "committed"]);

    let log = Arc::new(Mutex::new(Vec::new()));
    engine
        .commands
        .execute(&RecordPhases {
            log: Arc::clone(&log),
            fail: true,
        })
        .await
        .unwrap_err();
    assert_eq!(*log.lock().unwrap(), vec!["rolled-back"]);
}
