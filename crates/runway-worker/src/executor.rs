//! Job executor: acquisition loop and worker pool.
//!
//! One acquisition loop claims due jobs under a lease and hands them to a
//! bounded queue drained by `worker_count` worker tasks. Jobs that do not
//! fit in the queue are released immediately. Each worker runs the job
//! through the command pipeline and records failures in a separate
//! transaction.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use runway_command::CommandExecutor;
use runway_core::config::JobExecutorConfig;
use runway_core::types::JobId;
use runway_core::{AppError, AppResult, Clock};
use runway_database::{ClaimRequest, Datastore};
use runway_entity::job::Job;

use crate::backoff::{AcquisitionBackoff, RetryBackoff};
use crate::execution::{ExecuteJobCmd, FailureOutcome, HandleJobFailureCmd, JobOutcome, after};
use crate::handler::JobHandlerRegistry;

#[derive(Debug)]
struct Inner {
    datastore: Arc<dyn Datastore>,
    commands: CommandExecutor,
    registry: Arc<JobHandlerRegistry>,
    clock: Arc<dyn Clock>,
    config: JobExecutorConfig,
    lock_owner: String,
    retry_backoff: RetryBackoff,
    deployments: RwLock<BTreeSet<String>>,
    hint: Arc<Notify>,
}

/// Claims due jobs and executes them.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    inner: Arc<Inner>,
}

impl JobExecutor {
    /// Creates a new job executor.
    pub fn new(
        datastore: Arc<dyn Datastore>,
        commands: CommandExecutor,
        registry: Arc<JobHandlerRegistry>,
        clock: Arc<dyn Clock>,
        config: JobExecutorConfig,
    ) -> AppResult<Self> {
        let retry_backoff = RetryBackoff::from_config(&config.retry_backoff)?;
        let lock_owner = config
            .lock_owner
            .clone()
            .unwrap_or_else(|| format!("runway-{}", Uuid::new_v4()));

        Ok(Self {
            inner: Arc::new(Inner {
                datastore,
                commands,
                registry,
                clock,
                config,
                lock_owner,
                retry_backoff,
                deployments: RwLock::new(BTreeSet::new()),
                hint: Arc::new(Notify::new()),
            }),
        })
    }

    /// Identity written into the leases this executor takes.
    pub fn lock_owner(&self) -> &str {
        &self.inner.lock_owner
    }

    /// Handle that wakes the acquisition loop and resets its wait.
    pub fn hint(&self) -> Arc<Notify> {
        Arc::clone(&self.inner.hint)
    }

    /// Accept jobs of `deployment_id` when deployment-aware acquisition is on.
    pub fn register_deployment(&self, deployment_id: impl Into<String>) {
        if let Ok(mut deployments) = self.inner.deployments.write() {
            deployments.insert(deployment_id.into());
        }
    }

    fn claim_request(&self) -> ClaimRequest {
        let config = &self.inner.config;
        let now = self.inner.clock.now();
        let deployment_ids = config.deployment_aware.then(|| {
            self.inner
                .deployments
                .read()
                .map(|d| d.iter().cloned().collect())
                .unwrap_or_default()
        });

        ClaimRequest {
            lock_owner: self.inner.lock_owner.clone(),
            max_jobs: config.max_jobs_per_acquisition,
            now,
            lock_expiration: after(now, Duration::from_millis(config.lock_time_ms)),
            deployment_ids,
            priority_min: config.priority_min,
            priority_max: config.priority_max,
        }
    }

    /// Run one acquisition round.
    pub async fn acquire_once(&self) -> AppResult<Vec<Job>> {
        let jobs = self.inner.datastore.claim_jobs(&self.claim_request()).await?;
        if !jobs.is_empty() {
            debug!(
                lock_owner = %self.inner.lock_owner,
                acquired = jobs.len(),
                "Acquired jobs"
            );
        }
        Ok(jobs)
    }

    /// Run one claimed job and record its failure, if any.
    ///
    /// Fatal errors are recorded on the job and then returned.
    pub async fn execute_job(&self, job_id: JobId) -> AppResult<JobOutcome> {
        let command = ExecuteJobCmd {
            job_id,
            lock_owner: Some(self.inner.lock_owner.clone()),
            registry: Arc::clone(&self.inner.registry),
        };

        match self.inner.commands.execute(&command).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let outcome = self
                    .handle_failure(job_id, Some(self.inner.lock_owner.clone()), &err)
                    .await?;
                if err.is_fatal() {
                    return Err(err);
                }
                Ok(JobOutcome::Failed(outcome))
            }
        }
    }

    /// Run a job synchronously regardless of its lease.
    pub async fn execute_job_now(&self, job_id: JobId) -> AppResult<JobOutcome> {
        let command = ExecuteJobCmd {
            job_id,
            lock_owner: None,
            registry: Arc::clone(&self.inner.registry),
        };

        match self.inner.commands.execute(&command).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.handle_failure(job_id, None, &err).await?;
                Err(err)
            }
        }
    }

    async fn handle_failure(
        &self,
        job_id: JobId,
        lock_owner: Option<String>,
        err: &AppError,
    ) -> AppResult<FailureOutcome> {
        debug!(job_id = %job_id, kind = %err.kind, "Recording job failure: {}", err);
        let command = HandleJobFailureCmd::new(job_id, lock_owner, err, self.inner.retry_backoff);
        self.inner.commands.execute(&command).await.map_err(|e| {
            error!(job_id = %job_id, "Failed to record job failure: {}", e);
            e
        })
    }

    /// Claim and execute due jobs once, in acquisition order, on the calling
    /// task. Returns the number of jobs claimed.
    pub async fn process_due_jobs(&self) -> AppResult<usize> {
        let jobs = self.acquire_once().await?;
        for job in &jobs {
            self.execute_job(job.id).await?;
        }
        Ok(jobs.len())
    }

    /// Queue claimed jobs for the workers. Jobs that do not fit are released
    /// at once. Returns the number of jobs queued.
    pub(crate) async fn dispatch(&self, queue: &mpsc::Sender<Job>, jobs: Vec<Job>) -> usize {
        let mut queued = 0;
        let mut rejected: Vec<JobId> = Vec::new();

        for job in jobs {
            if !rejected.is_empty() {
                rejected.push(job.id);
                continue;
            }
            match queue.try_send(job) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                    rejected.push(job.id)
                }
            }
        }

        if !rejected.is_empty() {
            warn!(
                lock_owner = %self.inner.lock_owner,
                rejected = rejected.len(),
                "Worker queue saturated, releasing jobs"
            );
            if let Err(e) = self
                .inner
                .datastore
                .release_jobs(&self.inner.lock_owner, &rejected)
                .await
            {
                error!("Failed to release rejected jobs: {}", e);
            }
        }
        queued
    }

    /// Run the acquisition loop and the workers until `shutdown` flips to
    /// `true`. Returns the first fatal job error, if any.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let config = &self.inner.config;
        info!(
            "Job executor '{}' started with workers={}, queue_size={}, max_jobs_per_acquisition={}",
            self.inner.lock_owner,
            config.worker_count,
            config.queue_size,
            config.max_jobs_per_acquisition
        );

        let (queue, receiver) = mpsc::channel::<Job>(config.queue_size.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<AppError>(1);

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker in 0..config.worker_count.max(1) {
            let executor = self.clone();
            let receiver = Arc::clone(&receiver);
            let fatal_tx = fatal_tx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(job) = next else { break };
                    match executor.execute_job(job.id).await {
                        Ok(outcome) => {
                            debug!(worker, job_id = %job.id, ?outcome, "Job executed")
                        }
                        Err(e) if e.is_fatal() => {
                            error!(worker, job_id = %job.id, "Fatal job error: {}", e);
                            // Only the first fatal error stops the loop.
                            let _ = fatal_tx.try_send(e);
                        }
                        Err(e) => error!(worker, job_id = %job.id, "Job execution failed: {}", e),
                    }
                }
            }));
        }
        drop(fatal_tx);

        let mut backoff = AcquisitionBackoff::from_config(config);
        let result = loop {
            let wait = match self.acquire_once().await {
                Ok(jobs) => {
                    let acquired = jobs.len();
                    self.dispatch(&queue, jobs).await;
                    backoff.next_wait(acquired)
                }
                Err(e) => {
                    error!("Job acquisition failed: {}", e);
                    backoff.next_wait(0)
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "Waiting for next acquisition");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Job executor '{}' received shutdown signal", self.inner.lock_owner);
                        break Ok(());
                    }
                }
                Some(fatal) = fatal_rx.recv() => {
                    break Err(fatal);
                }
                _ = self.inner.hint.notified() => {
                    backoff.reset();
                }
                _ = tokio::time::sleep(wait) => {}
            }
        };

        drop(queue);
        info!(
            "Job executor '{}' waiting for in-flight jobs to complete...",
            self.inner.lock_owner
        );
        for worker in workers {
            if tokio::time::timeout(Duration::from_secs(30), worker)
                .await
                .is_err()
            {
                warn!("Worker did not finish within the shutdown timeout");
            }
        }
        info!("Job executor '{}' shut down complete", self.inner.lock_owner);

        result
    }
}
