//! Datastore and session contracts.
//!
//! A [`PersistenceSession`] is one database transaction. The command context
//! owns exactly one session, reads through it, and hands it the coalesced
//! list of [`DbOperation`]s at flush time. Every update and delete carries
//! the revision the entity had when it was read; a mismatch is reported as
//! a concurrent modification.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use runway_core::AppResult;
use runway_core::types::JobId;
use runway_entity::job::Job;

use crate::entity::{DbEntity, EntityKey, EntityKind};
use crate::query::EntityQuery;

/// A write produced by a command.
#[derive(Debug, Clone, PartialEq)]
pub enum DbOperation {
    /// Insert a new entity (its revision is already set to 1).
    Insert(DbEntity),
    /// Replace an entity whose stored revision must equal `expected_revision`.
    Update {
        /// New state, carrying revision `expected_revision + 1`.
        entity: DbEntity,
        /// Revision read by the command.
        expected_revision: i64,
    },
    /// Delete an entity whose stored revision must equal `expected_revision`.
    Delete {
        /// Entity identity.
        key: EntityKey,
        /// Revision read by the command.
        expected_revision: i64,
    },
}

impl DbOperation {
    /// Identity of the entity the operation touches.
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Insert(entity) | Self::Update { entity, .. } => entity.key(),
            Self::Delete { key, .. } => *key,
        }
    }
}

/// Atomic claim of due jobs.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Lease owner written into claimed jobs.
    pub lock_owner: String,
    /// Maximum number of jobs to claim.
    pub max_jobs: usize,
    /// Acquisition instant; jobs due at or before it are eligible.
    pub now: DateTime<Utc>,
    /// Lease end written into claimed jobs.
    pub lock_expiration: DateTime<Utc>,
    /// When set, only jobs of these deployments or with no deployment.
    pub deployment_ids: Option<Vec<String>>,
    /// Lowest acquired priority.
    pub priority_min: Option<i64>,
    /// Highest acquired priority.
    pub priority_max: Option<i64>,
}

impl ClaimRequest {
    /// Whether `job` is eligible under this request.
    pub fn accepts(&self, job: &Job) -> bool {
        job.is_acquirable(self.now)
            && self.deployment_ids.as_ref().is_none_or(|ids| {
                job.deployment_id
                    .as_ref()
                    .is_none_or(|dep| ids.contains(dep))
            })
            && self.priority_min.is_none_or(|min| job.priority >= min)
            && self.priority_max.is_none_or(|max| job.priority <= max)
    }
}

/// Acquisition order: priority desc, due date asc, id asc.
pub fn acquisition_order(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.due_date.cmp(&b.due_date))
        .then(a.id.cmp(&b.id))
}

/// One transactional unit of work against the datastore.
#[async_trait]
pub trait PersistenceSession: Send + fmt::Debug {
    /// Load a single entity.
    async fn select(&mut self, kind: EntityKind, id: Uuid) -> AppResult<Option<DbEntity>>;

    /// Load every entity matching `query`.
    async fn select_list(&mut self, query: &EntityQuery) -> AppResult<Vec<DbEntity>>;

    /// Write `operations` in order; fails with a concurrent-modification
    /// error when a revision check does not hold.
    async fn flush(&mut self, operations: Vec<DbOperation>) -> AppResult<()>;

    /// Make flushed writes durable and visible.
    async fn commit(&mut self) -> AppResult<()>;

    /// Discard flushed writes.
    async fn rollback(&mut self) -> AppResult<()>;

    /// Release the session; rolls back if neither committed nor rolled back.
    async fn close(&mut self) -> AppResult<()>;
}

/// Shared store that hands out sessions and performs atomic job claims.
#[async_trait]
pub trait Datastore: Send + Sync + fmt::Debug {
    /// Open a new session.
    async fn open_session(&self) -> AppResult<Box<dyn PersistenceSession>>;

    /// Atomically lease up to `request.max_jobs` eligible jobs.
    ///
    /// The selection and the lease write happen in one indivisible step, so
    /// two callers never receive the same job while its lease is live. The
    /// returned jobs are in acquisition order and carry their new revision.
    async fn claim_jobs(&self, request: &ClaimRequest) -> AppResult<Vec<Job>>;

    /// Clear the lease of the given jobs if `owner` still holds it. Returns
    /// the number of released jobs.
    async fn release_jobs(&self, owner: &str, ids: &[JobId]) -> AppResult<usize>;
}
