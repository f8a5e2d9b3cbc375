//! In-memory datastore.
//!
//! All committed state lives behind one async mutex. Sessions read committed
//! state directly and buffer their writes until commit, where the whole
//! buffer is revision-checked and applied while the lock is held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use runway_core::types::JobId;
use runway_core::{AppError, AppResult};
use runway_entity::job::Job;

use crate::entity::{DbEntity, Entity, EntityKey, EntityKind};
use crate::query::EntityQuery;
use crate::session::{ClaimRequest, Datastore, DbOperation, PersistenceSession, acquisition_order};

#[derive(Debug, Default)]
struct MemoryState {
    entities: BTreeMap<EntityKey, DbEntity>,
    commits: u64,
}

impl MemoryState {
    fn check(&self, operations: &[DbOperation]) -> AppResult<()> {
        let mut overlay: HashMap<EntityKey, Option<i64>> = HashMap::new();
        for op in operations {
            let key = op.key();
            let current = match overlay.get(&key) {
                Some(revision) => *revision,
                None => self.entities.get(&key).map(DbEntity::revision),
            };
            match op {
                DbOperation::Insert(entity) => {
                    if current.is_some() {
                        return Err(AppError::concurrent_modification(format!(
                            "{key} was inserted concurrently"
                        )));
                    }
                    overlay.insert(key, Some(entity.revision()));
                }
                DbOperation::Update {
                    entity,
                    expected_revision,
                } => {
                    if current != Some(*expected_revision) {
                        return Err(stale(key, *expected_revision, current));
                    }
                    overlay.insert(key, Some(entity.revision()));
                }
                DbOperation::Delete {
                    expected_revision, ..
                } => {
                    if current != Some(*expected_revision) {
                        return Err(stale(key, *expected_revision, current));
                    }
                    overlay.insert(key, None);
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, operations: Vec<DbOperation>) {
        for op in operations {
            match op {
                DbOperation::Insert(entity) | DbOperation::Update { entity, .. } => {
                    self.entities.insert(entity.key(), entity);
                }
                DbOperation::Delete { key, .. } => {
                    self.entities.remove(&key);
                }
            }
        }
        self.commits += 1;
    }
}

fn stale(key: EntityKey, expected: i64, actual: Option<i64>) -> AppError {
    match actual {
        Some(actual) => AppError::concurrent_modification(format!(
            "{key} was updated by another transaction \
             (expected revision {expected}, found {actual})"
        )),
        None => AppError::concurrent_modification(format!(
            "{key} was deleted by another transaction"
        )),
    }
}

/// Datastore keeping every entity in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatastore {
    /// Create an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits so far.
    pub async fn commit_count(&self) -> u64 {
        self.state.lock().await.commits
    }

    /// Committed entity of type `T` with the given id.
    pub async fn get<T: Entity>(&self, id: Uuid) -> Option<T> {
        let key = EntityKey { kind: T::KIND, id };
        let state = self.state.lock().await;
        state.entities.get(&key).cloned().and_then(T::from_db)
    }

    /// Every committed entity of type `T`, ordered by id.
    pub async fn all<T: Entity>(&self) -> Vec<T> {
        let state = self.state.lock().await;
        state
            .entities
            .values()
            .filter(|e| e.kind() == T::KIND)
            .cloned()
            .filter_map(T::from_db)
            .collect()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn open_session(&self) -> AppResult<Box<dyn PersistenceSession>> {
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }

    async fn claim_jobs(&self, request: &ClaimRequest) -> AppResult<Vec<Job>> {
        let mut state = self.state.lock().await;

        let mut candidates: Vec<Job> = state
            .entities
            .values()
            .filter_map(|e| match e {
                DbEntity::Job(job) if request.accepts(job) => Some(job.clone()),
                _ => None,
            })
            .collect();
        candidates.sort_by(acquisition_order);
        candidates.truncate(request.max_jobs);

        for job in &mut candidates {
            job.lock_owner = Some(request.lock_owner.clone());
            job.lock_expiration_time = Some(request.lock_expiration);
            job.revision += 1;
            state.entities.insert(job.key(), DbEntity::Job(job.clone()));
        }

        if !candidates.is_empty() {
            debug!(
                owner = %request.lock_owner,
                claimed = candidates.len(),
                "Claimed jobs"
            );
        }
        Ok(candidates)
    }

    async fn release_jobs(&self, owner: &str, ids: &[JobId]) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let mut released = 0;
        for id in ids {
            let key = EntityKey {
                kind: EntityKind::Job,
                id: id.into_uuid(),
            };
            if let Some(DbEntity::Job(job)) = state.entities.get_mut(&key) {
                if job.lock_owner.as_deref() == Some(owner) {
                    job.unlock();
                    job.revision += 1;
                    released += 1;
                }
            }
        }
        Ok(released)
    }
}

/// Session over a [`MemoryDatastore`].
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    staged: Vec<DbOperation>,
}

#[async_trait]
impl PersistenceSession for MemorySession {
    async fn select(&mut self, kind: EntityKind, id: Uuid) -> AppResult<Option<DbEntity>> {
        let state = self.state.lock().await;
        Ok(state.entities.get(&EntityKey { kind, id }).cloned())
    }

    async fn select_list(&mut self, query: &EntityQuery) -> AppResult<Vec<DbEntity>> {
        let kind = query.kind();
        let state = self.state.lock().await;
        Ok(state
            .entities
            .values()
            .filter(|e| e.kind() == kind && query.matches(e))
            .cloned()
            .collect())
    }

    async fn flush(&mut self, operations: Vec<DbOperation>) -> AppResult<()> {
        let state = self.state.lock().await;
        let mut pending = self.staged.clone();
        pending.extend(operations);
        state.check(&pending)?;
        self.staged = pending;
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.state.lock().await;
        state.check(&staged)?;
        state.apply(staged);
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        self.staged.clear();
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.staged.clear();
        Ok(())
    }
}
