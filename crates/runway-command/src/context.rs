//! Per-invocation command context.
//!
//! The context owns the persistence session of a top-level command and
//! everything the command touched: an entity cache, the ordered list of
//! pending writes, transaction listeners and one frame per nested command.
//! Nothing reaches the datastore until the transaction interceptor of the
//! top-level frame flushes and commits.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use runway_core::{AppError, AppResult, Clock};
use runway_database::{DbEntity, DbOperation, Entity, EntityKey, PersistenceSession, Query};
use runway_entity::authorization::{Authentication, CompositePermissionCheck};

use crate::command::Command;
use crate::interceptor::{CommandChain, Invocation};
use crate::listener::{TransactionListener, TransactionPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Read from the session at this revision.
    Loaded(i64),
    /// Created by this context.
    Inserted,
}

#[derive(Debug)]
struct Tracked {
    origin: Origin,
    /// `None` once deleted.
    current: Option<DbEntity>,
    dirty: bool,
    /// Position of the first write, used to order the flush.
    order: Option<u64>,
}

#[derive(Debug)]
struct Frame {
    command: &'static str,
    checks: Vec<CompositePermissionCheck>,
}

/// State shared by a top-level command and every command it nests.
pub struct CommandContext {
    session: Box<dyn PersistenceSession>,
    entities: BTreeMap<EntityKey, Tracked>,
    write_sequence: u64,
    listeners: Vec<(TransactionPhase, TransactionListener)>,
    frames: Vec<Frame>,
    authentication: Option<Authentication>,
    chain: Arc<CommandChain>,
    clock: Arc<dyn Clock>,
    rollback_cause: Option<AppError>,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("depth", &self.frames.len())
            .field("tracked", &self.entities.len())
            .field("listeners", &self.listeners.len())
            .field("rollback_only", &self.rollback_cause.is_some())
            .finish()
    }
}

impl CommandContext {
    pub(crate) fn new(
        session: Box<dyn PersistenceSession>,
        authentication: Option<Authentication>,
        chain: Arc<CommandChain>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            entities: BTreeMap::new(),
            write_sequence: 0,
            listeners: Vec::new(),
            frames: Vec::new(),
            authentication,
            chain,
            clock,
            rollback_cause: None,
        }
    }

    // ── Entities ────────────────────────────────────────────────

    /// Load an entity by id, preferring the state this context already holds.
    pub async fn find<T: Entity>(&mut self, id: Uuid) -> AppResult<Option<T>> {
        let key = EntityKey { kind: T::KIND, id };
        if let Some(tracked) = self.entities.get(&key) {
            return Ok(tracked.current.clone().and_then(T::from_db));
        }

        let loaded = self.session.select(T::KIND, id).await?;
        if let Some(entity) = &loaded {
            self.track_loaded(entity.clone());
        }
        Ok(loaded.and_then(T::from_db))
    }

    /// Load an entity by id or fail with a not-found error.
    pub async fn get<T: Entity>(&mut self, id: Uuid) -> AppResult<T> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} {id} not found", T::KIND)))
    }

    /// Every entity matching `query`, including this context's own pending
    /// inserts and updates and excluding its pending deletes. Ordered by id.
    pub async fn list<Q: Query>(&mut self, query: Q) -> AppResult<Vec<Q::Entity>> {
        let query = query.into_entity_query();
        let kind = query.kind();

        for entity in self.session.select_list(&query).await? {
            if !self.entities.contains_key(&entity.key()) {
                self.track_loaded(entity);
            }
        }

        Ok(self
            .entities
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter_map(|(_, tracked)| tracked.current.as_ref())
            .filter(|entity| query.matches(entity))
            .cloned()
            .filter_map(Q::Entity::from_db)
            .collect())
    }

    /// Schedule an insert. The stored entity starts at revision 1.
    pub fn insert<T: Entity>(&mut self, entity: T) -> AppResult<()> {
        let key = entity.key();
        if self
            .entities
            .get(&key)
            .is_some_and(|t| t.current.is_some())
        {
            return Err(AppError::internal(format!(
                "{key} is already present in this command context"
            )));
        }

        let mut entity = entity.into_db();
        entity.set_revision(1);
        let order = self.next_write();
        self.entities.insert(
            key,
            Tracked {
                origin: Origin::Inserted,
                current: Some(entity),
                dirty: true,
                order: Some(order),
            },
        );
        Ok(())
    }

    /// Schedule an update of an entity read through this context.
    ///
    /// An entity that was not read through this context is checked against
    /// the revision it carries.
    pub fn update<T: Entity>(&mut self, entity: T) -> AppResult<()> {
        let key = entity.key();
        let order = self.next_write();
        match self.entities.get_mut(&key) {
            Some(tracked) => {
                if tracked.current.is_none() {
                    return Err(AppError::not_found(format!(
                        "{key} was deleted in this command context"
                    )));
                }
                let mut entity = entity.into_db();
                entity.set_revision(match tracked.origin {
                    Origin::Loaded(revision) => revision + 1,
                    Origin::Inserted => 1,
                });
                tracked.current = Some(entity);
                tracked.dirty = true;
                tracked.order.get_or_insert(order);
            }
            None => {
                let original = entity.revision();
                let mut entity = entity.into_db();
                entity.set_revision(original + 1);
                self.entities.insert(
                    key,
                    Tracked {
                        origin: Origin::Loaded(original),
                        current: Some(entity),
                        dirty: true,
                        order: Some(order),
                    },
                );
            }
        }
        Ok(())
    }

    /// Schedule a delete.
    pub fn delete<T: Entity>(&mut self, entity: &T) {
        let key = entity.key();
        let order = self.next_write();
        match self.entities.get(&key).map(|t| t.origin) {
            Some(Origin::Inserted) => {
                self.entities.remove(&key);
            }
            Some(Origin::Loaded(_)) => {
                if let Some(tracked) = self.entities.get_mut(&key) {
                    tracked.current = None;
                    tracked.dirty = true;
                    tracked.order.get_or_insert(order);
                }
            }
            None => {
                self.entities.insert(
                    key,
                    Tracked {
                        origin: Origin::Loaded(entity.revision()),
                        current: None,
                        dirty: true,
                        order: Some(order),
                    },
                );
            }
        }
    }

    /// Pending writes in the order they were first made. Repeated writes to
    /// one entity collapse into a single operation.
    pub fn pending_operations(&self) -> Vec<DbOperation> {
        let mut pending: Vec<(u64, DbOperation)> = self
            .entities
            .iter()
            .filter(|(_, t)| t.dirty)
            .filter_map(|(key, t)| {
                let op = match (t.origin, &t.current) {
                    (Origin::Inserted, Some(entity)) => DbOperation::Insert(entity.clone()),
                    (Origin::Loaded(expected), Some(entity)) => DbOperation::Update {
                        entity: entity.clone(),
                        expected_revision: expected,
                    },
                    (Origin::Loaded(expected), None) => DbOperation::Delete {
                        key: *key,
                        expected_revision: expected,
                    },
                    (Origin::Inserted, None) => return None,
                };
                Some((t.order.unwrap_or(u64::MAX), op))
            })
            .collect();
        pending.sort_by_key(|(order, _)| *order);
        pending.into_iter().map(|(_, op)| op).collect()
    }

    fn track_loaded(&mut self, entity: DbEntity) {
        self.entities.insert(
            entity.key(),
            Tracked {
                origin: Origin::Loaded(entity.revision()),
                current: Some(entity),
                dirty: false,
                order: None,
            },
        );
    }

    fn next_write(&mut self) -> u64 {
        self.write_sequence += 1;
        self.write_sequence
    }

    // ── Nesting ─────────────────────────────────────────────────

    /// Run `command` as a nested command sharing this context.
    ///
    /// The nested command never commits. If it fails, the whole context is
    /// marked rollback-only, even when the caller handles the error.
    pub async fn execute<C: Command>(&mut self, command: &C) -> AppResult<C::Output> {
        let chain = Arc::clone(&self.chain);
        let output = chain
            .run(Invocation {
                command,
                context: Some(self),
                authentication: None,
                chain: &chain,
            })
            .await?;
        crate::executor::downcast_output::<C::Output>(output)
    }

    /// Number of active frames; 1 for a top-level command.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push_frame(&mut self, command: &'static str) {
        self.frames.push(Frame {
            command,
            checks: Vec::new(),
        });
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Mark the context so that it rolls back instead of committing.
    pub fn mark_rollback_only(&mut self, cause: AppError) {
        if self.rollback_cause.is_none() {
            self.rollback_cause = Some(cause);
        }
    }

    pub(crate) fn rollback_cause(&self) -> Option<&AppError> {
        self.rollback_cause.as_ref()
    }

    // ── Authorization ───────────────────────────────────────────

    /// Identity the command runs as; `None` for internal work such as jobs.
    pub fn authentication(&self) -> Option<&Authentication> {
        self.authentication.as_ref()
    }

    /// Register a permission check for the current frame. Checks are
    /// evaluated after the command body and before anything is flushed.
    pub fn require_authorization(&mut self, check: impl Into<CompositePermissionCheck>) {
        match self.frames.last_mut() {
            Some(frame) => {
                let check = check.into();
                debug!(command = frame.command, ?check, "Authorization check registered");
                frame.checks.push(check);
            }
            None => warn!("Authorization check registered outside of a command frame"),
        }
    }

    pub(crate) fn take_frame_checks(&mut self) -> Vec<CompositePermissionCheck> {
        self.frames
            .last_mut()
            .map(|f| std::mem::take(&mut f.checks))
            .unwrap_or_default()
    }

    // ── Transaction ─────────────────────────────────────────────

    /// Run `listener` when the transaction reaches `phase`.
    pub fn register_listener(
        &mut self,
        phase: TransactionPhase,
        listener: impl FnOnce() -> AppResult<()> + Send + 'static,
    ) {
        self.listeners.push((phase, Box::new(listener)));
    }

    pub(crate) fn take_listeners(&mut self, phase: TransactionPhase) -> Vec<TransactionListener> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.listeners)
            .into_iter()
            .partition(|(p, _)| *p == phase);
        self.listeners = kept;
        taken.into_iter().map(|(_, l)| l).collect()
    }

    pub(crate) fn session_mut(&mut self) -> &mut dyn PersistenceSession {
        self.session.as_mut()
    }

    // ── Time ────────────────────────────────────────────────────

    /// Current time of the engine clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
