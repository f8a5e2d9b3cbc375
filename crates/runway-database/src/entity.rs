//! Stored entity envelope.
//!
//! Sessions move entities as [`DbEntity`] values; commands work with the
//! concrete types through the [`Entity`] trait.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use runway_core::AppResult;
use runway_entity::authorization::Authorization;
use runway_entity::batch::Batch;
use runway_entity::incident::Incident;
use runway_entity::job::{Job, JobDefinition};

/// Discriminator of stored entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// [`Job`]
    Job,
    /// [`JobDefinition`]
    JobDefinition,
    /// [`Batch`]
    Batch,
    /// [`Authorization`]
    Authorization,
    /// [`Incident`]
    Incident,
}

impl EntityKind {
    /// Name stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::JobDefinition => "job_definition",
            Self::Batch => "batch",
            Self::Authorization => "authorization",
            Self::Incident => "incident",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id.
    pub id: Uuid,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.id)
    }
}

/// Any stored entity.
#[derive(Debug, Clone, PartialEq)]
pub enum DbEntity {
    /// A job.
    Job(Job),
    /// A job definition.
    JobDefinition(JobDefinition),
    /// A batch.
    Batch(Batch),
    /// An authorization record.
    Authorization(Authorization),
    /// An incident.
    Incident(Incident),
}

impl DbEntity {
    /// Kind of the wrapped entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Job(_) => EntityKind::Job,
            Self::JobDefinition(_) => EntityKind::JobDefinition,
            Self::Batch(_) => EntityKind::Batch,
            Self::Authorization(_) => EntityKind::Authorization,
            Self::Incident(_) => EntityKind::Incident,
        }
    }

    /// Id of the wrapped entity.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Job(e) => e.id.into_uuid(),
            Self::JobDefinition(e) => e.id.into_uuid(),
            Self::Batch(e) => e.id.into_uuid(),
            Self::Authorization(e) => e.id.into_uuid(),
            Self::Incident(e) => e.id.into_uuid(),
        }
    }

    /// Identity of the wrapped entity.
    pub fn key(&self) -> EntityKey {
        EntityKey {
            kind: self.kind(),
            id: self.id(),
        }
    }

    /// Revision of the wrapped entity.
    pub fn revision(&self) -> i64 {
        match self {
            Self::Job(e) => e.revision,
            Self::JobDefinition(e) => e.revision,
            Self::Batch(e) => e.revision,
            Self::Authorization(e) => e.revision,
            Self::Incident(e) => e.revision,
        }
    }

    /// Overwrite the revision of the wrapped entity.
    pub fn set_revision(&mut self, revision: i64) {
        match self {
            Self::Job(e) => e.revision = revision,
            Self::JobDefinition(e) => e.revision = revision,
            Self::Batch(e) => e.revision = revision,
            Self::Authorization(e) => e.revision = revision,
            Self::Incident(e) => e.revision = revision,
        }
    }

    /// Serialize the wrapped entity as a JSON document.
    pub fn to_json(&self) -> AppResult<serde_json::Value> {
        let value = match self {
            Self::Job(e) => serde_json::to_value(e)?,
            Self::JobDefinition(e) => serde_json::to_value(e)?,
            Self::Batch(e) => serde_json::to_value(e)?,
            Self::Authorization(e) => serde_json::to_value(e)?,
            Self::Incident(e) => serde_json::to_value(e)?,
        };
        Ok(value)
    }

    /// Deserialize a JSON document of the given kind.
    pub fn from_json(kind: EntityKind, value: serde_json::Value) -> AppResult<Self> {
        let entity = match kind {
            EntityKind::Job => Self::Job(serde_json::from_value(value)?),
            EntityKind::JobDefinition => Self::JobDefinition(serde_json::from_value(value)?),
            EntityKind::Batch => Self::Batch(serde_json::from_value(value)?),
            EntityKind::Authorization => Self::Authorization(serde_json::from_value(value)?),
            EntityKind::Incident => Self::Incident(serde_json::from_value(value)?),
        };
        Ok(entity)
    }
}

/// A concrete entity type that can travel through a session.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Kind discriminator.
    const KIND: EntityKind;

    /// Entity id.
    fn entity_id(&self) -> Uuid;

    /// Current revision.
    fn revision(&self) -> i64;

    /// Wrap into the envelope.
    fn into_db(self) -> DbEntity;

    /// Unwrap from the envelope; `None` if the kind differs.
    fn from_db(entity: DbEntity) -> Option<Self>;

    /// Identity of this entity.
    fn key(&self) -> EntityKey {
        EntityKey {
            kind: Self::KIND,
            id: self.entity_id(),
        }
    }
}

macro_rules! impl_entity {
    ($ty:ty, $variant:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$variant;

            fn entity_id(&self) -> Uuid {
                self.id.into_uuid()
            }

            fn revision(&self) -> i64 {
                self.revision
            }

            fn into_db(self) -> DbEntity {
                DbEntity::$variant(self)
            }

            fn from_db(entity: DbEntity) -> Option<Self> {
                match entity {
                    DbEntity::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(Job, Job);
impl_entity!(JobDefinition, JobDefinition);
impl_entity!(Batch, Batch);
impl_entity!(Authorization, Authorization);
impl_entity!(Incident, Incident);
