//! # runway-database
//!
//! Persistence layer for Runway: the [`Datastore`] / [`PersistenceSession`]
//! contracts used by the command context, typed entity queries, and two
//! implementations (in-memory and PostgreSQL).

pub mod entity;
mod filter;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod session;

pub use entity::{DbEntity, Entity, EntityKey, EntityKind};
pub use memory::MemoryDatastore;
pub use postgres::PgDatastore;
pub use query::{
    AuthorizationQuery, BatchQuery, EntityQuery, IncidentQuery, JobDefinitionQuery, JobQuery, Query,
};
pub use session::{ClaimRequest, Datastore, DbOperation, PersistenceSession};
