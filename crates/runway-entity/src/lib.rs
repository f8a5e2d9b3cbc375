//! # runway-entity
//!
//! Persistent entity models for Runway. Every struct in this crate is
//! either a stored entity (job, job definition, batch, authorization,
//! incident) or a value object passed across the command pipeline. All
//! stored entities carry a `revision` used for optimistic locking.

pub mod authorization;
pub mod batch;
pub mod incident;
pub mod job;
