//! Core type definitions used across the Runway workspace.

pub mod id;

pub use id::*;
