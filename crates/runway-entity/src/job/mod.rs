//! Job domain entities.

pub mod definition;
pub mod model;
pub mod state;

pub use definition::JobDefinition;
pub use model::Job;
pub use state::JobState;
