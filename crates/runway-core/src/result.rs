//! Convenience result type alias for Runway.

use crate::error::AppError;

/// A specialized `Result` type for Runway operations.
pub type AppResult<T> = Result<T, AppError>;
