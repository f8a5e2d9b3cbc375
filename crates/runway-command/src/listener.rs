//! Transaction listeners.

use runway_core::AppResult;

/// Point in the transaction lifecycle a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    /// Before flush; a failing listener rolls the transaction back.
    Committing,
    /// After a successful commit.
    Committed,
    /// After a rollback.
    RolledBack,
}

/// Callback run once when its phase is reached.
pub type TransactionListener = Box<dyn FnOnce() -> AppResult<()> + Send>;
