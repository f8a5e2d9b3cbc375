//! # runway-command
//!
//! The transactional command pipeline. A [`Command`] is submitted to the
//! [`CommandExecutor`], which threads it through an immutable chain of
//! [`CommandInterceptor`]s: logging, optimistic-concurrency retry, context
//! management, transaction demarcation and authorization, in that order.
//! Nested commands run through the same chain on the caller's
//! [`CommandContext`] and never commit on their own.

pub mod command;
pub mod context;
pub mod executor;
pub mod interceptor;
pub mod listener;

pub use command::{Command, CommandOutput, DynCommand};
pub use context::CommandContext;
pub use executor::{CommandExecutor, CommandExecutorBuilder};
pub use interceptor::authorization::AuthorizationChecker;
pub use interceptor::{CommandChain, CommandInterceptor, Invocation, Next};
pub use listener::TransactionPhase;
