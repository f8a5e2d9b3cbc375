//! Command executor.

use std::any::Any;
use std::sync::Arc;

use runway_core::config::CommandConfig;
use runway_core::{AppError, AppResult, Clock};
use runway_database::Datastore;
use runway_entity::authorization::Authentication;

use crate::command::{Command, CommandOutput};
use crate::interceptor::authorization::{AuthorizationChecker, AuthorizationInterceptor};
use crate::interceptor::context::ContextInterceptor;
use crate::interceptor::logging::LoggingInterceptor;
use crate::interceptor::retry::RetryInterceptor;
use crate::interceptor::transaction::TransactionInterceptor;
use crate::interceptor::{CommandChain, CommandInterceptor, Invocation};

pub(crate) fn downcast_output<T: Send + 'static>(output: CommandOutput) -> AppResult<T> {
    let output: Box<dyn Any + Send> = output;
    output
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| AppError::internal("Command returned an unexpected output type"))
}

/// Entry point for submitting commands.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    chain: Arc<CommandChain>,
}

impl CommandExecutor {
    /// Create an executor over a composed chain.
    pub fn new(chain: CommandChain) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    /// Start composing the standard chain.
    pub fn builder(datastore: Arc<dyn Datastore>, clock: Arc<dyn Clock>) -> CommandExecutorBuilder {
        CommandExecutorBuilder {
            datastore,
            clock,
            config: CommandConfig::default(),
            checker: None,
            interceptors: Vec::new(),
        }
    }

    /// Execute a command without an authenticated identity.
    pub async fn execute<C: Command>(&self, command: &C) -> AppResult<C::Output> {
        self.run(command, None).await
    }

    /// Execute a command as `authentication`.
    pub async fn execute_as<C: Command>(
        &self,
        authentication: &Authentication,
        command: &C,
    ) -> AppResult<C::Output> {
        self.run(command, Some(authentication)).await
    }

    async fn run<C: Command>(
        &self,
        command: &C,
        authentication: Option<&Authentication>,
    ) -> AppResult<C::Output> {
        let output = self
            .chain
            .run(Invocation {
                command,
                context: None,
                authentication,
                chain: &self.chain,
            })
            .await?;
        downcast_output::<C::Output>(output)
    }
}

/// Composes the standard chain:
/// logging → retry → context → transaction → custom → authorization → body.
#[derive(Debug)]
pub struct CommandExecutorBuilder {
    datastore: Arc<dyn Datastore>,
    clock: Arc<dyn Clock>,
    config: CommandConfig,
    checker: Option<Arc<dyn AuthorizationChecker>>,
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
}

impl CommandExecutorBuilder {
    /// Use the given pipeline settings.
    pub fn config(mut self, config: CommandConfig) -> Self {
        self.config = config;
        self
    }

    /// Enforce registered authorization checks with `checker`.
    pub fn authorization_checker(mut self, checker: Arc<dyn AuthorizationChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Add a custom interceptor running inside the transaction, before the
    /// authorization check.
    pub fn interceptor(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Compose the chain.
    pub fn build(self) -> CommandExecutor {
        let mut chain: Vec<Arc<dyn CommandInterceptor>> = vec![
            Arc::new(LoggingInterceptor),
            Arc::new(RetryInterceptor::new(self.config.retry_budget)),
            Arc::new(ContextInterceptor::new(self.datastore, self.clock)),
            Arc::new(TransactionInterceptor),
        ];
        chain.extend(self.interceptors);
        if let Some(checker) = self.checker {
            chain.push(Arc::new(AuthorizationInterceptor::new(
                checker,
                self.config.authorization_enabled,
            )));
        }
        CommandExecutor::new(CommandChain::new(chain))
    }
}
