use thiserror::Error;

/// Errors that can occur within the `job_orchestra` pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Invalid pool configuration: {0}")]
  InvalidConfig(String),

  #[error("Dispatch loop is already running for this pool")]
  AlreadyRunning,

  #[error("Pool has been closed, the dispatch loop cannot be started")]
  PoolShutDown,

  #[error("Job outcome channel closed before an outcome was sent (pool dropped while the job was pending?): {0}")]
  OutcomeChannelClosed(String),

  #[error("Job outcome already taken or channel was not available")]
  OutcomeUnavailable,

  #[error("Dispatch loop panicked")]
  DispatchLoopPanicked,
}
