use crate::error::PoolError;

use std::time::Duration;

/// Construction-time settings for a [`JobPool`](crate::JobPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Name attached to every log span emitted by the pool.
  pub pool_name: String,
  /// Initial worker limit. Can be changed later with `set_max_workers`.
  pub max_workers: usize,
  /// Waiting limit, fixed for the pool's lifetime. `0` means the pending queue is unbounded.
  pub max_waiting: usize,
  /// How often an idle dispatch loop re-checks capacity on its own.
  pub recheck_interval: Duration,
  /// Polling interval used by `wait_all_done` and `wait_idle`.
  pub drain_poll_interval: Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      pool_name: "job_pool".to_string(),
      max_workers: 4,
      max_waiting: 0,
      recheck_interval: Duration::from_secs(1),
      drain_poll_interval: Duration::from_secs(1),
    }
  }
}

impl PoolConfig {
  pub fn new(pool_name: &str, max_workers: usize, max_waiting: usize) -> Self {
    Self {
      pool_name: pool_name.to_string(),
      max_workers,
      max_waiting,
      ..Self::default()
    }
  }

  pub fn with_pool_name(mut self, pool_name: &str) -> Self {
    self.pool_name = pool_name.to_string();
    self
  }

  pub fn with_max_workers(mut self, max_workers: usize) -> Self {
    self.max_workers = max_workers;
    self
  }

  pub fn with_max_waiting(mut self, max_waiting: usize) -> Self {
    self.max_waiting = max_waiting;
    self
  }

  pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
    self.recheck_interval = interval;
    self
  }

  pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
    self.drain_poll_interval = interval;
    self
  }

  /// Rejects settings the dispatch loop cannot work with.
  ///
  /// A worker limit of zero is allowed: the pool admits jobs but starts none until
  /// the limit is raised at runtime.
  pub(crate) fn validate(&self) -> Result<(), PoolError> {
    if self.recheck_interval.is_zero() {
      return Err(PoolError::InvalidConfig("recheck_interval must be greater than zero".to_string()));
    }
    if self.drain_poll_interval.is_zero() {
      return Err(PoolError::InvalidConfig(
        "drain_poll_interval must be greater than zero".to_string(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builder_overrides_defaults() {
    let config = PoolConfig::new("builder_pool", 2, 8)
      .with_recheck_interval(Duration::from_millis(20))
      .with_drain_poll_interval(Duration::from_millis(5));

    assert_eq!(config.pool_name, "builder_pool");
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.max_waiting, 8);
    assert_eq!(config.recheck_interval, Duration::from_millis(20));
    assert_eq!(config.drain_poll_interval, Duration::from_millis(5));
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_zero_intervals_are_rejected() {
    let config = PoolConfig::default().with_recheck_interval(Duration::ZERO);
    assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));

    let config = PoolConfig::default().with_drain_poll_interval(Duration::ZERO);
    assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
  }

  #[test]
  fn test_zero_workers_is_valid() {
    assert!(PoolConfig::default().with_max_workers(0).validate().is_ok());
  }
}
