#![allow(dead_code)]

use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TestJobError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
  Succeed,
  Fail,
  Panic,
}

/// Shared record of what test jobs did, in the order they did it.
#[derive(Debug, Default)]
pub struct JobLog {
  pub started: Mutex<Vec<String>>,
  pub completed: Mutex<Vec<String>>,
  pub stop_requests: Mutex<Vec<String>>,
  pub in_flight: AtomicUsize,
  pub peak_in_flight: AtomicUsize,
}

impl JobLog {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn started(&self) -> Vec<String> {
    self.started.lock().clone()
  }

  pub fn completed(&self) -> Vec<String> {
    self.completed.lock().clone()
  }

  pub fn stop_requests(&self) -> Vec<String> {
    self.stop_requests.lock().clone()
  }

  pub fn peak(&self) -> usize {
    self.peak_in_flight.load(Ordering::SeqCst)
  }
}

/// A job that sleeps, then succeeds, fails or panics. Equality is by name only.
#[derive(Debug, Clone)]
pub struct SleepJob {
  pub name: String,
  pub duration: Duration,
  pub behavior: Behavior,
  pub honors_stop: bool,
  pub stop_fails: bool,
  stop_token: CancellationToken,
  log: Arc<JobLog>,
}

impl PartialEq for SleepJob {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}

impl SleepJob {
  pub fn new(name: &str, duration_ms: u64, log: &Arc<JobLog>) -> Self {
    Self {
      name: name.to_string(),
      duration: Duration::from_millis(duration_ms),
      behavior: Behavior::Succeed,
      honors_stop: true,
      stop_fails: false,
      stop_token: CancellationToken::new(),
      log: log.clone(),
    }
  }

  /// A value equal to any job with this name, for lookups.
  pub fn named(name: &str) -> Self {
    Self::new(name, 0, &JobLog::new())
  }

  pub fn with_behavior(mut self, behavior: Behavior) -> Self {
    self.behavior = behavior;
    self
  }

  pub fn ignoring_stop(mut self) -> Self {
    self.honors_stop = false;
    self
  }

  pub fn with_failing_stop(mut self) -> Self {
    self.stop_fails = true;
    self
  }
}

#[async_trait]
impl Job for SleepJob {
  type Error = TestJobError;

  async fn execute(&self) -> Result<(), TestJobError> {
    self.log.started.lock().push(self.name.clone());
    let now = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.log.peak_in_flight.fetch_max(now, Ordering::SeqCst);

    let stopped = if self.honors_stop {
      tokio::select! {
        _ = sleep(self.duration) => false,
        _ = self.stop_token.cancelled() => true,
      }
    } else {
      sleep(self.duration).await;
      false
    };
    self.log.in_flight.fetch_sub(1, Ordering::SeqCst);

    if stopped {
      return Err(TestJobError(format!("{} stopped", self.name)));
    }
    match self.behavior {
      Behavior::Succeed => {
        self.log.completed.lock().push(self.name.clone());
        Ok(())
      }
      Behavior::Fail => Err(TestJobError(format!("{} failed", self.name))),
      Behavior::Panic => panic!("{} intentionally panicked", self.name),
    }
  }

  async fn request_stop(&self) -> Result<(), TestJobError> {
    self.log.stop_requests.lock().push(self.name.clone());
    if self.stop_fails {
      return Err(TestJobError(format!("{} refused to stop", self.name)));
    }
    self.stop_token.cancel();
    Ok(())
  }
}

pub fn test_config(pool_name: &str, max_workers: usize, max_waiting: usize) -> PoolConfig {
  PoolConfig::new(pool_name, max_workers, max_waiting)
    .with_recheck_interval(Duration::from_millis(200))
    .with_drain_poll_interval(Duration::from_millis(10))
}

pub fn new_pool(pool_name: &str, max_workers: usize, max_waiting: usize) -> Arc<JobPool<SleepJob>> {
  JobPool::new(
    test_config(pool_name, max_workers, max_waiting),
    PanicHandler::log(),
    tokio::runtime::Handle::current(),
  )
  .unwrap()
}

// Initialise tracing once per test binary.
pub fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,job_orchestra=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}
