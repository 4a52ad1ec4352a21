use std::fmt;

use async_trait::async_trait;

/// A unit of work accepted by a [`JobPool`](crate::JobPool).
///
/// The pool never assigns a lookup identity to a job. Every lookup
/// (`exist`, `exist_pending`, `remove`) uses the job's own `PartialEq`,
/// so equality is entirely caller-defined and may compare arbitrary content.
#[async_trait]
pub trait Job: PartialEq + Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Performs the work. Runs on its own Tokio task and may take arbitrarily long;
  /// the pool applies no timeout.
  async fn execute(&self) -> Result<(), Self::Error>;

  /// Asks a running job to stop.
  ///
  /// This is best-effort: the pool calls it fire-and-forget from `remove` and never
  /// waits for `execute` to actually return. A failure is logged and reported as a
  /// [`PoolEventKind::StopRequestFailed`](crate::PoolEventKind::StopRequestFailed) event.
  async fn request_stop(&self) -> Result<(), Self::Error>;
}

/// Final outcome of an admitted job, delivered through its [`JobHandle`](crate::JobHandle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
  /// `execute` returned `Ok`.
  Succeeded,
  /// `execute` returned an error; holds its display text.
  Failed(String),
  /// `execute` panicked; holds the recovered panic message.
  Panicked(String),
  /// Dropped from the pending queue because the waiting limit was reached. Never started.
  Evicted,
  /// Removed via `remove` while still pending. Never started.
  Removed,
}

impl JobOutcome {
  /// `true` for outcomes of jobs that never got to run.
  pub fn never_started(&self) -> bool {
    matches!(self, JobOutcome::Evicted | JobOutcome::Removed)
  }
}

/// Field-less summary of a [`JobOutcome`], used in pool events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
  Succeeded,
  Failed,
  Panicked,
  Evicted,
  Removed,
}

impl From<&JobOutcome> for JobStatus {
  fn from(outcome: &JobOutcome) -> Self {
    match outcome {
      JobOutcome::Succeeded => JobStatus::Succeeded,
      JobOutcome::Failed(_) => JobStatus::Failed,
      JobOutcome::Panicked(_) => JobStatus::Panicked,
      JobOutcome::Evicted => JobStatus::Evicted,
      JobOutcome::Removed => JobStatus::Removed,
    }
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      JobStatus::Succeeded => "succeeded",
      JobStatus::Failed => "failed",
      JobStatus::Panicked => "panicked",
      JobStatus::Evicted => "evicted",
      JobStatus::Removed => "removed",
    };
    f.write_str(s)
  }
}
