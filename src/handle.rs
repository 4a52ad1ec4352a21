use crate::error::PoolError;
use crate::job::JobOutcome;

use tokio::sync::oneshot;

/// A handle to a job admitted by `JobPool::add`.
///
/// Dropping the handle does not affect the job. Awaiting it yields the job's final
/// outcome. For a job removed while running, that is whatever its `execute` eventually
/// reports, so the handle doubles as a "has it really stopped?" signal.
#[derive(Debug)]
pub struct JobHandle {
  pub(crate) job_id: u64,
  pub(crate) outcome_receiver: Option<oneshot::Receiver<JobOutcome>>,
}

impl JobHandle {
  /// Returns the pool-assigned sequence number of this job.
  ///
  /// Useful for correlating logs and events; lookups never use it.
  pub fn id(&self) -> u64 {
    self.job_id
  }

  /// Returns the outcome if it is already available, without waiting.
  pub fn try_outcome(&mut self) -> Option<JobOutcome> {
    let outcome = self.outcome_receiver.as_mut()?.try_recv().ok()?;
    self.outcome_receiver = None;
    Some(outcome)
  }

  /// Awaits the final outcome of the job.
  ///
  /// # Errors
  /// Returns `PoolError::OutcomeChannelClosed` if the pool was dropped before the job
  /// reached a terminal state (for example while it was still pending).
  /// Returns `PoolError::OutcomeUnavailable` if the outcome was already taken by `try_outcome`.
  pub async fn await_outcome(mut self) -> Result<JobOutcome, PoolError> {
    match self.outcome_receiver.take() {
      Some(rx) => match rx.await {
        Ok(outcome) => Ok(outcome),
        Err(recv_error) => {
          tracing::warn!(job_id = %self.job_id, "Outcome channel receive error: {}", recv_error);
          Err(PoolError::OutcomeChannelClosed(format!(
            "Job (id: {}) outcome channel unexpectedly closed: {}",
            self.job_id, recv_error
          )))
        }
      },
      None => Err(PoolError::OutcomeUnavailable),
    }
  }
}
