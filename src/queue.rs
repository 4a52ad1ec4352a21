use crate::job::JobOutcome;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

/// A job admitted but not yet started. It still owns the sender of its outcome.
pub(crate) struct PendingEntry<J> {
  pub(crate) job_id: u64,
  pub(crate) job: Arc<J>,
  pub(crate) outcome_tx: oneshot::Sender<JobOutcome>,
}

/// A job currently executing. The outcome sender has moved into the execution task.
pub(crate) struct RunningEntry<J> {
  pub(crate) job_id: u64,
  pub(crate) job: Arc<J>,
}

/// Result of a `remove` lookup, telling the caller which queue the job was taken from.
pub(crate) enum Removal<J> {
  Running(RunningEntry<J>),
  Pending(PendingEntry<J>),
}

impl<J> fmt::Debug for PendingEntry<J> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PendingEntry")
      .field("job_id", &self.job_id)
      .finish_non_exhaustive()
  }
}

impl<J> fmt::Debug for RunningEntry<J> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RunningEntry")
      .field("job_id", &self.job_id)
      .finish_non_exhaustive()
  }
}

/// Pending and running bookkeeping for one pool.
///
/// Both queues live behind the pool's single lock. The waiting and running counts
/// are the queue lengths themselves, so they cannot drift from the queues.
pub(crate) struct JobQueues<J> {
  pending: VecDeque<PendingEntry<J>>,
  running: Vec<RunningEntry<J>>,
  max_waiting: usize,
}

impl<J> fmt::Debug for JobQueues<J> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobQueues")
      .field("pending", &self.pending.len())
      .field("running", &self.running.len())
      .field("max_waiting", &self.max_waiting)
      .finish()
  }
}

impl<J: PartialEq> JobQueues<J> {
  pub(crate) fn new(max_waiting: usize) -> Self {
    Self {
      pending: VecDeque::new(),
      running: Vec::new(),
      max_waiting,
    }
  }

  pub(crate) fn waiting_len(&self) -> usize {
    self.pending.len()
  }

  pub(crate) fn running_len(&self) -> usize {
    self.running.len()
  }

  /// Appends `entry` to the back of the pending queue.
  ///
  /// With a waiting limit set, the oldest pending entry is evicted first whenever the
  /// queue is already at the limit, so the pending length never exceeds `max_waiting`.
  /// At most one entry is evicted per call. The evicted entry is returned untouched;
  /// no stop request is ever sent for it.
  pub(crate) fn admit(&mut self, entry: PendingEntry<J>) -> Option<PendingEntry<J>> {
    let evicted = if self.max_waiting > 0 && self.pending.len() >= self.max_waiting {
      self.pending.pop_front()
    } else {
      None
    };
    self.pending.push_back(entry);
    evicted
  }

  /// Scans running, then pending, using the job's own equality.
  pub(crate) fn contains(&self, job: &J) -> bool {
    self.running.iter().any(|e| *e.job == *job) || self.contains_pending(job)
  }

  pub(crate) fn contains_pending(&self, job: &J) -> bool {
    self.pending.iter().any(|e| *e.job == *job)
  }

  /// Takes the first entry equal to `job`, looking at the running queue first.
  pub(crate) fn remove_matching(&mut self, job: &J) -> Option<Removal<J>> {
    if let Some(pos) = self.running.iter().position(|e| *e.job == *job) {
      return Some(Removal::Running(self.running.remove(pos)));
    }
    let pos = self.pending.iter().position(|e| *e.job == *job)?;
    self.pending.remove(pos).map(Removal::Pending)
  }

  /// Moves the front pending entry onto the running queue if `running < max_workers`.
  ///
  /// Returns the job together with its outcome sender, which the caller hands to the
  /// execution task.
  pub(crate) fn promote(&mut self, max_workers: usize) -> Option<PendingEntry<J>> {
    if self.running.len() >= max_workers {
      return None;
    }
    let entry = self.pending.pop_front()?;
    self.running.push(RunningEntry {
      job_id: entry.job_id,
      job: entry.job.clone(),
    });
    Some(entry)
  }

  /// Drops the running entry with `job_id`. Returns `false` if `remove` already took it.
  pub(crate) fn finish(&mut self, job_id: u64) -> bool {
    match self.running.iter().position(|e| e.job_id == job_id) {
      Some(pos) => {
        self.running.remove(pos);
        true
      }
      None => false,
    }
  }
}
