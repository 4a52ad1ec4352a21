use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::JobHandle;
use crate::job::{Job, JobOutcome, JobStatus};
use crate::notifier::{EventNotifier, PoolEvent, PoolEventKind};
use crate::panic::{panic_message, PanicHandler, PanicInfo};
use crate::queue::{JobQueues, PendingEntry, Removal, RunningEntry};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// State shared between the pool, its dispatch loop and every job task.
struct PoolShared<J: Job> {
  pool_name: Arc<String>,
  queues: Mutex<JobQueues<J>>,
  max_workers: AtomicUsize,
  recheck_interval: Duration,
  wake: Notify,
  notifier: EventNotifier,
  panic_handler: PanicHandler,
  tokio_handle: TokioHandle,
}

/// A bounded job pool.
///
/// Jobs enter a FIFO pending queue through [`add`](Self::add). Once [`run`](Self::run)
/// has started the dispatch loop, pending jobs are promoted to running, each on its own
/// Tokio task, for as long as fewer than `max_workers` jobs are running.
///
/// When `max_waiting > 0`, admitting a job into a full pending queue evicts the oldest
/// pending job. Admission never blocks and never fails.
///
/// # Usage constraints
/// `run` starts at most one dispatch loop; later calls return an error. `close` halts
/// promotions but neither stops nor waits for jobs that are already running.
pub struct JobPool<J: Job> {
  shared: Arc<PoolShared<J>>,
  max_waiting: usize,
  drain_poll_interval: Duration,
  started: AtomicBool,
  shutdown_token: CancellationToken,
  dispatch_exited: CancellationToken,
  dispatch_join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<J: Job> fmt::Debug for JobPool<J> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobPool")
      .field("pool_name", &self.shared.pool_name)
      .field("queues", &*self.shared.queues.lock())
      .field("max_workers", &self.max_workers())
      .field("started", &self.started.load(AtomicOrdering::Acquire))
      .field("closed", &self.shutdown_token.is_cancelled())
      .finish_non_exhaustive()
  }
}

impl<J: Job> JobPool<J> {
  /// Creates a pool. Nothing is dispatched until [`run`](Self::run) is called.
  ///
  /// The panic handler is mandatory: it is called for every job whose `execute` panics.
  /// Use [`PanicHandler::log`] to only record such panics.
  pub fn new(config: PoolConfig, panic_handler: PanicHandler, tokio_handle: TokioHandle) -> Result<Arc<Self>, PoolError> {
    config.validate()?;

    let pool_name = Arc::new(config.pool_name);
    info!(
      pool_name = %*pool_name,
      max_workers = config.max_workers,
      max_waiting = config.max_waiting,
      "Creating job pool."
    );

    let shared = Arc::new(PoolShared {
      pool_name: pool_name.clone(),
      queues: Mutex::new(JobQueues::new(config.max_waiting)),
      max_workers: AtomicUsize::new(config.max_workers),
      recheck_interval: config.recheck_interval,
      wake: Notify::new(),
      notifier: EventNotifier::new(tokio_handle.clone(), pool_name),
      panic_handler,
      tokio_handle,
    });

    Ok(Arc::new(Self {
      shared,
      max_waiting: config.max_waiting,
      drain_poll_interval: config.drain_poll_interval,
      started: AtomicBool::new(false),
      shutdown_token: CancellationToken::new(),
      dispatch_exited: CancellationToken::new(),
      dispatch_join_handle: Mutex::new(None),
    }))
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  pub fn max_workers(&self) -> usize {
    self.shared.max_workers.load(AtomicOrdering::Acquire)
  }

  pub fn max_waiting(&self) -> usize {
    self.max_waiting
  }

  /// Changes the worker limit. Only future promotions are affected: running jobs are
  /// never preempted when the limit is lowered.
  pub fn set_max_workers(&self, max_workers: usize) {
    let previous = self.shared.max_workers.swap(max_workers, AtomicOrdering::AcqRel);
    info!(pool_name = %*self.shared.pool_name, previous, max_workers, "Worker limit changed.");
    self.shared.wake.notify_one();
  }

  /// Number of jobs in the pending queue.
  pub fn waiting_count(&self) -> usize {
    self.shared.queues.lock().waiting_len()
  }

  /// Number of jobs the pool currently tracks as running.
  pub fn running_count(&self) -> usize {
    self.shared.queues.lock().running_len()
  }

  /// Admits `job` at the back of the pending queue.
  ///
  /// If the waiting limit is reached, the oldest pending job is evicted first. The
  /// evicted job gets no stop request; its handle resolves to [`JobOutcome::Evicted`].
  pub fn add(&self, job: J) -> JobHandle {
    let job_id = NEXT_POOL_JOB_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let entry = PendingEntry {
      job_id,
      job: Arc::new(job),
      outcome_tx,
    };

    let (evicted, waiting) = {
      let mut queues = self.shared.queues.lock();
      let evicted = queues.admit(entry);
      (evicted, queues.waiting_len())
    };
    debug!(pool_name = %*self.shared.pool_name, %job_id, waiting, "Job admitted to pending queue.");

    if let Some(evicted) = evicted {
      debug!(
        pool_name = %*self.shared.pool_name,
        job_id = evicted.job_id,
        "Waiting limit reached, evicted oldest pending job."
      );
      self.shared.notifier.emit(evicted.job_id, PoolEventKind::Evicted);
      let _ = evicted.outcome_tx.send(JobOutcome::Evicted);
    }

    self.shared.wake.notify_one();
    JobHandle {
      job_id,
      outcome_receiver: Some(outcome_rx),
    }
  }

  /// `true` if a job equal to `job` is running or pending.
  pub fn exist(&self, job: &J) -> bool {
    self.shared.queues.lock().contains(job)
  }

  /// `true` if a job equal to `job` is pending.
  pub fn exist_pending(&self, job: &J) -> bool {
    self.shared.queues.lock().contains_pending(job)
  }

  /// Removes the first job equal to `job`, looking at running jobs first.
  ///
  /// A running job is dropped from the bookkeeping immediately and asked to stop on a
  /// separate task; this call does not wait for the stop request nor for `execute` to
  /// return. Cancellation is requested, not confirmed: a job that ignores the request
  /// keeps running, untracked, and its [`JobHandle`] resolves when it really finishes.
  ///
  /// A pending job is simply dropped and its handle resolves to [`JobOutcome::Removed`].
  pub fn remove(&self, job: &J) -> bool {
    let removal = self.shared.queues.lock().remove_matching(job);
    match removal {
      Some(Removal::Running(entry)) => {
        info!(pool_name = %*self.shared.pool_name, job_id = entry.job_id, "Removed running job, requesting stop.");
        self.shared.notifier.emit(entry.job_id, PoolEventKind::Removed { was_running: true });
        self.shared.wake.notify_one();

        let job_id = entry.job_id;
        let shared = self.shared.clone();
        self.shared.tokio_handle.spawn(
          async move { shared.request_stop(entry).await }.instrument(info_span!(
            "pool_job_stop",
            pool_name = %*self.shared.pool_name,
            %job_id
          )),
        );
        true
      }
      Some(Removal::Pending(entry)) => {
        info!(pool_name = %*self.shared.pool_name, job_id = entry.job_id, "Removed pending job.");
        self.shared.notifier.emit(entry.job_id, PoolEventKind::Removed { was_running: false });
        let _ = entry.outcome_tx.send(JobOutcome::Removed);
        true
      }
      None => {
        trace!(pool_name = %*self.shared.pool_name, "Remove: no matching job.");
        false
      }
    }
  }

  /// Registers a callback for pool events. The first registration starts the
  /// notification worker; events emitted before that are not recorded.
  pub fn add_event_handler(&self, handler: impl Fn(PoolEvent) + Send + Sync + 'static) {
    self.shared.notifier.add_handler(handler);
  }

  /// Starts the dispatch loop on the pool's Tokio runtime.
  ///
  /// # Errors
  /// `PoolError::AlreadyRunning` on a second call, `PoolError::PoolShutDown` after `close`.
  pub fn run(&self) -> Result<(), PoolError> {
    if self.shutdown_token.is_cancelled() {
      warn!(pool_name = %*self.shared.pool_name, "Run: pool already closed.");
      return Err(PoolError::PoolShutDown);
    }
    if self.started.swap(true, AtomicOrdering::AcqRel) {
      warn!(pool_name = %*self.shared.pool_name, "Run: dispatch loop already started.");
      return Err(PoolError::AlreadyRunning);
    }

    let loop_join_handle = self.shared.tokio_handle.spawn(
      PoolShared::run_dispatch_loop(
        self.shared.clone(),
        self.shutdown_token.clone(),
        self.dispatch_exited.clone(),
      )
      .instrument(info_span!("job_pool_dispatch_loop", pool_name = %*self.shared.pool_name)),
    );
    *self.dispatch_join_handle.lock() = Some(loop_join_handle);
    Ok(())
  }

  /// Stops the dispatch loop and waits until it has exited.
  ///
  /// Pending jobs stay pending and running jobs keep running. Calling `close` more
  /// than once, or concurrently, is fine: every caller returns once the loop is gone.
  pub async fn close(&self) -> Result<(), PoolError> {
    if !self.shutdown_token.is_cancelled() {
      info!(pool_name = %*self.shared.pool_name, "Closing pool: signalling dispatch loop to stop.");
    }
    self.shutdown_token.cancel();

    let handle_to_await = self.dispatch_join_handle.lock().take();

    if let Some(handle) = handle_to_await {
      info!(pool_name = %*self.shared.pool_name, "Waiting for dispatch loop to join.");
      let joined = handle.await;
      self.dispatch_exited.cancel();
      match joined {
        Ok(()) => info!(pool_name = %*self.shared.pool_name, "Dispatch loop successfully joined."),
        Err(join_error) => {
          error!(pool_name = %*self.shared.pool_name, "Error joining dispatch loop: {:?}", join_error);
          if join_error.is_panic() {
            return Err(PoolError::DispatchLoopPanicked);
          }
        }
      }
    } else if self.started.load(AtomicOrdering::Acquire) {
      trace!(pool_name = %*self.shared.pool_name, "Dispatch loop handle already taken, waiting for loop exit.");
      self.dispatch_exited.cancelled().await;
    }
    Ok(())
  }

  /// Waits until the pending queue is empty, polling every `drain_poll_interval`.
  ///
  /// Running jobs are not considered: this can return while work is still executing.
  pub async fn wait_all_done(&self) {
    while self.waiting_count() > 0 {
      tokio::time::sleep(self.drain_poll_interval).await;
    }
  }

  /// Waits until nothing is pending and nothing is tracked as running.
  pub async fn wait_idle(&self) {
    loop {
      let idle = {
        let queues = self.shared.queues.lock();
        queues.waiting_len() == 0 && queues.running_len() == 0
      };
      if idle {
        break;
      }
      tokio::time::sleep(self.drain_poll_interval).await;
    }
  }
}

impl<J: Job> PoolShared<J> {
  async fn run_dispatch_loop(
    shared: Arc<Self>,
    shutdown_token: CancellationToken,
    dispatch_exited: CancellationToken,
  ) {
    info!("Dispatch loop started.");

    loop {
      // Drain as fast as capacity allows before going idle.
      while !shutdown_token.is_cancelled() {
        match shared.promote_next() {
          Some(entry) => shared.spawn_job(entry),
          None => break,
        }
      }

      tokio::select! {
        biased;

        _ = shutdown_token.cancelled() => {
          info!("Shutdown signal received. Dispatch loop terminating.");
          break;
        }
        _ = shared.wake.notified() => {
          trace!("Dispatch loop woken by pool activity.");
        }
        _ = tokio::time::sleep(shared.recheck_interval) => {
          trace!("Periodic capacity re-check.");
        }
      }
    }

    let (waiting, running) = {
      let queues = shared.queues.lock();
      (queues.waiting_len(), queues.running_len())
    };
    info!(waiting, running, "Dispatch loop stopped.");
    dispatch_exited.cancel();
  }

  fn promote_next(&self) -> Option<PendingEntry<J>> {
    let max_workers = self.max_workers.load(AtomicOrdering::Acquire);
    let mut queues = self.queues.lock();
    let entry = queues.promote(max_workers)?;
    debug!(
      job_id = entry.job_id,
      waiting = queues.waiting_len(),
      running = queues.running_len(),
      max_workers,
      "Promoted job to running."
    );
    Some(entry)
  }

  fn spawn_job(self: &Arc<Self>, entry: PendingEntry<J>) {
    let job_id = entry.job_id;
    self.notifier.emit(job_id, PoolEventKind::Started);

    let shared = self.clone();
    self.tokio_handle.spawn(
      async move { shared.execute_job(entry).await }
        .instrument(info_span!("pool_job", pool_name = %*self.pool_name, %job_id)),
    );
  }

  async fn execute_job(&self, entry: PendingEntry<J>) {
    let PendingEntry { job_id, job, outcome_tx } = entry;

    // Build the future inside the guard; an impl may panic before returning it.
    let outcome = match AssertUnwindSafe(async { job.execute().await }).catch_unwind().await {
      Ok(Ok(())) => {
        trace!("Job executed successfully.");
        JobOutcome::Succeeded
      }
      Ok(Err(job_error)) => {
        warn!("Job execution failed: {}", job_error);
        JobOutcome::Failed(job_error.to_string())
      }
      Err(panic_payload) => {
        let message = panic_message(panic_payload.as_ref());
        error!("Job panicked during execution: {}", message);
        self.panic_handler.invoke(PanicInfo {
          pool_name: self.pool_name.clone(),
          job_id,
          message: message.clone(),
          payload: panic_payload,
        });
        JobOutcome::Panicked(message)
      }
    };

    let still_tracked = self.queues.lock().finish(job_id);
    if still_tracked {
      self.wake.notify_one();
    } else {
      debug!("Job finished after being removed from the pool.");
    }

    self.notifier.emit(
      job_id,
      PoolEventKind::Finished {
        status: JobStatus::from(&outcome),
      },
    );
    if outcome_tx.send(outcome).is_err() {
      trace!("Job handle dropped, outcome discarded.");
    }
  }

  async fn request_stop(&self, entry: RunningEntry<J>) {
    match entry.job.request_stop().await {
      Ok(()) => debug!("Stop request accepted."),
      Err(stop_error) => {
        warn!("Stop request failed: {}", stop_error);
        self.notifier.emit(
          entry.job_id,
          PoolEventKind::StopRequestFailed {
            error: stop_error.to_string(),
          },
        );
      }
    }
  }
}

impl<J: Job> Drop for JobPool<J> {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      info!(
        pool_name = %*self.shared.pool_name,
        "JobPool dropped without close. Signalling dispatch loop to stop."
      );
      self.shutdown_token.cancel();
    } else {
      trace!(pool_name = %*self.shared.pool_name, "Drop: pool already closed.");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;

  #[derive(Debug, PartialEq)]
  struct Idle(u32);

  #[async_trait]
  impl Job for Idle {
    type Error = std::io::Error;

    async fn execute(&self) -> Result<(), Self::Error> {
      tokio::time::sleep(Duration::from_secs(1)).await;
      Ok(())
    }

    async fn request_stop(&self) -> Result<(), Self::Error> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_periodic_recheck_promotes_without_wakeup() {
    let config = PoolConfig::new("timer_only_pool", 0, 0).with_recheck_interval(Duration::from_millis(300));
    let pool = JobPool::new(config, PanicHandler::log(), TokioHandle::current()).unwrap();
    pool.run().unwrap();
    let _handle = pool.add(Idle(1));
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Raise the limit behind the loop's back so only the timer can notice.
    pool.shared.max_workers.store(1, AtomicOrdering::Release);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(pool.running_count(), 0);
    assert_eq!(pool.waiting_count(), 1);

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(pool.running_count(), 1);
    assert_eq!(pool.waiting_count(), 0);
    pool.close().await.unwrap();
  }
}
