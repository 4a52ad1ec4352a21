use crate::job::JobStatus;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, trace, Instrument};

// --- Public Event Structs for Handlers ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEventKind {
  /// The dispatch loop moved the job from pending to running.
  Started,
  /// The job's execution task finished (successfully, with an error, or by panicking).
  Finished { status: JobStatus },
  /// The job was dropped from the pending queue to make room for a newer one.
  Evicted,
  /// `remove` took the job out of the pool's bookkeeping.
  Removed { was_running: bool },
  /// The stop request issued by `remove` returned an error.
  StopRequestFailed { error: String },
}

#[derive(Debug, Clone)]
pub struct PoolEvent {
  pub job_id: u64,
  pub pool_name: Arc<String>,
  pub kind: PoolEventKind,
  pub time: SystemTime,
}

type EventHandler = Arc<dyn Fn(PoolEvent) + Send + Sync + 'static>;

// --- EventNotifier Struct ---

struct NotifierInternalState {
  internal_rx_for_init: Option<mpsc::UnboundedReceiver<PoolEvent>>,
  tokio_handle: TokioHandle,
}

/// Fans pool events out to registered handlers on a dedicated worker task.
///
/// The worker is only started when the first handler is added. Until then `emit`
/// drops events, so a pool without handlers never buffers anything.
pub(crate) struct EventNotifier {
  pool_name: Arc<String>,
  handlers: Arc<RwLock<Vec<EventHandler>>>,
  internal_tx: mpsc::UnboundedSender<PoolEvent>,
  init_once: Once,
  internal_state_for_init: Mutex<NotifierInternalState>,
}

impl fmt::Debug for EventNotifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventNotifier")
      .field("pool_name", &self.pool_name)
      .field("handler_count", &self.handlers.read().len())
      .field("initialized", &self.init_once.is_completed())
      .finish()
  }
}

impl EventNotifier {
  pub(crate) fn new(tokio_handle: TokioHandle, pool_name: Arc<String>) -> Self {
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    Self {
      pool_name,
      handlers: Arc::new(RwLock::new(Vec::new())),
      internal_tx,
      init_once: Once::new(),
      internal_state_for_init: Mutex::new(NotifierInternalState {
        internal_rx_for_init: Some(internal_rx),
        tokio_handle,
      }),
    }
  }

  fn ensure_worker_initialized(&self) {
    self.init_once.call_once(|| {
      let mut state_guard = self.internal_state_for_init.lock();
      if let Some(rx_to_use) = state_guard.internal_rx_for_init.take() {
        info!(pool_name = %*self.pool_name, "First event handler added. Starting notification worker.");
        state_guard.tokio_handle.spawn(
          Self::run_notification_worker_loop(rx_to_use, self.handlers.clone())
            .instrument(info_span!("job_pool_notification_worker", pool_name = %*self.pool_name)),
        );
      }
    });
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(PoolEvent) + Send + Sync + 'static) {
    self.ensure_worker_initialized();
    let mut handlers_guard = self.handlers.write();
    handlers_guard.push(Arc::new(handler));
    info!(pool_name = %*self.pool_name, "Added new event handler. Total handlers: {}", handlers_guard.len());
  }

  /// Queues an event for the worker. Never blocks; dropped if no handler was ever added.
  pub(crate) fn emit(&self, job_id: u64, kind: PoolEventKind) {
    if !self.init_once.is_completed() {
      return;
    }
    let event = PoolEvent {
      job_id,
      pool_name: self.pool_name.clone(),
      kind,
      time: SystemTime::now(),
    };
    if self.internal_tx.send(event).is_err() {
      trace!(pool_name = %*self.pool_name, job_id, "Notification worker gone, event dropped.");
    }
  }

  async fn run_notification_worker_loop(
    mut queue_rx: mpsc::UnboundedReceiver<PoolEvent>,
    handlers_list_arc: Arc<RwLock<Vec<EventHandler>>>,
  ) {
    info!("Notification worker started.");

    while let Some(event) = queue_rx.recv().await {
      // Snapshot so a handler can register further handlers without deadlocking.
      let handlers: Vec<EventHandler> = handlers_list_arc.read().clone();
      debug!(job_id = event.job_id, kind = ?event.kind, "Dispatching event to {} handlers.", handlers.len());

      for handler in handlers {
        let event_for_handler = event.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event_for_handler)));
        if result.is_err() {
          error!(
            "An event handler panicked. Pool: {}, Job ID: {}",
            event.pool_name, event.job_id
          );
        }
      }
    }

    info!("Notification worker stopped (all event senders dropped).");
  }
}
