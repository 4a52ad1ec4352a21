use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tracing::error;

/// Everything known about a panic recovered from a job's `execute`.
pub struct PanicInfo {
  pub pool_name: Arc<String>,
  pub job_id: u64,
  /// Best-effort text of the panic payload.
  pub message: String,
  /// The raw payload as recovered by `catch_unwind`.
  pub payload: Box<dyn Any + Send + 'static>,
}

impl fmt::Debug for PanicInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PanicInfo")
      .field("pool_name", &self.pool_name)
      .field("job_id", &self.job_id)
      .field("message", &self.message)
      .finish_non_exhaustive()
  }
}

/// Callback invoked, inside the recovering job task, for every panicking job.
///
/// A pool always requires one at construction; there is no implicit default.
#[derive(Clone)]
pub struct PanicHandler {
  callback: Arc<dyn Fn(PanicInfo) + Send + Sync + 'static>,
}

impl fmt::Debug for PanicHandler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PanicHandler").finish_non_exhaustive()
  }
}

impl PanicHandler {
  pub fn new(callback: impl Fn(PanicInfo) + Send + Sync + 'static) -> Self {
    Self {
      callback: Arc::new(callback),
    }
  }

  /// A handler that records the panic with `tracing::error!` and nothing else.
  pub fn log() -> Self {
    Self::new(|info: PanicInfo| {
      error!(
        pool_name = %*info.pool_name,
        job_id = info.job_id,
        "Job panicked: {}",
        info.message
      );
    })
  }

  /// Runs the callback. A panic raised by the callback itself is contained here.
  pub(crate) fn invoke(&self, info: PanicInfo) {
    let pool_name = info.pool_name.clone();
    let job_id = info.job_id;
    let callback = self.callback.clone();
    if std::panic::catch_unwind(AssertUnwindSafe(move || callback(info))).is_err() {
      error!(pool_name = %*pool_name, job_id, "Panic handler itself panicked.");
    }
  }
}

/// Extracts the text of a panic payload (`&str` or `String`), if any.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "<non-string panic payload>".to_string()
  }
}
