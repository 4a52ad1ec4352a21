use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig};
use std::convert::Infallible;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Debug, PartialEq)]
struct Upload(u32);

#[async_trait]
impl Job for Upload {
  type Error = Infallible;

  async fn execute(&self) -> Result<(), Infallible> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    info!("Upload {} done", self.0);
    Ok(())
  }

  async fn request_stop(&self) -> Result<(), Infallible> {
    Ok(())
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Drop-Oldest Backpressure Example (1 worker, 3 waiting) ---");

  let config = PoolConfig::new("backpressure_pool", 1, 3).with_drain_poll_interval(Duration::from_millis(50));
  let pool = JobPool::new(config, PanicHandler::log(), Handle::current()).expect("valid config");
  pool.run().expect("dispatch loop starts once");

  // A burst of ten uploads: the pending queue keeps only the three most recent.
  let handles: Vec<_> = (0..10).map(|i| pool.add(Upload(i))).collect();
  info!(
    "Burst submitted to {}. waiting: {} (limit {})",
    pool.name(),
    pool.waiting_count(),
    pool.max_waiting()
  );

  for (i, handle) in handles.into_iter().enumerate() {
    match handle.await_outcome().await {
      Ok(outcome) if outcome.never_started() => info!("Upload {} never ran: {:?}", i, outcome),
      Ok(outcome) => info!("Upload {} -> {:?}", i, outcome),
      Err(e) => info!("Upload {} outcome lost: {:?}", i, e),
    }
  }

  pool.wait_idle().await;
  pool.close().await.expect("Pool close failed");
  info!("--- Drop-Oldest Backpressure Example End ---");
}
