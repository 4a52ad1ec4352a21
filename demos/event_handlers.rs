use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig, PoolEvent, PoolEventKind};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("report {0} has no data")]
struct EmptyReport(u32);

#[derive(Debug, PartialEq)]
struct Report(u32);

#[async_trait]
impl Job for Report {
  type Error = EmptyReport;

  async fn execute(&self) -> Result<(), EmptyReport> {
    tokio::time::sleep(Duration::from_millis(150)).await;
    if self.0 % 3 == 0 {
      return Err(EmptyReport(self.0));
    }
    Ok(())
  }

  async fn request_stop(&self) -> Result<(), EmptyReport> {
    Ok(())
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Event Handlers Example ---");

  let config = PoolConfig::new("report_pool", 2, 4).with_drain_poll_interval(Duration::from_millis(50));
  let pool = JobPool::new(config, PanicHandler::log(), Handle::current()).expect("valid config");

  pool.add_event_handler(|event: PoolEvent| match event.kind {
    PoolEventKind::Evicted => info!("[events] job {} dropped by backpressure", event.job_id),
    PoolEventKind::Finished { status } => info!("[events] job {} {}", event.job_id, status),
    other => info!("[events] job {}: {:?}", event.job_id, other),
  });

  for i in 1..=8 {
    pool.add(Report(i));
  }
  pool.run().expect("dispatch loop starts once");

  pool.wait_idle().await;
  // Give the notification worker a moment to flush the last events.
  tokio::time::sleep(Duration::from_millis(50)).await;
  pool.close().await.expect("Pool close failed");
  info!("--- Event Handlers Example End ---");
}
