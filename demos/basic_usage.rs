use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig};
use std::convert::Infallible;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Debug, PartialEq)]
struct Greeting {
  name: String,
}

#[async_trait]
impl Job for Greeting {
  type Error = Infallible;

  async fn execute(&self) -> Result<(), Infallible> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Hello, {}!", self.name);
    Ok(())
  }

  async fn request_stop(&self) -> Result<(), Infallible> {
    Ok(())
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Basic Usage Example ---");

  let config = PoolConfig::new("basic_pool", 2, 0).with_drain_poll_interval(Duration::from_millis(50));
  let pool = JobPool::new(config, PanicHandler::log(), Handle::current()).expect("valid config");

  let handles: Vec<_> = ["Ada", "Grace", "Barbara", "Frances"]
    .iter()
    .map(|name| pool.add(Greeting { name: name.to_string() }))
    .collect();
  info!(
    "Submitted {} jobs, waiting: {}, running: {}",
    handles.len(),
    pool.waiting_count(),
    pool.running_count()
  );

  pool.run().expect("dispatch loop starts once");

  for handle in handles {
    let job_id = handle.id();
    match handle.await_outcome().await {
      Ok(outcome) => info!("Job {} finished: {:?}", job_id, outcome),
      Err(e) => info!("Job {} outcome lost: {:?}", job_id, e),
    }
  }

  pool.close().await.expect("Pool close failed");
  info!("--- Basic Usage Example End ---");
}
