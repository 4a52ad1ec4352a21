use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
struct Divide {
  numerator: u32,
  denominator: u32,
}

#[async_trait]
impl Job for Divide {
  type Error = Infallible;

  async fn execute(&self) -> Result<(), Infallible> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if self.denominator == 0 {
      panic!("attempted to divide {} by zero", self.numerator);
    }
    info!("{} / {} = {}", self.numerator, self.denominator, self.numerator / self.denominator);
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
  info!("--- Job Panic Example ---");

  let panics = Arc::new(AtomicUsize::new(0));
  let panics_for_handler = panics.clone();
  let handler = PanicHandler::new(move |info| {
    panics_for_handler.fetch_add(1, Ordering::SeqCst);
    warn!("Panic handler: job {} in {} panicked: {}", info.job_id, info.pool_name, info.message);
  });

  let pool = JobPool::new(PoolConfig::new("panic_pool", 2, 0), handler, Handle::current()).expect("valid config");
  pool.run().expect("dispatch loop starts once");

  let handles = vec![
    pool.add(Divide {
      numerator: 10,
      denominator: 2,
    }),
    pool.add(Divide {
      numerator: 1,
      denominator: 0,
    }),
    pool.add(Divide {
      numerator: 9,
      denominator: 3,
    }),
  ];

  for handle in handles {
    let job_id = handle.id();
    info!("Job {} -> {:?}", job_id, handle.await_outcome().await);
  }
  info!("Panics observed by handler: {}", panics.load(Ordering::SeqCst));

  pool.close().await.expect("Pool close failed");
  info!("--- Job Panic Example End ---");
}
