use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("crawl of {0} interrupted")]
struct Interrupted(String);

/// Equality is by URL, so any `Crawl` with the same URL can be used to look it up.
#[derive(Debug, Clone)]
struct Crawl {
  url: String,
  stop: CancellationToken,
}

impl PartialEq for Crawl {
  fn eq(&self, other: &Self) -> bool {
    self.url == other.url
  }
}

impl Crawl {
  fn new(url: &str) -> Self {
    Self {
      url: url.to_string(),
      stop: CancellationToken::new(),
    }
  }
}

#[async_trait]
impl Job for Crawl {
  type Error = Interrupted;

  async fn execute(&self) -> Result<(), Interrupted> {
    for page in 1..=10 {
      tokio::select! {
        _ = self.stop.cancelled() => return Err(Interrupted(self.url.clone())),
        _ = tokio::time::sleep(Duration::from_millis(100)) => info!("{}: fetched page {}", self.url, page),
      }
    }
    Ok(())
  }

  async fn request_stop(&self) -> Result<(), Interrupted> {
    self.stop.cancel();
    Ok(())
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Cancellation Example ---");

  let pool = JobPool::new(PoolConfig::new("crawl_pool", 1, 0), PanicHandler::log(), Handle::current())
    .expect("valid config");

  let running = pool.add(Crawl::new("https://example.org"));
  let queued = pool.add(Crawl::new("https://example.net"));
  pool.run().expect("dispatch loop starts once");

  tokio::time::sleep(Duration::from_millis(350)).await;

  let queued_crawl = Crawl::new("https://example.net");
  info!("example.net pending? {}", pool.exist_pending(&queued_crawl));
  info!("Removing pending crawl: {}", pool.remove(&queued_crawl));
  info!("Removing running crawl: {}", pool.remove(&Crawl::new("https://example.org")));

  info!("example.net outcome: {:?}", queued.await_outcome().await);
  // Only now is the running crawl known to have actually stopped.
  info!("example.org outcome: {:?}", running.await_outcome().await);

  pool.close().await.expect("Pool close failed");
  info!("--- Cancellation Example End ---");
}
