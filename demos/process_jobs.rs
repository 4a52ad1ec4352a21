//! Runs external commands through the pool. The job kills its child process when a
//! stop is requested.

use job_orchestra::{async_trait, Job, JobPool, PanicHandler, PoolConfig};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum ProcessError {
  #[error("failed to spawn {0}: {1}")]
  Spawn(String, std::io::Error),
  #[error("{0} exited with {1}")]
  ExitStatus(String, std::process::ExitStatus),
  #[error("{0} was killed on request")]
  Killed(String),
  #[error("io error while supervising {0}: {1}")]
  Io(String, std::io::Error),
}

#[derive(Debug, Clone)]
struct ProcessJob {
  program: String,
  args: Vec<String>,
  stop: CancellationToken,
}

impl PartialEq for ProcessJob {
  fn eq(&self, other: &Self) -> bool {
    self.program == other.program && self.args == other.args
  }
}

impl ProcessJob {
  fn new(program: &str, args: &[&str]) -> Self {
    Self {
      program: program.to_string(),
      args: args.iter().map(|a| a.to_string()).collect(),
      stop: CancellationToken::new(),
    }
  }

  fn command_line(&self) -> String {
    format!("{} {}", self.program, self.args.join(" "))
  }
}

#[async_trait]
impl Job for ProcessJob {
  type Error = ProcessError;

  async fn execute(&self) -> Result<(), ProcessError> {
    let command_line = self.command_line();
    let mut child = Command::new(&self.program)
      .args(&self.args)
      .stdout(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| ProcessError::Spawn(command_line.clone(), e))?;
    info!(pid = ?child.id(), "Started `{}`", command_line);

    if let Some(stdout) = child.stdout.take() {
      let label = command_line.clone();
      tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
          info!("[{}] {}", label, line);
        }
      });
    }

    tokio::select! {
      status = child.wait() => {
        let status = status.map_err(|e| ProcessError::Io(command_line.clone(), e))?;
        if status.success() {
          Ok(())
        } else {
          Err(ProcessError::ExitStatus(command_line, status))
        }
      }
      _ = self.stop.cancelled() => {
        child.kill().await.map_err(|e| ProcessError::Io(command_line.clone(), e))?;
        Err(ProcessError::Killed(command_line))
      }
    }
  }

  async fn request_stop(&self) -> Result<(), ProcessError> {
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
  info!("--- Process Jobs Example ---");

  let pool = JobPool::new(PoolConfig::new("process_pool", 2, 0), PanicHandler::log(), Handle::current())
    .expect("valid config");

  let echo = pool.add(ProcessJob::new("echo", &["hello from a child process"]));
  let long_sleep = pool.add(ProcessJob::new("sleep", &["30"]));
  let failing = pool.add(ProcessJob::new("sh", &["-c", "exit 3"]));
  pool.run().expect("dispatch loop starts once");

  tokio::time::sleep(Duration::from_millis(300)).await;
  info!("Stopping the long sleep: {}", pool.remove(&ProcessJob::new("sleep", &["30"])));

  info!("echo -> {:?}", echo.await_outcome().await);
  info!("sleep -> {:?}", long_sleep.await_outcome().await);
  info!("sh -> {:?}", failing.await_outcome().await);

  pool.close().await.expect("Pool close failed");
  info!("--- Process Jobs Example End ---");
}
