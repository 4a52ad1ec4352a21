//! A Tokio-based bounded job pool: FIFO admission with drop-oldest backpressure,
//! a runtime-adjustable worker limit, best-effort cancellation and per-job panic isolation.

mod config;
mod error;
mod handle;
mod job;
mod notifier;
mod panic;
mod pool;
mod queue;

pub use config::PoolConfig;
pub use error::PoolError;
pub use handle::JobHandle;
pub use job::{Job, JobOutcome, JobStatus};
pub use notifier::{PoolEvent, PoolEventKind};
pub use panic::{panic_message, PanicHandler, PanicInfo};
pub use pool::JobPool;

pub use async_trait::async_trait;
