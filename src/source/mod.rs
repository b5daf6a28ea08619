//! Source trait: the core abstraction for anything that produces captured traffic
//!
//! A source knows how to observe some environment (a proxied agent process,
//! a log file) and emit [`Message`]s. It knows nothing about what happens to
//! them afterwards; scrubbing and delivery live in the pipeline.

use crate::error::Result;
use crate::types::Message;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod acp;
pub mod log;

pub use acp::{AcpConfig, AcpSource, ClientIo};
pub use log::LogSource;

/// Core trait for message producers
///
/// Contract for implementations:
///
/// - `run` blocks until the underlying activity ends or `cancel` fires.
/// - `out` is owned by the source. Dropping every sender is the only
///   "no more messages" signal, and it happens exactly once when `run`
///   returns, on success and failure paths alike. Consumers never close it.
/// - Errors are reserved for conditions that kept the activity from
///   starting or for abnormal termination of the observed process.
///   Requested termination (cancellation) returns `Ok(())`.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier included in every message (e.g. "acp", "log")
    fn name(&self) -> &str;

    /// Run until done or cancelled, emitting messages into `out`
    async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Message>) -> Result<()>;
}
