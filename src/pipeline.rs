//! Pipeline: source → bounded queue → scrubber → transmitter
//!
//! The consumer loop never waits on delivery, so a slow ingest server cannot
//! back up into the source's forwarding path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{RecallError, Result};
use crate::scrubber::{EnvSecrets, Scrubber};
use crate::source::Source;
use crate::transmitter::{Payload, Transmitter};
use crate::types::Message;

/// Messages buffered between the source and the consumer loop
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// How long a cancelled source gets to stop its child before it is aborted
pub const SOURCE_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Literal values replaced with `<ENV:NAME>` after the pattern pass
    pub env_secrets: EnvSecrets,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            env_secrets: EnvSecrets::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Bridges one source to the transmitter
pub struct Pipeline {
    scrubber: Scrubber,
    env_secrets: EnvSecrets,
    transmitter: Arc<dyn Transmitter>,
    queue_capacity: usize,
}

impl Pipeline {
    /// Create a pipeline using the built-in scrub rules
    pub fn new(transmitter: Arc<dyn Transmitter>, config: PipelineConfig) -> Result<Self> {
        Ok(Self::with_scrubber(
            Scrubber::with_default_rules()?,
            transmitter,
            config,
        ))
    }

    /// Create a pipeline with a custom rule set
    pub fn with_scrubber(
        scrubber: Scrubber,
        transmitter: Arc<dyn Transmitter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            scrubber,
            env_secrets: config.env_secrets,
            transmitter,
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }

    /// Scrub one message into its wire payload
    pub fn process(&self, msg: &Message) -> Payload {
        let scrubbed = self.scrubber.scrub_all(msg.raw(), &self.env_secrets);
        Payload::from_message(msg, scrubbed)
    }

    fn dispatch(&self, msg: &Message) {
        tracing::trace!(
            direction = %msg.direction(),
            session_id = %msg.session_id(),
            "Dispatching message"
        );
        self.transmitter.send(self.process(msg));
    }

    /// Run `source` to completion, shipping everything it captures
    ///
    /// On normal completion every queued message is processed before this
    /// returns, and the source's own result is returned. On cancellation the
    /// queue is abandoned and the result is `Ok(())`.
    pub async fn run(&self, cancel: CancellationToken, source: Arc<dyn Source>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(self.queue_capacity);
        let source_name = source.name().to_string();

        let source_cancel = cancel.clone();
        let mut handle = tokio::spawn(async move { source.run(source_cancel, tx).await });
        tracing::info!(source = %source_name, "Pipeline started");

        let mut processed = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(source = %source_name, processed, "Pipeline cancelled");
                    drop(rx);
                    Self::await_cancelled_source(&source_name, handle).await;
                    return Ok(());
                }
                Some(msg) = rx.recv() => {
                    self.dispatch(&msg);
                    processed += 1;
                }
                joined = &mut handle => {
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) => Err(RecallError::Source(e.to_string())),
                    };
                    processed += self.drain(&mut rx, &cancel);
                    match &result {
                        Ok(()) => {
                            tracing::info!(source = %source_name, processed, "Source finished")
                        }
                        Err(e) => tracing::info!(
                            source = %source_name,
                            processed,
                            error = %e,
                            "Source ended with error"
                        ),
                    }
                    return result;
                }
            }
        }
    }

    /// Process whatever is still buffered, yielding to cancellation between messages
    fn drain(&self, rx: &mut mpsc::Receiver<Message>, cancel: &CancellationToken) -> usize {
        let mut drained = 0;
        while !cancel.is_cancelled() {
            let Ok(msg) = rx.try_recv() else {
                break;
            };
            self.dispatch(&msg);
            drained += 1;
        }
        drained
    }

    async fn await_cancelled_source(source_name: &str, mut handle: JoinHandle<Result<()>>) {
        match tokio::time::timeout(SOURCE_SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::debug!(source = %source_name, error = %e, "Source error during shutdown")
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    source = %source_name,
                    error = %e,
                    "Source task failed during shutdown"
                )
            }
            Err(_) => {
                tracing::warn!(source = %source_name, "Source did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}
