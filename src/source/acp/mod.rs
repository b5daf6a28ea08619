//! ACP source: a transparent stdio proxy in front of an agent process
//!
//! The proxy sits between an editor (client) and an agent speaking the Agent
//! Client Protocol over stdio:
//!
//! ```text
//! client stdin  ──► [upstream relay]   ──► agent stdin
//! client stdout ◄── [downstream relay] ◄── agent stdout
//! ```
//!
//! Both relays forward every byte unchanged and capture a copy of each line.
//! The agent's stderr is inherited so its diagnostics reach the terminal
//! untouched.

mod relay;
pub mod session;

pub use relay::DEFAULT_MAX_LINE_BYTES;
pub use session::extract_session_id;

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Source;
use crate::error::{RecallError, Result};
use crate::types::{Direction, Message};
use relay::Relay;
use session::SessionState;

/// Source name stamped on every ACP message
pub const ACP_SOURCE_NAME: &str = "acp";

/// Configuration for the ACP proxy
#[derive(Debug, Clone)]
pub struct AcpConfig {
    /// Agent program followed by its arguments
    pub agent_args: Vec<String>,
    /// Lines longer than this are forwarded but not captured
    pub max_line_bytes: usize,
}

impl AcpConfig {
    pub fn new(agent_args: Vec<String>) -> Self {
        Self {
            agent_args,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Override the capture limit (clamped to at least one byte)
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }
}

/// The client side of the proxy
///
/// Defaults to the process's own stdin/stdout. Tests and embedders can
/// substitute any async byte streams.
pub struct ClientIo {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ClientIo {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// The process's own stdin and stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl std::fmt::Debug for ClientIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIo").finish_non_exhaustive()
    }
}

/// Proxies an ACP agent and captures both directions of its traffic
pub struct AcpSource {
    config: AcpConfig,
    client: Mutex<Option<ClientIo>>,
}

impl AcpSource {
    /// Proxy between this process's stdio and the agent
    pub fn new(config: AcpConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    /// Proxy between the given client streams and the agent
    ///
    /// The streams are consumed by the first `run`; later runs fall back to
    /// process stdio.
    pub fn with_client_io(config: AcpConfig, client: ClientIo) -> Self {
        Self {
            config,
            client: Mutex::new(Some(client)),
        }
    }

    pub fn config(&self) -> &AcpConfig {
        &self.config
    }

    fn take_client_io(&self) -> ClientIo {
        let taken = match self.client.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        taken.unwrap_or_else(ClientIo::stdio)
    }

    fn spawn_agent(&self) -> Result<Child> {
        let Some((program, args)) = self.config.agent_args.split_first() else {
            return Err(RecallError::Config("no agent command specified".to_string()));
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecallError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            source = ACP_SOURCE_NAME,
            agent = %program,
            pid = ?child.id(),
            "Agent started"
        );
        Ok(child)
    }

    /// Wait for the agent to exit, or kill it if cancellation arrives first
    async fn wait_agent(&self, child: &mut Child, cancel: &CancellationToken) -> Result<()> {
        let status = if cancel.is_cancelled() {
            None
        } else {
            tokio::select! {
                status = child.wait() => Some(status?),
                _ = cancel.cancelled() => None,
            }
        };

        let Some(status) = status else {
            tracing::debug!(source = ACP_SOURCE_NAME, "Reaping cancelled agent");
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "Agent already gone");
            }
            return Ok(());
        };

        if status.success() {
            tracing::info!(source = ACP_SOURCE_NAME, "Agent exited");
            return Ok(());
        }

        Err(RecallError::AgentExit {
            status: status.to_string(),
            code: status.code(),
        })
    }
}

#[async_trait]
impl Source for AcpSource {
    fn name(&self) -> &str {
        ACP_SOURCE_NAME
    }

    async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Message>) -> Result<()> {
        let mut child = self.spawn_agent()?;

        let (Some(agent_stdin), Some(agent_stdout)) = (child.stdin.take(), child.stdout.take())
        else {
            return Err(RecallError::Spawn {
                program: self.config.agent_args[0].clone(),
                reason: "agent stdio pipes unavailable".to_string(),
            });
        };

        let client = self.take_client_io();
        let session = Arc::new(SessionState::default());
        // Fires when either relay ends, or when the caller cancels
        let stop = cancel.child_token();

        let relay = |direction| Relay {
            direction,
            source_name: ACP_SOURCE_NAME.to_string(),
            session: session.clone(),
            out: out.clone(),
            stop: stop.clone(),
            max_line_bytes: self.config.max_line_bytes,
        };

        let upstream = relay(Direction::Upstream).run(client.reader, agent_stdin);
        let downstream = relay(Direction::Downstream).run(agent_stdout, client.writer);
        let upstream = tokio::spawn(upstream);
        let downstream = tokio::spawn(downstream);

        // If this future is dropped mid-run the relays still wind down
        let _stop_relays = stop.clone().drop_guard();

        let relays = async { tokio::join!(upstream, downstream) };
        tokio::pin!(relays);
        let (up, down) = tokio::select! {
            joined = &mut relays => joined,
            _ = cancel.cancelled() => {
                // Kill now: a relay may be parked on a pipe the agent no longer drains
                tracing::info!(source = ACP_SOURCE_NAME, "Cancelled, stopping agent");
                if let Err(e) = child.start_kill() {
                    tracing::debug!(error = %e, "Agent already gone");
                }
                relays.await
            }
        };
        for (direction, joined) in [(Direction::Upstream, up), (Direction::Downstream, down)] {
            if let Err(e) = joined {
                tracing::error!(direction = %direction, error = %e, "Relay task failed");
            }
        }

        // Both relays are done: this is the last sender
        drop(out);

        self.wait_agent(&mut child, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AcpConfig::new(vec!["agent".to_string()]);
        assert_eq!(config.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
        assert_eq!(config.with_max_line_bytes(0).max_line_bytes, 1);
    }

    #[test]
    fn test_source_name() {
        let source = AcpSource::new(AcpConfig::new(vec!["agent".to_string()]));
        assert_eq!(source.name(), "acp");
    }

    #[tokio::test]
    async fn test_empty_agent_command_is_config_error() {
        let (client, _peer) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let source =
            AcpSource::with_client_io(AcpConfig::new(vec![]), ClientIo::new(reader, writer));
        let (tx, mut rx) = mpsc::channel(8);

        let err = source.run(CancellationToken::new(), tx).await.unwrap_err();
        assert!(matches!(err, RecallError::Config(_)));
        assert!(rx.recv().await.is_none(), "sender must be released on failure");
    }

    #[tokio::test]
    async fn test_missing_agent_binary_is_spawn_error() {
        let (client, _peer) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let source = AcpSource::with_client_io(
            AcpConfig::new(vec!["a3s-recall-no-such-agent-binary".to_string()]),
            ClientIo::new(reader, writer),
        );
        let (tx, mut rx) = mpsc::channel(8);

        let err = source.run(CancellationToken::new(), tx).await.unwrap_err();
        match err {
            RecallError::Spawn { program, .. } => {
                assert_eq!(program, "a3s-recall-no-such-agent-binary")
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
