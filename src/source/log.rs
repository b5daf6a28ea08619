//! Log source: captures lines from a file or any async reader
//!
//! Nothing is forwarded anywhere; lines are only captured. Every message
//! has direction `log` and an empty session id.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Source;
use crate::error::{RecallError, Result};
use crate::types::{Direction, Message};

/// Source name stamped on every log message
pub const LOG_SOURCE_NAME: &str = "log";

enum LogInput {
    File(PathBuf),
    Reader(Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>),
}

/// Reads newline-delimited text until EOF or cancellation
pub struct LogSource {
    input: LogInput,
}

impl LogSource {
    /// Read lines from a file, opened when the source runs
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            input: LogInput::File(path.into()),
        }
    }

    /// Read lines from an arbitrary stream; it is consumed by the first run
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            input: LogInput::Reader(Mutex::new(Some(Box::new(reader)))),
        }
    }

    async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.input {
            LogInput::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    RecallError::Io(std::io::Error::new(
                        e.kind(),
                        format!("{}: {e}", path.display()),
                    ))
                })?;
                tracing::info!(
                    source = LOG_SOURCE_NAME,
                    path = %path.display(),
                    "Reading log file"
                );
                Ok(Box::new(file))
            }
            LogInput::Reader(slot) => {
                let taken = match slot.lock() {
                    Ok(mut guard) => guard.take(),
                    Err(poisoned) => poisoned.into_inner().take(),
                };
                taken.ok_or_else(|| RecallError::Config("log reader already consumed".to_string()))
            }
        }
    }
}

#[async_trait]
impl Source for LogSource {
    fn name(&self) -> &str {
        LOG_SOURCE_NAME
    }

    async fn run(&self, cancel: CancellationToken, out: mpsc::Sender<Message>) -> Result<()> {
        let mut reader = BufReader::new(self.open().await?);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(source = LOG_SOURCE_NAME, error = %e, "Read error, stopping");
                    break;
                }
            }

            let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            let msg = Message::capture(
                String::from_utf8_lossy(line).into_owned(),
                Direction::Log,
                "",
                LOG_SOURCE_NAME,
            );
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = out.send(msg) => sent,
            };
            if sent.is_err() {
                tracing::debug!(source = LOG_SOURCE_NAME, "Capture queue closed");
                break;
            }
        }

        Ok(())
    }
}
