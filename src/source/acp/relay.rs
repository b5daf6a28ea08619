//! One direction of the stdio tee
//!
//! A relay reads newline-delimited frames from one side, captures each as a
//! [`Message`], then writes the original bytes to the other side unchanged.

use std::io;
use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::session::{extract_session_id, SessionState};
use crate::types::{Direction, Message};

/// Largest line captured (8 MiB, terminator not counted); longer lines are
/// forwarded but not captured
///
/// ACP lines can carry whole files the agent read, so the ceiling is generous.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Outcome of one bounded line read
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineRead {
    /// Stream closed with nothing pending
    Eof,
    /// A full line (terminator included, if there was one) is in the buffer
    Complete,
    /// The line has more than `max_bytes` of content; its head is in the buffer
    Oversized,
}

/// Read one line into `buf`, allowing `max_bytes` of content plus the `\n`
pub(crate) async fn read_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_bytes.saturating_add(1);
    let n = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', buf)
        .await?;

    if n == 0 {
        return Ok(LineRead::Eof);
    }
    // Short reads without a newline mean EOF hit mid-line: still a line
    if buf.last() == Some(&b'\n') || n < limit {
        return Ok(LineRead::Complete);
    }
    Ok(LineRead::Oversized)
}

/// Stream the rest of the current line straight through, up to and including its newline
async fn pass_through_rest<R, W>(reader: &mut R, writer: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                writer.write_all(&available[..=pos]).await?;
                reader.consume(pos + 1);
                break;
            }
            None => {
                let len = available.len();
                writer.write_all(available).await?;
                reader.consume(len);
            }
        }
    }
    writer.flush().await
}

/// Write a line read by [`read_line`], streaming the remainder when it was oversized
async fn forward<R, W>(
    reader: &mut R,
    writer: &mut W,
    head: &[u8],
    oversized: bool,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(head).await?;
    if oversized {
        pass_through_rest(reader, writer).await
    } else {
        writer.flush().await
    }
}

/// Drop a trailing `\n` or `\r\n`
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

enum Capture {
    Sent,
    /// Stop fired while waiting for queue space
    Stopped,
    /// Nobody is consuming any more
    Closed,
}

/// One direction of the tee
pub(crate) struct Relay {
    pub(crate) direction: Direction,
    pub(crate) source_name: String,
    pub(crate) session: Arc<SessionState>,
    pub(crate) out: mpsc::Sender<Message>,
    /// Shared between both relays; whichever finishes first cancels it
    pub(crate) stop: CancellationToken,
    pub(crate) max_line_bytes: usize,
}

impl Relay {
    /// Pump lines from `reader` to `writer` until EOF, error, or stop
    ///
    /// Read and write errors end this direction only; they are logged, not
    /// returned. On exit the stop token fires so the opposite relay ends too.
    pub(crate) async fn run<R, W>(self, reader: R, mut writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let _stop_on_exit = self.stop.clone().drop_guard();
        let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, reader);
        let mut buf = Vec::new();
        let mut capturing = true;

        loop {
            buf.clear();

            let read = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    tracing::debug!(direction = %self.direction, "Relay stopping");
                    break;
                }
                read = read_line(&mut reader, &mut buf, self.max_line_bytes) => read,
            };

            let oversized = match read {
                Ok(LineRead::Eof) => {
                    tracing::debug!(direction = %self.direction, "Stream closed");
                    break;
                }
                Ok(LineRead::Complete) => false,
                Ok(LineRead::Oversized) => true,
                Err(e) => {
                    tracing::warn!(
                        direction = %self.direction,
                        error = %e,
                        "Read error, closing stream"
                    );
                    break;
                }
            };

            if oversized {
                tracing::warn!(
                    direction = %self.direction,
                    max_bytes = self.max_line_bytes,
                    "Line exceeds capture limit, forwarding without capture"
                );
            } else if capturing {
                match self.capture(&buf).await {
                    Capture::Sent => {}
                    Capture::Stopped => break,
                    Capture::Closed => {
                        tracing::debug!(
                            direction = %self.direction,
                            "Capture queue closed, forwarding only"
                        );
                        capturing = false;
                    }
                }
            }

            // A peer that stops reading must not pin this relay past a stop
            let forwarded = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    tracing::debug!(direction = %self.direction, "Relay stopping mid-write");
                    break;
                }
                forwarded = forward(&mut reader, &mut writer, &buf, oversized) => forwarded,
            };

            if let Err(e) = forwarded {
                tracing::warn!(
                    direction = %self.direction,
                    error = %e,
                    "Forwarding failed, closing stream"
                );
                break;
            }
        }
    }

    async fn capture(&self, line: &[u8]) -> Capture {
        let text = String::from_utf8_lossy(strip_terminator(line));

        if self.direction == Direction::Downstream {
            if let Some(id) = extract_session_id(&text) {
                self.session.set(&id);
                tracing::info!(source = %self.source_name, session_id = %id, "Session started");
            }
        }

        let msg = Message::capture(
            text.into_owned(),
            self.direction,
            self.session.get(),
            self.source_name.clone(),
        );
        tracing::trace!(direction = %self.direction, bytes = line.len(), "Captured line");

        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Capture::Stopped,
            sent = self.out.send(msg) => match sent {
                Ok(()) => Capture::Sent,
                Err(_) => Capture::Closed,
            },
        }
    }
}
