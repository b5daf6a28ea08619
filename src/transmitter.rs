//! Delivery of scrubbed messages to the ingest endpoint
//!
//! `send` never blocks and never reports failure to the caller. Delivery is
//! best-effort: one attempt, no retry, failures end up in the log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::{RecallError, Result};
use crate::types::{Direction, Message};

/// Per-request timeout for HTTP delivery
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire body posted to the ingest endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub direction: Direction,
    /// Scrubbed text, never the original
    pub raw: String,
    pub session_id: String,
    pub source_name: String,
    /// RFC 3339 UTC with nanoseconds, e.g. `2024-05-01T12:00:00.123456789Z`
    pub captured_at: String,
}

impl Payload {
    /// Build the wire body for `msg`, carrying `scrubbed` in place of its raw text
    pub fn from_message(msg: &Message, scrubbed: String) -> Self {
        Self {
            direction: msg.direction(),
            raw: scrubbed,
            session_id: msg.session_id().to_string(),
            source_name: msg.source_name().to_string(),
            captured_at: msg
                .captured_at()
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
    }
}

/// Fire-and-forget delivery
pub trait Transmitter: Send + Sync {
    /// Hand off a payload; returns immediately
    fn send(&self, payload: Payload);
}

struct HttpInner {
    client: reqwest::Client,
    url: String,
}

impl HttpInner {
    async fn deliver(&self, payload: &Payload) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| RecallError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecallError::Delivery(format!(
                "ingest server returned {status}"
            )));
        }
        Ok(())
    }
}

/// POSTs each payload as JSON from its own detached task
#[derive(Clone)]
pub struct HttpTransmitter {
    inner: Arc<HttpInner>,
}

impl HttpTransmitter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecallError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                url: url.into(),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// One delivery attempt, awaited
    pub async fn deliver(&self, payload: &Payload) -> Result<()> {
        self.inner.deliver(payload).await
    }
}

impl std::fmt::Debug for HttpTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransmitter")
            .field("url", &self.inner.url)
            .finish()
    }
}

impl Transmitter for HttpTransmitter {
    fn send(&self, payload: Payload) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, dropping payload");
            return;
        };

        let inner = self.inner.clone();
        runtime.spawn(async move {
            if let Err(e) = inner.deliver(&payload).await {
                tracing::warn!(
                    error = %e,
                    direction = %payload.direction,
                    session_id = %payload.session_id,
                    "Dropping undelivered message"
                );
            }
        });
    }
}

/// Records payloads in memory
///
/// Clones share the same buffer, so a test can keep a handle while the
/// pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransmitter {
    payloads: Arc<Mutex<Vec<Payload>>>,
}

impl MemoryTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far, in order
    pub fn payloads(&self) -> Vec<Payload> {
        match self.payloads.lock() {
            Ok(payloads) => payloads.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.payloads.lock() {
            Ok(payloads) => payloads.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transmitter for MemoryTransmitter {
    fn send(&self, payload: Payload) {
        let mut payloads = match self.payloads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        payloads.push(payload);
    }
}
