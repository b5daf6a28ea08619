//! # a3s-recall
//!
//! Transparent capture of agent protocol traffic, scrubbed before it leaves
//! the machine.
//!
//! ## Overview
//!
//! `a3s-recall` sits between an editor and an ACP agent on stdio. Every line
//! is forwarded unchanged in both directions; a copy is tagged with its
//! direction and session, run through a redaction rule table, and posted to
//! an ingest server without ever slowing down the proxied conversation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use a3s_recall::{AcpConfig, AcpSource, HttpTransmitter, Pipeline, PipelineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> a3s_recall::Result<()> {
//! let transmitter = HttpTransmitter::new(
//!     "http://localhost:8080/ingest",
//!     a3s_recall::transmitter::DEFAULT_TIMEOUT,
//! )?;
//! let pipeline = Pipeline::new(Arc::new(transmitter), PipelineConfig::default())?;
//!
//! let source = AcpSource::new(AcpConfig::new(vec!["claude-code-acp".to_string()]));
//! pipeline.run(CancellationToken::new(), Arc::new(source)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Sources
//!
//! - **acp**: stdio proxy in front of an agent process, both directions
//! - **log**: lines from a file or stream, capture only
//!
//! ## Architecture
//!
//! - **Source** trait: produces [`Message`]s and owns the output channel
//! - **Scrubber**: ordered regex rules plus literal env-secret replacement
//! - **Pipeline**: bounded queue, scrub, non-blocking hand-off
//! - **Transmitter** trait: fire-and-forget delivery (HTTP or in-memory)

pub mod config;
pub mod error;
pub mod pipeline;
pub mod scrubber;
pub mod source;
pub mod transmitter;
pub mod types;

// Re-export core types
pub use config::{Cli, Config, SourceConfig, SourceKind};
pub use error::{RecallError, Result};
pub use pipeline::{Pipeline, PipelineConfig};
pub use scrubber::{default_scrub_rules, EnvSecrets, ScrubRule, Scrubber};
pub use source::{AcpConfig, AcpSource, ClientIo, LogSource, Source};
pub use transmitter::{HttpTransmitter, MemoryTransmitter, Payload, Transmitter};
pub use types::{Direction, Message};
