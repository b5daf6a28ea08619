//! Core capture types for the a3s-recall system
//!
//! `Message` is the universal record passed from every source to the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way a captured line was travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client → agent
    Upstream,
    /// Agent → client
    Downstream,
    /// Unidirectional, source-specific (e.g. file-backed sources)
    Log,
}

impl Direction {
    /// Wire name of the direction
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
            Self::Log => "log",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured line of traffic
///
/// A message is immutable once built. `raw` is exactly what the source
/// observed; scrubbing produces new text and never touches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: String,
    direction: Direction,
    session_id: String,
    source_name: String,
    captured_at: DateTime<Utc>,
}

impl Message {
    /// Build a message with an explicit capture time
    pub fn new(
        raw: impl Into<String>,
        direction: Direction,
        session_id: impl Into<String>,
        source_name: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            raw: raw.into(),
            direction,
            session_id: session_id.into(),
            source_name: source_name.into(),
            captured_at,
        }
    }

    /// Build a message stamped with the current time
    ///
    /// Sources call this at the moment a line is observed.
    pub fn capture(
        raw: impl Into<String>,
        direction: Direction,
        session_id: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self::new(raw, direction, session_id, source_name, Utc::now())
    }

    /// The unmodified captured text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Session the line belonged to at capture time (may be empty)
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}
