//! Session tracking for ACP traffic
//!
//! ACP speaks JSON-RPC 2.0 over stdio. A `session/new` response carries the
//! identifier that groups every later line into one conversation:
//!
//! ```text
//! {"jsonrpc":"2.0","id":2,"result":{"sessionId":"abc123", ...}}
//! ```
//!
//! Detection is a read-only peek; the line itself is never touched.

use std::sync::RwLock;

use serde::Deserialize;

/// Minimal view of a JSON-RPC envelope, just enough to spot a session start
#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    method: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Extract the session id from a `session/new` response
///
/// Returns `None` for requests, notifications, other responses, non-JSON
/// and malformed lines. Never fails.
pub fn extract_session_id(line: &str) -> Option<String> {
    // Cheap reject before paying for a parse of large payloads
    if !line.contains("\"sessionId\"") {
        return None;
    }

    let envelope: RpcEnvelope = serde_json::from_str(line).ok()?;
    if envelope.method.is_some() {
        return None;
    }

    let id = envelope.result?.get("sessionId")?.as_str()?.to_string();
    if id.is_empty() {
        return None;
    }
    Some(id)
}

/// Current session id shared by the two relay tasks of one source run
///
/// Starts empty and holds the last id seen; there is no session-end signal
/// in ACP, so it is never cleared.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    current: RwLock<String>,
}

impl SessionState {
    pub(crate) fn get(&self) -> String {
        match self.current.read() {
            Ok(id) => id.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set(&self, id: &str) {
        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        current.clear();
        current.push_str(id);
    }
}
