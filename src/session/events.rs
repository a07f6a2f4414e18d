//! Notices broadcast by the session for the host UI.
//!
//! Intentionally lightweight so the demux loop can emit events without
//! blocking audio paths; slow subscribers lag, they never stall the session.

use crate::session::state::SessionState;
use crate::transcript::TranscriptEvent;

/// Events describing what the session is doing right now.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// Lifecycle transition.
    State(SessionState),
    /// Transcript fragment with turn attribution.
    Transcript(TranscriptEvent),
    /// A tool call arrived and was handed to the dispatcher.
    ToolCall {
        id: String,
        name: String,
        args_json: String,
    },
    /// A tool call got its response (immediate, deferred, or failure text).
    ToolResult {
        id: String,
        name: String,
        success: bool,
    },
    /// The transport failed or was closed by the peer; teardown follows.
    TransportFailure { message: Option<String> },
}
