//! Session lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of one voice session.
///
/// `Idle` is both the starting and the terminal state: a stopped or failed
/// session returns to `Idle` and a new one may be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session; `start()` is accepted.
    Idle,
    /// Devices acquired, transport opening.
    Connecting,
    /// Streaming conversation in progress.
    Active,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
        };
        f.write_str(name)
    }
}
