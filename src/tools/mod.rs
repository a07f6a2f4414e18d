//! Tool invocation types and dispatch.
//!
//! The service issues tool calls mid-conversation; the host application
//! supplies a [`ToolHandler`] that resolves them. A handler either returns a
//! concrete value or explicitly defers, in which case the host completes the
//! call later through the session's deferred-response entry point.

pub mod catalog;
pub mod dispatcher;

pub use catalog::{ToolDeclaration, ToolName, declarations};
pub use dispatcher::ToolDispatcher;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A tool invocation requested by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique id for this call; every response correlates through it.
    pub id: String,
    /// Tool name from the advertised catalog.
    pub name: String,
    /// Parsed argument mapping.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallRequest {
    /// Look up a string argument.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(serde_json::Value::as_str)
    }

    /// Look up a numeric argument.
    pub fn f64_arg(&self, key: &str) -> Option<f64> {
        self.args.get(key).and_then(serde_json::Value::as_f64)
    }
}

/// Correlates a deferred call to its not-yet-available result.
///
/// Constructed by the host's handler when it defers a call, held by the host
/// until the out-of-band decision arrives, then consumed by
/// `VoiceSession::send_deferred_response`. Consuming by value means a token
/// completes at most once.
#[derive(Debug)]
pub struct DeferredToken {
    id: String,
    name: String,
}

impl DeferredToken {
    /// Capture the correlation identity of a call being deferred.
    pub fn for_call(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
        }
    }

    /// The call id this token completes.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The tool name the call was made against.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, String) {
        (self.id, self.name)
    }
}

/// Result of a tool handler invocation.
///
/// The "respond later" control signal is an explicit variant, never an absent
/// value: deferring means the dispatcher sends nothing and completion
/// responsibility moves to the host.
#[derive(Debug)]
pub enum ToolOutcome {
    /// A concrete result; the dispatcher responds immediately.
    Immediate(serde_json::Value),
    /// No response yet; the host completes the call out of band.
    Deferred,
}

/// Host-supplied tool handler.
///
/// Handlers may suspend indefinitely (network calls, human confirmation)
/// without blocking the session loop or other pending calls. A returned error
/// is converted into a textual failure response for the same call id.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn on_tool_call(&self, call: &ToolCallRequest) -> Result<ToolOutcome>;
}
