//! Correlates inbound tool calls with handler invocations and responses.
//!
//! Each call moves Received → Resolved, or Received → Deferred → Resolved.
//! Calls in one batch are dispatched independently and may resolve out of
//! order. The dispatcher enforces at most one response per call id, including
//! across deferred completions and handler failures.

use crate::session::events::SessionNotice;
use crate::tools::{ToolCallRequest, ToolHandler, ToolOutcome};
use crate::transport::messages::ClientMessage;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-session dispatch bookkeeping.
#[derive(Default)]
struct DispatchState {
    /// Ids of every call received this session. Duplicate requests are ignored.
    seen: HashSet<String>,
    /// Ids that already got their single response.
    responded: HashSet<String>,
    /// Ids awaiting an out-of-band completion from the host.
    deferred: HashSet<String>,
}

struct DispatcherInner {
    handler: Arc<dyn ToolHandler>,
    outbound: mpsc::Sender<ClientMessage>,
    notices: Option<broadcast::Sender<SessionNotice>>,
    state: Mutex<DispatchState>,
    cancel: CancellationToken,
}

/// Tool invocation dispatcher. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ToolDispatcher {
    inner: Arc<DispatcherInner>,
}

impl ToolDispatcher {
    pub fn new(
        handler: Arc<dyn ToolHandler>,
        outbound: mpsc::Sender<ClientMessage>,
        notices: Option<broadcast::Sender<SessionNotice>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                handler,
                outbound,
                notices,
                state: Mutex::new(DispatchState::default()),
                cancel,
            }),
        }
    }

    /// Dispatch one call to the handler on its own task.
    ///
    /// Returns immediately; the handler may suspend indefinitely without
    /// blocking the session loop or other pending calls.
    pub fn dispatch(&self, call: ToolCallRequest) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.seen.insert(call.id.clone()) {
                warn!("duplicate tool call id {}, ignoring", call.id);
                return;
            }
        }

        self.notify(SessionNotice::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args_json: serde_json::Value::Object(call.args.clone()).to_string(),
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = inner.cancel.cancelled() => {
                    debug!("session ended before tool call {} resolved", call.id);
                    return;
                }
                outcome = inner.handler.on_tool_call(&call) => outcome,
            };

            match outcome {
                Ok(ToolOutcome::Immediate(result)) => {
                    respond(&inner, &call.id, &call.name, result, true).await;
                }
                Ok(ToolOutcome::Deferred) => {
                    debug!("tool call {} deferred by handler", call.id);
                    let mut state = inner
                        .state
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    state.deferred.insert(call.id.clone());
                }
                Err(e) => {
                    // A handler failure must never leave a call silently stuck:
                    // send a best-effort textual failure for the same id.
                    warn!("tool handler failed for {}: {e}", call.name);
                    let result = serde_json::Value::String(format!("Error: {e}"));
                    respond(&inner, &call.id, &call.name, result, false).await;
                }
            }
        });
    }

    /// Complete a previously deferred call.
    ///
    /// Unknown ids and already-answered ids are dropped, preserving the
    /// one-response-per-id invariant.
    pub async fn complete_deferred(&self, id: &str, name: &str, result: serde_json::Value) {
        {
            let state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.seen.contains(id) {
                warn!("deferred completion for unknown call id {id}, dropping");
                return;
            }
        }
        respond(&self.inner, id, name, result, true).await;
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(tx) = &self.inner.notices {
            let _ = tx.send(notice);
        }
    }
}

/// Send the single correlated response for a call, if it has not been sent.
async fn respond(
    inner: &DispatcherInner,
    id: &str,
    name: &str,
    result: serde_json::Value,
    success: bool,
) {
    {
        let mut state = inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.responded.insert(id.to_owned()) {
            warn!("tool call {id} already answered, dropping second response");
            return;
        }
        state.deferred.remove(id);
    }

    if let Some(tx) = &inner.notices {
        let _ = tx.send(SessionNotice::ToolResult {
            id: id.to_owned(),
            name: name.to_owned(),
            success,
        });
    }

    let msg = ClientMessage::ToolCallResponse {
        id: id.to_owned(),
        name: name.to_owned(),
        result,
    };
    // After teardown the outbound receiver is gone; the response is dropped
    // rather than transmitted to a dead transport.
    if inner.outbound.send(msg).await.is_err() {
        debug!("transport closed, dropping tool response for {id}");
    }
}
