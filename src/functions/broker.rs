//! Invocation broker: correlates remote function-call requests with their
//! results.
//!
//! The broker owns the outstanding-call table. Call identifiers are inserted
//! here when a request arrives and removed here when its result is sent;
//! nothing else touches the table. Each handler runs in its own task, so a
//! slow or failing handler never delays other invocations or the session
//! event flow, and results may complete out of request order.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::functions::{FunctionInvocation, FunctionRegistry};
use crate::protocol::ClientEvent;

/// A request that has been received but not yet answered.
struct OutstandingCall {
    function_name: String,
    received_at: Instant,
}

/// Dispatches invocation requests to registered handlers and guarantees
/// exactly one result per call identifier.
pub struct InvocationBroker {
    registry: Arc<FunctionRegistry>,
    outstanding: Arc<DashMap<String, OutstandingCall>>,
    outgoing: mpsc::Sender<ClientEvent>,
}

impl InvocationBroker {
    /// Create a broker over the given capability registry. Results are
    /// emitted on `outgoing`.
    pub fn new(registry: Arc<FunctionRegistry>, outgoing: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            registry,
            outstanding: Arc::new(DashMap::new()),
            outgoing,
        }
    }

    /// Handle one invocation request.
    ///
    /// Unknown function names get an immediate error result listing the
    /// available names; known ones run asynchronously in their own task.
    /// Never blocks the caller.
    pub fn dispatch(&self, invocation: FunctionInvocation) {
        let FunctionInvocation {
            call_id,
            function_name,
            arguments,
        } = invocation;

        if self.outstanding.contains_key(&call_id) {
            warn!(%call_id, "Duplicate invocation request for outstanding call, ignoring");
            return;
        }

        let Some(handler) = self.registry.get(&function_name) else {
            warn!(%call_id, %function_name, "Invocation for unregistered function");
            let result = json!({
                "status": "error",
                "error": format!("unknown function: {function_name}"),
                "available": self.registry.names(),
            });
            self.send_result(call_id, function_name, result);
            return;
        };

        self.outstanding.insert(
            call_id.clone(),
            OutstandingCall {
                function_name: function_name.clone(),
                received_at: Instant::now(),
            },
        );

        let outstanding = self.outstanding.clone();
        let outgoing = self.outgoing.clone();
        tokio::spawn(async move {
            // Run the handler in its own task so a panic is contained to this
            // call identifier.
            let outcome = match tokio::spawn(async move { handler.call(arguments).await }).await {
                Ok(result) => result,
                Err(e) => Err(format!("handler panicked: {e}")),
            };

            let Some((_, call)) = outstanding.remove(&call_id) else {
                // Teardown already cleared the table; the session is gone.
                debug!(%call_id, "Discarding handler result for call no longer outstanding");
                return;
            };

            let result = match outcome {
                Ok(value) => {
                    debug!(
                        %call_id,
                        elapsed_ms = call.received_at.elapsed().as_millis() as u64,
                        "Invocation completed"
                    );
                    json!({"status": "success", "result": value})
                }
                Err(reason) => {
                    warn!(%call_id, %reason, "Invocation handler failed");
                    json!({"status": "error", "error": reason})
                }
            };

            let event = ClientEvent::InvocationResult {
                call_id,
                function_name,
                result,
            };
            if outgoing.send(event).await.is_err() {
                debug!("Outbound channel closed, invocation result dropped");
            }
        });
    }

    /// Emit a result event without touching the outstanding table.
    fn send_result(&self, call_id: String, function_name: String, result: serde_json::Value) {
        let event = ClientEvent::InvocationResult {
            call_id,
            function_name,
            result,
        };
        let outgoing = self.outgoing.clone();
        tokio::spawn(async move {
            if outgoing.send(event).await.is_err() {
                debug!("Outbound channel closed, invocation result dropped");
            }
        });
    }

    /// Submit a result for an already-known call identifier.
    ///
    /// Results for identifiers with no outstanding invocation (duplicates,
    /// post-teardown stragglers) are discarded with a diagnostic and produce
    /// no outbound message.
    pub fn submit_result(&self, call_id: &str, result: serde_json::Value) {
        let Some((id, call)) = self.outstanding.remove(call_id) else {
            warn!(%call_id, "Result for unknown call identifier, discarding");
            return;
        };

        self.send_result(id, call.function_name, result);
    }

    /// Number of invocations awaiting a result.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Drop all outstanding invocations. Running handler tasks are not
    /// cancelled; their late results will find no table entry and be
    /// discarded.
    pub fn clear(&self) {
        let dropped = self.outstanding.len();
        if dropped > 0 {
            debug!(dropped, "Clearing outstanding invocations");
        }
        self.outstanding.clear();
    }
}
