//! Host side of the bridge protocol.
//!
//! Requests travel to the instance thread over a channel and responses come
//! back on another. Each request carries a correlation id; the caller parks
//! on a oneshot stored in the pending table under that id until the
//! dispatcher task hands it the matching response or the call times out.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};

use playgate_core::{BridgeErrorKind, BridgeRequest, BridgeResponse, Error, Operation, Result};
use playgate_governance::track_bridge_call;

/// Messages into the instance thread.
#[derive(Debug)]
pub(crate) enum Inbound {
    Call(BridgeRequest),
    Shutdown,
}

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeResponse>>>>;

/// Correlating client for one instance.
pub struct BridgeClient {
    instance_id: String,
    requests: std_mpsc::Sender<Inbound>,
    pending: PendingTable,
    next_id: AtomicU64,
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl BridgeClient {
    /// Create the client and spawn its response dispatcher.
    ///
    /// `on_exit` runs once the instance thread has dropped its response
    /// channel, after any callers still waiting were failed.
    pub(crate) fn spawn(
        instance_id: String,
        requests: std_mpsc::Sender<Inbound>,
        responses: mpsc::UnboundedReceiver<BridgeResponse>,
        timeout: Duration,
        on_exit: impl FnOnce() + Send + 'static,
    ) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(dispatch(
            instance_id.clone(),
            responses,
            pending.clone(),
            closed.clone(),
            on_exit,
        ));

        Self {
            instance_id,
            requests,
            pending,
            next_id: AtomicU64::new(0),
            timeout,
            closed,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Never fails at the transport level: timeouts, cancellation and a
    /// dead instance all come back as failure responses.
    pub async fn call(&self, operation: Operation, args: Value) -> BridgeResponse {
        let correlation_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();

        if self.closed.load(Ordering::Acquire) {
            return self.finish(
                operation,
                started,
                BridgeResponse::failure(
                    correlation_id,
                    BridgeErrorKind::InstanceGone,
                    "instance is not running",
                ),
            );
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation_id, tx);

        let request = BridgeRequest {
            correlation_id,
            operation,
            args,
        };
        if self.requests.send(Inbound::Call(request)).is_err() {
            self.pending.lock().await.remove(&correlation_id);
            return self.finish(
                operation,
                started,
                BridgeResponse::failure(
                    correlation_id,
                    BridgeErrorKind::InstanceGone,
                    "instance request channel closed",
                ),
            );
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => BridgeResponse::failure(
                correlation_id,
                BridgeErrorKind::InstanceGone,
                "response channel dropped",
            ),
            Err(_) => {
                self.pending.lock().await.remove(&correlation_id);
                tracing::warn!(
                    instance_id = %self.instance_id,
                    operation = %operation,
                    correlation_id,
                    "Bridge call timed out after {:?}",
                    self.timeout
                );
                BridgeResponse::failure(
                    correlation_id,
                    BridgeErrorKind::Timeout,
                    format!("no response within {:?}", self.timeout),
                )
            }
        };
        self.finish(operation, started, response)
    }

    /// Call and unwrap the result, mapping failures to [`Error::RuntimeFault`].
    pub async fn invoke(&self, operation: Operation, args: Value) -> Result<Value> {
        into_result(operation, self.call(operation, args).await)
    }

    /// Number of calls waiting for a response.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting calls, fail every waiting caller with `kind` and ask
    /// the instance thread to exit. Returns how many calls were failed.
    pub(crate) async fn close(&self, kind: BridgeErrorKind) -> usize {
        self.closed.store(true, Ordering::Release);
        let _ = self.requests.send(Inbound::Shutdown);
        fail_pending(&self.pending, kind, "instance destroyed").await
    }

    fn finish(
        &self,
        operation: Operation,
        started: Instant,
        response: BridgeResponse,
    ) -> BridgeResponse {
        let outcome = response
            .error_kind
            .map(|k| k.as_str())
            .unwrap_or("ok");
        track_bridge_call(operation.name(), outcome, started.elapsed().as_secs_f64());
        tracing::debug!(
            instance_id = %self.instance_id,
            operation = %operation,
            correlation_id = response.correlation_id,
            outcome,
            "Bridge call completed"
        );
        response
    }
}

/// Map a response to the typed result of an operation.
pub fn into_result(operation: Operation, response: BridgeResponse) -> Result<Value> {
    if response.ok {
        Ok(response.result.unwrap_or(Value::Null))
    } else {
        Err(Error::runtime_fault(
            operation,
            response
                .error_kind
                .unwrap_or(BridgeErrorKind::InvalidResult),
            response.detail.unwrap_or_default(),
        ))
    }
}

async fn fail_pending(pending: &PendingTable, kind: BridgeErrorKind, detail: &str) -> usize {
    let waiters: Vec<_> = pending.lock().await.drain().collect();
    let count = waiters.len();
    for (correlation_id, tx) in waiters {
        let _ = tx.send(BridgeResponse::failure(correlation_id, kind, detail));
    }
    count
}

async fn dispatch(
    instance_id: String,
    mut responses: mpsc::UnboundedReceiver<BridgeResponse>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    on_exit: impl FnOnce(),
) {
    while let Some(response) = responses.recv().await {
        let waiter = pending.lock().await.remove(&response.correlation_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::debug!(
                instance_id = %instance_id,
                correlation_id = response.correlation_id,
                "Dropping response with no waiting caller"
            ),
        }
    }

    closed.store(true, Ordering::Release);
    let failed = fail_pending(&pending, BridgeErrorKind::InstanceGone, "instance exited").await;
    if failed > 0 {
        tracing::warn!(instance_id = %instance_id, failed, "Instance exited with calls in flight");
    }
    on_exit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Echo thread answering every call with its args, except `readState`
    /// which is never answered.
    fn echo_instance() -> (std_mpsc::Sender<Inbound>, mpsc::UnboundedReceiver<BridgeResponse>) {
        let (req_tx, req_rx) = std_mpsc::channel::<Inbound>();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            while let Ok(Inbound::Call(req)) = req_rx.recv() {
                if req.operation == Operation::ReadState {
                    continue;
                }
                let _ = resp_tx.send(BridgeResponse::success(req.correlation_id, req.args));
            }
        });
        (req_tx, resp_rx)
    }

    #[tokio::test]
    async fn test_responses_are_correlated() {
        let (req_tx, resp_rx) = echo_instance();
        let client = BridgeClient::spawn(
            "i-1".into(),
            req_tx,
            resp_rx,
            Duration::from_secs(2),
            || {},
        );

        let (a, b) = tokio::join!(
            client.invoke(Operation::ReadMeta, json!({"n": 1})),
            client.invoke(Operation::ReadMeta, json!({"n": 2})),
        );
        assert_eq!(a.unwrap(), json!({"n": 1}));
        assert_eq!(b.unwrap(), json!({"n": 2}));
        assert_eq!(client.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_runtime_fault() {
        let (req_tx, resp_rx) = echo_instance();
        let client = BridgeClient::spawn(
            "i-2".into(),
            req_tx,
            resp_rx,
            Duration::from_millis(50),
            || {},
        );

        let err = client
            .invoke(Operation::ReadState, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RuntimeFault {
                operation: Operation::ReadState,
                kind: BridgeErrorKind::Timeout,
                ..
            }
        ));
        assert_eq!(client.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_calls() {
        let (req_tx, resp_rx) = echo_instance();
        let client = Arc::new(BridgeClient::spawn(
            "i-3".into(),
            req_tx,
            resp_rx,
            Duration::from_secs(5),
            || {},
        ));

        let waiting = {
            let client = client.clone();
            tokio::spawn(async move { client.call(Operation::ReadState, Value::Null).await })
        };
        while client.in_flight().await == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(client.close(BridgeErrorKind::Cancelled).await, 1);
        let response = waiting.await.unwrap();
        assert!(!response.ok);
        assert_eq!(response.error_kind, Some(BridgeErrorKind::Cancelled));

        let after = client.call(Operation::ReadMeta, Value::Null).await;
        assert_eq!(after.error_kind, Some(BridgeErrorKind::InstanceGone));
    }
}
