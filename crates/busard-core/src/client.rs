//! RpcClient: the webview-side caller.
//!
//! Issues correlated requests over the transport and resolves them from
//! inbound response envelopes; separately fans inbound notification
//! envelopes out to topic subscribers.
//!
//! # Key invariant
//!
//! Only [`RpcClient::run`] receives from the transport. Response routing and
//! notification fan-out happen inside that intake loop; a later-arriving
//! notification is therefore dispatched strictly after an earlier one
//! finishes dispatching.
//!
//! # Usage
//!
//! ```ignore
//! let client = Arc::new(RpcClient::new(transport, policy));
//! tokio::spawn(client.clone().run());
//!
//! let body = client.invoke("Foo.bar", vec![json!("x")]).await?;
//!
//! let subscription = client.subscribe("image-update", |body| {
//!     // refresh the image list
//! });
//! subscription.unsubscribe();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    CallerInbound, NotificationEnvelope, RequestEnvelope, RequestId, ResponseEnvelope,
    ResponseStatus, RpcError, TimeoutPolicy, Transport, TransportError,
};

const DEFAULT_MAX_PENDING: usize = 8192;

fn max_pending() -> usize {
    std::env::var("BUSARD_MAX_PENDING")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_PENDING)
}

/// Listener invoked with each notification body for a subscribed topic.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// Pending entry outcome: the resolved body, or the error string off the wire.
type PendingSender = oneshot::Sender<Result<Value, String>>;

/// Webview-side caller owning one endpoint of the transport.
pub struct RpcClient {
    transport: Transport,
    policy: TimeoutPolicy,

    /// Pending entries: request id → oneshot sender. An entry is created when
    /// a request is sent and removed by whichever of response arrival,
    /// timeout eviction, or call-future drop happens first.
    pending: Mutex<HashMap<RequestId, PendingSender>>,

    /// Subscribers: topic → ordered registrations. Fan-out runs in
    /// registration order; only per-receipt ordering is contractual.
    subscribers: Mutex<HashMap<String, Vec<(u64, Listener)>>>,

    /// Ids are monotonic and never reused while a request is in flight.
    next_request_id: AtomicU64,
    next_subscriber_id: AtomicU64,
}

impl RpcClient {
    /// Create a caller over the given transport endpoint.
    pub fn new(transport: Transport, policy: TimeoutPolicy) -> Self {
        Self {
            transport,
            policy,
            pending: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Ids of in-flight requests (for diagnostics).
    pub fn pending_ids(&self) -> Vec<RequestId> {
        let pending = self.pending.lock();
        let mut ids: Vec<RequestId> = pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Close the underlying transport. The intake loop fails every pending
    /// call and exits; closing more than once is a no-op.
    pub fn close(&self) {
        self.transport.close();
    }

    fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a pending entry for a fresh request id.
    fn register_pending(
        &self,
        request_id: RequestId,
    ) -> Result<oneshot::Receiver<Result<Value, String>>, RpcError> {
        let mut pending = self.pending.lock();
        let pending_len = pending.len();
        let max = max_pending();
        if pending_len >= max {
            tracing::warn!(
                pending_len,
                max_pending = max,
                "too many pending calls; refusing new call"
            );
            return Err(RpcError::Saturated {
                pending: pending_len,
            });
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(request_id, tx);
        tracing::debug!(request_id, pending_len = pending_len + 1, "registered pending entry");
        Ok(rx)
    }

    /// Invoke the remote operation addressed by `channel` with positional
    /// `args`, and wait for its response.
    ///
    /// Channels not exempted by the timeout policy get a fixed call window;
    /// on expiry the pending entry is evicted and the call fails with
    /// [`RpcError::Timeout`]. A response that arrives first wins; a response
    /// arriving after eviction is logged and dropped by the intake loop.
    pub async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        struct PendingGuard<'a> {
            client: &'a RpcClient,
            request_id: RequestId,
            active: bool,
        }

        impl PendingGuard<'_> {
            fn disarm(&mut self) {
                self.active = false;
            }
        }

        impl Drop for PendingGuard<'_> {
            fn drop(&mut self) {
                if !self.active {
                    return;
                }
                if self
                    .client
                    .pending
                    .lock()
                    .remove(&self.request_id)
                    .is_some()
                {
                    tracing::debug!(
                        request_id = self.request_id,
                        "call abandoned: removed pending entry"
                    );
                }
            }
        }

        // Register the pending entry before sending
        let request_id = self.next_request_id();
        let rx = self.register_pending(request_id)?;
        let mut guard = PendingGuard {
            client: self,
            request_id,
            active: true,
        };

        let envelope = RequestEnvelope {
            id: request_id,
            channel: channel.to_string(),
            args,
        };
        let message =
            serde_json::to_value(&envelope).expect("envelope is always serializable");
        self.transport.send(message).await.map_err(RpcError::Transport)?;
        tracing::debug!(request_id, channel, "invoke: request sent");

        let received = match self.policy.call_timeout(channel) {
            Some(window) => match tokio::time::timeout(window, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    tracing::warn!(
                        request_id,
                        channel,
                        timeout_ms = window.as_millis() as u64,
                        "invoke: call timed out waiting for response"
                    );
                    // The guard evicts the pending entry on the way out, so a
                    // late response finds nothing and is dropped by intake.
                    return Err(RpcError::Timeout {
                        channel: channel.to_string(),
                    });
                }
            },
            None => rx.await,
        };

        guard.disarm();
        match received {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(message)) => Err(RpcError::Remote(message)),
            // Sender dropped without a terminal outcome: the client shut down.
            Err(_) => Err(RpcError::Transport(TransportError::Closed)),
        }
    }

    /// Register `listener` for notifications on `topic`.
    ///
    /// Duplicate registrations of the same listener are permitted; each one
    /// is delivered independently and removed independently.
    pub fn subscribe(
        self: &Arc<Self>,
        topic: impl Into<String>,
        listener: impl Fn(Value) + Send + Sync + 'static,
    ) -> Subscription {
        let topic = topic.into();
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .entry(topic.clone())
            .or_default()
            .push((subscriber_id, Arc::new(listener)));
        tracing::debug!(topic = %topic, subscriber_id, "subscribed");
        Subscription {
            client: self.clone(),
            topic,
            subscriber_id,
        }
    }

    /// Run the intake loop.
    ///
    /// One inbound message at a time, in arrival order: response envelopes
    /// resolve or reject their pending entry; notification envelopes fan out
    /// to the topic's subscribers; anything else is logged and dropped.
    ///
    /// Consumes self and runs until the transport closes, at which point
    /// every still-pending call fails with a transport error so no caller
    /// hangs on a channel exempt from timeouts.
    pub async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        tracing::debug!("RpcClient::run: starting intake loop");
        loop {
            let message = match self.transport.recv().await {
                Ok(message) => message,
                Err(TransportError::Closed) => {
                    tracing::debug!("RpcClient::run: transport closed");
                    self.fail_pending();
                    return Ok(());
                }
            };

            match CallerInbound::deserialize(&message) {
                Ok(CallerInbound::Response(response)) => self.route_response(response),
                Ok(CallerInbound::Notification(notification)) => {
                    self.dispatch_notification(notification)
                }
                Err(_) => {
                    tracing::error!(message = %message, "received incompatible message; dropping");
                }
            }
        }
    }

    fn route_response(&self, response: ResponseEnvelope) {
        let ResponseEnvelope {
            id,
            channel,
            status,
            body,
            error,
        } = response;

        let waiter = self.pending.lock().remove(&id);
        let Some(tx) = waiter else {
            // Expected after timeout eviction; a delayed response is dropped.
            tracing::warn!(
                request_id = id,
                channel = %channel,
                "response with no pending entry; dropping"
            );
            return;
        };

        tracing::debug!(request_id = id, channel = %channel, ?status, "response delivered");
        let outcome = match status {
            ResponseStatus::Success => Ok(body),
            ResponseStatus::Error => Err(error.unwrap_or_default()),
        };
        // The receiver may be gone if the call future was dropped.
        let _ = tx.send(outcome);
    }

    fn dispatch_notification(&self, notification: NotificationEnvelope) {
        // Snapshot the listener set so a listener can subscribe or
        // unsubscribe without deadlocking the table.
        let listeners: Vec<Listener> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(&notification.id) {
                Some(entries) if !entries.is_empty() => {
                    entries.iter().map(|(_, listener)| listener.clone()).collect()
                }
                _ => {
                    // Not a notification for us.
                    tracing::warn!(
                        topic = %notification.id,
                        "notification with no subscribers; dropping"
                    );
                    return;
                }
            }
        };

        tracing::debug!(
            topic = %notification.id,
            listeners = listeners.len(),
            "dispatching notification"
        );
        for listener in listeners {
            listener(notification.body.clone());
        }
    }

    fn fail_pending(&self) {
        let drained: Vec<(RequestId, PendingSender)> =
            self.pending.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(
                count = drained.len(),
                "transport closed; failing pending calls"
            );
        }
        // Dropping the senders rejects every waiting call.
    }
}

/// Capability to remove one notification listener.
///
/// `unsubscribe` removes exactly the registration that produced this value,
/// never other listeners on the same topic; calling it more than once is a
/// no-op.
pub struct Subscription {
    client: Arc<RpcClient>,
    topic: String,
    subscriber_id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let mut subscribers = self.client.subscribers.lock();
        if let Some(entries) = subscribers.get_mut(&self.topic) {
            entries.retain(|(id, _)| *id != self.subscriber_id);
            if entries.is_empty() {
                subscribers.remove(&self.topic);
            }
        }
    }
}

// RpcClient conformance scenarios live in `crates/busard-testkit`.
