//! RpcHost: the host-side dispatcher.
//!
//! Holds the channel → handler table, executes handlers on behalf of inbound
//! request envelopes, and posts back correlated responses. It can also emit
//! unsolicited notification envelopes toward the webview.
//!
//! # Key invariant
//!
//! Only [`RpcHost::run`] receives from the transport. All routing decisions
//! happen inside that intake loop; handlers themselves run in spawned tasks
//! so a slow handler never blocks intake.
//!
//! # Usage
//!
//! ```ignore
//! let host = Arc::new(RpcHost::new(transport));
//! host.register("Foo.bar", |args| async move { Ok(json!(42)) });
//! tokio::spawn(host.clone().run());
//!
//! // Push a UI refresh trigger
//! host.notify("image-update", json!({})).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::channel_for;
use crate::{
    HandlerError, NotificationEnvelope, RequestEnvelope, ResponseEnvelope, RpcError, Transport,
    TransportError,
};

/// Future returned by a registered handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// A handler callable with a request's positional arguments.
pub type SharedHandler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// A service exposing an explicit table of (method-name, handler) pairs.
///
/// The table is declared at construction time, one entry per public method;
/// [`RpcHost::register_service`] registers each entry under `"NAME.method"`.
pub trait RpcService: Send + Sync + 'static {
    /// Channel namespace shared with the remote side, e.g. `"DiskImageApi"`.
    const NAME: &'static str;

    /// Statically declared handler table.
    fn handlers(self: &Arc<Self>) -> Vec<(&'static str, SharedHandler)>;
}

/// Host-side dispatcher owning one endpoint of the transport.
pub struct RpcHost {
    transport: Transport,
    /// Channel → handler. Populated at registration time; entries live for
    /// the lifetime of the host, there is no removal path.
    methods: Mutex<HashMap<String, SharedHandler>>,
}

impl RpcHost {
    /// Create a dispatcher over the given transport endpoint.
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            methods: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or overwrite) the handler for `channel`.
    pub fn register<F, Fut>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let shared: SharedHandler = Arc::new(move |args| Box::pin(handler(args)));
        let channel = channel.into();
        if self.methods.lock().insert(channel.clone(), shared).is_some() {
            tracing::debug!(channel = %channel, "handler overwritten");
        }
    }

    /// Register every handler a service declares, one channel per method.
    pub fn register_service<S: RpcService>(&self, service: Arc<S>) {
        for (method, handler) in service.handlers() {
            self.methods.lock().insert(channel_for(S::NAME, method), handler);
        }
        tracing::debug!(service = S::NAME, "service registered");
    }

    /// Emit an unsolicited notification toward the webview.
    pub async fn notify(&self, id: impl Into<String>, body: Value) -> Result<(), RpcError> {
        let envelope = NotificationEnvelope { id: id.into(), body };
        let message =
            serde_json::to_value(&envelope).expect("envelope is always serializable");
        self.transport.send(message).await.map_err(RpcError::Transport)
    }

    /// Close the underlying transport. The intake loop exits once it observes
    /// closure; closing more than once is a no-op.
    pub fn close(&self) {
        self.transport.close();
    }

    /// Run the intake loop.
    ///
    /// One inbound message at a time, in arrival order:
    /// - malformed messages are logged and dropped, no response is sent
    /// - requests for unknown channels are logged and answered with an error
    ///   response through the normal response path
    /// - requests for known channels are dispatched in a spawned task; the
    ///   handler's resolved value (or reduced error string) is posted back
    ///   correlated by the request id
    ///
    /// Consumes self and runs until the transport closes.
    pub async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        tracing::debug!("RpcHost::run: starting intake loop");
        loop {
            let message = match self.transport.recv().await {
                Ok(message) => message,
                Err(TransportError::Closed) => {
                    tracing::debug!("RpcHost::run: transport closed");
                    return Ok(());
                }
            };

            let request = match RequestEnvelope::deserialize(&message) {
                Ok(request) => request,
                Err(_) => {
                    tracing::error!(message = %message, "received incompatible message; dropping");
                    continue;
                }
            };

            let RequestEnvelope { id, channel, args } = request;
            tracing::debug!(
                request_id = id,
                channel = %channel,
                args = args.len(),
                "RpcHost::run: received request"
            );

            let handler = self.methods.lock().get(&channel).cloned();
            let Some(handler) = handler else {
                // The caller is actively waiting on this id, so the condition
                // is reported back through the response path rather than
                // crashing the intake loop or dropping the request silently.
                let registered: Vec<String> = self.methods.lock().keys().cloned().collect();
                tracing::error!(
                    channel = %channel,
                    ?registered,
                    "request for unknown channel"
                );
                let response = ResponseEnvelope::error(id, channel, "channel does not exist.");
                self.post_response(response).await;
                continue;
            };

            let host = self.clone();
            tokio::spawn(async move {
                // A handler may fail by returning an error, by panicking when
                // called, or by panicking while its future runs; all three
                // reduce to the same error-response path.
                let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
                    Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                    Err(panic) => Err(panic),
                };

                let result = match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = if let Some(s) = panic.downcast_ref::<&str>() {
                            format!("panic in handler: {s}")
                        } else if let Some(s) = panic.downcast_ref::<String>() {
                            format!("panic in handler: {s}")
                        } else {
                            "panic in handler".to_string()
                        };
                        Err(HandlerError::Message(message))
                    }
                };

                let response = match result {
                    Ok(body) => ResponseEnvelope::success(id, channel, body),
                    Err(error) => ResponseEnvelope::error(id, channel, error.to_wire_string()),
                };
                host.post_response(response).await;
            });
        }
    }

    async fn post_response(&self, response: ResponseEnvelope) {
        let request_id = response.id;
        let message =
            serde_json::to_value(&response).expect("envelope is always serializable");
        if let Err(error) = self.transport.send(message).await {
            tracing::warn!(request_id, error = %error, "failed to send response");
        }
    }
}

// RpcHost conformance scenarios live in `crates/busard-testkit`.
