//! busard: Bidirectional RPC message proxy between a sandboxed webview and
//! its privileged extension host.
//!
//! Two halves share one message transport. The host side ([`RpcHost`]) maps
//! channel names to handlers and answers request envelopes with correlated
//! responses; the webview side ([`RpcClient`]) issues requests, applies the
//! per-channel timeout policy, and fans unsolicited notifications out to
//! topic subscribers.
//!
//! # Quick Start
//!
//! ```ignore
//! use busard::prelude::*;
//!
//! let (host_transport, view_transport) = Transport::mem_pair();
//!
//! let host = Arc::new(RpcHost::new(host_transport));
//! host.register("DiskImageApi.listImages", |_args| async move {
//!     Ok(json!([]))
//! });
//! tokio::spawn(host.clone().run());
//!
//! let client = Arc::new(RpcClient::new(
//!     view_transport,
//!     busard::no_timeout::default_policy(),
//! ));
//! tokio::spawn(client.clone().run());
//!
//! let images = client.invoke("DiskImageApi.listImages", vec![]).await?;
//! ```
//!
//! # Typed clients
//!
//! Remote operations are addressed by `"Service.method"` channel keys derived
//! with [`channel_for`] on both sides independently. Application code wraps
//! them in concrete client structs, one thin method per operation:
//!
//! ```ignore
//! struct DiskImageClient { client: Arc<RpcClient> }
//!
//! impl DiskImageClient {
//!     async fn pull_image(&self, image: &str) -> Result<(), RpcError> {
//!         self.client
//!             .invoke(&channel_for("DiskImageApi", "pullImage"), vec![json!(image)])
//!             .await?;
//!         Ok(())
//!     }
//! }
//! ```

pub use busard_core::{
    CallerInbound, DEFAULT_CALL_TIMEOUT, HandlerError, HandlerFuture, Listener,
    NotificationEnvelope, RequestEnvelope, RequestId, ResponseEnvelope, ResponseStatus,
    RpcClient, RpcError, RpcHost, RpcService, SharedHandler, Subscription, TimeoutPolicy,
    Transport, TransportError, channel_for,
};

pub mod no_timeout;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use busard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        HandlerError, RpcClient, RpcError, RpcHost, RpcService, TimeoutPolicy, Transport,
        channel_for,
    };
}
