//! busard-core: Core types for the busard webview RPC proxy.
//!
//! This crate defines:
//! - Wire envelopes ([`RequestEnvelope`], [`ResponseEnvelope`], [`NotificationEnvelope`])
//! - Channel naming ([`channel_for`])
//! - Per-channel timeout policy ([`TimeoutPolicy`])
//! - Transport front and in-process backend ([`Transport`])
//! - Host-side dispatcher ([`RpcHost`]) and webview-side caller ([`RpcClient`])
//! - Error types ([`RpcError`], [`HandlerError`], [`TransportError`])

mod channel;
mod client;
mod envelope;
mod error;
mod host;
mod policy;
mod transport;

pub use channel::*;
pub use client::*;
pub use envelope::*;
pub use error::*;
pub use host::*;
pub use policy::*;
pub use transport::*;
