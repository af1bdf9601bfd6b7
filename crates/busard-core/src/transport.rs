//! Transport front and internal backend trait.
//!
//! The public API is the [`Transport`] enum. Each backend lives in its own
//! module under `transport/` and implements the internal [`TransportBackend`]
//! trait. Messages are JSON-structured values: the boundary performs
//! structured serialization, exactly one message per send.

use serde_json::Value;

use crate::TransportError;

pub(crate) trait TransportBackend: Send + Sync + Clone + 'static {
    async fn send(&self, message: Value) -> Result<(), TransportError>;
    async fn recv(&self) -> Result<Value, TransportError>;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// One endpoint of the webview message channel.
///
/// Symmetric on both sides: send one message, receive one message. The
/// in-process backend is the semantic reference exercised by the test suite.
#[derive(Clone, Debug)]
pub enum Transport {
    Mem(mem::MemTransport),
}

impl Transport {
    pub async fn send(&self, message: Value) -> Result<(), TransportError> {
        match self {
            Transport::Mem(t) => t.send(message).await,
        }
    }

    pub async fn recv(&self) -> Result<Value, TransportError> {
        match self {
            Transport::Mem(t) => t.recv().await,
        }
    }

    /// Close this endpoint. Idempotent: closing twice is a no-op.
    pub fn close(&self) {
        match self {
            Transport::Mem(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Mem(t) => t.is_closed(),
        }
    }

    /// Connected in-process pair: messages sent on one end arrive on the other.
    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }
}

pub mod mem;
