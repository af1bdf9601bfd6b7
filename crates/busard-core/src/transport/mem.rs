use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{Notify, mpsc};

use super::TransportBackend;
use crate::TransportError;

const CHANNEL_CAPACITY: usize = 64;

/// In-process transport: a connected pair of bounded async channels.
#[derive(Clone, Debug)]
pub struct MemTransport {
    inner: Arc<MemInner>,
}

#[derive(Debug)]
struct MemInner {
    tx: mpsc::Sender<Value>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Value>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl MemTransport {
    /// Create a connected pair; messages sent on one end arrive on the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let inner_a = Arc::new(MemInner {
            tx: tx_b,
            rx: tokio::sync::Mutex::new(rx_a),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        let inner_b = Arc::new(MemInner {
            tx: tx_a,
            rx: tokio::sync::Mutex::new(rx_b),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        (Self { inner: inner_a }, Self { inner: inner_b })
    }

    fn is_closed_inner(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl TransportBackend for MemTransport {
    async fn send(&self, message: Value) -> Result<(), TransportError> {
        if self.is_closed_inner() {
            return Err(TransportError::Closed);
        }

        self.inner
            .tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Result<Value, TransportError> {
        let mut rx = self.inner.rx.lock().await;
        loop {
            // Invariant: close() must unblock a parked recv. The shutdown
            // waiter is registered before the closed flag is re-checked so a
            // close landing between the check and the select cannot be missed.
            let shutdown = self.inner.shutdown.notified();
            tokio::pin!(shutdown);
            shutdown.as_mut().enable();

            if self.is_closed_inner() {
                return Err(TransportError::Closed);
            }

            tokio::select! {
                _ = shutdown => continue,
                message = rx.recv() => return message.ok_or(TransportError::Closed),
            }
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn pair_creation() {
        let (a, b) = MemTransport::pair();
        assert!(!a.is_closed());
        assert!(!b.is_closed());
    }

    #[tokio::test]
    async fn send_recv() {
        let (a, b) = MemTransport::pair();

        a.send(json!({ "id": 1, "channel": "Foo.bar", "args": ["x"] }))
            .await
            .unwrap();

        let message = b.recv().await.unwrap();
        assert_eq!(message["channel"], json!("Foo.bar"));
    }

    #[tokio::test]
    async fn bidirectional() {
        let (a, b) = MemTransport::pair();

        a.send(json!("from A")).await.unwrap();
        b.send(json!("from B")).await.unwrap();

        assert_eq!(b.recv().await.unwrap(), json!("from A"));
        assert_eq!(a.recv().await.unwrap(), json!("from B"));
    }

    #[tokio::test]
    async fn send_on_closed_fails() {
        let (a, _b) = MemTransport::pair();

        a.close();
        assert!(a.is_closed());
        assert!(matches!(
            a.send(json!(1)).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_unblocks_parked_recv() {
        let (a, _b) = MemTransport::pair();

        let parked = tokio::spawn({
            let a = a.clone();
            async move { a.recv().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        a.close();

        let result = tokio::time::timeout(Duration::from_secs(1), parked)
            .await
            .expect("recv did not observe close")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
