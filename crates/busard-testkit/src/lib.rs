//! busard-testkit: Conformance scenarios for the busard proxy.
//!
//! Provides shared test scenarios exercised against the in-process transport
//! pair, plus a reference service (`AdderService`) with a hand-written typed
//! client in the style every application client follows: one concrete method
//! per remote operation, each a thin wrapper over `invoke`.
//!
//! # Usage
//!
//! ```ignore
//! #[tokio::test]
//! async fn request_envelope_round_trip() {
//!     busard_testkit::run_request_envelope_round_trip().await;
//! }
//! ```

use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{Value, json};

use busard_core::{
    HandlerError, HandlerFuture, RequestEnvelope, ResponseEnvelope, RpcClient, RpcError, RpcHost,
    RpcService, SharedHandler, TimeoutPolicy, Transport, TransportError, channel_for,
};

static INIT: Once = Once::new();

/// Initialize tracing once for the whole test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into()),
            )
            .with_test_writer()
            .init();
    });
}

/// Error type for test scenarios.
#[derive(Debug)]
pub enum TestError {
    /// RPC call failed.
    Rpc(RpcError),
    /// Transport error.
    Transport(TransportError),
    /// Assertion failed.
    Assertion(String),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Rpc(e) => write!(f, "RPC error: {}", e),
            TestError::Transport(e) => write!(f, "transport error: {}", e),
            TestError::Assertion(msg) => write!(f, "assertion failed: {}", msg),
        }
    }
}

impl std::error::Error for TestError {}

impl From<RpcError> for TestError {
    fn from(e: RpcError) -> Self {
        TestError::Rpc(e)
    }
}

impl From<TransportError> for TestError {
    fn from(e: TransportError) -> Self {
        TestError::Transport(e)
    }
}

// ============================================================================
// Harness helpers
// ============================================================================

/// Spawn a fully wired host/caller pair over an in-process transport.
pub fn spawn_proxy(policy: TimeoutPolicy) -> (Arc<RpcHost>, Arc<RpcClient>) {
    let (host_transport, view_transport) = Transport::mem_pair();
    let host = Arc::new(RpcHost::new(host_transport));
    let client = Arc::new(RpcClient::new(view_transport, policy));
    tokio::spawn(host.clone().run());
    tokio::spawn(client.clone().run());
    (host, client)
}

/// Spawn only the caller; the host side stays a raw transport endpoint so a
/// scenario can inspect requests and hand-craft responses.
pub fn spawn_client(policy: TimeoutPolicy) -> (Transport, Arc<RpcClient>) {
    let (host_transport, view_transport) = Transport::mem_pair();
    let client = Arc::new(RpcClient::new(view_transport, policy));
    tokio::spawn(client.clone().run());
    (host_transport, client)
}

/// Spawn only the host; the webview side stays a raw transport endpoint so a
/// scenario can hand-craft requests and inspect responses on the wire.
pub fn spawn_host() -> (Arc<RpcHost>, Transport) {
    let (host_transport, view_transport) = Transport::mem_pair();
    let host = Arc::new(RpcHost::new(host_transport));
    tokio::spawn(host.clone().run());
    (host, view_transport)
}

fn recv_request(message: Value) -> Result<RequestEnvelope, TestError> {
    serde_json::from_value(message)
        .map_err(|e| TestError::Assertion(format!("expected request envelope: {e}")))
}

fn success_message(id: u64, channel: impl Into<String>, body: Value) -> Value {
    serde_json::to_value(ResponseEnvelope::success(id, channel, body))
        .expect("envelope is always serializable")
}

// ============================================================================
// Test service: Adder
// ============================================================================

/// Simple arithmetic service used by the scenarios.
pub struct AdderService;

impl RpcService for AdderService {
    const NAME: &'static str = "Adder";

    fn handlers(self: &Arc<Self>) -> Vec<(&'static str, SharedHandler)> {
        let add: SharedHandler = Arc::new(|args: Vec<Value>| -> HandlerFuture {
            Box::pin(async move {
                let a = args
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| HandlerError::from("add: expected two integers"))?;
                let b = args
                    .get(1)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| HandlerError::from("add: expected two integers"))?;
                Ok(json!(a + b))
            })
        });

        vec![("add", add)]
    }
}

/// Typed client for the Adder service.
pub struct AdderClient {
    client: Arc<RpcClient>,
}

impl AdderClient {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    pub async fn add(&self, a: i64, b: i64) -> Result<i64, RpcError> {
        let body = self
            .client
            .invoke(&channel_for("Adder", "add"), vec![json!(a), json!(b)])
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// Exact envelope round trip: `{id:1, channel:"Foo.bar", args:["x"]}` is
/// answered with `{id:1, channel:"Foo.bar", status:success, body:42}` and the
/// call resolves to `42`.
pub async fn run_request_envelope_round_trip() {
    if let Err(e) = run_request_envelope_round_trip_inner().await {
        panic!("run_request_envelope_round_trip failed: {}", e);
    }
}

async fn run_request_envelope_round_trip_inner() -> Result<(), TestError> {
    let (raw_host, client) = spawn_client(TimeoutPolicy::default());

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.invoke("Foo.bar", vec![json!("x")]).await }
    });

    let request = recv_request(raw_host.recv().await?)?;
    if request.id != 1 {
        return Err(TestError::Assertion(format!(
            "expected first request id 1, got {}",
            request.id
        )));
    }
    if request.channel != "Foo.bar" {
        return Err(TestError::Assertion(format!(
            "expected channel Foo.bar, got {}",
            request.channel
        )));
    }
    if request.args != vec![json!("x")] {
        return Err(TestError::Assertion(format!(
            "expected args [\"x\"], got {:?}",
            request.args
        )));
    }

    raw_host
        .send(success_message(request.id, request.channel, json!(42)))
        .await?;

    let body = call.await.expect("call task panicked")?;
    if body != json!(42) {
        return Err(TestError::Assertion(format!(
            "expected body 42, got {body}"
        )));
    }
    Ok(())
}

/// Full host/caller round trip through a registered service and its typed
/// client: `add(2, 3)` resolves to `5`, unmodified.
pub async fn run_adder_round_trip() {
    if let Err(e) = run_adder_round_trip_inner().await {
        panic!("run_adder_round_trip failed: {}", e);
    }
}

async fn run_adder_round_trip_inner() -> Result<(), TestError> {
    let (host, client) = spawn_proxy(TimeoutPolicy::default());
    host.register_service(Arc::new(AdderService));

    let adder = AdderClient::new(client);
    let result = adder.add(2, 3).await?;
    if result != 5 {
        return Err(TestError::Assertion(format!(
            "expected add(2, 3) = 5, got {}",
            result
        )));
    }
    Ok(())
}

/// A handler failing with a message rejects the call with exactly that
/// string.
pub async fn run_error_message_passthrough() {
    if let Err(e) = run_error_message_passthrough_inner().await {
        panic!("run_error_message_passthrough failed: {}", e);
    }
}

async fn run_error_message_passthrough_inner() -> Result<(), TestError> {
    let (host, client) = spawn_proxy(TimeoutPolicy::default());
    host.register("Foo.fail", |_args| async move {
        Err(HandlerError::from("boom"))
    });

    match client.invoke("Foo.fail", vec![]).await {
        Err(RpcError::Remote(message)) if message == "boom" => Ok(()),
        other => Err(TestError::Assertion(format!(
            "expected Remote(\"boom\"), got {other:?}"
        ))),
    }
}

/// A handler failing with a bare value rejects the call with the value's own
/// string form.
pub async fn run_non_error_value_coercion() {
    if let Err(e) = run_non_error_value_coercion_inner().await {
        panic!("run_non_error_value_coercion failed: {}", e);
    }
}

async fn run_non_error_value_coercion_inner() -> Result<(), TestError> {
    let (host, client) = spawn_proxy(TimeoutPolicy::default());
    host.register("Foo.failValue", |_args| async move {
        Err(HandlerError::Value(json!({ "code": 7 })))
    });
    host.register("Foo.failText", |_args| async move {
        Err(HandlerError::Value(json!("plain")))
    });

    match client.invoke("Foo.failValue", vec![]).await {
        Err(RpcError::Remote(message)) if message == r#"{"code":7}"# => {}
        other => {
            return Err(TestError::Assertion(format!(
                "expected Remote with JSON form, got {other:?}"
            )));
        }
    }

    match client.invoke("Foo.failText", vec![]).await {
        Err(RpcError::Remote(message)) if message == "plain" => Ok(()),
        other => Err(TestError::Assertion(format!(
            "expected Remote(\"plain\"), got {other:?}"
        ))),
    }
}

/// A request to an unregistered channel is answered with a non-empty error
/// string instead of hanging or crashing the host.
pub async fn run_unknown_channel() {
    if let Err(e) = run_unknown_channel_inner().await {
        panic!("run_unknown_channel failed: {}", e);
    }
}

async fn run_unknown_channel_inner() -> Result<(), TestError> {
    let (_host, client) = spawn_proxy(TimeoutPolicy::default());

    match client.invoke(&channel_for("Foo", "missing"), vec![]).await {
        Err(RpcError::Remote(message)) if !message.is_empty() => {
            if message != "channel does not exist." {
                return Err(TestError::Assertion(format!(
                    "unexpected unknown-channel message: {message}"
                )));
            }
            Ok(())
        }
        other => Err(TestError::Assertion(format!(
            "expected non-empty Remote error, got {other:?}"
        ))),
    }
}

/// Responses delivered in reverse send order still resolve each call with its
/// own body.
pub async fn run_out_of_order_responses() {
    if let Err(e) = run_out_of_order_responses_inner().await {
        panic!("run_out_of_order_responses failed: {}", e);
    }
}

async fn run_out_of_order_responses_inner() -> Result<(), TestError> {
    let (raw_host, client) = spawn_client(TimeoutPolicy::default());

    let calls: Vec<_> = (0..3)
        .map(|i| {
            tokio::spawn({
                let client = client.clone();
                async move { client.invoke("Foo.echo", vec![json!(i)]).await }
            })
        })
        .collect();

    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(recv_request(raw_host.recv().await?)?);
    }

    // Echo each request's first argument back, last request first.
    for request in requests.iter().rev() {
        let body = request.args[0].clone();
        raw_host
            .send(success_message(request.id, request.channel.clone(), body))
            .await?;
    }

    for (i, call) in calls.into_iter().enumerate() {
        let body = call.await.expect("call task panicked")?;
        if body != json!(i) {
            return Err(TestError::Assertion(format!(
                "call {i} resolved with wrong body {body}"
            )));
        }
    }
    Ok(())
}

/// A call on a plain channel with no response fails after the window, the
/// pending entry is evicted, and a late response is dropped without
/// disturbing the loop.
pub async fn run_timeout_evicts_pending() {
    if let Err(e) = run_timeout_evicts_pending_inner().await {
        panic!("run_timeout_evicts_pending failed: {}", e);
    }
}

async fn run_timeout_evicts_pending_inner() -> Result<(), TestError> {
    let policy = TimeoutPolicy::with_timeout(Duration::from_millis(100), std::iter::empty());
    let (raw_host, client) = spawn_client(policy);

    match client.invoke("Foo.slow", vec![]).await {
        Err(RpcError::Timeout { channel }) if channel == "Foo.slow" => {}
        other => {
            return Err(TestError::Assertion(format!(
                "expected Timeout, got {other:?}"
            )));
        }
    }
    if !client.pending_ids().is_empty() {
        return Err(TestError::Assertion(format!(
            "pending entry not evicted: {:?}",
            client.pending_ids()
        )));
    }

    // The response eventually shows up for the evicted id; it must be dropped.
    let request = recv_request(raw_host.recv().await?)?;
    raw_host
        .send(success_message(request.id, request.channel, json!("late")))
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The loop is still routing: a fresh call succeeds.
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.invoke("Foo.after", vec![]).await }
    });
    let request = recv_request(raw_host.recv().await?)?;
    raw_host
        .send(success_message(request.id, request.channel, json!("ok")))
        .await?;
    let body = call.await.expect("call task panicked")?;
    if body != json!("ok") {
        return Err(TestError::Assertion(format!(
            "follow-up call resolved with wrong body {body}"
        )));
    }
    Ok(())
}

/// A channel in the exclusion set never fails on elapsed time: the response
/// arrives well past the normal window and still resolves the call.
pub async fn run_no_timeout_channel_waits() {
    if let Err(e) = run_no_timeout_channel_waits_inner().await {
        panic!("run_no_timeout_channel_waits failed: {}", e);
    }
}

async fn run_no_timeout_channel_waits_inner() -> Result<(), TestError> {
    let slow = channel_for("Foo", "slow");
    let policy = TimeoutPolicy::with_timeout(Duration::from_millis(100), [slow.clone()]);
    let (raw_host, client) = spawn_client(policy);

    let call = tokio::spawn({
        let client = client.clone();
        let slow = slow.clone();
        async move { client.invoke(&slow, vec![]).await }
    });

    let request = recv_request(raw_host.recv().await?)?;

    // Four times the normal window.
    tokio::time::sleep(Duration::from_millis(400)).await;
    raw_host
        .send(success_message(request.id, request.channel, json!("done")))
        .await?;

    let body = call.await.expect("call task panicked")?;
    if body != json!("done") {
        return Err(TestError::Assertion(format!(
            "expected \"done\", got {body}"
        )));
    }
    Ok(())
}

/// Two independent subscribers on one topic each receive a subsequently
/// emitted notification exactly once.
pub async fn run_subscribe_fanout() {
    if let Err(e) = run_subscribe_fanout_inner().await {
        panic!("run_subscribe_fanout failed: {}", e);
    }
}

async fn run_subscribe_fanout_inner() -> Result<(), TestError> {
    let (host, client) = spawn_proxy(TimeoutPolicy::default());

    let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
    let _sub_a = client.subscribe("image-update", move |body| {
        let _ = tx_a.send(body);
    });
    let _sub_b = client.subscribe("image-update", move |body| {
        let _ = tx_b.send(body);
    });

    host.notify("image-update", json!({})).await?;

    for rx in [&mut rx_a, &mut rx_b] {
        let body = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .map_err(|_| TestError::Assertion("notification not delivered".into()))?
            .ok_or_else(|| TestError::Assertion("listener channel closed".into()))?;
        if body != json!({}) {
            return Err(TestError::Assertion(format!(
                "unexpected notification body {body}"
            )));
        }
    }

    // Exactly once each.
    tokio::time::sleep(Duration::from_millis(50)).await;
    if rx_a.try_recv().is_ok() || rx_b.try_recv().is_ok() {
        return Err(TestError::Assertion(
            "notification delivered more than once".into(),
        ));
    }
    Ok(())
}

/// `unsubscribe` is idempotent and never disturbs other subscribers on the
/// same topic.
pub async fn run_unsubscribe_idempotent() {
    if let Err(e) = run_unsubscribe_idempotent_inner().await {
        panic!("run_unsubscribe_idempotent failed: {}", e);
    }
}

async fn run_unsubscribe_idempotent_inner() -> Result<(), TestError> {
    let (host, client) = spawn_proxy(TimeoutPolicy::default());

    let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
    let sub_a = client.subscribe("image-update", move |body| {
        let _ = tx_a.send(body);
    });
    let _sub_b = client.subscribe("image-update", move |body| {
        let _ = tx_b.send(body);
    });

    sub_a.unsubscribe();
    sub_a.unsubscribe();

    host.notify("image-update", json!({ "n": 1 })).await?;

    let body = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .map_err(|_| TestError::Assertion("surviving subscriber starved".into()))?
        .ok_or_else(|| TestError::Assertion("listener channel closed".into()))?;
    if body != json!({ "n": 1 }) {
        return Err(TestError::Assertion(format!(
            "unexpected notification body {body}"
        )));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    if rx_a.try_recv().is_ok() {
        return Err(TestError::Assertion(
            "unsubscribed listener still received a notification".into(),
        ));
    }
    Ok(())
}

/// Malformed messages reaching the host are dropped without a response and
/// without killing the intake loop.
pub async fn run_host_drops_malformed() {
    if let Err(e) = run_host_drops_malformed_inner().await {
        panic!("run_host_drops_malformed failed: {}", e);
    }
}

async fn run_host_drops_malformed_inner() -> Result<(), TestError> {
    let (host, raw_view) = spawn_host();
    host.register("Foo.ping", |_args| async move { Ok(json!("pong")) });

    raw_view.send(json!("garbage")).await?;
    raw_view.send(json!({ "unexpected": true })).await?;

    let request = RequestEnvelope {
        id: 9,
        channel: "Foo.ping".into(),
        args: vec![],
    };
    raw_view
        .send(serde_json::to_value(&request).expect("envelope is always serializable"))
        .await?;

    // The only message coming back is the response to the valid request.
    let response: ResponseEnvelope = serde_json::from_value(raw_view.recv().await?)
        .map_err(|e| TestError::Assertion(format!("expected response envelope: {e}")))?;
    if response.id != 9 || response.body != json!("pong") {
        return Err(TestError::Assertion(format!(
            "unexpected response {response:?}"
        )));
    }
    Ok(())
}

/// Malformed messages, orphaned responses, and subscriber-less notifications
/// reaching the caller are dropped without killing the intake loop.
pub async fn run_client_drops_malformed() {
    if let Err(e) = run_client_drops_malformed_inner().await {
        panic!("run_client_drops_malformed failed: {}", e);
    }
}

async fn run_client_drops_malformed_inner() -> Result<(), TestError> {
    let (raw_host, client) = spawn_client(TimeoutPolicy::default());

    raw_host.send(json!(42)).await?;
    raw_host
        .send(
            serde_json::to_value(busard_core::NotificationEnvelope {
                id: "nobody-listens".into(),
                body: json!({}),
            })
            .expect("envelope is always serializable"),
        )
        .await?;
    raw_host
        .send(success_message(777, "Foo.bar", json!(1)))
        .await?;

    // The loop is still routing: a normal call completes.
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.invoke("Foo.bar", vec![]).await }
    });
    let request = recv_request(raw_host.recv().await?)?;
    raw_host
        .send(success_message(request.id, request.channel, json!("alive")))
        .await?;
    let body = call.await.expect("call task panicked")?;
    if body != json!("alive") {
        return Err(TestError::Assertion(format!(
            "expected \"alive\", got {body}"
        )));
    }
    Ok(())
}

/// A handler resolving with no meaningful value still produces a response
/// whose `body` field is explicitly null on the wire.
pub async fn run_null_body_on_wire() {
    if let Err(e) = run_null_body_on_wire_inner().await {
        panic!("run_null_body_on_wire failed: {}", e);
    }
}

async fn run_null_body_on_wire_inner() -> Result<(), TestError> {
    let (host, raw_view) = spawn_host();
    host.register("Disk.flush", |_args| async move { Ok(Value::Null) });

    let request = RequestEnvelope {
        id: 4,
        channel: "Disk.flush".into(),
        args: vec![],
    };
    raw_view
        .send(serde_json::to_value(&request).expect("envelope is always serializable"))
        .await?;

    let message = raw_view.recv().await?;
    let object = message
        .as_object()
        .ok_or_else(|| TestError::Assertion(format!("expected object response, got {message}")))?;
    if object.get("status") != Some(&json!("success")) {
        return Err(TestError::Assertion(format!(
            "expected success status, got {message}"
        )));
    }
    if object.get("body") != Some(&Value::Null) {
        return Err(TestError::Assertion(format!(
            "body field missing or non-null: {message}"
        )));
    }
    Ok(())
}

/// Closing the caller fails every pending call, even on channels exempt from
/// timeouts, so nothing hangs forever.
pub async fn run_shutdown_fails_pending() {
    if let Err(e) = run_shutdown_fails_pending_inner().await {
        panic!("run_shutdown_fails_pending failed: {}", e);
    }
}

async fn run_shutdown_fails_pending_inner() -> Result<(), TestError> {
    let slow = channel_for("Foo", "slow");
    let policy = TimeoutPolicy::with_timeout(Duration::from_millis(100), [slow.clone()]);
    let (raw_host, client) = spawn_client(policy);

    let call = tokio::spawn({
        let client = client.clone();
        let slow = slow.clone();
        async move { client.invoke(&slow, vec![]).await }
    });

    // Let the request land before tearing the caller down.
    let _ = recv_request(raw_host.recv().await?)?;
    client.close();

    match call.await.expect("call task panicked") {
        Err(RpcError::Transport(TransportError::Closed)) => Ok(()),
        other => Err(TestError::Assertion(format!(
            "expected Transport(Closed), got {other:?}"
        ))),
    }
}
