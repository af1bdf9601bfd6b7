//! Conformance tests for the proxy over the in-process transport pair.

use std::sync::Arc;

use busard::prelude::*;
use busard_testkit as testkit;

/// The facade wiring end to end: the application timeout policy plus a
/// registered handler, driven through `invoke`.
#[tokio::test]
async fn disk_image_policy_round_trip() {
    let (host_transport, view_transport) = Transport::mem_pair();

    let host = Arc::new(RpcHost::new(host_transport));
    host.register(
        channel_for(busard::no_timeout::SERVICE, "listImages"),
        |_args| async move { Ok(serde_json::json!([])) },
    );
    tokio::spawn(host.clone().run());

    let client = Arc::new(RpcClient::new(
        view_transport,
        busard::no_timeout::default_policy(),
    ));
    tokio::spawn(client.clone().run());

    let images = client
        .invoke(
            &channel_for(busard::no_timeout::SERVICE, "listImages"),
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(images, serde_json::json!([]));
}

#[tokio::test]
async fn request_envelope_round_trip() {
    testkit::init_tracing();
    testkit::run_request_envelope_round_trip().await;
}

#[tokio::test]
async fn adder_round_trip() {
    testkit::run_adder_round_trip().await;
}

#[tokio::test]
async fn error_message_passthrough() {
    testkit::run_error_message_passthrough().await;
}

#[tokio::test]
async fn non_error_value_coercion() {
    testkit::run_non_error_value_coercion().await;
}

#[tokio::test]
async fn unknown_channel() {
    testkit::run_unknown_channel().await;
}

#[tokio::test]
async fn out_of_order_responses() {
    testkit::run_out_of_order_responses().await;
}

#[tokio::test]
async fn timeout_evicts_pending() {
    testkit::run_timeout_evicts_pending().await;
}

#[tokio::test]
async fn no_timeout_channel_waits() {
    testkit::run_no_timeout_channel_waits().await;
}

#[tokio::test]
async fn subscribe_fanout() {
    testkit::run_subscribe_fanout().await;
}

#[tokio::test]
async fn unsubscribe_idempotent() {
    testkit::run_unsubscribe_idempotent().await;
}

#[tokio::test]
async fn host_drops_malformed() {
    testkit::run_host_drops_malformed().await;
}

#[tokio::test]
async fn client_drops_malformed() {
    testkit::run_client_drops_malformed().await;
}

#[tokio::test]
async fn null_body_on_wire() {
    testkit::run_null_body_on_wire().await;
}

#[tokio::test]
async fn shutdown_fails_pending() {
    testkit::run_shutdown_fails_pending().await;
}
