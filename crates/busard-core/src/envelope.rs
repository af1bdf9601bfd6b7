//! Wire envelopes crossing the webview message boundary.
//!
//! Three shapes travel over the transport: requests (caller → host),
//! responses (host → caller, correlated by `id`), and notifications
//! (host → caller, addressed by topic name). Every envelope is a
//! JSON-structured value because the underlying channel performs
//! structured serialization; nothing non-serializable may cross it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id allocated by the caller, unique per in-flight request.
pub type RequestId = u64;

/// A request posted by the webview side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: RequestId,
    /// Channel key addressing one registered handler, see [`channel_for`].
    ///
    /// [`channel_for`]: crate::channel_for
    pub channel: String,
    /// Positional arguments, spread into the handler in order.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Terminal outcome of a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// A response correlated to a request by `id` and echoing its `channel`.
///
/// `body` is always present on the wire: a handler that resolves with no
/// meaningful value yields an explicit JSON `null`, never a missing field.
/// `error` carries the reduced failure string only for `status: error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: RequestId,
    pub channel: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response carrying the handler's resolved value.
    pub fn success(id: RequestId, channel: impl Into<String>, body: Value) -> Self {
        Self {
            id,
            channel: channel.into(),
            status: ResponseStatus::Success,
            body,
            error: None,
        }
    }

    /// Error response carrying the reduced failure string.
    pub fn error(id: RequestId, channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            channel: channel.into(),
            status: ResponseStatus::Error,
            body: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// An unsolicited push message.
///
/// `id` here is a semantic topic name chosen by the emitter (e.g.
/// `"image-update"`), not a numeric correlation id; any number of listeners
/// may be subscribed to it on the caller side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub id: String,
    pub body: Value,
}

/// Inbound shapes the caller recognizes, classified by structure.
///
/// A response carries `status` and a numeric `id`; a notification carries a
/// string `id` plus `body`. Anything matching neither is dropped by the
/// caller's intake loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallerInbound {
    Response(ResponseEnvelope),
    Notification(NotificationEnvelope),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_classifies_before_notification() {
        let message = json!({
            "id": 3,
            "channel": "Foo.bar",
            "status": "success",
            "body": 42,
        });
        match serde_json::from_value(message).unwrap() {
            CallerInbound::Response(response) => {
                assert_eq!(response.id, 3);
                assert_eq!(response.channel, "Foo.bar");
                assert_eq!(response.status, ResponseStatus::Success);
                assert_eq!(response.body, json!(42));
                assert_eq!(response.error, None);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn notification_classifies_by_string_id() {
        let message = json!({ "id": "image-update", "body": {} });
        match serde_json::from_value(message).unwrap() {
            CallerInbound::Notification(notification) => {
                assert_eq!(notification.id, "image-update");
                assert_eq!(notification.body, json!({}));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn garbage_matches_neither_shape() {
        assert!(serde_json::from_value::<CallerInbound>(json!("hello")).is_err());
        assert!(serde_json::from_value::<CallerInbound>(json!({ "id": 1 })).is_err());
        // A bare request is not something the caller should ever act on.
        assert!(
            serde_json::from_value::<CallerInbound>(json!({
                "id": 1,
                "channel": "Foo.bar",
                "args": [],
            }))
            .is_err()
        );
    }

    #[test]
    fn request_args_default_to_empty() {
        let request: RequestEnvelope =
            serde_json::from_value(json!({ "id": 1, "channel": "Foo.bar" })).unwrap();
        assert!(request.args.is_empty());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ResponseStatus::Success).unwrap(),
            json!("success")
        );
        assert_eq!(
            serde_json::to_value(ResponseStatus::Error).unwrap(),
            json!("error")
        );
    }

    #[test]
    fn success_body_is_always_serialized() {
        let wire = serde_json::to_value(ResponseEnvelope::success(1, "Foo.bar", Value::Null))
            .unwrap();
        let object = wire.as_object().unwrap();
        assert_eq!(object.get("body"), Some(&Value::Null));
        assert!(!object.contains_key("error"));
    }

    #[test]
    fn error_response_carries_string_and_null_body() {
        let wire =
            serde_json::to_value(ResponseEnvelope::error(2, "Foo.bar", "boom")).unwrap();
        let object = wire.as_object().unwrap();
        assert_eq!(object.get("status"), Some(&json!("error")));
        assert_eq!(object.get("error"), Some(&json!("boom")));
        assert_eq!(object.get("body"), Some(&Value::Null));
    }
}
