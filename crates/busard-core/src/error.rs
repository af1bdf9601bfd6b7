//! Error types for the proxy core.

use core::fmt;

use serde_json::Value;

/// Transport-level errors.
#[derive(Debug)]
pub enum TransportError {
    /// The transport was closed, locally or by the peer going away.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Failures surfaced to a caller awaiting [`invoke`].
///
/// [`invoke`]: crate::RpcClient::invoke
#[derive(Debug)]
pub enum RpcError {
    Transport(TransportError),
    /// The handler reported an error; carries the exact string off the wire.
    Remote(String),
    /// No response arrived within the call window.
    Timeout { channel: String },
    /// The pending-call table is at capacity; the call was refused.
    Saturated { pending: usize },
    /// A typed client failed to decode a response body.
    Decode(serde_json::Error),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Remote(message) => write!(f, "remote error: {message}"),
            Self::Timeout { channel } => write!(f, "call on {channel} timed out"),
            Self::Saturated { pending } => {
                write!(f, "too many pending calls ({pending}); call refused")
            }
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e)
    }
}

/// Failure raised by a host-side handler.
///
/// Only a single string crosses the boundary: an error-like failure
/// contributes its message, anything else its own string form.
#[derive(Debug)]
pub enum HandlerError {
    /// An error with a message.
    Message(String),
    /// A bare value raised in place of an error.
    Value(Value),
}

impl HandlerError {
    /// The single string sent across the boundary in the response envelope.
    pub fn to_wire_string(&self) -> String {
        match self {
            Self::Message(message) => message.clone(),
            Self::Value(Value::String(text)) => text.clone(),
            Self::Value(value) => value.to_string(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire_string())
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Message(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_crosses_verbatim() {
        assert_eq!(HandlerError::from("boom").to_wire_string(), "boom");
    }

    #[test]
    fn string_value_is_not_requoted() {
        assert_eq!(
            HandlerError::Value(json!("plain")).to_wire_string(),
            "plain"
        );
    }

    #[test]
    fn other_values_use_their_json_form() {
        assert_eq!(
            HandlerError::Value(json!({ "code": 7 })).to_wire_string(),
            r#"{"code":7}"#
        );
        assert_eq!(HandlerError::Value(json!(42)).to_wire_string(), "42");
    }
}
