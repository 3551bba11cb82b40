//! Chat wire-format types.
//!
//! Inbound frames are JSON objects with a `type` discriminator. Control
//! replies are JSON [`ControlResponse`] objects; chat broadcasts are plain
//! `"{identity}: {text}"` strings and are not wrapped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of the fallback reply for frames that are not chat requests.
pub const ECHO_PREFIX: &str = "Data from server: ";

/// Reply sent by the legacy `/test` endpoint.
pub const TEST_ENDPOINT_REPLY: &str = "Data from server";

/// Successful sign-in message.
pub const SIGNED_IN: &str = "Logged in!";
/// Successful sign-up message.
pub const SIGNED_UP: &str = "Signed up!";
/// Chat attempted without signing in.
pub const LOGIN_REQUIRED: &str = "Must be logged in to send messages";
/// Frame decoded to JSON `null`.
pub const INVALID_FORMAT: &str = "Invalid message format";
/// Registration could not be persisted.
pub const SAVE_FAILED: &str = "Failed to save user";

/// Raw inbound frame as it appears on the wire.
///
/// Missing fields default to the empty string. Unknown fields are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
    username: String,
    password: String,
    content: String,
}

/// A decoded inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundRequest {
    /// `{"type":"signin", "username", "password"}`.
    SignIn {
        /// Identity to sign in as.
        identity: String,
        /// Plaintext secret.
        secret: String,
    },
    /// `{"type":"signup", "username", "password"}`.
    SignUp {
        /// Identity to register.
        identity: String,
        /// Plaintext secret.
        secret: String,
    },
    /// `{"type":"message", "content"}`.
    ChatMessage {
        /// Chat text.
        text: String,
    },
    /// The frame was the JSON literal `null`.
    Invalid,
    /// Anything else: not JSON, not an object, or an unknown `type`.
    Unrecognized {
        /// The frame exactly as received.
        raw: String,
    },
}

impl InboundRequest {
    /// Decode one inbound text frame.
    ///
    /// Never fails: malformed input becomes [`InboundRequest::Unrecognized`].
    /// The `type` field is matched case-insensitively.
    pub fn decode(raw: &str) -> Self {
        let frame = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Null) => return Self::Invalid,
            Ok(value @ Value::Object(_)) => match serde_json::from_value::<ClientFrame>(value) {
                Ok(frame) => frame,
                Err(_) => return Self::unrecognized(raw),
            },
            Ok(_) | Err(_) => return Self::unrecognized(raw),
        };

        match frame.kind.to_lowercase().as_str() {
            "signin" => Self::SignIn {
                identity: frame.username,
                secret: frame.password,
            },
            "signup" => Self::SignUp {
                identity: frame.username,
                secret: frame.password,
            },
            "message" => Self::ChatMessage {
                text: frame.content,
            },
            _ => Self::unrecognized(raw),
        }
    }

    fn unrecognized(raw: &str) -> Self {
        Self::Unrecognized {
            raw: raw.to_owned(),
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "signin",
            Self::SignUp { .. } => "signup",
            Self::ChatMessage { .. } => "message",
            Self::Invalid => "invalid",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Kind of control response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Reply to a sign-in request.
    Signin,
    /// Reply to a sign-up request.
    Signup,
    /// Request-level error.
    Error,
}

/// Structured reply to a control request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Echoes the request kind, or `error`.
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl ControlResponse {
    /// Build a response.
    pub fn new(kind: ResponseKind, success: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            success,
            message: message.into(),
        }
    }

    /// Build a failed `error` response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResponseKind::Error, false, message)
    }
}

/// Format a chat line for broadcast.
pub fn chat_line(identity: &str, text: &str) -> String {
    format!("{identity}: {text}")
}

/// Format the fallback echo for an unrecognized frame.
pub fn echo_line(raw: &str) -> String {
    format!("{ECHO_PREFIX}{raw}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_signin() {
        let req = InboundRequest::decode(r#"{"type":"signin","username":"alice","password":"pw"}"#);
        assert_eq!(
            req,
            InboundRequest::SignIn {
                identity: "alice".into(),
                secret: "pw".into()
            }
        );
    }

    #[test]
    fn decode_signup() {
        let req = InboundRequest::decode(r#"{"type":"signup","username":"bob","password":"x"}"#);
        assert_eq!(
            req,
            InboundRequest::SignUp {
                identity: "bob".into(),
                secret: "x".into()
            }
        );
    }

    #[test]
    fn decode_message() {
        let req = InboundRequest::decode(r#"{"type":"message","content":"hi"}"#);
        assert_eq!(req, InboundRequest::ChatMessage { text: "hi".into() });
    }

    #[test]
    fn type_match_is_case_insensitive() {
        let req = InboundRequest::decode(r#"{"type":"SignIn","username":"a","password":"b"}"#);
        assert_eq!(req.kind(), "signin");
        let req = InboundRequest::decode(r#"{"type":"MESSAGE","content":"x"}"#);
        assert_eq!(req.kind(), "message");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let req = InboundRequest::decode(r#"{"type":"signin"}"#);
        assert_eq!(
            req,
            InboundRequest::SignIn {
                identity: String::new(),
                secret: String::new()
            }
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let req = InboundRequest::decode(r#"{"type":"message","content":"hi","room":"lobby"}"#);
        assert_eq!(req, InboundRequest::ChatMessage { text: "hi".into() });
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let raw = r#"{"type":"dance"}"#;
        assert_eq!(
            InboundRequest::decode(raw),
            InboundRequest::Unrecognized { raw: raw.into() }
        );
    }

    #[test]
    fn object_without_type_is_unrecognized() {
        let raw = r#"{"content":"hi"}"#;
        assert_eq!(InboundRequest::decode(raw).kind(), "unrecognized");
    }

    #[test]
    fn non_json_is_unrecognized() {
        let raw = "hello there";
        assert_eq!(
            InboundRequest::decode(raw),
            InboundRequest::Unrecognized { raw: raw.into() }
        );
    }

    #[test]
    fn non_object_json_is_unrecognized() {
        for raw in ["[1,2,3]", r#"["signin","a","b",""]"#, "42", r#""text""#, "true"] {
            assert_eq!(InboundRequest::decode(raw).kind(), "unrecognized", "{raw}");
        }
    }

    #[test]
    fn wrong_field_type_is_unrecognized() {
        let raw = r#"{"type":7,"content":"hi"}"#;
        assert_eq!(InboundRequest::decode(raw).kind(), "unrecognized");
    }

    #[test]
    fn null_is_invalid() {
        assert_eq!(InboundRequest::decode("null"), InboundRequest::Invalid);
    }

    #[test]
    fn control_response_wire_shape() {
        let resp = ControlResponse::new(ResponseKind::Signup, true, SIGNED_UP);
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"type":"signup","success":true,"message":"Signed up!"}"#);
    }

    #[test]
    fn error_response_wire_shape() {
        let json = serde_json::to_value(ControlResponse::error(LOGIN_REQUIRED)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Must be logged in to send messages");
    }

    #[test]
    fn chat_and_echo_lines() {
        assert_eq!(chat_line("alice", "hi"), "alice: hi");
        assert_eq!(echo_line("ping"), "Data from server: ping");
    }
}
