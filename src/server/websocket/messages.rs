//! WebSocket message types.
//!
//! A generic envelope carries all traffic in both directions; the `type`
//! field routes, the payload is free-form JSON.

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: serde_json::Value,
}

impl ServerMessage {
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// System-level messages used by the WebSocket infrastructure itself.
pub mod system {
    use serde::{Deserialize, Serialize};

    /// Sent immediately after the connection is established.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Connected {
        pub session_id: String,
        pub server_version: String,
    }

    /// Client acknowledgment that a notification reached the device.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Ack {
        pub notification_id: i64,
    }

    /// Sent after all missed notifications have been replayed on reconnect.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct ReplayComplete {
        pub replayed: usize,
    }

    /// Client request to replay notifications after a cursor.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct ReplayRequest {
        pub last_seen_id: i64,
    }

    /// Broadcast when an entity changed as a side effect of a dispatch.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct EntityChanged {
        pub entity: String,
        pub id: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Client heartbeat request.
    pub const PING: &str = "ping";
    /// Server heartbeat response.
    pub const PONG: &str = "pong";
    /// Server error response.
    pub const ERROR: &str = "error";
    /// A notification pushed to the client (server -> client).
    pub const NOTIFICATION: &str = "notification";
    /// Client acknowledgment of a notification (client -> server).
    pub const ACK: &str = "ack";
    /// Reconnect replay finished (server -> client).
    pub const REPLAY_COMPLETE: &str = "replay_complete";
    /// Client request to replay everything after a cursor (client -> server).
    pub const REPLAY_REQUEST: &str = "replay_request";
    /// An entity the seller is looking at changed (server -> client).
    pub const ENTITY_CHANGED: &str = "entity_changed";
}
