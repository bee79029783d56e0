//! JSON wire protocol for the chat WebSocket.
//!
//! Frames are JSON text messages. Field names are camelCase to match the
//! client. Server-to-client frames carry a `type` discriminator.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

/// Client-to-server frame. Anything without a non-empty `message` is
/// silently ignored.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub message: Option<String>,
}

/// Server-to-client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// One replayed message during handshake history replay.
    #[serde(rename_all = "camelCase")]
    History {
        id: i64,
        data: String,
        sender_id: i64,
        sender_username: String,
        timestamp: String,
        is_me: bool,
    },
    /// Handshake confirmation carrying the resolved room id. Sent once.
    #[serde(rename_all = "camelCase")]
    Info { info: String, room_id: i64 },
    /// Presence announcement to the counterpart user.
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: i64, username: String },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: i64, username: String },
    /// One live message, rendered per recipient (isMe differs).
    #[serde(rename_all = "camelCase")]
    Chat {
        id: i64,
        room_id: i64,
        data: String,
        sender_id: i64,
        sender_username: String,
        is_me: bool,
    },
    /// Out-of-band push to a counterpart who is connected but viewing a
    /// different conversation.
    #[serde(rename_all = "camelCase")]
    NewMessageNotification {
        from_user_id: i64,
        from_username: String,
        message: String,
        room_id: i64,
        unread_count: i64,
    },
}

impl ServerEvent {
    /// Render as a WebSocket text frame. Serialization of these variants
    /// cannot fail; an empty frame is the fallback rather than a panic in
    /// the delivery path.
    pub fn to_message(&self) -> Message {
        let json = serde_json::to_string(self).unwrap_or_default();
        Message::Text(json.into())
    }
}
