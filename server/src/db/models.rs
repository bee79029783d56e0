//! Database row types for all tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use serde::Serialize;

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub disabled: bool,
    pub created_at: String,
}

/// One replayed message from a room's history, joined with the sender's username.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: i64,
    pub sender_id: i64,
    pub body: String,
    pub created_at: String,
    pub sender_username: String,
}

/// One entry in a user's conversation list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub room_id: i64,
    pub other_user_id: i64,
    pub other_username: String,
    pub other_email: String,
    pub last_message: String,
    pub last_message_time: String,
    pub unread_count: i64,
}

/// Public user shape returned by REST endpoints (no password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub disabled: bool,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            disabled: u.disabled,
        }
    }
}
