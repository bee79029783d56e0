//! REST endpoints around the chat core: user search, conversation listing,
//! mark-read, and total unread count. JWT auth required on all of them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::{current_active_user, Claims};
use crate::chat::presence;
use crate::db::models::ConversationSummary;
use crate::db::store;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct FoundUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub users: Vec<FoundUser>,
}

/// GET /api/chat/search-users?q= — substring match on username, excluding
/// the caller and disabled accounts. Queries shorter than 2 chars return
/// an empty list.
pub async fn search_users(
    State(state): State<AppState>,
    claims: Claims,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, StatusCode> {
    let user = current_active_user(&state, &claims).await?;

    let query = params.q.trim().to_string();
    if query.len() < 2 {
        return Ok(Json(SearchResponse { users: vec![] }));
    }

    let db = state.db.clone();
    let users = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::search_users(&conn, &query, user.id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(SearchResponse {
        users: users
            .into_iter()
            .map(|(id, username, email)| FoundUser { id, username, email })
            .collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// GET /api/chat/conversations — the caller's rooms with a last message,
/// counterpart identity, and unread count, ordered by recency.
pub async fn conversations(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<ConversationsResponse>, StatusCode> {
    let user = current_active_user(&state, &claims).await?;

    let db = state.db.clone();
    let conversations = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::conversation_list(&conn, user.id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(ConversationsResponse { conversations }))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
}

/// POST /api/chat/mark-read/{room_id} — advance the caller's read cursor
/// to the room's latest message.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<i64>,
) -> Result<Json<MarkReadResponse>, StatusCode> {
    let user = current_active_user(&state, &claims).await?;

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        presence::mark_read(&conn, room_id, user.id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(MarkReadResponse { success: true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

/// GET /api/chat/unread-count — total unread across all conversations.
pub async fn unread_count(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UnreadCountResponse>, StatusCode> {
    let user = current_active_user(&state, &claims).await?;

    let db = state.db.clone();
    let total = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        presence::total_unread_count(&conn, user.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(UnreadCountResponse { unread_count: total }))
}
