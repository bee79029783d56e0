use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::chat::session::{self, SessionContext};
use crate::db::models::User;
use crate::db::store;
use crate::state::AppState;

/// Query parameters for the WebSocket handshake.
/// Auth is via query param since WebSocket clients cannot set headers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub user_id: i64,
    pub recipient_id: i64,
    pub token: String,
}

/// WebSocket close codes for handshake refusal:
/// 4001 = token missing/expired/malformed, or names no known user
/// 4002 = token identity does not match the claimed userId
/// 4003 = a participant does not exist
const CLOSE_TOKEN_INVALID: u16 = 4001;
const CLOSE_IDENTITY_MISMATCH: u16 = 4002;
const CLOSE_INVALID_PARTICIPANT: u16 = 4003;

/// GET /ws?userId=&recipientId=&token=
/// Authenticates and resolves the canonical room before any registry
/// mutation. On refusal, upgrades then immediately closes with a
/// distinguishing close code; the client must re-initiate a fresh
/// handshake, there is no retry.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match prepare_session(&state, &params).await {
        Ok(ctx) => {
            tracing::info!(
                user_id = ctx.user_id,
                recipient_id = ctx.recipient_id,
                room_id = ctx.room_id,
                "WebSocket handshake accepted"
            );
            ws.on_upgrade(move |socket| session::run_connection(socket, state, ctx))
        }
        Err((close_code, reason)) => {
            tracing::warn!(
                user_id = params.user_id,
                close_code,
                reason,
                "WebSocket handshake refused"
            );
            ws.on_upgrade(move |socket| refuse(socket, close_code, reason))
        }
    }
}

async fn refuse(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Handshake steps 1-3: verify the token, resolve both participants,
/// resolve-or-create the canonical room. No state is mutated on failure.
async fn prepare_session(
    state: &AppState,
    params: &WsQuery,
) -> Result<SessionContext, (u16, &'static str)> {
    let claims = jwt::verify_token(&state.jwt_secret, &params.token)
        .ok_or((CLOSE_TOKEN_INVALID, "Invalid token"))?;

    let db = state.db.clone();
    let email = claims.sub.clone();
    let (user_id, recipient_id) = (params.user_id, params.recipient_id);

    type Lookup = (Option<User>, Option<User>);
    let (authenticated, recipient): Lookup = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (1011u16, "Internal error"))?;
        let authenticated =
            store::user_by_email(&conn, &email).map_err(|_| (1011, "Internal error"))?;
        let recipient =
            store::user_by_id(&conn, recipient_id).map_err(|_| (1011, "Internal error"))?;
        Ok((authenticated, recipient))
    })
    .await
    .map_err(|_| (1011u16, "Internal error"))??;

    let authenticated = authenticated.ok_or((CLOSE_TOKEN_INVALID, "Invalid token"))?;
    if authenticated.id != user_id {
        return Err((CLOSE_IDENTITY_MISMATCH, "User ID mismatch"));
    }
    let recipient = recipient.ok_or((CLOSE_INVALID_PARTICIPANT, "Invalid participant"))?;

    let db = state.db.clone();
    let room_id = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| (1011u16, "Internal error"))?;
        store::resolve_or_create_room(&conn, user_id, recipient_id)
            .map_err(|_| (1011, "Internal error"))
    })
    .await
    .map_err(|_| (1011u16, "Internal error"))??;

    Ok(SessionContext {
        user_id: authenticated.id,
        username: authenticated.username,
        recipient_id: recipient.id,
        room_id,
    })
}
