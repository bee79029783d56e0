//! Actor-per-connection session loop.
//!
//! The socket is split into reader and writer halves. The writer task owns
//! the sink and forwards frames from an mpsc channel; the registry holds a
//! clone of the sender so any part of the system can push frames to this
//! client. The reader loop is the only suspension point of the session:
//! every action is triggered by an inbound frame or a disconnect.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::chat::presence;
use crate::chat::protocol::{ClientFrame, ServerEvent};
use crate::chat::store_async;
use crate::state::AppState;

/// Resolved handshake output: who is attached, to whom, in which room.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: i64,
    pub username: String,
    pub recipient_id: i64,
    pub room_id: i64,
}

/// Handshake steps 4-8 and the message distribution loop for one
/// authenticated connection.
pub async fn run_connection(socket: WebSocket, state: AppState, ctx: SessionContext) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let conn_id = state
        .registry
        .register(ctx.user_id, ctx.room_id, tx.clone());

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Entering the room implies having seen everything currently in it,
    // then the full history is replayed in creation order.
    let replay = store_async::mark_read_and_history(&state.db, ctx.room_id, ctx.user_id).await;
    let Some(rows) = replay else {
        tracing::error!(
            user_id = ctx.user_id,
            room_id = ctx.room_id,
            "History replay failed, closing connection"
        );
        let _ = tx.send(Message::Close(Some(CloseFrame {
            code: 1011,
            reason: "Internal error".into(),
        })));
        state.registry.unregister(conn_id);
        return;
    };

    for row in rows {
        let event = ServerEvent::History {
            id: row.id,
            data: row.body,
            sender_id: row.sender_id,
            sender_username: row.sender_username,
            timestamp: row.created_at,
            is_me: row.sender_id == ctx.user_id,
        };
        if tx.send(event.to_message()).is_err() {
            break;
        }
    }

    let _ = tx.send(
        ServerEvent::Info {
            info: "Connected to chat room".to_string(),
            room_id: ctx.room_id,
        }
        .to_message(),
    );

    presence::announce_online(&state.registry, ctx.recipient_id, ctx.user_id, &ctx.username);

    tracing::info!(
        user_id = ctx.user_id,
        room_id = ctx.room_id,
        "Chat session started"
    );

    // Reader loop: the sole suspension point of the session.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    handle_inbound(&state, &ctx, &text).await;
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::debug!(user_id = ctx.user_id, "Ignoring binary frame");
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = ctx.user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id = ctx.user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => break,
        }
    }

    writer_handle.abort();
    state.registry.unregister(conn_id);

    presence::announce_offline(&state.registry, ctx.recipient_id, ctx.user_id, &ctx.username);

    tracing::info!(
        user_id = ctx.user_id,
        room_id = ctx.room_id,
        "Chat session ended"
    );
}

/// One inbound chat payload: persist, fan out to the room with
/// per-recipient isMe tagging, and notify an absent counterpart.
async fn handle_inbound(state: &AppState, ctx: &SessionContext, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(user_id = ctx.user_id, error = %e, "Ignoring malformed frame");
            return;
        }
    };

    // Missing or empty message text is a no-op, not a protocol violation.
    let Some(body) = frame.message.filter(|m| !m.is_empty()) else {
        return;
    };

    // Not broadcast unless durably appended.
    let Some(message_id) =
        store_async::append_message(&state.db, ctx.room_id, ctx.user_id, &body).await
    else {
        tracing::error!(
            user_id = ctx.user_id,
            room_id = ctx.room_id,
            "Message append failed, dropping"
        );
        return;
    };

    let (sender_id, sender_username) = (ctx.user_id, ctx.username.clone());
    let (room_id, body_for_room) = (ctx.room_id, body.clone());
    state.registry.broadcast_to_room(room_id, move |recipient| {
        ServerEvent::Chat {
            id: message_id,
            room_id,
            data: body_for_room.clone(),
            sender_id,
            sender_username: sender_username.clone(),
            is_me: recipient == sender_id,
        }
        .to_message()
    });

    // A counterpart who is connected but viewing another conversation
    // still learns of the message through an out-of-band notification.
    if !state
        .registry
        .is_user_present_in_room(ctx.recipient_id, ctx.room_id)
    {
        let Some(unread) =
            store_async::unread_count(&state.db, ctx.room_id, ctx.recipient_id).await
        else {
            return;
        };
        state.registry.send_to_user(
            ctx.recipient_id,
            ServerEvent::NewMessageNotification {
                from_user_id: ctx.user_id,
                from_username: ctx.username.clone(),
                message: body,
                room_id: ctx.room_id,
                unread_count: unread,
            }
            .to_message(),
        );
    }
}

/// Writer task: forwards frames from the mpsc channel to the sink. Exits
/// when the channel closes or a send fails, which the registry observes as
/// a dead connection on the next delivery attempt.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}
