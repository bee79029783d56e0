//! spawn_blocking wrappers over the synchronous store for the session
//! layer. rusqlite calls are blocking I/O and must never run on the
//! async executor or while the registry lock is held.
//!
//! Failures collapse to None: the session layer treats any persistence
//! failure as fatal to the in-flight operation only.

use tokio::task::spawn_blocking;

use crate::chat::presence;
use crate::db::models::HistoryRow;
use crate::db::{store, DbPool};

/// Handshake step 5 + 6: advance the read cursor to the latest message,
/// then fetch the full ordered history.
pub async fn mark_read_and_history(
    db: &DbPool,
    room_id: i64,
    user_id: i64,
) -> Option<Vec<HistoryRow>> {
    let db = db.clone();
    spawn_blocking(move || {
        let conn = db.lock().ok()?;
        presence::mark_read(&conn, room_id, user_id).ok()?;
        store::history(&conn, room_id).ok()
    })
    .await
    .ok()
    .flatten()
}

pub async fn append_message(db: &DbPool, room_id: i64, sender_id: i64, body: &str) -> Option<i64> {
    let db = db.clone();
    let body = body.to_string();
    spawn_blocking(move || {
        let conn = db.lock().ok()?;
        store::append_message(&conn, room_id, sender_id, &body).ok()
    })
    .await
    .ok()
    .flatten()
}

pub async fn unread_count(db: &DbPool, room_id: i64, user_id: i64) -> Option<i64> {
    let db = db.clone();
    spawn_blocking(move || {
        let conn = db.lock().ok()?;
        presence::unread_count(&conn, room_id, user_id).ok()
    })
    .await
    .ok()
    .flatten()
}
