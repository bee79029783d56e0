//! Presence announcements and read-cursor tracking.
//!
//! The three cursor operations here are the only readers/writers of the
//! read_cursors table from the session layer. A cursor never moves
//! backward: the upsert keeps the maximum of the stored and offered ids.

use rusqlite::{params, Connection, OptionalExtension};

use crate::chat::protocol::ServerEvent;
use crate::chat::registry::Registry;

/// Highest message id the user has acknowledged in the room; 0 if the user
/// has never visited it.
pub fn get_cursor(conn: &Connection, user_id: i64, room_id: i64) -> rusqlite::Result<i64> {
    let cursor: Option<i64> = conn
        .query_row(
            "SELECT last_read_message_id FROM read_cursors WHERE user_id = ?1 AND room_id = ?2",
            params![user_id, room_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(cursor.unwrap_or(0))
}

/// Monotonic upsert: the cursor only ever advances.
pub fn set_cursor(
    conn: &Connection,
    user_id: i64,
    room_id: i64,
    message_id: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO read_cursors (user_id, room_id, last_read_message_id)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id, room_id) DO UPDATE SET
             last_read_message_id = MAX(last_read_message_id, excluded.last_read_message_id)",
        params![user_id, room_id, message_id],
    )?;
    Ok(())
}

/// Mark the room read up to its latest message for the user. Entering a
/// room implies having seen everything currently in it. No-op when the
/// room has no messages yet.
pub fn mark_read(conn: &Connection, room_id: i64, user_id: i64) -> rusqlite::Result<()> {
    let latest: Option<i64> = conn.query_row(
        "SELECT MAX(id) FROM chat_messages WHERE room_id = ?1",
        params![room_id],
        |row| row.get(0),
    )?;

    match latest {
        Some(id) if id > 0 => set_cursor(conn, user_id, room_id, id),
        _ => Ok(()),
    }
}

/// Messages in the room authored by someone else with id greater than the
/// user's cursor (absent cursor counts as 0).
pub fn unread_count(conn: &Connection, room_id: i64, user_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM chat_messages cm
         WHERE cm.room_id = ?1
           AND cm.sender_id != ?2
           AND cm.id > COALESCE((SELECT last_read_message_id
                                 FROM read_cursors
                                 WHERE user_id = ?2 AND room_id = ?1), 0)",
        params![room_id, user_id],
        |row| row.get(0),
    )
}

/// Total unread across every room the user participates in, as a single
/// aggregate query.
pub fn total_unread_count(conn: &Connection, user_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM chat_messages cm
         JOIN chat_rooms cr ON cm.room_id = cr.id
         WHERE (cr.user1_id = ?1 OR cr.user2_id = ?1)
           AND cm.sender_id != ?1
           AND cm.id > COALESCE((SELECT last_read_message_id
                                 FROM read_cursors
                                 WHERE user_id = ?1 AND room_id = cm.room_id), 0)",
        params![user_id],
        |row| row.get(0),
    )
}

/// Best-effort online announcement to the counterpart. Dropped if they
/// have no live connection.
pub fn announce_online(registry: &Registry, counterpart_id: i64, user_id: i64, username: &str) {
    registry.send_to_user(
        counterpart_id,
        ServerEvent::UserOnline {
            user_id,
            username: username.to_string(),
        }
        .to_message(),
    );
}

/// Best-effort offline announcement to the counterpart.
pub fn announce_offline(registry: &Registry, counterpart_id: i64, user_id: i64, username: &str) {
    registry.send_to_user(
        counterpart_id,
        ServerEvent::UserOffline {
            user_id,
            username: username.to_string(),
        }
        .to_message(),
    );
}
