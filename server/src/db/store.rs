//! Narrow query/command interface over the durable store.
//!
//! All functions are synchronous and take a borrowed connection; async
//! callers go through tokio::task::spawn_blocking with the shared DbPool.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{ConversationSummary, HistoryRow, User};

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        hashed_password: row.get(3)?,
        disabled: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

const USER_COLUMNS: &str = "id, username, email, hashed_password, disabled, created_at";

pub fn user_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        user_from_row,
    )
    .optional()
}

pub fn user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        user_from_row,
    )
    .optional()
}

/// Insert a new user. Fails with a constraint violation if the username
/// or email is already taken.
pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    hashed_password: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (username, email, hashed_password) VALUES (?1, ?2, ?3)",
        params![username, email, hashed_password],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Resolve the canonical room for a user pair, creating it on first contact.
/// The pair is stored smaller id first, so (a, b) and (b, a) always resolve
/// to the same room.
pub fn resolve_or_create_room(conn: &Connection, user_a: i64, user_b: i64) -> rusqlite::Result<i64> {
    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM chat_rooms WHERE user1_id = ?1 AND user2_id = ?2 LIMIT 1",
            params![lo, hi],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(room_id) = existing {
        return Ok(room_id);
    }

    conn.execute(
        "INSERT INTO chat_rooms (user1_id, user2_id) VALUES (?1, ?2)",
        params![lo, hi],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Append a message and return its assigned id.
pub fn append_message(
    conn: &Connection,
    room_id: i64,
    sender_id: i64,
    body: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO chat_messages (room_id, sender_id, body) VALUES (?1, ?2, ?3)",
        params![room_id, sender_id, body],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Full ordered history for a room, ascending by creation order.
pub fn history(conn: &Connection, room_id: i64) -> rusqlite::Result<Vec<HistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT cm.id, cm.sender_id, cm.body, cm.created_at, u.username
         FROM chat_messages cm
         JOIN users u ON cm.sender_id = u.id
         WHERE cm.room_id = ?1
         ORDER BY cm.created_at ASC, cm.id ASC",
    )?;
    let rows = stmt.query_map(params![room_id], |row| {
        Ok(HistoryRow {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            body: row.get(2)?,
            created_at: row.get(3)?,
            sender_username: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Substring search on username, excluding the caller and disabled users.
pub fn search_users(
    conn: &Connection,
    query: &str,
    exclude_user_id: i64,
) -> rusqlite::Result<Vec<(i64, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email
         FROM users
         WHERE username LIKE ?1 AND id != ?2 AND disabled = 0
         ORDER BY username
         LIMIT 20",
    )?;
    let pattern = format!("%{}%", query);
    let rows = stmt.query_map(params![pattern, exclude_user_id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    rows.collect()
}

/// The caller's conversation list: every room with at least one message,
/// with the counterpart's identity, the latest message, and the unread
/// count relative to the caller's read cursor. Ordered by recency.
pub fn conversation_list(
    conn: &Connection,
    user_id: i64,
) -> rusqlite::Result<Vec<ConversationSummary>> {
    let mut stmt = conn.prepare(
        "SELECT
            cr.id,
            CASE WHEN cr.user1_id = ?1 THEN cr.user2_id ELSE cr.user1_id END,
            CASE WHEN cr.user1_id = ?1 THEN u2.username ELSE u1.username END,
            CASE WHEN cr.user1_id = ?1 THEN u2.email ELSE u1.email END,
            (SELECT cm.body FROM chat_messages cm
             WHERE cm.room_id = cr.id
             ORDER BY cm.created_at DESC, cm.id DESC LIMIT 1),
            (SELECT cm.created_at FROM chat_messages cm
             WHERE cm.room_id = cr.id
             ORDER BY cm.created_at DESC, cm.id DESC LIMIT 1),
            (SELECT COUNT(*) FROM chat_messages cm
             WHERE cm.room_id = cr.id
               AND cm.sender_id != ?1
               AND cm.id > COALESCE((SELECT last_read_message_id
                                     FROM read_cursors
                                     WHERE user_id = ?1 AND room_id = cr.id), 0))
         FROM chat_rooms cr
         JOIN users u1 ON cr.user1_id = u1.id
         JOIN users u2 ON cr.user2_id = u2.id
         WHERE (cr.user1_id = ?1 OR cr.user2_id = ?1)
           AND EXISTS (SELECT 1 FROM chat_messages cm WHERE cm.room_id = cr.id)
         ORDER BY 6 DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(ConversationSummary {
            room_id: row.get(0)?,
            other_user_id: row.get(1)?,
            other_username: row.get(2)?,
            other_email: row.get(3)?,
            last_message: row.get(4)?,
            last_message_time: row.get(5)?,
            unread_count: row.get(6)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db_in_memory;

    fn seed_user(conn: &Connection, name: &str) -> i64 {
        create_user(conn, name, &format!("{name}@example.com"), "x").unwrap()
    }

    #[test]
    fn room_resolution_is_commutative() {
        let db = init_db_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let alice = seed_user(&conn, "alice");
        let bob = seed_user(&conn, "bob");

        let r1 = resolve_or_create_room(&conn, alice, bob).unwrap();
        let r2 = resolve_or_create_room(&conn, bob, alice).unwrap();
        assert_eq!(r1, r2);

        // No second room appears for the same pair
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_rooms", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = init_db_in_memory().unwrap();
        let conn = db.lock().unwrap();
        seed_user(&conn, "alice");
        assert!(create_user(&conn, "alice", "other@example.com", "x").is_err());
    }

    #[test]
    fn history_is_ascending_and_joined_with_sender() {
        let db = init_db_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let alice = seed_user(&conn, "alice");
        let bob = seed_user(&conn, "bob");
        let room = resolve_or_create_room(&conn, alice, bob).unwrap();

        append_message(&conn, room, alice, "first").unwrap();
        append_message(&conn, room, bob, "second").unwrap();

        let rows = history(&conn, room).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].body, "first");
        assert_eq!(rows[0].sender_username, "alice");
        assert_eq!(rows[1].body, "second");
        assert!(rows[0].id < rows[1].id);
    }

    #[test]
    fn search_excludes_caller_and_disabled() {
        let db = init_db_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let alice = seed_user(&conn, "alice");
        seed_user(&conn, "alina");
        let archie = seed_user(&conn, "archie");
        conn.execute("UPDATE users SET disabled = 1 WHERE id = ?1", params![archie])
            .unwrap();

        let found = search_users(&conn, "al", alice).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, "alina");
    }

    #[test]
    fn conversation_list_reports_last_message_and_unread() {
        let db = init_db_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let alice = seed_user(&conn, "alice");
        let bob = seed_user(&conn, "bob");
        let room = resolve_or_create_room(&conn, alice, bob).unwrap();

        // Empty room does not show up
        assert!(conversation_list(&conn, alice).unwrap().is_empty());

        append_message(&conn, room, bob, "hey").unwrap();
        append_message(&conn, room, bob, "you there?").unwrap();

        let list = conversation_list(&conn, alice).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].room_id, room);
        assert_eq!(list[0].other_username, "bob");
        assert_eq!(list[0].last_message, "you there?");
        assert_eq!(list[0].unread_count, 2);

        // Bob authored both, so his own list shows zero unread
        let bob_list = conversation_list(&conn, bob).unwrap();
        assert_eq!(bob_list[0].unread_count, 0);
    }
}
