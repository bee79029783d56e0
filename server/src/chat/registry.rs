//! In-memory connection registry.
//!
//! Multiplexes live WebSocket connections onto users and rooms. Holds three
//! indices: user -> connections, room -> connections, and per-connection
//! metadata. All structural mutation is serialized by a single mutex;
//! delivery happens on a snapshot taken under the lock, so a recipient
//! failing mid-broadcast cannot corrupt the set being iterated and one slow
//! connection cannot stall registration of unrelated ones.
//!
//! The registry performs no I/O itself. Delivery goes through each
//! connection's unbounded mpsc sender; a failed send means the connection's
//! writer task is gone, which triggers that connection's unregistration.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// Sender half of a connection's outbound channel. Any part of the system
/// can clone this to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Opaque handle for a live connection, allocated from a process-wide
/// counter. Used as the map key instead of the socket object itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

struct ConnMeta {
    user_id: i64,
    room_id: i64,
    sender: ConnectionSender,
}

#[derive(Default)]
struct Indices {
    by_user: HashMap<i64, HashSet<ConnId>>,
    by_room: HashMap<i64, HashSet<ConnId>>,
    meta: HashMap<ConnId, ConnMeta>,
}

/// Explicitly constructed registry, shared behind Arc in AppState.
/// Independent instances are fully isolated, so tests can build their own.
#[derive(Default)]
pub struct Registry {
    next_id: AtomicU64,
    inner: Mutex<Indices>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Indices> {
        // A poisoned mutex only means another thread panicked mid-mutation;
        // the indices are still structurally sound maps, so recover.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Accept a connection into the user and room indices and record its
    /// metadata. Returns the handle used for all later operations.
    pub fn register(&self, user_id: i64, room_id: i64, sender: ConnectionSender) -> ConnId {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.lock();
        inner.by_user.entry(user_id).or_default().insert(id);
        inner.by_room.entry(room_id).or_default().insert(id);
        inner.meta.insert(id, ConnMeta { user_id, room_id, sender });
        drop(inner);

        tracing::debug!(user_id, room_id, conn = id.0, "Connection registered");
        id
    }

    /// Remove a connection from its user-set and room-set, pruning empty
    /// sets, and discard its metadata. Idempotent: unregistering a
    /// connection that is already gone is a no-op, not an error.
    pub fn unregister(&self, id: ConnId) {
        let mut inner = self.lock();
        let Some(meta) = inner.meta.remove(&id) else {
            return;
        };

        if let Some(set) = inner.by_user.get_mut(&meta.user_id) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_user.remove(&meta.user_id);
            }
        }
        if let Some(set) = inner.by_room.get_mut(&meta.room_id) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_room.remove(&meta.room_id);
            }
        }
        drop(inner);

        tracing::debug!(
            user_id = meta.user_id,
            room_id = meta.room_id,
            conn = id.0,
            "Connection unregistered"
        );
    }

    /// Deliver one frame to every connection currently in the room.
    /// The render closure receives the recipient's user id, so each
    /// recipient gets its own copy (per-recipient isMe tagging).
    /// A failed delivery unregisters that connection only.
    pub fn broadcast_to_room<F>(&self, room_id: i64, render: F)
    where
        F: Fn(i64) -> Message,
    {
        let recipients: Vec<(ConnId, i64, ConnectionSender)> = {
            let inner = self.lock();
            match inner.by_room.get(&room_id) {
                Some(set) => set
                    .iter()
                    .filter_map(|id| {
                        inner
                            .meta
                            .get(id)
                            .map(|m| (*id, m.user_id, m.sender.clone()))
                    })
                    .collect(),
                None => return,
            }
        };

        let mut failed = Vec::new();
        for (id, user_id, sender) in recipients {
            if sender.send(render(user_id)).is_err() {
                failed.push(id);
            }
        }
        for id in failed {
            self.unregister(id);
        }
    }

    /// Deliver one frame to every live connection of a user (a user may be
    /// connected from several devices). Missing user means no recipients,
    /// not an error.
    pub fn send_to_user(&self, user_id: i64, message: Message) {
        let recipients: Vec<(ConnId, ConnectionSender)> = {
            let inner = self.lock();
            match inner.by_user.get(&user_id) {
                Some(set) => set
                    .iter()
                    .filter_map(|id| inner.meta.get(id).map(|m| (*id, m.sender.clone())))
                    .collect(),
                None => return,
            }
        };

        let mut failed = Vec::new();
        for (id, sender) in recipients {
            if sender.send(message.clone()).is_err() {
                failed.push(id);
            }
        }
        for id in failed {
            self.unregister(id);
        }
    }

    /// True iff at least one of the user's live connections currently has
    /// this room as its active room. Decides whether a new-message push
    /// notification is needed versus the user already seeing the broadcast.
    pub fn is_user_present_in_room(&self, user_id: i64, room_id: i64) -> bool {
        let inner = self.lock();
        let Some(set) = inner.by_user.get(&user_id) else {
            return false;
        };
        set.iter()
            .any(|id| inner.meta.get(id).is_some_and(|m| m.room_id == room_id))
    }

    /// Number of live connections for a user. Zero means offline.
    pub fn connection_count(&self, user_id: i64) -> usize {
        self.lock().by_user.get(&user_id).map_or(0, |s| s.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn frame(text: &str) -> Message {
        Message::Text(text.to_string().into())
    }

    fn connect(
        reg: &Registry,
        user_id: i64,
        room_id: i64,
    ) -> (ConnId, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        (reg.register(user_id, room_id, tx), rx)
    }

    #[test]
    fn register_then_unregister_updates_presence() {
        let reg = Registry::new();
        let (conn, _rx) = connect(&reg, 1, 10);

        assert!(reg.is_user_present_in_room(1, 10));
        assert!(!reg.is_user_present_in_room(1, 11));
        assert!(!reg.is_user_present_in_room(2, 10));

        reg.unregister(conn);
        assert!(!reg.is_user_present_in_room(1, 10));
        assert_eq!(reg.connection_count(1), 0);

        // Double unregister is safe
        reg.unregister(conn);
    }

    #[test]
    fn multi_device_presence() {
        let reg = Registry::new();
        let (a, _rx_a) = connect(&reg, 1, 10);
        let (_b, _rx_b) = connect(&reg, 1, 20);

        // Present in both rooms while both devices are live
        assert!(reg.is_user_present_in_room(1, 10));
        assert!(reg.is_user_present_in_room(1, 20));
        assert_eq!(reg.connection_count(1), 2);

        reg.unregister(a);
        assert!(!reg.is_user_present_in_room(1, 10));
        assert!(reg.is_user_present_in_room(1, 20));
    }

    #[test]
    fn broadcast_reaches_everyone_with_per_recipient_render() {
        let reg = Registry::new();
        let (_a, mut rx_a) = connect(&reg, 1, 10);
        let (_b, mut rx_b) = connect(&reg, 2, 10);

        reg.broadcast_to_room(10, |recipient| frame(if recipient == 1 { "me" } else { "them" }));

        assert_eq!(rx_a.try_recv().unwrap(), frame("me"));
        assert_eq!(rx_b.try_recv().unwrap(), frame("them"));
    }

    #[test]
    fn broadcast_to_unknown_room_is_a_no_op() {
        let reg = Registry::new();
        reg.broadcast_to_room(99, |_| frame("x"));
        reg.send_to_user(99, frame("x"));
    }

    #[test]
    fn failed_recipient_is_isolated_and_pruned() {
        let reg = Registry::new();
        let (_a, mut rx_a) = connect(&reg, 1, 10);
        let (_b, rx_b) = connect(&reg, 2, 10);
        let (_c, mut rx_c) = connect(&reg, 3, 10);

        // B's writer task is gone
        drop(rx_b);

        reg.broadcast_to_room(10, |_| frame("hello"));

        assert_eq!(rx_a.try_recv().unwrap(), frame("hello"));
        assert_eq!(rx_c.try_recv().unwrap(), frame("hello"));
        assert!(!reg.is_user_present_in_room(2, 10));

        // A follow-up broadcast no longer attempts B
        reg.broadcast_to_room(10, |_| frame("again"));
        assert_eq!(rx_a.try_recv().unwrap(), frame("again"));
        assert_eq!(rx_c.try_recv().unwrap(), frame("again"));
    }

    #[test]
    fn send_to_user_hits_all_devices() {
        let reg = Registry::new();
        let (_a, mut rx_a) = connect(&reg, 1, 10);
        let (_b, mut rx_b) = connect(&reg, 1, 20);
        let (_c, mut rx_c) = connect(&reg, 2, 10);

        reg.send_to_user(1, frame("ping"));

        assert_eq!(rx_a.try_recv().unwrap(), frame("ping"));
        assert_eq!(rx_b.try_recv().unwrap(), frame("ping"));
        assert!(rx_c.try_recv().is_err());
    }
}
