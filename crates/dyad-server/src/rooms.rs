//! Conversation room multiplexer: routing scope for realtime events.
//!
//! Owns the per-connection outbound senders and the per-conversation
//! membership sets.  Delivery is fire-and-forget: a peer whose receiver has
//! gone away is skipped, and no acknowledgement is tracked.
//!
//! Room membership is independent of authentication; event handlers that
//! need an identity enforce that against the registry, not here.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, Mutex};

use dyad_shared::{ConversationId, ServerEvent};

use crate::registry::ConnectionId;

type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
struct Inner {
    peers: HashMap<ConnectionId, EventSender>,
    rooms: HashMap<ConversationId, HashSet<ConnectionId>>,
}

/// Groups live connections into per-conversation rooms.
pub struct RoomMultiplexer {
    inner: Mutex<Inner>,
}

impl RoomMultiplexer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a connection's outbound sender.  Must happen before the
    /// connection can receive any event.
    pub async fn register_peer(&self, connection: ConnectionId, sender: EventSender) {
        self.inner.lock().await.peers.insert(connection, sender);
    }

    /// Drop a connection's sender and all of its room memberships.
    pub async fn unregister_peer(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock().await;
        inner.peers.remove(&connection);
        inner.rooms.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    /// Add a connection to a room.  Idempotent; no membership cap.
    pub async fn join_room(&self, connection: ConnectionId, room: ConversationId) {
        self.inner
            .lock()
            .await
            .rooms
            .entry(room)
            .or_default()
            .insert(connection);
    }

    /// Deliver an event to every member of a room, optionally skipping one
    /// connection (used by typing events to exclude the sender).
    pub async fn broadcast_to_room(
        &self,
        room: &ConversationId,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) {
        let inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get(room) else {
            return;
        };

        for connection in members {
            if Some(*connection) == except {
                continue;
            }
            if let Some(sender) = inner.peers.get(connection) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Deliver an event to exactly one connection.
    pub async fn emit_to(&self, connection: ConnectionId, event: &ServerEvent) {
        let inner = self.inner.lock().await;
        if let Some(sender) = inner.peers.get(&connection) {
            let _ = sender.send(event.clone());
        }
    }

    /// Deliver an event to every registered connection, optionally skipping
    /// one (presence changes are not echoed to their own socket).
    pub async fn broadcast_all(&self, event: &ServerEvent, except: Option<ConnectionId>) {
        let inner = self.inner.lock().await;
        for (connection, sender) in &inner.peers {
            if Some(*connection) == except {
                continue;
            }
            let _ = sender.send(event.clone());
        }
    }
}

impl Default for RoomMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyad_shared::{Presence, UserId};

    fn presence_event() -> ServerEvent {
        ServerEvent::PresenceChanged {
            user_id: UserId::new(),
            status: Presence::Online,
            last_seen: None,
        }
    }

    fn peer() -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionId::new(), rx, tx)
    }

    #[tokio::test]
    async fn room_broadcast_reaches_members_only() {
        let rooms = RoomMultiplexer::new();
        let room = ConversationId::from_string("room".into());

        let (a, mut a_rx, a_tx) = peer();
        let (b, mut b_rx, b_tx) = peer();
        let (outsider, mut outsider_rx, outsider_tx) = peer();
        rooms.register_peer(a, a_tx).await;
        rooms.register_peer(b, b_tx).await;
        rooms.register_peer(outsider, outsider_tx).await;

        rooms.join_room(a, room.clone()).await;
        rooms.join_room(b, room.clone()).await;
        // Joining twice is a no-op.
        rooms.join_room(b, room.clone()).await;

        rooms.broadcast_to_room(&room, &presence_event(), None).await;

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
        assert!(outsider_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_broadcast_can_skip_sender() {
        let rooms = RoomMultiplexer::new();
        let room = ConversationId::from_string("room".into());

        let (a, mut a_rx, a_tx) = peer();
        let (b, mut b_rx, b_tx) = peer();
        rooms.register_peer(a, a_tx).await;
        rooms.register_peer(b, b_tx).await;
        rooms.join_room(a, room.clone()).await;
        rooms.join_room(b, room.clone()).await;

        rooms
            .broadcast_to_room(&room, &presence_event(), Some(a))
            .await;

        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn emit_to_targets_one_connection() {
        let rooms = RoomMultiplexer::new();
        let (a, mut a_rx, a_tx) = peer();
        let (b, mut b_rx, b_tx) = peer();
        rooms.register_peer(a, a_tx).await;
        rooms.register_peer(b, b_tx).await;

        rooms.emit_to(a, &presence_event()).await;

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_drops_memberships_and_sender() {
        let rooms = RoomMultiplexer::new();
        let room = ConversationId::from_string("room".into());

        let (a, mut a_rx, a_tx) = peer();
        rooms.register_peer(a, a_tx).await;
        rooms.join_room(a, room.clone()).await;

        rooms.unregister_peer(a).await;

        rooms.broadcast_to_room(&room, &presence_event(), None).await;
        rooms.broadcast_all(&presence_event(), None).await;
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delivery_survives_dropped_receiver() {
        let rooms = RoomMultiplexer::new();
        let (a, a_rx, a_tx) = peer();
        let (b, mut b_rx, b_tx) = peer();
        rooms.register_peer(a, a_tx).await;
        rooms.register_peer(b, b_tx).await;
        drop(a_rx);

        // Fire-and-forget: the dead peer is skipped, the live one still
        // receives.
        rooms.broadcast_all(&presence_event(), None).await;
        assert!(b_rx.try_recv().is_ok());
    }
}
