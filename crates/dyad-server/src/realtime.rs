//! The realtime event router.
//!
//! Each WebSocket connection runs one task here: frames are decoded at the
//! boundary into [`ClientEvent`]s and dispatched to a handler that performs
//! the authoritative store write (if any) and then fans the derived
//! [`ServerEvent`] out through the room multiplexer.  The write always
//! commits before the broadcast, so the store stays ground truth for
//! anything a client saw pushed.
//!
//! Every handler is an isolated unit of failure: a validation, authorization,
//! or persistence error drops that one event (logged, no partial broadcast)
//! and never closes the connection or crashes the process.

use std::sync::Arc;

use axum::extract::ws::{Message as WsFrame, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dyad_shared::{ClientEvent, ConversationId, Presence, ServerEvent, UserId};
use dyad_store::Message;

use crate::api::{AppState, SharedDb};
use crate::auth::TokenService;
use crate::error::ServerError;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::rooms::RoomMultiplexer;
use crate::views;

/// Handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection lifecycle: register the peer, pump frames both ways, and
/// unwind (room memberships, registry binding, presence) on close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    debug!(%connection, "websocket connected");

    let router = EventRouter::new(
        state.db.clone(),
        state.tokens.clone(),
        state.registry.clone(),
        state.rooms.clone(),
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.rooms.register_peer(connection, tx).await;

    let (mut sink, mut stream) = socket.split();

    // Forward outbound events onto the wire.  Fire-and-forget: a send
    // failure just ends the pump, the read loop notices the close.
    let forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match event.to_json() {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(%error, "failed to encode outbound event");
                    continue;
                }
            };
            if sink.send(WsFrame::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsFrame::Text(text) => router.dispatch(connection, &text).await,
            WsFrame::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            _ => {}
        }
    }

    state.rooms.unregister_peer(connection).await;
    router.handle_disconnect(connection).await;
    forward.abort();
    debug!(%connection, "websocket disconnected");
}

/// Routes inbound realtime events to their handlers.
pub struct EventRouter {
    db: SharedDb,
    tokens: TokenService,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomMultiplexer>,
}

impl EventRouter {
    pub fn new(
        db: SharedDb,
        tokens: TokenService,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomMultiplexer>,
    ) -> Self {
        Self {
            db,
            tokens,
            registry,
            rooms,
        }
    }

    /// Decode one frame and run its handler.  Malformed frames and handler
    /// failures are dropped here; the realtime channel is advisory and
    /// clients fall back to the pull endpoints for ground truth.
    pub async fn dispatch(&self, connection: ConnectionId, frame: &str) {
        let event = match ClientEvent::from_json(frame) {
            Ok(event) => event,
            Err(error) => {
                debug!(%connection, %error, "dropping malformed frame");
                return;
            }
        };

        let result = match event {
            ClientEvent::Authenticate { token } => {
                self.handle_authenticate(connection, &token).await
            }
            ClientEvent::JoinConversation { conversation_id } => {
                self.handle_join(connection, conversation_id).await
            }
            ClientEvent::SendMessage {
                conversation_id,
                content,
                ..
            } => {
                self.handle_send_message(connection, conversation_id, content)
                    .await
            }
            ClientEvent::StartConversation { recipient_id } => {
                self.handle_start_conversation(connection, recipient_id)
                    .await
            }
            ClientEvent::TypingStart { conversation_id } => {
                self.handle_typing(connection, conversation_id, true).await
            }
            ClientEvent::TypingStop { conversation_id } => {
                self.handle_typing(connection, conversation_id, false).await
            }
            ClientEvent::MarkMessagesRead { conversation_id } => {
                self.handle_mark_read(connection, conversation_id).await
            }
        };

        if let Err(error) = result {
            warn!(%connection, %error, "realtime event dropped");
        }
    }

    /// The identity bound to this connection, or an authentication error.
    async fn authed_user(&self, connection: ConnectionId) -> Result<UserId, ServerError> {
        self.registry
            .resolve_user(connection)
            .await
            .ok_or_else(|| ServerError::Unauthorized("Connection not authenticated".to_string()))
    }

    /// `authenticate(token)`: verify, bind, flip presence online, tell
    /// everyone else.  A bad token leaves the connection open and
    /// unauthenticated so the client may retry on the same transport.
    async fn handle_authenticate(
        &self,
        connection: ConnectionId,
        token: &str,
    ) -> Result<(), ServerError> {
        let user_id = self.tokens.verify(token)?;

        let now = Utc::now();
        {
            let db = self.db.lock().await;
            // The token may outlive the account; never bind a ghost.
            db.get_user(user_id)?;
            db.set_presence(user_id, Presence::Online, now)?;
        }

        self.registry.bind(connection, user_id).await;
        debug!(%connection, %user_id, "connection authenticated");

        self.rooms
            .broadcast_all(
                &ServerEvent::PresenceChanged {
                    user_id,
                    status: Presence::Online,
                    last_seen: None,
                },
                Some(connection),
            )
            .await;
        Ok(())
    }

    /// `join_conversation`: membership only, no identity required.
    async fn handle_join(
        &self,
        connection: ConnectionId,
        conversation_id: ConversationId,
    ) -> Result<(), ServerError> {
        self.rooms.join_room(connection, conversation_id).await;
        Ok(())
    }

    /// `send_message`: validate, persist the message and the conversation's
    /// last-message pointer, then broadcast to the room (sender included).
    async fn handle_send_message(
        &self,
        connection: ConnectionId,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<(), ServerError> {
        let sender = self.authed_user(connection).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ServerError::BadRequest("Empty message content".to_string()));
        }

        let event = {
            let db = self.db.lock().await;

            let conversation = db
                .get_conversation(&conversation_id)
                .map_err(|_| ServerError::AccessDenied)?;
            if !conversation.involves(sender) {
                return Err(ServerError::AccessDenied);
            }

            let message = Message::new(conversation_id.clone(), sender, content.to_string());
            db.insert_message(&message)?;
            db.set_last_message(&conversation.id, message.id, message.created_at)?;

            ServerEvent::NewMessage {
                message: views::message_view(&db, &message)?,
            }
        };

        // Commit happened above; only now may the fan-out see it.
        self.rooms
            .broadcast_to_room(&conversation_id, &event, None)
            .await;
        Ok(())
    }

    /// `start_conversation`: find-or-create by the derived pair id and
    /// acknowledge to the requester only.
    async fn handle_start_conversation(
        &self,
        connection: ConnectionId,
        recipient_id: UserId,
    ) -> Result<(), ServerError> {
        let requester = self.authed_user(connection).await?;
        if recipient_id == requester {
            return Err(ServerError::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let event = {
            let db = self.db.lock().await;
            db.get_user(recipient_id)
                .map_err(|_| ServerError::NotFound("No such recipient".to_string()))?;

            let (conversation, created) = db.find_or_create_conversation(requester, recipient_id)?;
            if created {
                debug!(conversation = %conversation.id, "conversation created");
            }

            ServerEvent::ConversationCreated {
                conversation: views::conversation_view(&db, &conversation, requester)?,
            }
        };

        self.rooms.emit_to(connection, &event).await;
        Ok(())
    }

    /// `typing_start` / `typing_stop`: ephemeral, never persisted, never
    /// echoed to the sender.
    async fn handle_typing(
        &self,
        connection: ConnectionId,
        conversation_id: ConversationId,
        is_typing: bool,
    ) -> Result<(), ServerError> {
        let user_id = self.authed_user(connection).await?;

        let user = {
            let db = self.db.lock().await;
            db.get_user(user_id)?.view()
        };

        self.rooms
            .broadcast_to_room(
                &conversation_id,
                &ServerEvent::UserTyping { user, is_typing },
                Some(connection),
            )
            .await;
        Ok(())
    }

    /// `mark_messages_read`: bulk-flip the other side's unread messages,
    /// then notify the room.  Repeat calls flip nothing and re-broadcast
    /// identical content, which is harmless.
    async fn handle_mark_read(
        &self,
        connection: ConnectionId,
        conversation_id: ConversationId,
    ) -> Result<(), ServerError> {
        let reader = self.authed_user(connection).await?;

        {
            let db = self.db.lock().await;
            if !db.is_participant(&conversation_id, reader)? {
                return Err(ServerError::AccessDenied);
            }
            let affected = db.mark_read(&conversation_id, reader)?;
            debug!(conversation = %conversation_id, affected, "messages marked read");
        }

        self.rooms
            .broadcast_to_room(
                &conversation_id,
                &ServerEvent::MessagesRead {
                    conversation_id: conversation_id.clone(),
                    reader_id: reader,
                },
                None,
            )
            .await;
        Ok(())
    }

    /// Transport close: unbind (unless a newer socket took over the user),
    /// persist offline presence with last-seen, and tell everyone else.
    pub async fn handle_disconnect(&self, connection: ConnectionId) {
        let Some(user_id) = self.registry.unbind(connection).await else {
            return;
        };

        let now = Utc::now();
        {
            let db = self.db.lock().await;
            if let Err(error) = db.set_presence(user_id, Presence::Offline, now) {
                warn!(%user_id, %error, "failed to persist offline presence");
                return;
            }
        }

        self.rooms
            .broadcast_all(
                &ServerEvent::PresenceChanged {
                    user_id,
                    status: Presence::Offline,
                    last_seen: Some(now),
                },
                Some(connection),
            )
            .await;
        debug!(%connection, %user_id, "user went offline");
    }
}
