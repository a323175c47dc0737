//! Realtime wire protocol.
//!
//! Every frame on the WebSocket is a JSON envelope `{ "type": ..., "payload": ... }`
//! decoding into one of the closed enums below. Field validation happens once
//! here, at the boundary: a frame that does not decode never reaches an event
//! handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::{ConversationId, Presence, UserId};

// ---------------------------------------------------------------------------
// Outward views
// ---------------------------------------------------------------------------

/// A user as exposed on the wire. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub presence: Presence,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A message with its sender resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender: UserView,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A conversation with participants resolved.
///
/// `other_user` is a convenience field populated relative to the requesting
/// user (the participant that is not the requester).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: ConversationId,
    pub participants: Vec<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_user: Option<UserView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client -> server events
// ---------------------------------------------------------------------------

/// Events a client may send over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to the identity carried by the token.
    Authenticate { token: String },

    /// Join the event room for a conversation.
    JoinConversation { conversation_id: ConversationId },

    /// Persist a message and fan it out to the conversation room.
    SendMessage {
        conversation_id: ConversationId,
        content: String,
        recipient_id: UserId,
    },

    /// Find-or-create the conversation with `recipient_id`.
    StartConversation { recipient_id: UserId },

    TypingStart { conversation_id: ConversationId },

    TypingStop { conversation_id: ConversationId },

    /// Flip every unread message not sent by the caller to read.
    MarkMessagesRead { conversation_id: ConversationId },
}

impl ClientEvent {
    pub fn from_json(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }
}

// ---------------------------------------------------------------------------
// Server -> client events
// ---------------------------------------------------------------------------

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerEvent {
    PresenceChanged {
        user_id: UserId,
        status: Presence,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },

    NewMessage {
        message: MessageView,
    },

    ConversationCreated {
        conversation: ConversationView,
    },

    UserTyping {
        user: UserView,
        is_typing: bool,
    },

    MessagesRead {
        conversation_id: ConversationId,
        reader_id: UserId,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_envelope_shape() {
        let frame = r#"{"type":"send_message","payload":{
            "conversationId":"00000000-0000-4000-8000-000000000001-00000000-0000-4000-8000-000000000002",
            "content":"hi",
            "recipientId":"00000000-0000-4000-8000-000000000002"
        }}"#;

        let event = ClientEvent::from_json(frame).unwrap();
        match event {
            ClientEvent::SendMessage {
                content,
                recipient_id,
                ..
            } => {
                assert_eq!(content, "hi");
                assert_eq!(
                    recipient_id.to_string(),
                    "00000000-0000-4000-8000-000000000002"
                );
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn authenticate_frame_decodes() {
        let frame = r#"{"type":"authenticate","payload":{"token":"abc.def.ghi"}}"#;
        assert_eq!(
            ClientEvent::from_json(frame).unwrap(),
            ClientEvent::Authenticate {
                token: "abc.def.ghi".into()
            }
        );
    }

    #[test]
    fn malformed_frame_is_rejected() {
        assert!(ClientEvent::from_json(r#"{"type":"send_message","payload":{}}"#).is_err());
        assert!(ClientEvent::from_json("not json").is_err());
        assert!(ClientEvent::from_json(r#"{"type":"no_such_event","payload":{}}"#).is_err());
    }

    #[test]
    fn presence_event_omits_absent_last_seen() {
        let event = ServerEvent::PresenceChanged {
            user_id: UserId::new(),
            status: Presence::Online,
            last_seen: None,
        };
        let json = event.to_json().unwrap();
        assert!(json.contains(r#""type":"presence_changed""#));
        assert!(json.contains(r#""status":"online""#));
        assert!(!json.contains("lastSeen"));
    }

    #[test]
    fn typing_event_serializes_user_view() {
        let user = UserView {
            id: UserId::new(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            presence: Presence::Online,
            last_seen: Utc::now(),
            created_at: Utc::now(),
        };
        let json = ServerEvent::UserTyping {
            user,
            is_typing: true,
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""isTyping":true"#));
        assert!(!json.contains("password"));
    }
}
