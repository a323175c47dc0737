//! Domain model structs persisted in the SQLite database.
//!
//! These are the row shapes, not the wire shapes: [`User`] carries the
//! password hash and is converted to [`UserView`] before anything leaves the
//! process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dyad_shared::{ConversationId, MessageView, Presence, UserId, UserView};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user: identity plus presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique display handle.
    pub username: String,
    /// Unique login email.
    pub email: String,
    /// Argon2 PHC string.  Never serialized onto the wire.
    pub password_hash: String,
    pub presence: Presence,
    /// Last time the user's bound connection closed (or account creation).
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a fresh offline user record.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username,
            email,
            password_hash,
            presence: Presence::Offline,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// The outward representation (password hash stripped).
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            presence: self.presence,
            last_seen: self.last_seen,
            created_at: self.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A dyadic channel between exactly two users.
///
/// Participants are stored sorted (`participant_a < participant_b`) so the
/// row matches the derived [`ConversationId`] exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    /// Denormalized pointer to the most recent message, for list views.
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participants(&self) -> [UserId; 2] {
        [self.participant_a, self.participant_b]
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// The participant that is not `user`, if `user` is a participant.
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        if self.participant_a == user {
            Some(self.participant_b)
        } else if self.participant_b == user {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.  Immutable after creation except for the read flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    /// Flips false -> true on a read receipt; never reverts.
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: ConversationId, sender_id: UserId, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    /// The outward representation, with the sender resolved by the caller.
    pub fn view(&self, sender: UserView) -> MessageView {
        MessageView {
            id: self.id,
            conversation_id: self.conversation_id.clone(),
            sender,
            content: self.content.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}
