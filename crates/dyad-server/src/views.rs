//! Assembly of outward wire views from store rows.

use dyad_shared::{ConversationView, MessageView, UserId};
use dyad_store::{Conversation, Database, Message, StoreError};

/// Resolve a message's sender and build its wire view.
pub fn message_view(db: &Database, message: &Message) -> Result<MessageView, StoreError> {
    let sender = db.get_user(message.sender_id)?;
    Ok(message.view(sender.view()))
}

/// Build a conversation's wire view from `viewer`'s perspective: participants
/// and the denormalized last message resolved, `other_user` populated as the
/// participant that is not the viewer.
pub fn conversation_view(
    db: &Database,
    conversation: &Conversation,
    viewer: UserId,
) -> Result<ConversationView, StoreError> {
    let mut participants = Vec::with_capacity(2);
    for id in conversation.participants() {
        participants.push(db.get_user(id)?.view());
    }

    let other_user = conversation
        .other_participant(viewer)
        .and_then(|id| participants.iter().find(|u| u.id == id).cloned());

    let last_message = match conversation.last_message_id {
        Some(id) => Some(message_view(db, &db.get_message(id)?)?),
        None => None,
    };

    Ok(ConversationView {
        id: conversation.id.clone(),
        participants,
        last_message,
        other_user,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
    })
}
