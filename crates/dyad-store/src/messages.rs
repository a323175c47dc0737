//! CRUD operations for [`Message`] records.

use rusqlite::params;
use uuid::Uuid;

use dyad_shared::{ConversationId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::users::{parse_ts, text_conversion};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, is_read, created_at";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.conversation_id.as_str(),
                message.sender_id.to_string(),
                message.content,
                message.is_read,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All messages of a conversation in creation order.
    pub fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![conversation_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Bulk read receipt: flip every unread message in the conversation that
    /// was not sent by `reader`.  Returns the number of rows affected, so a
    /// repeat call reports 0.  The flag never reverts.
    pub fn mark_read(&self, conversation_id: &ConversationId, reader: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
            params![conversation_id.as_str(), reader.to_string()],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;

    Ok(Message {
        id: Uuid::parse_str(&id_str).map_err(|e| text_conversion(0, e))?,
        conversation_id: ConversationId::from_string(conversation_str),
        sender_id: UserId::parse(&sender_str).map_err(|e| text_conversion(2, e))?,
        content: row.get(3)?,
        is_read: row.get(4)?,
        created_at: parse_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn add_user(db: &Database, name: &str) -> UserId {
        let user = User::new(
            name.to_string(),
            format!("{name}@example.com"),
            "$argon2id$fake".to_string(),
        );
        db.insert_user(&user).unwrap();
        user.id
    }

    fn seed_conversation(db: &Database) -> (UserId, UserId, ConversationId) {
        let a = add_user(db, "ada");
        let b = add_user(db, "grace");
        let (conversation, _) = db.find_or_create_conversation(a, b).unwrap();
        (a, b, conversation.id)
    }

    #[test]
    fn insert_and_list_in_creation_order() {
        let (_dir, db) = open_db();
        let (a, b, conversation_id) = seed_conversation(&db);

        let mut first = Message::new(conversation_id.clone(), a, "hi".into());
        let mut second = Message::new(conversation_id.clone(), b, "hello".into());
        // Force distinct timestamps so the ordering assertion is meaningful.
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        first.created_at -= chrono::Duration::seconds(1);

        db.insert_message(&second).unwrap();
        db.insert_message(&first).unwrap();

        let listed = db.list_messages(&conversation_id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
        assert!(!listed[0].is_read);
    }

    #[test]
    fn mark_read_skips_own_messages_and_is_idempotent() {
        let (_dir, db) = open_db();
        let (a, b, conversation_id) = seed_conversation(&db);

        db.insert_message(&Message::new(conversation_id.clone(), a, "one".into()))
            .unwrap();
        db.insert_message(&Message::new(conversation_id.clone(), a, "two".into()))
            .unwrap();
        db.insert_message(&Message::new(conversation_id.clone(), b, "reply".into()))
            .unwrap();

        // b reads: only a's two messages flip.
        assert_eq!(db.mark_read(&conversation_id, b).unwrap(), 2);

        let listed = db.list_messages(&conversation_id).unwrap();
        for message in &listed {
            if message.sender_id == a {
                assert!(message.is_read);
            } else {
                assert!(!message.is_read);
            }
        }

        // Second call changes nothing.
        assert_eq!(db.mark_read(&conversation_id, b).unwrap(), 0);
    }

    #[test]
    fn get_message_round_trip() {
        let (_dir, db) = open_db();
        let (a, _b, conversation_id) = seed_conversation(&db);

        let message = Message::new(conversation_id, a, "hi".into());
        db.insert_message(&message).unwrap();

        let fetched = db.get_message(message.id).unwrap();
        assert_eq!(fetched.content, "hi");
        assert!(matches!(
            db.get_message(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }
}
