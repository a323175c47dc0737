//! CRUD operations for [`Conversation`] records.
//!
//! Conversations are keyed by the deterministic pair id, so creation is a
//! find-or-create: `INSERT OR IGNORE` on the derived id makes concurrent
//! `start_conversation` calls from both participants converge on one row.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use dyad_shared::{ConversationId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Conversation;
use crate::users::{parse_ts, text_conversion};

const CONVERSATION_COLUMNS: &str =
    "id, participant_a, participant_b, last_message_id, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Find or create the conversation between two users.
    ///
    /// Returns the row and whether this call created it.
    pub fn find_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<(Conversation, bool)> {
        let id = ConversationId::for_pair(a, b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let now = Utc::now();

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO conversations
                 (id, participant_a, participant_b, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                id.as_str(),
                lo.to_string(),
                hi.to_string(),
                now.to_rfc3339(),
            ],
        )?;

        let conversation = self.get_conversation(&id)?;
        Ok((conversation, inserted > 0))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single conversation by id.
    pub fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.as_str()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Whether `user` is a participant of the conversation.
    ///
    /// A nonexistent conversation reports `false`, indistinguishable from
    /// access-denied.
    pub fn is_participant(&self, id: &ConversationId, user: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE id = ?1 AND (participant_a = ?2 OR participant_b = ?2)",
            params![id.as_str(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List a user's conversations, most recently updated first.
    pub fn list_conversations_for_user(&self, user: UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY updated_at DESC"
        ))?;

        let rows = stmt.query_map(params![user.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Update the denormalized last-message pointer and bump `updated_at`.
    pub fn set_last_message(
        &self,
        id: &ConversationId,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE conversations SET last_message_id = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id.as_str(), message_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let a_str: String = row.get(1)?;
    let b_str: String = row.get(2)?;
    let last_message_str: Option<String> = row.get(3)?;

    let last_message_id = last_message_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| text_conversion(3, e))?;

    Ok(Conversation {
        id: ConversationId::from_string(id_str),
        participant_a: UserId::parse(&a_str).map_err(|e| text_conversion(1, e))?,
        participant_b: UserId::parse(&b_str).map_err(|e| text_conversion(2, e))?,
        last_message_id,
        created_at: parse_ts(row, 4)?,
        updated_at: parse_ts(row, 5)?,
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

    #[test]
    fn find_or_create_converges_from_both_sides() {
        let (_dir, db) = open_db();
        let a = add_user(&db, "ada");
        let b = add_user(&db, "grace");

        let (first, created) = db.find_or_create_conversation(a, b).unwrap();
        assert!(created);

        // Same pair from the other side resolves to the same row.
        let (second, created) = db.find_or_create_conversation(b, a).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(first.participants(), second.participants());

        assert_eq!(db.list_conversations_for_user(a).unwrap().len(), 1);
    }

    #[test]
    fn participants_are_stored_sorted() {
        let (_dir, db) = open_db();
        let a = add_user(&db, "ada");
        let b = add_user(&db, "grace");

        let (conversation, _) = db.find_or_create_conversation(b, a).unwrap();
        assert!(conversation.participant_a <= conversation.participant_b);
        assert!(conversation.involves(a));
        assert!(conversation.involves(b));
        assert_eq!(conversation.other_participant(a), Some(b));
    }

    #[test]
    fn participant_check_denies_outsiders_and_missing_rows() {
        let (_dir, db) = open_db();
        let a = add_user(&db, "ada");
        let b = add_user(&db, "grace");
        let outsider = add_user(&db, "mallory");

        let (conversation, _) = db.find_or_create_conversation(a, b).unwrap();
        assert!(db.is_participant(&conversation.id, a).unwrap());
        assert!(!db.is_participant(&conversation.id, outsider).unwrap());

        let missing = ConversationId::for_pair(outsider, UserId::new());
        assert!(!db.is_participant(&missing, outsider).unwrap());
    }

    #[test]
    fn list_orders_by_most_recent_update() {
        let (_dir, db) = open_db();
        let me = add_user(&db, "me");
        let x = add_user(&db, "x");
        let y = add_user(&db, "y");

        let (older, _) = db.find_or_create_conversation(me, x).unwrap();
        let (newer, _) = db.find_or_create_conversation(me, y).unwrap();

        // Bump the first conversation so it becomes the most recent.
        db.set_last_message(&older.id, Uuid::new_v4(), Utc::now() + chrono::Duration::seconds(5))
            .unwrap();

        let listed = db.list_conversations_for_user(me).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
        assert!(listed[0].last_message_id.is_some());
    }
}
