//! # dyad-store
//!
//! The system of record for the Dyad chat server, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for the three
//! persisted collections: users, conversations, and messages. Conversations
//! are keyed by the deterministic pair id from `dyad-shared`, which is what
//! makes conversation creation a race-free find-or-create.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
