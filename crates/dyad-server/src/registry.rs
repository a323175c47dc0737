//! Connection registry: which user is behind which live connection, right now.
//!
//! Both mapping directions live under one lock, so no event handler can
//! observe a half-updated registry.  The registry keeps a single handle per
//! user id: the last-authenticated connection wins and the old mapping is
//! dropped silently (documented single-device simplification).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use dyad_shared::UserId;

/// Opaque handle for one live transport connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Bindings {
    by_connection: HashMap<ConnectionId, UserId>,
    by_user: HashMap<UserId, ConnectionId>,
}

/// Process-wide bidirectional connection <-> user mapping.
pub struct ConnectionRegistry {
    bindings: Mutex<Bindings>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(Bindings::default()),
        }
    }

    /// Bind a connection to a user in both directions.
    ///
    /// If the user already has a bound handle, that mapping is replaced
    /// without notifying the old handle.  Idempotent for an identical pair.
    pub async fn bind(&self, connection: ConnectionId, user: UserId) {
        let mut bindings = self.bindings.lock().await;

        // Drop the user's previous handle, if any.
        if let Some(old_connection) = bindings.by_user.remove(&user) {
            bindings.by_connection.remove(&old_connection);
        }
        // Drop any identity this connection previously authenticated as.
        if let Some(old_user) = bindings.by_connection.remove(&connection) {
            if bindings.by_user.get(&old_user) == Some(&connection) {
                bindings.by_user.remove(&old_user);
            }
        }

        bindings.by_connection.insert(connection, user);
        bindings.by_user.insert(user, connection);
    }

    /// Remove both mapping directions for a connection.
    ///
    /// Returns the user id if this connection was still the user's active
    /// handle.  A connection whose user has since re-authenticated elsewhere
    /// resolves to `None`, so a stale socket close cannot clobber the newer
    /// binding's presence.
    pub async fn unbind(&self, connection: ConnectionId) -> Option<UserId> {
        let mut bindings = self.bindings.lock().await;

        let user = bindings.by_connection.remove(&connection)?;
        if bindings.by_user.get(&user) == Some(&connection) {
            bindings.by_user.remove(&user);
            Some(user)
        } else {
            None
        }
    }

    pub async fn resolve_user(&self, connection: ConnectionId) -> Option<UserId> {
        self.bindings
            .lock()
            .await
            .by_connection
            .get(&connection)
            .copied()
    }

    pub async fn resolve_connection(&self, user: UserId) -> Option<ConnectionId> {
        self.bindings.lock().await.by_user.get(&user).copied()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_resolves_both_directions() {
        let registry = ConnectionRegistry::new();
        let connection = ConnectionId::new();
        let user = UserId::new();

        registry.bind(connection, user).await;

        assert_eq!(registry.resolve_user(connection).await, Some(user));
        assert_eq!(registry.resolve_connection(user).await, Some(connection));
    }

    #[tokio::test]
    async fn rebind_replaces_old_handle_silently() {
        let registry = ConnectionRegistry::new();
        let old = ConnectionId::new();
        let new = ConnectionId::new();
        let user = UserId::new();

        registry.bind(old, user).await;
        registry.bind(new, user).await;

        assert_eq!(registry.resolve_connection(user).await, Some(new));
        assert_eq!(registry.resolve_user(old).await, None);

        // The stale socket's close must not unbind the new handle.
        assert_eq!(registry.unbind(old).await, None);
        assert_eq!(registry.resolve_connection(user).await, Some(new));
    }

    #[tokio::test]
    async fn bind_is_idempotent_for_identical_pair() {
        let registry = ConnectionRegistry::new();
        let connection = ConnectionId::new();
        let user = UserId::new();

        registry.bind(connection, user).await;
        registry.bind(connection, user).await;

        assert_eq!(registry.resolve_user(connection).await, Some(user));
        assert_eq!(registry.resolve_connection(user).await, Some(connection));
    }

    #[tokio::test]
    async fn unbind_removes_active_binding() {
        let registry = ConnectionRegistry::new();
        let connection = ConnectionId::new();
        let user = UserId::new();

        registry.bind(connection, user).await;
        assert_eq!(registry.unbind(connection).await, Some(user));
        assert_eq!(registry.resolve_user(connection).await, None);
        assert_eq!(registry.resolve_connection(user).await, None);

        // Unbinding an unknown connection is a no-op.
        assert_eq!(registry.unbind(connection).await, None);
    }
}
