use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = UUID v4, serialized as its hyphenated string form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a dyadic conversation, derived from its two participants.
///
/// The id is the two participant ids sorted lexicographically and joined
/// with `-`, so both sides of a pair always derive the same id and lookup
/// by pair is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the canonical id for an unordered pair of users.
    ///
    /// Commutative: `for_pair(a, b) == for_pair(b, a)`. Both halves are
    /// fixed-length hyphenated UUIDs, so the joined form is injective over
    /// unordered pairs.
    pub fn for_pair(a: UserId, b: UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}-{hi}"))
    }

    /// Wrap an id string received from a client or read from the store.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// The two participant ids this conversation id was derived from, in
    /// sorted order. `None` if the string is not a well-formed pair id.
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        // A hyphenated UUID is 36 chars; the pair id is 36 + 1 + 36.
        if self.0.len() != 73 {
            return None;
        }
        let lo = UserId::parse(&self.0[..36]).ok()?;
        let hi = UserId::parse(&self.0[37..]).ok()?;
        Some((lo, hi))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Online/offline presence of a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Presence::Online),
            "offline" => Some(Presence::Offline),
            _ => None,
        }
    }
}
