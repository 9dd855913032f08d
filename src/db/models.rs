use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted reaction. The whole tuple is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub chat_id: i64,
    pub from_user_id: i64,
    pub target_user_id: i64,
    pub message_id: i64,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub chat_id: i64,
    pub user_id: i64,
    pub rating: i64,
}

/// Raw per-emoji count of reactions received by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub user_id: i64,
    pub emoji: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub chat_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedUsername {
    pub user_id: i64,
    pub display_name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingOrder {
    Descending,
    Ascending,
}

/// What happened to the rating counter when a reaction record was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringResult {
    /// Scoring attempt marker created and `delta` applied.
    Applied { delta: i64 },
    /// The source user already scored this message.
    AlreadyScored,
    /// The emoji carries no score.
    NotScored,
    /// The target was blacklisted when the transaction started; nothing was
    /// written.
    Blacklisted,
}
