use async_trait::async_trait;

use super::DatabaseError;
use super::models::{
    BlacklistEntry, CachedUsername, RatingOrder, ReactionCount, ReactionRecord, ScoreEntry,
    ScoringResult,
};

#[async_trait]
pub trait ReactionStore: Send + Sync {
    /// Stores the record and, unless the source user already scored this
    /// message, applies `delta` to the target's rating in the same transaction.
    /// A repeated identical record fails with [`DatabaseError::Duplicate`].
    async fn record_reaction(
        &self,
        record: &ReactionRecord,
        delta: i64,
    ) -> Result<ScoringResult, DatabaseError>;
    async fn reaction_counts(&self, chat_id: i64) -> Result<Vec<ReactionCount>, DatabaseError>;
    async fn user_reaction_counts(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<Vec<ReactionCount>, DatabaseError>;
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn get_or_create_rating(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ScoreEntry, DatabaseError>;
    async fn top_ratings(
        &self,
        chat_id: i64,
        order: RatingOrder,
        limit: i64,
    ) -> Result<Vec<ScoreEntry>, DatabaseError>;
}

#[async_trait]
pub trait BlacklistStore: Send + Sync {
    async fn is_blacklisted(&self, chat_id: i64, user_id: i64) -> Result<bool, DatabaseError>;
    /// Returns `false` when the entry already existed.
    async fn add_to_blacklist(&self, chat_id: i64, user_id: i64) -> Result<bool, DatabaseError>;
    /// Returns `false` when there was nothing to remove.
    async fn remove_from_blacklist(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError>;
    async fn list_blacklist(&self, chat_id: i64) -> Result<Vec<BlacklistEntry>, DatabaseError>;
}

#[async_trait]
pub trait UsernameStore: Send + Sync {
    async fn upsert_username(&self, entry: &CachedUsername) -> Result<(), DatabaseError>;
    async fn get_username(&self, user_id: i64) -> Result<Option<CachedUsername>, DatabaseError>;
}
