use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::db::{
    BlacklistEntry, BlacklistStore, CachedUsername, DatabaseError, DatabaseManager, RatingOrder,
    RatingStore, ReactionRecord, ReactionStore, ScoreEntry, ScoringResult, UsernameStore,
};

pub mod classify;
pub mod eligibility;
pub mod rate_limit;

pub use self::classify::{EmojiClassifier, ReactionTally, TallyKind};
pub use self::eligibility::{Eligibility, EligibilityFilter};
pub use self::rate_limit::RateLimiter;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user already in blacklist")]
    AlreadyBlacklisted,
    #[error("user is not in blacklist")]
    NotBlacklisted,
    #[error("display name lookup failed for user {0}")]
    LookupMiss(i64),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl LedgerError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_retryable())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    SelfReaction,
    Blacklisted,
    RateLimited,
    Duplicate,
}

/// Result of a reaction that did not fail. Ignored reactions are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Scored { delta: i64 },
    /// Stored, but the rating did not move.
    Recorded,
    Ignored(IgnoreReason),
}

pub struct Ledger {
    reactions: Arc<dyn ReactionStore>,
    ratings: Arc<dyn RatingStore>,
    blacklist: Arc<dyn BlacklistStore>,
    usernames: Arc<dyn UsernameStore>,
    eligibility: EligibilityFilter,
    limiter: Arc<RateLimiter>,
    classifier: EmojiClassifier,
    top_limit: usize,
    kind_top_limit: usize,
}

impl Ledger {
    pub fn new(db: &DatabaseManager, limiter: Arc<RateLimiter>, config: &Config) -> Self {
        Self {
            reactions: db.reaction_store(),
            ratings: db.rating_store(),
            blacklist: db.blacklist_store(),
            usernames: db.username_store(),
            eligibility: EligibilityFilter::new(db.blacklist_store()),
            limiter,
            classifier: EmojiClassifier::new(&config.emoji),
            top_limit: config.ledger.top_limit,
            kind_top_limit: config.ledger.kind_top_limit,
        }
    }

    #[instrument(
        skip(self, reaction),
        fields(
            chat_id = reaction.chat_id,
            from = reaction.from_user_id,
            target = reaction.target_user_id,
            message_id = reaction.message_id,
        )
    )]
    pub async fn record_reaction(
        &self,
        reaction: &ReactionRecord,
    ) -> Result<RecordOutcome, LedgerError> {
        let eligibility = self
            .eligibility
            .evaluate(
                reaction.chat_id,
                reaction.from_user_id,
                reaction.target_user_id,
                reaction.message_id,
            )
            .await?;

        match eligibility {
            Eligibility::RejectSelf => return Ok(ignored(IgnoreReason::SelfReaction)),
            Eligibility::RejectBlacklisted => return Ok(ignored(IgnoreReason::Blacklisted)),
            Eligibility::Accept => {}
        }

        if !self.limiter.try_acquire(reaction.from_user_id) {
            return Ok(ignored(IgnoreReason::RateLimited));
        }

        let class = self.classifier.classify(&reaction.emoji);
        match self.reactions.record_reaction(reaction, class.delta()).await {
            Ok(ScoringResult::Applied { delta }) => {
                info!(delta, emoji = %reaction.emoji, "reaction scored");
                Ok(RecordOutcome::Scored { delta })
            }
            Ok(ScoringResult::AlreadyScored) => {
                debug!("message already scored by this user, record kept");
                Ok(RecordOutcome::Recorded)
            }
            Ok(ScoringResult::NotScored) => Ok(RecordOutcome::Recorded),
            // blacklisted after the eligibility check passed
            Ok(ScoringResult::Blacklisted) => Ok(ignored(IgnoreReason::Blacklisted)),
            Err(err) if err.is_duplicate() => Ok(ignored(IgnoreReason::Duplicate)),
            Err(err) => Err(err.into()),
        }
    }

    /// Creates a zero rating on first query.
    pub async fn get_user_rating(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ScoreEntry, LedgerError> {
        Ok(self.ratings.get_or_create_rating(chat_id, user_id).await?)
    }

    pub async fn get_user_tally(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ReactionTally, LedgerError> {
        let counts = self.reactions.user_reaction_counts(chat_id, user_id).await?;
        Ok(self
            .classifier
            .tally(&counts)
            .into_iter()
            .next()
            .unwrap_or_else(|| ReactionTally::new(user_id)))
    }

    pub async fn top_rating(
        &self,
        chat_id: i64,
        order: RatingOrder,
    ) -> Result<Vec<ScoreEntry>, LedgerError> {
        Ok(self
            .ratings
            .top_ratings(chat_id, order, self.top_limit as i64)
            .await?)
    }

    /// Users with a non-zero count of `kind`, highest first.
    pub async fn top_by_reaction_kind(
        &self,
        chat_id: i64,
        kind: TallyKind,
    ) -> Result<Vec<ReactionTally>, LedgerError> {
        let counts = self.reactions.reaction_counts(chat_id).await?;
        Ok(rank_by_kind(
            self.classifier.tally(&counts),
            kind,
            self.kind_top_limit,
        ))
    }

    pub async fn add_blacklist(&self, chat_id: i64, user_id: i64) -> Result<(), LedgerError> {
        if !self.blacklist.add_to_blacklist(chat_id, user_id).await? {
            return Err(LedgerError::AlreadyBlacklisted);
        }
        info!(chat_id, user_id, "user blacklisted");
        Ok(())
    }

    pub async fn remove_blacklist(&self, chat_id: i64, user_id: i64) -> Result<(), LedgerError> {
        if !self.blacklist.remove_from_blacklist(chat_id, user_id).await? {
            return Err(LedgerError::NotBlacklisted);
        }
        info!(chat_id, user_id, "user removed from blacklist");
        Ok(())
    }

    pub async fn list_blacklist(&self, chat_id: i64) -> Result<Vec<BlacklistEntry>, LedgerError> {
        Ok(self.blacklist.list_blacklist(chat_id).await?)
    }

    pub async fn remember_username(
        &self,
        user_id: i64,
        display_name: &str,
    ) -> Result<(), LedgerError> {
        if display_name.trim().is_empty() {
            return Ok(());
        }
        self.usernames
            .upsert_username(&CachedUsername {
                user_id,
                display_name: display_name.to_string(),
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn cached_username(&self, user_id: i64) -> Result<Option<String>, LedgerError> {
        Ok(self
            .usernames
            .get_username(user_id)
            .await?
            .map(|entry| entry.display_name))
    }
}

fn ignored(reason: IgnoreReason) -> RecordOutcome {
    debug!(?reason, "reaction ignored");
    RecordOutcome::Ignored(reason)
}

fn rank_by_kind(mut tallies: Vec<ReactionTally>, kind: TallyKind, limit: usize) -> Vec<ReactionTally> {
    tallies.retain(|tally| tally.count(kind) > 0);
    tallies.sort_by(|a, b| b.count(kind).cmp(&a.count(kind)));
    tallies.truncate(limit);
    tallies
}
