use std::sync::Arc;
use std::time::Duration;

use diesel::RunQueryDsl;

use crate::config::DatabaseConfig;
use crate::db::sqlite::{
    SqliteBlacklistStore, SqliteHandle, SqliteRatingStore, SqliteReactionStore,
    SqliteUsernameStore,
};
use crate::db::{BlacklistStore, DatabaseError, RatingStore, ReactionStore, UsernameStore};

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS reactions (
        chat_id INTEGER NOT NULL,
        from_user_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        message_id INTEGER NOT NULL,
        reaction TEXT NOT NULL,
        PRIMARY KEY (chat_id, from_user_id, user_id, message_id, reaction)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ratings (
        chat_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        rating INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (chat_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scoring_attempts (
        chat_id INTEGER NOT NULL,
        from_user_id INTEGER NOT NULL,
        message_id INTEGER NOT NULL,
        PRIMARY KEY (chat_id, from_user_id, message_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS blacklist (
        chat_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        PRIMARY KEY (chat_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usernames (
        user_id INTEGER PRIMARY KEY NOT NULL,
        display_name TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_reactions_chat_user ON reactions(chat_id, user_id)",
    "CREATE INDEX IF NOT EXISTS idx_ratings_chat_rating ON ratings(chat_id, rating)",
];

#[derive(Clone)]
pub struct DatabaseManager {
    handle: SqliteHandle,
    reaction_store: Arc<dyn ReactionStore>,
    rating_store: Arc<dyn RatingStore>,
    blacklist_store: Arc<dyn BlacklistStore>,
    username_store: Arc<dyn UsernameStore>,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config.sqlite_path();
        let busy_timeout = config.busy_timeout();
        let operation_timeout = config.operation_timeout();

        let handle = tokio::task::spawn_blocking(move || {
            SqliteHandle::open(&path, busy_timeout, operation_timeout)
        })
        .await
        .map_err(|e| DatabaseError::Connection(format!("open task failed: {e}")))??;

        Ok(Self::from_handle(handle))
    }

    fn from_handle(handle: SqliteHandle) -> Self {
        Self {
            reaction_store: Arc::new(SqliteReactionStore::new(handle.clone())),
            rating_store: Arc::new(SqliteRatingStore::new(handle.clone())),
            blacklist_store: Arc::new(SqliteBlacklistStore::new(handle.clone())),
            username_store: Arc::new(SqliteUsernameStore::new(handle.clone())),
            handle,
        }
    }

    /// A manager over the same connection whose operations use `timeout`
    /// as their deadline.
    #[cfg(test)]
    pub fn with_operation_timeout(&self, timeout: Duration) -> Self {
        Self::from_handle(self.handle.with_operation_timeout(timeout))
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        self.handle
            .run(|conn| {
                for statement in SQLITE_SCHEMA {
                    diesel::sql_query(*statement)
                        .execute(conn)
                        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
                }
                Ok(())
            })
            .await
    }

    pub fn reaction_store(&self) -> Arc<dyn ReactionStore> {
        self.reaction_store.clone()
    }

    pub fn rating_store(&self) -> Arc<dyn RatingStore> {
        self.rating_store.clone()
    }

    pub fn blacklist_store(&self) -> Arc<dyn BlacklistStore> {
        self.blacklist_store.clone()
    }

    pub fn username_store(&self) -> Arc<dyn UsernameStore> {
        self.username_store.clone()
    }

    pub fn operation_timeout(&self) -> Duration {
        self.handle.operation_timeout()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;
    use crate::db::{
        CachedUsername, DatabaseError, RatingOrder, ReactionRecord, ScoringResult,
    };

    pub(crate) async fn temp_manager() -> (NamedTempFile, DatabaseManager) {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let config = DatabaseConfig {
            filename: file.path().to_string_lossy().to_string(),
            ..DatabaseConfig::default()
        };

        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        (file, manager)
    }

    async fn stored_reactions(manager: &DatabaseManager) -> i64 {
        let counts = manager.reaction_store().reaction_counts(100).await.unwrap();
        counts.iter().map(|c| c.count).sum()
    }

    fn record(from: i64, target: i64, message: i64, emoji: &str) -> ReactionRecord {
        ReactionRecord {
            chat_id: 100,
            from_user_id: from,
            target_user_id: target,
            message_id: message,
            emoji: emoji.to_string(),
        }
    }

    #[tokio::test]
    async fn migrate_is_idempotent_and_data_survives_reopen() {
        let (file, manager) = temp_manager().await;
        manager.migrate().await.expect("second migrate");

        manager
            .reaction_store()
            .record_reaction(&record(1, 2, 5, "👍"), 1)
            .await
            .expect("record");

        let config = DatabaseConfig {
            filename: file.path().to_string_lossy().to_string(),
            ..DatabaseConfig::default()
        };
        let reopened = DatabaseManager::new(&config).await.expect("reopen");
        reopened.migrate().await.expect("migrate reopened");

        let rating = reopened
            .rating_store()
            .get_or_create_rating(100, 2)
            .await
            .expect("rating");
        assert_eq!(rating.rating, 1);
        assert_eq!(stored_reactions(&reopened).await, 1);
    }

    #[tokio::test]
    async fn duplicate_record_is_classified_and_leaves_counter_alone() {
        let (_file, manager) = temp_manager().await;
        let store = manager.reaction_store();

        let first = store.record_reaction(&record(1, 2, 5, "👍"), 1).await;
        assert_eq!(first.unwrap(), ScoringResult::Applied { delta: 1 });

        let second = store.record_reaction(&record(1, 2, 5, "👍"), 1).await;
        assert!(matches!(second, Err(DatabaseError::Duplicate)));

        assert_eq!(stored_reactions(&manager).await, 1);
        let rating = manager.rating_store().get_or_create_rating(100, 2).await.unwrap();
        assert_eq!(rating.rating, 1);
    }

    #[tokio::test]
    async fn scoring_attempt_gates_second_emoji_on_same_message() {
        let (_file, manager) = temp_manager().await;
        let store = manager.reaction_store();

        store.record_reaction(&record(1, 2, 5, "👍"), 1).await.unwrap();
        let result = store.record_reaction(&record(1, 2, 5, "👎"), -1).await.unwrap();
        assert_eq!(result, ScoringResult::AlreadyScored);

        // the record is still kept for the per-kind breakdown
        assert_eq!(stored_reactions(&manager).await, 2);
        let rating = manager.rating_store().get_or_create_rating(100, 2).await.unwrap();
        assert_eq!(rating.rating, 1);

        let fresh = store.record_reaction(&record(1, 2, 6, "👎"), -1).await.unwrap();
        assert_eq!(fresh, ScoringResult::Applied { delta: -1 });
        let rating = manager.rating_store().get_or_create_rating(100, 2).await.unwrap();
        assert_eq!(rating.rating, 0);
    }

    #[tokio::test]
    async fn unscored_emoji_does_not_consume_scoring_attempt() {
        let (_file, manager) = temp_manager().await;
        let store = manager.reaction_store();

        let whale = store.record_reaction(&record(1, 2, 5, "🐳"), 0).await.unwrap();
        assert_eq!(whale, ScoringResult::NotScored);

        let like = store.record_reaction(&record(1, 2, 5, "🔥"), 1).await.unwrap();
        assert_eq!(like, ScoringResult::Applied { delta: 1 });
    }

    #[tokio::test]
    async fn blacklisted_target_is_checked_inside_the_write() {
        let (_file, manager) = temp_manager().await;
        let store = manager.reaction_store();
        manager.blacklist_store().add_to_blacklist(100, 2).await.unwrap();

        for (emoji, delta) in [("👍", 1), ("🐳", 0)] {
            let result = store.record_reaction(&record(1, 2, 5, emoji), delta).await.unwrap();
            assert_eq!(result, ScoringResult::Blacklisted);
        }
        assert_eq!(stored_reactions(&manager).await, 0);
        let rating = manager.rating_store().get_or_create_rating(100, 2).await.unwrap();
        assert_eq!(rating.rating, 0);

        // scoped to the chat
        let other_chat = ReactionRecord {
            chat_id: 101,
            ..record(1, 2, 5, "👍")
        };
        let result = store.record_reaction(&other_chat, 1).await.unwrap();
        assert_eq!(result, ScoringResult::Applied { delta: 1 });
    }

    #[tokio::test]
    async fn concurrent_identical_records_store_once() {
        let (_file, manager) = temp_manager().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = manager.reaction_store();
            handles.push(tokio::spawn(async move {
                store.record_reaction(&record(1, 2, 5, "👍"), 1).await
            }));
        }

        let mut applied = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(ScoringResult::Applied { .. }) => applied += 1,
                Err(DatabaseError::Duplicate) => duplicates += 1,
                other => panic!("unexpected result: {other:?}"),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(duplicates, 7);
        let rating = manager.rating_store().get_or_create_rating(100, 2).await.unwrap();
        assert_eq!(rating.rating, 1);
    }

    #[tokio::test]
    async fn expired_deadline_rolls_back_the_whole_reaction() {
        let (_file, manager) = temp_manager().await;
        let hurried = manager.with_operation_timeout(Duration::ZERO);

        let result = hurried
            .reaction_store()
            .record_reaction(&record(1, 2, 5, "👍"), 1)
            .await;
        assert!(matches!(result, Err(DatabaseError::Timeout)));

        assert_eq!(stored_reactions(&manager).await, 0);
        let retried = manager
            .reaction_store()
            .record_reaction(&record(1, 2, 5, "👍"), 1)
            .await
            .unwrap();
        assert_eq!(retried, ScoringResult::Applied { delta: 1 });
    }

    #[tokio::test]
    async fn top_ratings_respects_order_and_limit() {
        let (_file, manager) = temp_manager().await;
        let store = manager.reaction_store();

        // user 10 + n receives n likes from distinct users
        for target in 11..=13_i64 {
            for from in 0..(target - 10) {
                store
                    .record_reaction(&record(from, target, target * 100 + from, "👍"), 1)
                    .await
                    .unwrap();
            }
        }
        store.record_reaction(&record(1, 20, 1, "👎"), -1).await.unwrap();

        let top = manager
            .rating_store()
            .top_ratings(100, RatingOrder::Descending, 2)
            .await
            .unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, 13);
        assert_eq!(top[1].user_id, 12);

        let bottom = manager
            .rating_store()
            .top_ratings(100, RatingOrder::Ascending, 10)
            .await
            .unwrap();
        assert_eq!(bottom.len(), 4);
        assert_eq!(bottom[0].user_id, 20);
        assert_eq!(bottom[0].rating, -1);
        assert!(bottom.windows(2).all(|w| w[0].rating <= w[1].rating));
    }

    #[tokio::test]
    async fn reaction_counts_group_by_user_and_emoji() {
        let (_file, manager) = temp_manager().await;
        let store = manager.reaction_store();

        store.record_reaction(&record(1, 2, 5, "👍"), 1).await.unwrap();
        store.record_reaction(&record(3, 2, 5, "👍"), 1).await.unwrap();
        store.record_reaction(&record(3, 2, 5, "🐳"), 0).await.unwrap();
        store.record_reaction(&record(1, 4, 7, "💩"), -1).await.unwrap();

        let counts = store.reaction_counts(100).await.unwrap();
        assert_eq!(counts.len(), 3);
        let likes = counts
            .iter()
            .find(|c| c.user_id == 2 && c.emoji == "👍")
            .expect("likes for user 2");
        assert_eq!(likes.count, 2);

        let user = store.user_reaction_counts(100, 2).await.unwrap();
        let total: i64 = user.iter().map(|c| c.count).sum();
        assert_eq!(total, 3);
        assert!(store.reaction_counts(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blacklist_add_remove_report_state_changes() {
        let (_file, manager) = temp_manager().await;
        let store = manager.blacklist_store();

        assert!(!store.is_blacklisted(100, 2).await.unwrap());
        assert!(store.add_to_blacklist(100, 2).await.unwrap());
        assert!(!store.add_to_blacklist(100, 2).await.unwrap());
        assert!(store.is_blacklisted(100, 2).await.unwrap());
        assert!(!store.is_blacklisted(101, 2).await.unwrap());
        assert_eq!(store.list_blacklist(100).await.unwrap().len(), 1);

        assert!(store.remove_from_blacklist(100, 2).await.unwrap());
        assert!(!store.remove_from_blacklist(100, 2).await.unwrap());
        assert!(store.list_blacklist(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn username_cache_keeps_latest_name() {
        let (_file, manager) = temp_manager().await;
        let store = manager.username_store();

        assert!(store.get_username(2).await.unwrap().is_none());

        for name in ["@old", "@new"] {
            store
                .upsert_username(&CachedUsername {
                    user_id: 2,
                    display_name: name.to_string(),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let cached = store.get_username(2).await.unwrap().expect("cached name");
        assert_eq!(cached.display_name, "@new");
    }

    #[tokio::test]
    async fn get_or_create_rating_starts_at_zero() {
        let (_file, manager) = temp_manager().await;
        let rating = manager.rating_store().get_or_create_rating(100, 42).await.unwrap();
        assert_eq!(rating.rating, 0);

        let listed = manager
            .rating_store()
            .top_ratings(100, RatingOrder::Descending, 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
