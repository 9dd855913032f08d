pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    BlacklistEntry, CachedUsername, RatingOrder, ReactionCount, ReactionRecord, ScoreEntry,
    ScoringResult,
};
pub use self::stores::{BlacklistStore, RatingStore, ReactionStore, UsernameStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod stores;
