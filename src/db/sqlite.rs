use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use parking_lot::Mutex;

use crate::db::schema::{blacklist, ratings, reactions, scoring_attempts, usernames};

use super::{
    DatabaseError,
    models::{
        BlacklistEntry, CachedUsername, RatingOrder, ReactionCount, ReactionRecord, ScoreEntry,
        ScoringResult,
    },
};

fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

/// The single SQLite connection. Holding its lock is the critical section
/// every read and write goes through.
#[derive(Clone)]
pub struct SqliteHandle {
    conn: Arc<Mutex<SqliteConnection>>,
    operation_timeout: Duration,
}

impl SqliteHandle {
    pub fn open(
        path: &str,
        busy_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let mut conn = SqliteConnection::establish(path)
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            busy_timeout.as_millis()
        ))
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            operation_timeout,
        })
    }

    /// Same connection, different per-operation deadline.
    #[cfg(test)]
    pub fn with_operation_timeout(&self, operation_timeout: Duration) -> Self {
        Self {
            conn: self.conn.clone(),
            operation_timeout,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub async fn run<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let deadline = Instant::now() + self.operation_timeout;
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .try_lock_until(deadline)
                .ok_or(DatabaseError::Timeout)?;
            op(&mut guard)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    /// Runs `op` inside an immediate transaction. Past the deadline the
    /// transaction is rolled back instead of committed.
    pub async fn transaction<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let deadline = Instant::now() + self.operation_timeout;
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .try_lock_until(deadline)
                .ok_or(DatabaseError::Timeout)?;
            guard.immediate_transaction(|conn| {
                let value = op(conn)?;
                if Instant::now() >= deadline {
                    return Err(DatabaseError::Timeout);
                }
                Ok(value)
            })
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }
}

#[derive(Insertable)]
#[diesel(table_name = reactions)]
struct NewReaction<'a> {
    chat_id: i64,
    from_user_id: i64,
    user_id: i64,
    message_id: i64,
    reaction: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = scoring_attempts)]
struct NewScoringAttempt {
    chat_id: i64,
    from_user_id: i64,
    message_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ratings)]
struct DbRating {
    chat_id: i64,
    user_id: i64,
    rating: i64,
}

impl DbRating {
    fn to_score_entry(&self) -> ScoreEntry {
        ScoreEntry {
            chat_id: self.chat_id,
            user_id: self.user_id,
            rating: self.rating,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = blacklist)]
struct DbBlacklistEntry {
    chat_id: i64,
    user_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = usernames)]
struct DbUsername {
    user_id: i64,
    display_name: String,
    updated_at: String,
}

impl DbUsername {
    fn to_cached_username(&self) -> Result<CachedUsername, DatabaseError> {
        Ok(CachedUsername {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = usernames)]
struct NewUsername<'a> {
    user_id: i64,
    display_name: &'a str,
    updated_at: String,
}

fn ensure_rating_row(
    conn: &mut SqliteConnection,
    chat_id: i64,
    user_id: i64,
) -> Result<(), DatabaseError> {
    diesel::insert_or_ignore_into(ratings::table)
        .values(&DbRating {
            chat_id,
            user_id,
            rating: 0,
        })
        .execute(conn)?;
    Ok(())
}

pub struct SqliteReactionStore {
    handle: SqliteHandle,
}

impl SqliteReactionStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::ReactionStore for SqliteReactionStore {
    async fn record_reaction(
        &self,
        record: &ReactionRecord,
        delta: i64,
    ) -> Result<ScoringResult, DatabaseError> {
        let record = record.clone();
        self.handle
            .transaction(move |conn| {
                let blacklisted = diesel::select(diesel::dsl::exists(
                    blacklist::table.find((record.chat_id, record.target_user_id)),
                ))
                .get_result::<bool>(conn)?;
                if blacklisted {
                    return Ok(ScoringResult::Blacklisted);
                }

                diesel::insert_into(reactions::table)
                    .values(NewReaction {
                        chat_id: record.chat_id,
                        from_user_id: record.from_user_id,
                        user_id: record.target_user_id,
                        message_id: record.message_id,
                        reaction: &record.emoji,
                    })
                    .execute(conn)?;

                if delta == 0 {
                    return Ok(ScoringResult::NotScored);
                }

                let marked = diesel::insert_or_ignore_into(scoring_attempts::table)
                    .values(NewScoringAttempt {
                        chat_id: record.chat_id,
                        from_user_id: record.from_user_id,
                        message_id: record.message_id,
                    })
                    .execute(conn)?;
                if marked == 0 {
                    return Ok(ScoringResult::AlreadyScored);
                }

                ensure_rating_row(conn, record.chat_id, record.target_user_id)?;
                diesel::update(
                    ratings::table
                        .filter(ratings::chat_id.eq(record.chat_id))
                        .filter(ratings::user_id.eq(record.target_user_id)),
                )
                .set(ratings::rating.eq(ratings::rating + delta))
                .execute(conn)?;

                Ok(ScoringResult::Applied { delta })
            })
            .await
    }

    async fn reaction_counts(&self, chat_id: i64) -> Result<Vec<ReactionCount>, DatabaseError> {
        self.handle
            .run(move |conn| {
                let rows = reactions::table
                    .filter(reactions::chat_id.eq(chat_id))
                    .group_by((reactions::user_id, reactions::reaction))
                    .select((
                        reactions::user_id,
                        reactions::reaction,
                        diesel::dsl::count_star(),
                    ))
                    .load::<(i64, String, i64)>(conn)?;
                Ok(rows
                    .into_iter()
                    .map(|(user_id, emoji, count)| ReactionCount {
                        user_id,
                        emoji,
                        count,
                    })
                    .collect())
            })
            .await
    }

    async fn user_reaction_counts(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<Vec<ReactionCount>, DatabaseError> {
        self.handle
            .run(move |conn| {
                let rows = reactions::table
                    .filter(reactions::chat_id.eq(chat_id))
                    .filter(reactions::user_id.eq(user_id))
                    .group_by(reactions::reaction)
                    .select((reactions::reaction, diesel::dsl::count_star()))
                    .load::<(String, i64)>(conn)?;
                Ok(rows
                    .into_iter()
                    .map(|(emoji, count)| ReactionCount {
                        user_id,
                        emoji,
                        count,
                    })
                    .collect())
            })
            .await
    }
}

pub struct SqliteRatingStore {
    handle: SqliteHandle,
}

impl SqliteRatingStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::RatingStore for SqliteRatingStore {
    async fn get_or_create_rating(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ScoreEntry, DatabaseError> {
        self.handle
            .transaction(move |conn| {
                ensure_rating_row(conn, chat_id, user_id)?;
                let row = ratings::table
                    .find((chat_id, user_id))
                    .select(DbRating::as_select())
                    .first::<DbRating>(conn)?;
                Ok(row.to_score_entry())
            })
            .await
    }

    async fn top_ratings(
        &self,
        chat_id: i64,
        order: RatingOrder,
        limit: i64,
    ) -> Result<Vec<ScoreEntry>, DatabaseError> {
        self.handle
            .run(move |conn| {
                let query = ratings::table
                    .filter(ratings::chat_id.eq(chat_id))
                    .select(DbRating::as_select())
                    .into_boxed();
                let query = match order {
                    RatingOrder::Descending => query.order(ratings::rating.desc()),
                    RatingOrder::Ascending => query.order(ratings::rating.asc()),
                };
                let rows = query
                    .then_order_by(ratings::user_id.asc())
                    .limit(limit)
                    .load::<DbRating>(conn)?;
                Ok(rows.iter().map(DbRating::to_score_entry).collect())
            })
            .await
    }
}

pub struct SqliteBlacklistStore {
    handle: SqliteHandle,
}

impl SqliteBlacklistStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::BlacklistStore for SqliteBlacklistStore {
    async fn is_blacklisted(&self, chat_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        self.handle
            .run(move |conn| {
                diesel::select(diesel::dsl::exists(
                    blacklist::table.find((chat_id, user_id)),
                ))
                .get_result::<bool>(conn)
                .map_err(DatabaseError::from)
            })
            .await
    }

    async fn add_to_blacklist(&self, chat_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        self.handle
            .transaction(move |conn| {
                let inserted = diesel::insert_or_ignore_into(blacklist::table)
                    .values(&DbBlacklistEntry { chat_id, user_id })
                    .execute(conn)?;
                Ok(inserted > 0)
            })
            .await
    }

    async fn remove_from_blacklist(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        self.handle
            .transaction(move |conn| {
                let deleted = diesel::delete(blacklist::table.find((chat_id, user_id)))
                    .execute(conn)?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn list_blacklist(&self, chat_id: i64) -> Result<Vec<BlacklistEntry>, DatabaseError> {
        self.handle
            .run(move |conn| {
                let rows = blacklist::table
                    .filter(blacklist::chat_id.eq(chat_id))
                    .order(blacklist::user_id.asc())
                    .select(DbBlacklistEntry::as_select())
                    .load::<DbBlacklistEntry>(conn)?;
                Ok(rows
                    .into_iter()
                    .map(|row| BlacklistEntry {
                        chat_id: row.chat_id,
                        user_id: row.user_id,
                    })
                    .collect())
            })
            .await
    }
}

pub struct SqliteUsernameStore {
    handle: SqliteHandle,
}

impl SqliteUsernameStore {
    pub fn new(handle: SqliteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl super::UsernameStore for SqliteUsernameStore {
    async fn upsert_username(&self, entry: &CachedUsername) -> Result<(), DatabaseError> {
        let entry = entry.clone();
        self.handle
            .transaction(move |conn| {
                diesel::replace_into(usernames::table)
                    .values(NewUsername {
                        user_id: entry.user_id,
                        display_name: &entry.display_name,
                        updated_at: datetime_to_string(&entry.updated_at),
                    })
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn get_username(&self, user_id: i64) -> Result<Option<CachedUsername>, DatabaseError> {
        self.handle
            .run(move |conn| {
                usernames::table
                    .find(user_id)
                    .select(DbUsername::as_select())
                    .first::<DbUsername>(conn)
                    .optional()?
                    .map(|row| row.to_cached_username())
                    .transpose()
            })
            .await
    }
}
