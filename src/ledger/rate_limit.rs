use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Per-source-user cooldown between accepted reaction writes.
///
/// Every attempt refreshes the user's timestamp, including rejected ones, so
/// a steady burst keeps the user locked out until they pause for a full
/// cooldown. State lives only in memory and resets on restart.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_attempt: RwLock<HashMap<i64, Instant>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_attempt: RwLock::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, user_id: i64) -> bool {
        self.try_acquire_at(user_id, Instant::now())
    }

    /// Takes the write lock on every call: rejected attempts also store
    /// `now`, so there is no read-only path. The check and the refresh happen
    /// under one guard, which admits exactly one of several racing first
    /// attempts.
    pub fn try_acquire_at(&self, user_id: i64, now: Instant) -> bool {
        let previous = self.last_attempt.write().insert(user_id, now);
        match previous {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        }
    }

    /// Drops users idle for at least `idle`. Returns how many were removed.
    pub fn prune(&self, idle: Duration) -> usize {
        self.prune_at(idle, Instant::now())
    }

    pub fn prune_at(&self, idle: Duration, now: Instant) -> usize {
        let mut map = self.last_attempt.write();
        let before = map.len();
        map.retain(|_, last| now.saturating_duration_since(*last) < idle);
        before - map.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.last_attempt.read().len()
    }
}
