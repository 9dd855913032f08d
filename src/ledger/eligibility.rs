use std::sync::Arc;

use crate::db::{BlacklistStore, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Accept,
    RejectSelf,
    RejectBlacklisted,
}

/// Decides whether a reaction may touch storage at all. Runs before the rate
/// limiter and before any write.
pub struct EligibilityFilter {
    blacklist: Arc<dyn BlacklistStore>,
}

impl EligibilityFilter {
    pub fn new(blacklist: Arc<dyn BlacklistStore>) -> Self {
        Self { blacklist }
    }

    pub async fn evaluate(
        &self,
        chat_id: i64,
        from_user_id: i64,
        target_user_id: i64,
        _message_id: i64,
    ) -> Result<Eligibility, DatabaseError> {
        if from_user_id == target_user_id {
            return Ok(Eligibility::RejectSelf);
        }

        if self.blacklist.is_blacklisted(chat_id, target_user_id).await? {
            return Ok(Eligibility::RejectBlacklisted);
        }

        Ok(Eligibility::Accept)
    }
}
