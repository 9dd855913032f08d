use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::db::ReactionRecord;
use crate::ledger::{IgnoreReason, Ledger, LedgerError, RecordOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub message_id: i64,
    pub chat: ChatRef,
    /// Author of the reacted-to message; receives the score.
    pub from_user: ChatUser,
    #[serde(default)]
    pub reactions: Vec<PayloadReaction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadReaction {
    pub emoji: String,
    pub from: UserRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ChatUser {
    /// `@username`, else `first last`, else `first`. `None` when the user
    /// carries no name at all.
    pub fn display_name(&self) -> Option<String> {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return Some(format!("@{username}"));
        }

        let first = self.first_name.trim();
        let last = self.last_name.as_deref().map(str::trim).unwrap_or("");
        match (first.is_empty(), last.is_empty()) {
            (false, false) => Some(format!("{first} {last}")),
            (false, true) => Some(first.to_string()),
            (true, false) => Some(last.to_string()),
            (true, true) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubmitReport {
    pub skipped_bot: bool,
    pub outcomes: Vec<RecordOutcome>,
    pub failed: usize,
    pub first_error: Option<LedgerError>,
}

impl SubmitReport {
    pub fn scored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Scored { .. }))
            .count()
    }

    pub fn recorded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Recorded))
            .count()
    }

    pub fn ignored(&self) -> usize {
        self.ignored_reasons().count()
    }

    pub fn ignored_reasons(&self) -> impl Iterator<Item = IgnoreReason> + '_ {
        self.outcomes.iter().filter_map(|o| match o {
            RecordOutcome::Ignored(reason) => Some(*reason),
            _ => None,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.first_error.is_none()
    }
}

/// Forwards every reaction in `payload` to the ledger. A failing reaction
/// does not undo the ones recorded before it; the first failure is kept in
/// the report.
#[instrument(
    skip_all,
    fields(chat_id = payload.chat.id, message_id = payload.message_id)
)]
pub async fn submit(ledger: &Ledger, payload: &ReactionPayload) -> SubmitReport {
    let mut report = SubmitReport::default();

    if payload.from_user.is_bot {
        debug!(user_id = payload.from_user.id, "message author is a bot, submission ignored");
        report.skipped_bot = true;
        return report;
    }

    if let Some(name) = payload.from_user.display_name() {
        if let Err(err) = ledger.remember_username(payload.from_user.id, &name).await {
            warn!(user_id = payload.from_user.id, error = %err, "failed to cache username");
        }
    }

    for reaction in &payload.reactions {
        let record = ReactionRecord {
            chat_id: payload.chat.id,
            from_user_id: reaction.from.id,
            target_user_id: payload.from_user.id,
            message_id: payload.message_id,
            emoji: reaction.emoji.clone(),
        };

        match ledger.record_reaction(&record).await {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(err) => {
                error!(
                    from = record.from_user_id,
                    retryable = err.is_retryable(),
                    error = %err,
                    "failed to record reaction"
                );
                report.failed += 1;
                if report.first_error.is_none() {
                    report.first_error = Some(err);
                }
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use test_case::test_case;

    use super::{ChatRef, ChatUser, PayloadReaction, ReactionPayload, UserRef, submit};
    use crate::config::Config;
    use crate::db::DatabaseError;
    use crate::db::manager::tests::temp_manager;
    use crate::ledger::tests::{CHAT, temp_ledger};
    use crate::ledger::{IgnoreReason, Ledger, LedgerError, RateLimiter};

    pub(crate) fn payload(author: i64, message: i64, reactions: &[(i64, &str)]) -> ReactionPayload {
        ReactionPayload {
            message_id: message,
            chat: ChatRef { id: CHAT },
            from_user: ChatUser {
                id: author,
                first_name: "Bob".to_string(),
                username: Some("bob".to_string()),
                ..ChatUser::default()
            },
            reactions: reactions
                .iter()
                .map(|(from, emoji)| PayloadReaction {
                    emoji: emoji.to_string(),
                    from: UserRef { id: *from },
                })
                .collect(),
        }
    }

    #[test_case(Some("bob"), "Bob", Some("Smith") => Some("@bob".to_string()))]
    #[test_case(None, "Bob", Some("Smith") => Some("Bob Smith".to_string()))]
    #[test_case(Some(""), "Bob", None => Some("Bob".to_string()))]
    #[test_case(None, "", Some("Smith") => Some("Smith".to_string()))]
    #[test_case(None, " ", None => None)]
    fn display_name_prefers_username(
        username: Option<&str>,
        first: &str,
        last: Option<&str>,
    ) -> Option<String> {
        ChatUser {
            id: 1,
            first_name: first.to_string(),
            last_name: last.map(String::from),
            username: username.map(String::from),
            ..ChatUser::default()
        }
        .display_name()
    }

    #[test]
    fn payload_parses_with_optional_fields_missing() {
        let body = r#"{
            "message_id": 5,
            "chat": {"id": 100},
            "from_user": {"id": 2, "first_name": "Bob"},
            "reactions": [{"emoji": "👍", "from": {"id": 1}}]
        }"#;
        let parsed: ReactionPayload = serde_json::from_str(body).expect("payload");
        assert!(!parsed.from_user.is_bot);
        assert_eq!(parsed.from_user.username, None);
        assert_eq!(parsed.reactions[0].from.id, 1);
    }

    #[tokio::test]
    async fn bot_authors_are_ignored_entirely() {
        let (_file, ledger) = temp_ledger(Duration::from_millis(20)).await;
        let mut bot = payload(2, 5, &[(1, "👍")]);
        bot.from_user.is_bot = true;

        let report = submit(&ledger, &bot).await;
        assert!(report.skipped_bot);
        assert!(report.outcomes.is_empty());
        assert_eq!(ledger.get_user_rating(CHAT, 2).await.unwrap().rating, 0);
        assert_eq!(ledger.cached_username(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn each_reaction_is_forwarded_independently() {
        let (_file, ledger) = temp_ledger(Duration::from_secs(10)).await;
        let body = payload(2, 5, &[(1, "👍"), (3, "🐳"), (2, "👍"), (1, "🔥")]);

        let report = submit(&ledger, &body).await;
        assert!(report.is_ok());
        assert_eq!(report.scored(), 1);
        assert_eq!(report.recorded(), 1);
        assert_eq!(report.ignored(), 2);
        let reasons: Vec<_> = report.ignored_reasons().collect();
        assert!(reasons.contains(&IgnoreReason::SelfReaction));
        assert!(reasons.contains(&IgnoreReason::RateLimited));

        assert_eq!(ledger.get_user_rating(CHAT, 2).await.unwrap().rating, 1);
        assert_eq!(ledger.cached_username(2).await.unwrap().as_deref(), Some("@bob"));
    }

    #[tokio::test]
    async fn replayed_submission_changes_nothing() {
        let (_file, ledger) = temp_ledger(Duration::from_millis(20)).await;
        let body = payload(2, 5, &[(1, "👍"), (3, "👎")]);

        submit(&ledger, &body).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let replay = submit(&ledger, &body).await;

        assert_eq!(replay.scored(), 0);
        assert!(replay.ignored_reasons().all(|r| r == IgnoreReason::Duplicate));
        assert_eq!(ledger.get_user_rating(CHAT, 2).await.unwrap().rating, 0);
        assert_eq!(ledger.get_user_tally(CHAT, 2).await.unwrap().likes, 1);
        assert_eq!(ledger.get_user_tally(CHAT, 2).await.unwrap().dislikes, 1);
    }

    #[tokio::test]
    async fn storage_failures_are_reported_per_reaction() {
        let (_file, manager) = temp_manager().await;
        let expired = manager.with_operation_timeout(Duration::ZERO);
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(20)));
        let ledger = Ledger::new(&expired, limiter, &Config::default());

        let report = submit(&ledger, &payload(2, 5, &[(1, "👍"), (3, "👍")])).await;
        assert!(!report.is_ok());
        assert_eq!(report.failed, 2);
        assert!(matches!(
            report.first_error,
            Some(LedgerError::Storage(DatabaseError::Timeout))
        ));
        assert!(report.first_error.as_ref().is_some_and(LedgerError::is_retryable));

        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(20)));
        let healthy = Ledger::new(&manager, limiter, &Config::default());
        assert_eq!(healthy.get_user_rating(CHAT, 2).await.unwrap().rating, 0);
    }
}
