use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::ingest::SubmitReport;
use crate::ledger::IgnoreReason;

/// Process counters for the reaction webhook. Reset on restart.
#[derive(Debug, Default)]
pub struct ReactionMetrics {
    submissions_received: AtomicU64,
    submissions_rejected: AtomicU64,
    bot_submissions: AtomicU64,
    reactions_received: AtomicU64,
    reactions_scored: AtomicU64,
    reactions_recorded: AtomicU64,
    ignored_self: AtomicU64,
    ignored_blacklisted: AtomicU64,
    ignored_rate_limited: AtomicU64,
    ignored_duplicate: AtomicU64,
    reactions_failed: AtomicU64,
}

impl ReactionMetrics {
    pub fn submission_received(&self) {
        self.submissions_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Body could not be parsed.
    pub fn submission_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe(&self, report: &SubmitReport) {
        if report.skipped_bot {
            self.bot_submissions.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let received = report.outcomes.len() + report.failed;
        self.reactions_received
            .fetch_add(received as u64, Ordering::Relaxed);
        self.reactions_scored
            .fetch_add(report.scored() as u64, Ordering::Relaxed);
        self.reactions_recorded
            .fetch_add(report.recorded() as u64, Ordering::Relaxed);
        self.reactions_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        for reason in report.ignored_reasons() {
            self.ignored_counter(reason).fetch_add(1, Ordering::Relaxed);
        }
    }

    fn ignored_counter(&self, reason: IgnoreReason) -> &AtomicU64 {
        match reason {
            IgnoreReason::SelfReaction => &self.ignored_self,
            IgnoreReason::Blacklisted => &self.ignored_blacklisted,
            IgnoreReason::RateLimited => &self.ignored_rate_limited,
            IgnoreReason::Duplicate => &self.ignored_duplicate,
        }
    }

    pub fn format_prometheus(&self, uptime: Duration) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        format!(
            r#"# HELP reputation_uptime_seconds Number of seconds the service has been running
# TYPE reputation_uptime_seconds gauge
reputation_uptime_seconds {}

# HELP reputation_submissions_total Reaction submissions received
# TYPE reputation_submissions_total counter
reputation_submissions_total {}

# HELP reputation_submissions_rejected_total Submissions with a malformed body
# TYPE reputation_submissions_rejected_total counter
reputation_submissions_rejected_total {}

# HELP reputation_bot_submissions_total Submissions ignored because the author is a bot
# TYPE reputation_bot_submissions_total counter
reputation_bot_submissions_total {}

# HELP reputation_reactions_received_total Reactions forwarded to the ledger
# TYPE reputation_reactions_received_total counter
reputation_reactions_received_total {}

# HELP reputation_reactions_scored_total Reactions that moved a rating
# TYPE reputation_reactions_scored_total counter
reputation_reactions_scored_total {}

# HELP reputation_reactions_recorded_total Reactions stored without moving a rating
# TYPE reputation_reactions_recorded_total counter
reputation_reactions_recorded_total {}

# HELP reputation_reactions_ignored_total Reactions ignored, by reason
# TYPE reputation_reactions_ignored_total counter
reputation_reactions_ignored_total{{reason="self_reaction"}} {}
reputation_reactions_ignored_total{{reason="blacklisted"}} {}
reputation_reactions_ignored_total{{reason="rate_limited"}} {}
reputation_reactions_ignored_total{{reason="duplicate"}} {}

# HELP reputation_reactions_failed_total Reactions that hit a storage error
# TYPE reputation_reactions_failed_total counter
reputation_reactions_failed_total {}
"#,
            uptime.as_secs(),
            load(&self.submissions_received),
            load(&self.submissions_rejected),
            load(&self.bot_submissions),
            load(&self.reactions_received),
            load(&self.reactions_scored),
            load(&self.reactions_recorded),
            load(&self.ignored_self),
            load(&self.ignored_blacklisted),
            load(&self.ignored_rate_limited),
            load(&self.ignored_duplicate),
            load(&self.reactions_failed),
        )
    }
}
