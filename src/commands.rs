use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::db::{RatingOrder, ScoreEntry};
use crate::ingest::ChatUser;
use crate::ledger::{Ledger, LedgerError, ReactionTally, TallyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Rep,
    RepTop,
    RevRepTop,
    Likes,
    Dislikes,
    Whales,
    Blacklist,
    Unblacklist,
    Blacklisted,
}

impl Command {
    /// Parses the first word of `text`. A `/cmd@name` suffix must match
    /// `bot_username` when one is known.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let word = word.strip_prefix('/')?;

        let name = match word.split_once('@') {
            Some((name, addressee)) => {
                if let Some(bot) = bot_username {
                    if !addressee.eq_ignore_ascii_case(bot.trim_start_matches('@')) {
                        return None;
                    }
                }
                name
            }
            None => word,
        };

        match name.to_ascii_lowercase().as_str() {
            "rep" => Some(Self::Rep),
            "reptop" => Some(Self::RepTop),
            "revreptop" => Some(Self::RevRepTop),
            "likes" => Some(Self::Likes),
            "dislikes" => Some(Self::Dislikes),
            "whales" => Some(Self::Whales),
            "blacklist" => Some(Self::Blacklist),
            "unblacklist" => Some(Self::Unblacklist),
            "blacklisted" => Some(Self::Blacklisted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandContext {
    pub chat_id: i64,
    pub sender: ChatUser,
    /// Author of the message the command replied to.
    #[serde(default)]
    pub reply_to: Option<ChatUser>,
    /// Decided by the chat integration; the ledger performs no authorization.
    #[serde(default)]
    pub sender_is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Reply(String),
    Ignored,
}

/// Live member lookup provided by the chat integration.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Fails with [`LedgerError::LookupMiss`] when the member cannot be
    /// resolved.
    async fn display_name(&self, chat_id: i64, user_id: i64) -> Result<String, LedgerError>;
}

/// Directory that never resolves anyone; names come from the cache.
pub struct OfflineDirectory;

#[async_trait]
impl ChatDirectory for OfflineDirectory {
    async fn display_name(&self, _chat_id: i64, user_id: i64) -> Result<String, LedgerError> {
        Err(LedgerError::LookupMiss(user_id))
    }
}

pub struct CommandHandler {
    ledger: Arc<Ledger>,
    directory: Arc<dyn ChatDirectory>,
    bot_username: Option<String>,
}

impl CommandHandler {
    pub fn new(
        ledger: Arc<Ledger>,
        directory: Arc<dyn ChatDirectory>,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            ledger,
            directory,
            bot_username,
        }
    }

    #[instrument(skip(self, ctx), fields(chat_id = ctx.chat_id, sender = ctx.sender.id))]
    pub async fn handle(
        &self,
        text: &str,
        ctx: &CommandContext,
    ) -> Result<CommandOutcome, LedgerError> {
        let Some(command) = Command::parse(text, self.bot_username.as_deref()) else {
            return Ok(CommandOutcome::Ignored);
        };
        debug!(?command, "handling command");

        match command {
            Command::Rep => self.rep(ctx).await,
            Command::RepTop => self.top(ctx.chat_id, RatingOrder::Descending).await,
            Command::RevRepTop => self.top(ctx.chat_id, RatingOrder::Ascending).await,
            Command::Likes => self.kind_top(ctx.chat_id, TallyKind::Likes).await,
            Command::Dislikes => self.kind_top(ctx.chat_id, TallyKind::Dislikes).await,
            Command::Whales => self.kind_top(ctx.chat_id, TallyKind::Whales).await,
            Command::Blacklist => self.blacklist(ctx, true).await,
            Command::Unblacklist => self.blacklist(ctx, false).await,
            Command::Blacklisted => self.list_blacklist(ctx.chat_id).await,
        }
    }

    async fn rep(&self, ctx: &CommandContext) -> Result<CommandOutcome, LedgerError> {
        let user = match &ctx.reply_to {
            Some(user) if user.is_bot => return Ok(CommandOutcome::Ignored),
            Some(user) => user,
            None => &ctx.sender,
        };

        let name = match user.display_name() {
            Some(name) => name,
            None => self.resolve_name(ctx.chat_id, user.id).await?,
        };
        let rating = self.ledger.get_user_rating(ctx.chat_id, user.id).await?;
        let tally = self.ledger.get_user_tally(ctx.chat_id, user.id).await?;

        Ok(CommandOutcome::Reply(format!(
            "{name}: {} (👍 {} / 👎 {} / 🐳 {})",
            rating.rating, tally.likes, tally.dislikes, tally.whales
        )))
    }

    async fn top(&self, chat_id: i64, order: RatingOrder) -> Result<CommandOutcome, LedgerError> {
        let entries = self.ledger.top_rating(chat_id, order).await?;
        let title = match order {
            RatingOrder::Descending => "Rating top:",
            RatingOrder::Ascending => "Rating top (reversed):",
        };
        self.render_scores(chat_id, title, &entries).await
    }

    async fn render_scores(
        &self,
        chat_id: i64,
        title: &str,
        entries: &[ScoreEntry],
    ) -> Result<CommandOutcome, LedgerError> {
        if entries.is_empty() {
            return Ok(CommandOutcome::Reply(format!("{title}\nNobody yet.")));
        }

        let mut reply = title.to_string();
        for entry in entries {
            let name = self.resolve_name(chat_id, entry.user_id).await?;
            reply.push_str(&format!("\n{name}: {}", entry.rating));
        }
        Ok(CommandOutcome::Reply(reply))
    }

    async fn kind_top(&self, chat_id: i64, kind: TallyKind) -> Result<CommandOutcome, LedgerError> {
        let tallies = self.ledger.top_by_reaction_kind(chat_id, kind).await?;
        let title = match kind {
            TallyKind::Likes => "Most liked:",
            TallyKind::Dislikes => "Most disliked:",
            TallyKind::Whales => "Most 🐳:",
        };
        self.render_tallies(chat_id, title, kind, &tallies).await
    }

    async fn render_tallies(
        &self,
        chat_id: i64,
        title: &str,
        kind: TallyKind,
        tallies: &[ReactionTally],
    ) -> Result<CommandOutcome, LedgerError> {
        if tallies.is_empty() {
            return Ok(CommandOutcome::Reply(format!("{title}\nNobody yet.")));
        }

        let mut reply = title.to_string();
        for (place, tally) in tallies.iter().enumerate() {
            let name = self.resolve_name(chat_id, tally.user_id).await?;
            reply.push_str(&format!("\n{}. {name}: {}", place + 1, tally.count(kind)));
        }
        Ok(CommandOutcome::Reply(reply))
    }

    async fn blacklist(
        &self,
        ctx: &CommandContext,
        add: bool,
    ) -> Result<CommandOutcome, LedgerError> {
        if !ctx.sender_is_admin {
            return Ok(CommandOutcome::Reply(
                "Only chat administrators can change the blacklist.".to_string(),
            ));
        }
        let Some(target) = &ctx.reply_to else {
            return Ok(CommandOutcome::Reply(
                "Reply to a message from the user you want to change.".to_string(),
            ));
        };

        let name = match target.display_name() {
            Some(name) => name,
            None => self.resolve_name(ctx.chat_id, target.id).await?,
        };

        let result = if add {
            self.ledger.add_blacklist(ctx.chat_id, target.id).await
        } else {
            self.ledger.remove_blacklist(ctx.chat_id, target.id).await
        };

        let reply = match result {
            Ok(()) if add => format!("{name} is now blacklisted."),
            Ok(()) => format!("{name} is no longer blacklisted."),
            Err(LedgerError::AlreadyBlacklisted) => format!("{name} is already blacklisted."),
            Err(LedgerError::NotBlacklisted) => format!("{name} is not blacklisted."),
            Err(err) => return Err(err),
        };
        Ok(CommandOutcome::Reply(reply))
    }

    async fn list_blacklist(&self, chat_id: i64) -> Result<CommandOutcome, LedgerError> {
        let entries = self.ledger.list_blacklist(chat_id).await?;
        if entries.is_empty() {
            return Ok(CommandOutcome::Reply("The blacklist is empty.".to_string()));
        }

        let mut reply = "Blacklisted:".to_string();
        for entry in entries {
            let name = self.resolve_name(chat_id, entry.user_id).await?;
            reply.push_str(&format!("\n{name}"));
        }
        Ok(CommandOutcome::Reply(reply))
    }

    /// Live lookup, then the username cache, then the raw id. Only storage
    /// errors from the cache read escape.
    async fn resolve_name(&self, chat_id: i64, user_id: i64) -> Result<String, LedgerError> {
        match self.directory.display_name(chat_id, user_id).await {
            Ok(name) => return Ok(name),
            Err(err) => debug!(user_id, error = %err, "live lookup failed, using cache"),
        }

        Ok(self
            .ledger
            .cached_username(user_id)
            .await?
            .unwrap_or_else(|| user_id.to_string()))
    }
}
