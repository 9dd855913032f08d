use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::EmojiConfig;
use crate::db::ReactionCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmojiClass {
    Positive,
    Negative,
    Whale,
    Unknown,
}

impl EmojiClass {
    /// Contribution to the running rating.
    pub fn delta(self) -> i64 {
        match self {
            EmojiClass::Positive => 1,
            EmojiClass::Negative => -1,
            EmojiClass::Whale | EmojiClass::Unknown => 0,
        }
    }
}

/// The tallies a chat can be ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TallyKind {
    Likes,
    Dislikes,
    Whales,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTally {
    pub user_id: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub whales: i64,
}

impl ReactionTally {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn count(&self, kind: TallyKind) -> i64 {
        match kind {
            TallyKind::Likes => self.likes,
            TallyKind::Dislikes => self.dislikes,
            TallyKind::Whales => self.whales,
        }
    }

    fn add(&mut self, class: EmojiClass, count: i64) {
        match class {
            EmojiClass::Positive => self.likes += count,
            EmojiClass::Negative => self.dislikes += count,
            EmojiClass::Whale => self.whales += count,
            EmojiClass::Unknown => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmojiClassifier {
    classes: HashMap<String, EmojiClass>,
}

impl EmojiClassifier {
    pub fn new(config: &EmojiConfig) -> Self {
        let mut classes = HashMap::new();
        let groups = [
            (&config.positive, EmojiClass::Positive),
            (&config.negative, EmojiClass::Negative),
            (&config.whale, EmojiClass::Whale),
        ];
        for (emojis, class) in groups {
            for emoji in emojis {
                classes.insert(emoji.clone(), class);
            }
        }
        Self { classes }
    }

    pub fn classify(&self, emoji: &str) -> EmojiClass {
        self.classes
            .get(emoji)
            .copied()
            .unwrap_or(EmojiClass::Unknown)
    }

    /// Folds raw per-emoji counts into one tally per user, ordered by user id.
    pub fn tally(&self, counts: &[ReactionCount]) -> Vec<ReactionTally> {
        let mut by_user: BTreeMap<i64, ReactionTally> = BTreeMap::new();
        for count in counts {
            by_user
                .entry(count.user_id)
                .or_insert_with(|| ReactionTally::new(count.user_id))
                .add(self.classify(&count.emoji), count.count);
        }
        by_user.into_values().collect()
    }
}

impl Default for EmojiClassifier {
    fn default() -> Self {
        Self::new(&EmojiConfig::default())
    }
}
