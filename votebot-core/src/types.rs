use crate::error::{CoreError, DatabaseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Upvote,
    Downvote,
}

impl VoteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteAction::Upvote => "upvote",
            VoteAction::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteAction::Upvote),
            "downvote" => Ok(VoteAction::Downvote),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown action '{}', expected upvote or downvote", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Post,
    Comment,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Post => "post",
            ItemType::Comment => "comment",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ItemType::Post),
            "comment" => Ok(ItemType::Comment),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown item type '{}', expected post or comment", other),
            }),
        }
    }
}

/// One dedup ledger row. At most one exists per `(item_id, bot_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub item_id: String,
    pub item_type: ItemType,
    pub action: VoteAction,
    pub bot_id: String,
    pub created_at: DateTime<Utc>,
}

impl VoteRecord {
    /// Rebuilds a record from the raw column values stored by the vote store.
    pub fn from_columns(
        item_id: String,
        item_type: &str,
        action: &str,
        bot_id: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let item_type = item_type.parse().map_err(|_| {
            CoreError::Database(DatabaseError::CorruptRecord {
                details: format!("item_type '{}' for {}", item_type, item_id),
            })
        })?;
        let action = action.parse().map_err(|_| {
            CoreError::Database(DatabaseError::CorruptRecord {
                details: format!("action '{}' for {}", action, item_id),
            })
        })?;

        Ok(Self {
            item_id,
            item_type,
            action,
            bot_id,
            created_at,
        })
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "REDDIT_CLIENT_ID", default)]
    pub client_id: String,
    #[serde(rename = "REDDIT_CLIENT_SECRET", default)]
    pub client_secret: String,
    #[serde(rename = "REDDIT_USERNAME", default)]
    pub username: String,
    #[serde(rename = "REDDIT_PASSWORD", default)]
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable definition of one bot unit.
///
/// `action` and `item_type` are `None` when the configuration left them empty
/// or named something unknown; such a bot runs but acts on nothing.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub id: String,
    pub subreddit: String,
    pub action: Option<VoteAction>,
    pub item_type: Option<ItemType>,
    pub upvote_user_keyword: HashSet<String>,
    pub upvote_body_keyword: String,
    pub follow_author: bool,
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub full_id: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub likes: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub full_id: String,
    pub author: String,
    pub body: String,
    pub likes: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostWithComments {
    pub post: Post,
    pub comments: Vec<Comment>,
}
