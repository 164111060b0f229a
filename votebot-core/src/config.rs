//! Bot configuration loading.
//!
//! The file is JSON (or TOML when the path ends in `.toml`) and keeps the key
//! names of the original `config.json`:
//!
//! ```json
//! {
//!   "app_name": "reddit-bot",
//!   "version": "1.0",
//!   "bots": [{
//!     "ID": "0",
//!     "subreddit": "golang",
//!     "action": "upvote",
//!     "actiontype": "comment",
//!     "upvoteUserKeyword": ["alice"],
//!     "upvoteBodyKeyword": "Golang",
//!     "credential": { "REDDIT_CLIENT_ID": "...", "REDDIT_CLIENT_SECRET": "...",
//!                     "REDDIT_USERNAME": "...", "REDDIT_PASSWORD": "..." }
//!   }]
//! }
//! ```
//!
//! Empty credential fields are filled from the `REDDIT_*` environment variables.

use crate::error::{ConfigError, CoreError};
use crate::types::{BotConfig, Credential, ItemType, VoteAction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_USERNAME: &str = "REDDIT_USERNAME";
pub const ENV_PASSWORD: &str = "REDDIT_PASSWORD";

const MAX_FETCH_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Delay between two fetch cycles.
    pub poll_interval_secs: u64,
    /// Delay between two processed posts.
    pub item_delay_secs: u64,
    pub fetch_limit: u32,
    pub request_timeout_secs: u64,
    pub user_agent: Option<String>,
    pub database_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            item_delay_secs: 5,
            fetch_limit: 50,
            request_timeout_secs: 30,
            user_agent: None,
            database_url: "sqlite://reddit_bot.db".to_string(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    app_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    bots: Vec<RawBot>,
    #[serde(default)]
    settings: Settings,
}

#[derive(Debug, Deserialize)]
struct RawBot {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    action: String,
    #[serde(rename = "actiontype", default)]
    action_type: String,
    #[serde(rename = "upvoteUserKeyword", default)]
    upvote_user_keyword: Vec<String>,
    #[serde(rename = "upvoteBodyKeyword", default)]
    upvote_body_keyword: String,
    #[serde(rename = "followAuthor", default = "default_follow_author")]
    follow_author: bool,
    #[serde(default)]
    credential: Credential,
}

fn default_follow_author() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub version: String,
    pub bots: Vec<BotConfig>,
    pub settings: Settings,
}

impl AppConfig {
    /// Loads and validates the file at `path`, using the process environment
    /// for credential fallbacks.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    pub fn load_with_env<F>(path: &Path, env: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("Reading bot configuration file: {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }),
            _ => CoreError::Io(e),
        })?;

        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            Self::from_toml_str(&contents, env)
        } else {
            Self::from_json_str(&contents, env)
        }
    }

    pub fn from_json_str<F>(contents: &str, env: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = serde_json::from_str(contents).map_err(|e| {
            CoreError::Config(ConfigError::InvalidFormat {
                details: e.to_string(),
            })
        })?;
        Self::from_raw(raw, env)
    }

    pub fn from_toml_str<F>(contents: &str, env: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(contents).map_err(ConfigError::from)?;
        Self::from_raw(raw, env)
    }

    fn from_raw<F>(raw: RawConfig, env: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        validate_settings(&raw.settings)?;

        if raw.bots.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "no bots configured".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        let mut bots = Vec::with_capacity(raw.bots.len());

        for (index, raw_bot) in raw.bots.into_iter().enumerate() {
            let bot = build_bot(index, raw_bot, &env)?;
            if !seen.insert(bot.id.clone()) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("duplicate bot ID '{}'", bot.id),
                }
                .into());
            }
            debug!(bot = %bot.id, subreddit = %bot.subreddit, "Loaded bot definition");
            bots.push(bot);
        }

        Ok(Self {
            app_name: raw.app_name,
            version: raw.version,
            bots,
            settings: raw.settings,
        })
    }

    pub fn bot(&self, id: &str) -> Result<&BotConfig, CoreError> {
        self.bots.iter().find(|bot| bot.id == id).ok_or_else(|| {
            CoreError::Config(ConfigError::UnknownBot {
                bot_id: id.to_string(),
            })
        })
    }

    /// Reddit asks for a descriptive user agent naming the account.
    pub fn user_agent_for(&self, bot: &BotConfig) -> String {
        match &self.settings.user_agent {
            Some(agent) => agent.clone(),
            None => {
                let version = if self.version.is_empty() {
                    env!("CARGO_PKG_VERSION")
                } else {
                    self.version.as_str()
                };
                format!("votebot/{} by {}", version, bot.credential.username)
            }
        }
    }
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.fetch_limit == 0 || settings.fetch_limit > MAX_FETCH_LIMIT {
        return Err(ConfigError::InvalidValue {
            field: "settings.fetch_limit".to_string(),
            value: settings.fetch_limit.to_string(),
        });
    }
    if settings.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "settings.request_timeout_secs".to_string(),
            value: "0".to_string(),
        });
    }
    if settings.database_url.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "settings.database_url".to_string(),
        });
    }
    Ok(())
}

fn build_bot<F>(index: usize, raw: RawBot, env: &F) -> Result<BotConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(ConfigError::MissingField {
            field: format!("bots[{}].ID", index),
        });
    }

    let subreddit = raw
        .subreddit
        .trim()
        .trim_start_matches("r/")
        .to_string();
    if subreddit.is_empty() {
        return Err(ConfigError::MissingField {
            field: format!("bots[{}].subreddit", index),
        });
    }

    let action = match raw.action.parse::<VoteAction>() {
        Ok(action) => Some(action),
        Err(_) => {
            warn!(bot = %id, action = %raw.action, "Unset or unknown action, bot will not act");
            None
        }
    };
    let item_type = match raw.action_type.parse::<ItemType>() {
        Ok(item_type) => Some(item_type),
        Err(_) => {
            warn!(bot = %id, actiontype = %raw.action_type, "Unset or unknown item type, bot will not act");
            None
        }
    };

    let credential = resolve_credential(index, raw.credential, env)?;

    Ok(BotConfig {
        id,
        subreddit,
        action,
        item_type,
        upvote_user_keyword: raw
            .upvote_user_keyword
            .into_iter()
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .collect(),
        upvote_body_keyword: raw.upvote_body_keyword,
        follow_author: raw.follow_author,
        credential,
    })
}

fn resolve_credential<F>(index: usize, mut credential: Credential, env: &F) -> Result<Credential, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let fields = [
        (&mut credential.client_id, ENV_CLIENT_ID),
        (&mut credential.client_secret, ENV_CLIENT_SECRET),
        (&mut credential.username, ENV_USERNAME),
        (&mut credential.password, ENV_PASSWORD),
    ];

    for (value, var_name) in fields {
        if value.trim().is_empty() {
            match env(var_name).filter(|v| !v.trim().is_empty()) {
                Some(from_env) => *value = from_env,
                None => {
                    return Err(ConfigError::MissingField {
                        field: format!("bots[{}].credential.{}", index, var_name),
                    })
                }
            }
        }
    }

    Ok(credential)
}
