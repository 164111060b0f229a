use std::collections::HashMap;
use votebot_core::{AppConfig, ConfigError, CoreError, ItemType, VoteAction};

const FULL_CONFIG: &str = r#"{
    "app_name": "reddit-bot",
    "version": "1.2",
    "bots": [
        {
            "ID": "0",
            "subreddit": "r/golang",
            "action": "upvote",
            "actiontype": "comment",
            "upvoteUserKeyword": ["aryamahzar_new", "dani198", " "],
            "upvoteBodyKeyword": "Golang",
            "credential": {
                "REDDIT_CLIENT_ID": "id0",
                "REDDIT_CLIENT_SECRET": "secret0",
                "REDDIT_USERNAME": "user0",
                "REDDIT_PASSWORD": "pass0"
            }
        },
        {
            "ID": "1",
            "subreddit": "rust",
            "action": "sideways",
            "actiontype": "",
            "followAuthor": false,
            "credential": {
                "REDDIT_CLIENT_ID": "id1",
                "REDDIT_CLIENT_SECRET": "secret1",
                "REDDIT_USERNAME": "user1",
                "REDDIT_PASSWORD": "pass1"
            }
        }
    ],
    "settings": { "poll_interval_secs": 20, "fetch_limit": 25 }
}"#;

fn no_env(_: &str) -> Option<String> {
    None
}

fn temp_path(extension: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("votebot_config_{}.{}", uuid::Uuid::new_v4(), extension))
}

#[test]
fn test_full_json_config() {
    let config = AppConfig::from_json_str(FULL_CONFIG, no_env).expect("config should load");

    assert_eq!(config.app_name, "reddit-bot");
    assert_eq!(config.bots.len(), 2);
    assert_eq!(config.settings.poll_interval_secs, 20);
    assert_eq!(config.settings.fetch_limit, 25);
    assert_eq!(config.settings.item_delay_secs, 5);
    assert_eq!(config.settings.request_timeout_secs, 30);

    let bot0 = config.bot("0").unwrap();
    assert_eq!(bot0.subreddit, "golang");
    assert_eq!(bot0.action, Some(VoteAction::Upvote));
    assert_eq!(bot0.item_type, Some(ItemType::Comment));
    assert_eq!(bot0.upvote_user_keyword.len(), 2);
    assert!(bot0.upvote_user_keyword.contains("dani198"));
    assert!(bot0.follow_author);
    assert_eq!(config.user_agent_for(bot0), "votebot/1.2 by user0");
}

#[test]
fn test_unknown_action_loads_as_unset() {
    let config = AppConfig::from_json_str(FULL_CONFIG, no_env).unwrap();
    let bot1 = config.bot("1").unwrap();
    assert_eq!(bot1.action, None);
    assert_eq!(bot1.item_type, None);
    assert!(!bot1.follow_author);
}

#[test]
fn test_action_names_match_exactly() {
    assert_eq!("upvote".parse::<VoteAction>().unwrap(), VoteAction::Upvote);
    assert_eq!("comment".parse::<ItemType>().unwrap(), ItemType::Comment);
    assert!("UPVOTE".parse::<VoteAction>().is_err());
    assert!(" post ".parse::<ItemType>().is_err());

    let json = r#"{ "bots": [ { "ID": "a", "subreddit": "rust", "action": "Upvote",
        "actiontype": "Post", "credential": { "REDDIT_CLIENT_ID": "i", "REDDIT_CLIENT_SECRET": "s",
        "REDDIT_USERNAME": "u", "REDDIT_PASSWORD": "p" } } ] }"#;
    let config = AppConfig::from_json_str(json, no_env).unwrap();
    assert_eq!(config.bots[0].action, None);
    assert_eq!(config.bots[0].item_type, None);
}

#[test]
fn test_unknown_bot_lookup() {
    let config = AppConfig::from_json_str(FULL_CONFIG, no_env).unwrap();
    assert!(matches!(
        config.bot("7"),
        Err(CoreError::Config(ConfigError::UnknownBot { .. }))
    ));
}

#[test]
fn test_credentials_fall_back_to_environment() {
    let json = r#"{ "bots": [ { "ID": "a", "subreddit": "rust", "action": "downvote",
        "actiontype": "post", "credential": { "REDDIT_USERNAME": "file_user" } } ] }"#;
    let env: HashMap<&str, &str> = [
        ("REDDIT_CLIENT_ID", "env_id"),
        ("REDDIT_CLIENT_SECRET", "env_secret"),
        ("REDDIT_USERNAME", "env_user"),
        ("REDDIT_PASSWORD", "env_pass"),
    ]
    .into_iter()
    .collect();

    let config =
        AppConfig::from_json_str(json, |name| env.get(name).map(|v| v.to_string())).unwrap();
    let credential = &config.bots[0].credential;
    assert_eq!(credential.client_id, "env_id");
    assert_eq!(credential.username, "file_user");
    assert_eq!(credential.password, "env_pass");
}

#[test]
fn test_missing_credential_is_fatal() {
    let json = r#"{ "bots": [ { "ID": "a", "subreddit": "rust",
        "credential": { "REDDIT_CLIENT_ID": "id", "REDDIT_CLIENT_SECRET": "s", "REDDIT_USERNAME": "u" } } ] }"#;

    match AppConfig::from_json_str(json, no_env) {
        Err(CoreError::Config(ConfigError::MissingField { field })) => {
            assert_eq!(field, "bots[0].credential.REDDIT_PASSWORD");
        }
        other => panic!("Expected MissingField, got {:?}", other.map(|c| c.bots.len())),
    }
}

#[test]
fn test_validation_failures() {
    let empty = r#"{ "bots": [] }"#;
    assert!(matches!(
        AppConfig::from_json_str(empty, no_env),
        Err(CoreError::Config(ConfigError::ValidationFailed { .. }))
    ));

    let credential = r#""credential": { "REDDIT_CLIENT_ID": "i", "REDDIT_CLIENT_SECRET": "s",
        "REDDIT_USERNAME": "u", "REDDIT_PASSWORD": "p" }"#;
    let duplicate = format!(
        r#"{{ "bots": [ {{ "ID": "x", "subreddit": "a", {c} }}, {{ "ID": "x", "subreddit": "b", {c} }} ] }}"#,
        c = credential
    );
    assert!(matches!(
        AppConfig::from_json_str(&duplicate, no_env),
        Err(CoreError::Config(ConfigError::ValidationFailed { .. }))
    ));

    let bad_limit = format!(
        r#"{{ "bots": [ {{ "ID": "x", "subreddit": "a", {c} }} ], "settings": {{ "fetch_limit": 500 }} }}"#,
        c = credential
    );
    assert!(matches!(
        AppConfig::from_json_str(&bad_limit, no_env),
        Err(CoreError::Config(ConfigError::InvalidValue { .. }))
    ));

    assert!(matches!(
        AppConfig::from_json_str("{ not json", no_env),
        Err(CoreError::Config(ConfigError::InvalidFormat { .. }))
    ));
}

#[test]
fn test_load_json_and_toml_files() {
    let json_path = temp_path("json");
    std::fs::write(&json_path, FULL_CONFIG).unwrap();
    let from_json = AppConfig::load_with_env(&json_path, no_env).unwrap();
    assert_eq!(from_json.bots.len(), 2);
    std::fs::remove_file(&json_path).ok();

    let toml_path = temp_path("toml");
    std::fs::write(
        &toml_path,
        r#"
app_name = "reddit-bot"

[settings]
item_delay_secs = 1

[[bots]]
ID = "t"
subreddit = "rust"
action = "upvote"
actiontype = "post"
upvoteUserKeyword = ["alice"]
upvoteBodyKeyword = "rust"

[bots.credential]
REDDIT_CLIENT_ID = "i"
REDDIT_CLIENT_SECRET = "s"
REDDIT_USERNAME = "u"
REDDIT_PASSWORD = "p"
"#,
    )
    .unwrap();
    let from_toml = AppConfig::load_with_env(&toml_path, no_env).unwrap();
    assert_eq!(from_toml.settings.item_delay_secs, 1);
    assert_eq!(from_toml.bots[0].item_type, Some(ItemType::Post));
    std::fs::remove_file(&toml_path).ok();
}

#[test]
fn test_missing_file() {
    let path = temp_path("json");
    assert!(matches!(
        AppConfig::load_with_env(&path, no_env),
        Err(CoreError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[test]
fn test_credential_debug_is_redacted() {
    let config = AppConfig::from_json_str(FULL_CONFIG, no_env).unwrap();
    let rendered = format!("{:?}", config.bots[0].credential);
    assert!(rendered.contains("user0"));
    assert!(!rendered.contains("secret0"));
    assert!(!rendered.contains("pass0"));
}
