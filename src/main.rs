use anyhow::{bail, Context, Result};
use background_service::BotRunner;
use clap::{Parser, Subcommand};
use database::{SqliteVoteStore, VoteStore};
use reddit_client::RedditClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use votebot_core::{
    AppConfig, BotConfig, CoreError, ErrorExt, ItemType, RedditPlatform, VoteAction,
};

const DEFAULT_LOG_FILTER: &str =
    "votebot=info,background_service=info,reddit_client=info,database=info";

#[derive(Parser, Debug)]
#[command(name = "votebot", version, about = "Keyword-driven Reddit voting bots")]
struct Cli {
    /// Bot configuration file (JSON, or TOML by extension).
    #[arg(short, long, env = "VOTEBOT_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Overrides `settings.database_url` from the configuration file.
    #[arg(long, env = "VOTEBOT_DATABASE")]
    database: Option<String>,

    /// tracing filter directive, e.g. `votebot=debug`. Takes precedence over RUST_LOG.
    #[arg(long)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start every configured bot and poll until Ctrl-C.
    Run,
    /// Load and validate the configuration, then print a summary.
    Validate,
    /// Vote on one item by fullname with a bot's account.
    Vote {
        #[arg(long)]
        bot: String,
        #[arg(long = "type")]
        item_type: ItemType,
        #[arg(long)]
        action: VoteAction,
        /// Fullname of the item, e.g. `t3_abc123` or `t1_def456`.
        #[arg(long)]
        id: String,
    },
    /// Show what a bot recorded for one item.
    Check {
        #[arg(long)]
        bot: String,
        #[arg(long)]
        id: String,
    },
    /// List every vote a bot recorded, newest first.
    History {
        #[arg(long)]
        bot: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = match &cli.log_filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter '{}'", directives))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(code = %e.error_code(), "{}", e.user_friendly_message());
            return Err(anyhow::Error::new(e).context(format!(
                "failed to load configuration from {}",
                cli.config.display()
            )));
        }
    };
    if let Some(url) = cli.database {
        config.settings.database_url = url;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Validate => {
            validate(&config);
            Ok(())
        }
        Command::Vote {
            bot,
            item_type,
            action,
            id,
        } => vote(&config, &bot, item_type, action, &id).await,
        Command::Check { bot, id } => check(&config, &bot, &id).await,
        Command::History { bot } => history(&config, &bot).await,
    }
}

fn reddit_client(config: &AppConfig, bot: &BotConfig) -> Result<RedditClient, CoreError> {
    RedditClient::new(
        bot.credential.clone(),
        config.user_agent_for(bot),
        config.settings.request_timeout(),
    )
}

async fn run(config: AppConfig) -> Result<()> {
    tracing::info!(
        "Starting {} {} with {} bots",
        config.app_name,
        config.version,
        config.bots.len()
    );

    let runner = BotRunner::spawn(&config, |bot| {
        Ok(Arc::new(reddit_client(&config, bot)?) as Arc<dyn RedditPlatform>)
    });
    if runner.bot_count() == 0 {
        bail!("no bot could be started");
    }

    let stop = runner.shutdown_handle();
    let stopped = runner.wait();
    tokio::pin!(stopped);

    tokio::select! {
        _ = &mut stopped => bail!("every bot stopped before shutdown was requested"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("Ctrl-C received, shutting down");
        }
    }

    stop.shutdown();
    stopped.await;
    Ok(())
}

fn validate(config: &AppConfig) {
    println!(
        "{} {}: {} bots, database {}",
        config.app_name,
        config.version,
        config.bots.len(),
        config.settings.database_url
    );

    for bot in &config.bots {
        let mut authors: Vec<&str> = bot.upvote_user_keyword.iter().map(String::as_str).collect();
        authors.sort_unstable();

        println!(
            "  bot {}: r/{} action={} type={} keyword={:?} authors=[{}] follow={} account={}",
            bot.id,
            bot.subreddit,
            bot.action.map_or("none", |a| a.as_str()),
            bot.item_type.map_or("none", |t| t.as_str()),
            bot.upvote_body_keyword,
            authors.join(", "),
            bot.follow_author,
            bot.credential.username
        );
    }
}

async fn open_store(config: &AppConfig) -> Result<SqliteVoteStore> {
    SqliteVoteStore::connect(&config.settings.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.settings.database_url))
}

async fn vote(
    config: &AppConfig,
    bot_id: &str,
    item_type: ItemType,
    action: VoteAction,
    full_id: &str,
) -> Result<()> {
    let bot = config.bot(bot_id)?;
    let store = open_store(config).await?;

    if let Some(previous) = store.has_voted(full_id, item_type, &bot.id).await? {
        println!("bot {} already applied {} to {}", bot.id, previous, full_id);
        store.close().await?;
        return Ok(());
    }

    let client = reddit_client(config, bot)?;
    let result = match action {
        VoteAction::Upvote => client.upvote(full_id).await,
        VoteAction::Downvote => client.downvote(full_id).await,
    };
    result.with_context(|| format!("failed to {} {}", action, full_id))?;

    store.record_vote(full_id, item_type, action, &bot.id).await?;
    println!("bot {} applied {} to {} {}", bot.id, action, item_type, full_id);

    store.close().await?;
    Ok(())
}

async fn check(config: &AppConfig, bot_id: &str, full_id: &str) -> Result<()> {
    let bot = config.bot(bot_id)?;
    let store = open_store(config).await?;

    match store.get_vote(full_id, &bot.id).await? {
        Some(record) => println!(
            "{} {} {} by {} at {}",
            record.item_type, record.item_id, record.action, record.bot_id, record.created_at
        ),
        None => println!("bot {} has not acted on {}", bot.id, full_id),
    }

    store.close().await?;
    Ok(())
}

async fn history(config: &AppConfig, bot_id: &str) -> Result<()> {
    let bot = config.bot(bot_id)?;
    let store = open_store(config).await?;

    let records = store.votes_for_bot(&bot.id).await?;
    if records.is_empty() {
        println!("bot {} has no recorded votes", bot.id);
    }
    for record in records {
        println!(
            "{}  {:<8} {:<7} {}",
            record.created_at.to_rfc3339(),
            record.action.as_str(),
            record.item_type.as_str(),
            record.item_id
        );
    }

    store.close().await?;
    Ok(())
}
