use crate::bot::{Bot, BotSettings};
use database::{SqliteVoteStore, VoteStore};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use votebot_core::{AppConfig, BotConfig, CoreError, ErrorExt, RedditPlatform};

/// Owns the per-bot tasks and the shared shutdown signal.
pub struct BotRunner {
    shutdown: ShutdownHandle,
    handles: Vec<(String, JoinHandle<()>)>,
}

/// Signals every bot of one runner to stop at its next sleep or network
/// call. Stays usable while [`BotRunner::wait`] is pending.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("Signalling bots to stop");
        self.tx.send_replace(true);
    }
}

impl BotRunner {
    /// Starts one task per configured bot. `platform_for` builds the Reddit
    /// client for a bot; each task opens its own vote store at
    /// `config.settings.database_url`.
    ///
    /// A bot whose client or store cannot be created is logged and left out.
    /// The other bots keep running.
    pub fn spawn<F>(config: &AppConfig, platform_for: F) -> Self
    where
        F: Fn(&BotConfig) -> Result<Arc<dyn RedditPlatform>, CoreError>,
    {
        let (shutdown_tx, _) = watch::channel(false);
        let settings = BotSettings::from(&config.settings);
        let mut handles = Vec::with_capacity(config.bots.len());

        for bot_config in &config.bots {
            let platform = match platform_for(bot_config) {
                Ok(platform) => platform,
                Err(e) => {
                    error!(
                        bot = %bot_config.id,
                        code = %e.error_code(),
                        "Could not create Reddit client: {}", e
                    );
                    continue;
                }
            };

            // Client and store logs inside the task inherit the bot id.
            let span = info_span!("bot", id = %bot_config.id);
            let handle = tokio::spawn(
                run_bot(
                    bot_config.clone(),
                    platform,
                    config.settings.database_url.clone(),
                    settings,
                    shutdown_tx.subscribe(),
                )
                .instrument(span),
            );
            handles.push((bot_config.id.clone(), handle));
        }

        info!("Started {} of {} bots", handles.len(), config.bots.len());
        Self {
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
            handles,
        }
    }

    pub fn bot_count(&self) -> usize {
        self.handles.len()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Waits for every bot task to finish, either after a shutdown signal or
    /// because each bot ended on its own (for example when its store could not
    /// be opened).
    pub async fn wait(self) {
        let (ids, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();

        for (id, result) in ids.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!(bot = %id, "Bot task ended abnormally: {}", e);
            }
        }
        info!("All bots stopped");
    }
}

async fn run_bot(
    config: BotConfig,
    platform: Arc<dyn RedditPlatform>,
    database_url: String,
    settings: BotSettings,
    shutdown: watch::Receiver<bool>,
) {
    let store = match SqliteVoteStore::connect(&database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                bot = %config.id,
                operation = "open_store",
                code = %e.error_code(),
                "Failed to open vote store, bot will not run: {}", e
            );
            return;
        }
    };

    let bot = Bot::new(
        config.clone(),
        platform,
        store.clone() as Arc<dyn VoteStore>,
        settings,
        shutdown,
    );
    bot.run().await;

    if let Err(e) = store.close().await {
        warn!(bot = %config.id, "Error closing vote store: {}", e);
    }
}
