use database::VoteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use votebot_core::{
    choose_candidate, is_candidate, select_candidates, BotConfig, CoreError, ErrorExt, ItemType,
    Post, RedditPlatform, Settings, VoteAction,
};

/// Timing knobs shared by every bot of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotSettings {
    pub poll_interval: Duration,
    pub item_delay: Duration,
    pub fetch_limit: u32,
}

impl From<&Settings> for BotSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            item_delay: settings.item_delay(),
            fetch_limit: settings.fetch_limit,
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// What happened to one fetched post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Acted,
    AlreadyActed,
    /// Filtered out, no candidate comment, or nothing configured to do.
    Skipped,
    Failed,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub acted: usize,
    pub already_acted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    fn count(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Acted => self.acted += 1,
            ItemOutcome::AlreadyActed => self.already_acted += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Cancelled => {}
        }
    }
}

/// One polling loop bound to one Reddit account.
///
/// The bot owns its store handle and platform client; nothing is shared with
/// other bots except the shutdown signal.
pub struct Bot {
    config: BotConfig,
    platform: Arc<dyn RedditPlatform>,
    store: Arc<dyn VoteStore>,
    settings: BotSettings,
    rng: fastrand::Rng,
    shutdown: watch::Receiver<bool>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        platform: Arc<dyn RedditPlatform>,
        store: Arc<dyn VoteStore>,
        settings: BotSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            platform,
            store,
            settings,
            rng: fastrand::Rng::new(),
            shutdown,
        }
    }

    /// Replaces the generator used to pick among candidate comments.
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Gate in front of every network call once shutdown has been signalled.
    fn ensure_running(&self, operation: &str) -> Result<(), CoreError> {
        if !self.is_cancelled() {
            return Ok(());
        }
        let e = CoreError::Cancelled {
            operation: operation.to_string(),
        };
        debug!(bot = %self.config.id, operation, code = %e.error_code(), "Skipping call: {}", e);
        Err(e)
    }

    /// Polls until shutdown is signalled.
    pub async fn run(mut self) {
        info!(
            bot = %self.config.id,
            subreddit = %self.config.subreddit,
            action = ?self.config.action,
            item_type = ?self.config.item_type,
            authors = ?self.config.upvote_user_keyword,
            keyword = %self.config.upvote_body_keyword,
            "Bot started"
        );

        while !self.is_cancelled() {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        bot = %self.config.id,
                        fetched = report.fetched,
                        acted = report.acted,
                        already = report.already_acted,
                        skipped = report.skipped,
                        failed = report.failed,
                        "Cycle finished"
                    );
                    self.settings.poll_interval
                }
                Err(CoreError::Cancelled { .. }) => break,
                Err(e) => self.delay_after_fetch_error(&e),
            };

            debug!(bot = %self.config.id, "Sleeping {:?} before the next fetch", delay);
            if !self.pause(delay).await {
                break;
            }
        }

        info!(bot = %self.config.id, "Bot stopped");
    }

    /// Runs one fetch and processes every returned post. A fetch failure is
    /// logged and returned; per-item failures are only counted. Fails with
    /// `CoreError::Cancelled` when shutdown was signalled before the fetch.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CoreError> {
        let mut report = CycleReport::default();
        self.ensure_running("fetch_posts")?;

        debug!(bot = %self.config.id, subreddit = %self.config.subreddit, "Fetching new posts");
        let posts = self
            .platform
            .list_new_posts(&self.config.subreddit, self.settings.fetch_limit)
            .await
            .map_err(|e| {
                error!(
                    bot = %self.config.id,
                    operation = "fetch_posts",
                    code = %e.error_code(),
                    "Error fetching posts: {}", e
                );
                e
            })?;
        report.fetched = posts.len();

        for (index, post) in posts.iter().enumerate() {
            if index > 0 && !self.pause(self.settings.item_delay).await {
                break;
            }

            let outcome = self.process_post(post).await;
            if outcome == ItemOutcome::Cancelled {
                break;
            }
            report.count(outcome);
        }

        Ok(report)
    }

    /// Applies the configured action to `post`, or to one of its matching
    /// comments in comment mode.
    pub async fn process_post(&mut self, post: &Post) -> ItemOutcome {
        debug!(
            bot = %self.config.id,
            post = %post.full_id,
            author = %post.author,
            title = %post.title,
            "Processing post"
        );

        let (Some(action), Some(item_type)) = (self.config.action, self.config.item_type) else {
            return ItemOutcome::Skipped;
        };

        match item_type {
            ItemType::Post => {
                if !is_candidate(
                    post,
                    &self.config.upvote_body_keyword,
                    &self.config.upvote_user_keyword,
                ) {
                    debug!(bot = %self.config.id, post = %post.full_id, "Post does not match author or keyword");
                    return ItemOutcome::Skipped;
                }
                self.act_on(&post.full_id, ItemType::Post, action, None).await
            }
            ItemType::Comment => {
                if self.ensure_running("get_post").is_err() {
                    return ItemOutcome::Cancelled;
                }

                let thread = match self.platform.get_post(&post.id).await {
                    Ok(thread) => thread,
                    Err(e) => {
                        error!(
                            bot = %self.config.id,
                            operation = "get_post",
                            code = %e.error_code(),
                            post = %post.full_id,
                            "Error fetching comments: {}", e
                        );
                        return ItemOutcome::Failed;
                    }
                };

                let candidates = select_candidates(
                    &thread.comments,
                    &self.config.upvote_body_keyword,
                    &self.config.upvote_user_keyword,
                );
                let Some(comment) = choose_candidate(&candidates, &mut self.rng) else {
                    debug!(bot = %self.config.id, post = %post.full_id, "No matching comments");
                    return ItemOutcome::Skipped;
                };
                debug!(bot = %self.config.id, comment = %comment.full_id, "Selected comment");

                self.act_on(&comment.full_id, ItemType::Comment, action, Some(&thread.post.author))
                    .await
            }
        }
    }

    /// Dedup check, platform call, then bookkeeping. `post_author` is followed
    /// after a successful comment upvote when the bot is configured to, whether
    /// or not the vote could be recorded.
    async fn act_on(
        &self,
        full_id: &str,
        item_type: ItemType,
        action: VoteAction,
        post_author: Option<&str>,
    ) -> ItemOutcome {
        let bot_id = self.config.id.as_str();

        match self.store.has_voted(full_id, item_type, bot_id).await {
            Ok(Some(previous)) => {
                info!(bot = %bot_id, item = %full_id, "Already acted ({})", previous);
                return ItemOutcome::AlreadyActed;
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    bot = %bot_id,
                    operation = "has_voted",
                    code = %e.error_code(),
                    item = %full_id,
                    "Error checking vote status: {}", e
                );
                return ItemOutcome::Failed;
            }
        }

        if self.ensure_running("vote").is_err() {
            return ItemOutcome::Cancelled;
        }

        let result = match action {
            VoteAction::Upvote => self.platform.upvote(full_id).await,
            VoteAction::Downvote => self.platform.downvote(full_id).await,
        };
        if let Err(e) = result {
            error!(
                bot = %bot_id,
                operation = "vote",
                code = %e.error_code(),
                item = %full_id,
                "Error applying {}: {}", action, e
            );
            return ItemOutcome::Failed;
        }

        let recorded = self
            .store
            .record_vote(full_id, item_type, action, bot_id)
            .await;
        match &recorded {
            Ok(()) => {
                info!(bot = %bot_id, item = %full_id, item_type = %item_type, "Executed {}", action)
            }
            Err(e) => error!(
                bot = %bot_id,
                operation = "record_vote",
                code = %e.error_code(),
                item = %full_id,
                "Applied {} but could not record it: {}", action, e
            ),
        }

        if let Some(author) = post_author {
            let follows = action == VoteAction::Upvote
                && item_type == ItemType::Comment
                && self.config.follow_author;
            if follows && self.ensure_running("follow_user").is_ok() {
                match self.platform.follow_user(author).await {
                    Ok(()) => info!(bot = %bot_id, user = %author, "Followed post author"),
                    Err(e) => warn!(
                        bot = %bot_id,
                        operation = "follow_user",
                        code = %e.error_code(),
                        user = %author,
                        "Error following post author: {}", e
                    ),
                }
            }
        }

        match recorded {
            Ok(()) => ItemOutcome::Acted,
            Err(_) => ItemOutcome::Failed,
        }
    }

    /// A rate-limited fetch waits out the server's window, never less than the
    /// regular poll interval.
    pub(crate) fn delay_after_fetch_error(&self, error: &CoreError) -> Duration {
        match error.retry_after() {
            Some(retry_after) if error.is_retryable() => {
                let delay = retry_after.max(self.settings.poll_interval);
                warn!(bot = %self.config.id, "Rate limited, next fetch in {:?}", delay);
                delay
            }
            _ => self.settings.poll_interval,
        }
    }

    /// Sleeps for `duration`. Returns `false` if shutdown was signalled first.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = shutdown_signalled(&mut self.shutdown) => false,
        }
    }
}

/// Resolves once `true` is sent or the sender is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
