use crate::VoteStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use votebot_core::{CoreError, DatabaseError, ItemType, VoteAction, VoteRecord};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 4;

// SQLITE_BUSY and SQLITE_LOCKED primary result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

const UPSERT_VOTE: &str = r#"
    INSERT INTO votes (item_id, item_type, action, bot_id, created_at)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT(item_id, bot_id) DO UPDATE SET
        item_type = excluded.item_type,
        action = excluded.action,
        created_at = excluded.created_at
"#;

const SELECT_VOTE: &str = r#"
    SELECT item_id, item_type, action, bot_id, created_at
    FROM votes
    WHERE item_id = ? AND bot_id = ?
    LIMIT 1
"#;

const SELECT_BOT_VOTES: &str = r#"
    SELECT item_id, item_type, action, bot_id, created_at
    FROM votes
    WHERE bot_id = ?
    ORDER BY created_at DESC, id DESC
"#;

type VoteRow = (String, String, String, String, DateTime<Utc>);

/// SQLite-backed [`VoteStore`].
///
/// Concurrent bots rely on SQLite's own locking: the database runs in WAL mode
/// with a busy timeout, and every write is a single upsert statement.
#[derive(Debug, Clone)]
pub struct SqliteVoteStore {
    pool: SqlitePool,
}

impl SqliteVoteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    ///
    /// Accepts `sqlite://path/to/file.db`, a bare file path, or
    /// `sqlite::memory:`. A memory database lives on a single pooled
    /// connection, so it is private to this store.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let in_memory = url.contains(":memory:");
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{}", url)
        };

        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: format!("invalid database url '{}': {}", url, e),
                })
            })?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            CoreError::Database(DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })
        })?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("Vote store ready at {}", url);
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                CoreError::Database(DatabaseError::MigrationFailed {
                    migration: e.to_string(),
                })
            })
    }

    /// Full record for one dedup key.
    pub async fn get_vote(
        &self,
        item_id: &str,
        bot_id: &str,
    ) -> Result<Option<VoteRecord>, CoreError> {
        let row: Option<VoteRow> = sqlx::query_as(SELECT_VOTE)
            .bind(item_id)
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "select vote"))?;

        row.map(into_record).transpose()
    }

    /// Every record written by `bot_id`, newest first.
    pub async fn votes_for_bot(&self, bot_id: &str) -> Result<Vec<VoteRecord>, CoreError> {
        let rows: Vec<VoteRow> = sqlx::query_as(SELECT_BOT_VOTES)
            .bind(bot_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "select bot votes"))?;

        rows.into_iter().map(into_record).collect()
    }
}

#[async_trait]
impl VoteStore for SqliteVoteStore {
    async fn record_vote(
        &self,
        item_id: &str,
        item_type: ItemType,
        action: VoteAction,
        bot_id: &str,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(UPSERT_VOTE)
            .bind(item_id)
            .bind(item_type.as_str())
            .bind(action.as_str())
            .bind(bot_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "upsert vote"))?;

        debug!(
            bot = bot_id,
            item_id,
            %action,
            rows_affected = result.rows_affected(),
            "Recorded vote"
        );
        Ok(())
    }

    async fn has_voted(
        &self,
        item_id: &str,
        item_type: ItemType,
        bot_id: &str,
    ) -> Result<Option<VoteAction>, CoreError> {
        let Some(record) = self.get_vote(item_id, bot_id).await? else {
            return Ok(None);
        };

        if record.item_type != item_type {
            warn!(
                bot = bot_id,
                item_id,
                stored = %record.item_type,
                requested = %item_type,
                "Vote recorded under a different item type"
            );
        }
        Ok(Some(record.action))
    }

    async fn close(&self) -> Result<(), CoreError> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            debug!("Vote store closed");
        }
        Ok(())
    }
}

fn into_record(row: VoteRow) -> Result<VoteRecord, CoreError> {
    let (item_id, item_type, action, bot_id, created_at) = row;
    VoteRecord::from_columns(item_id, &item_type, &action, bot_id, created_at)
}

fn map_sqlx_error(error: sqlx::Error, query: &str) -> CoreError {
    if let sqlx::Error::Database(db_error) = &error {
        let primary_code = db_error
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff);

        if matches!(primary_code, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
            return CoreError::Database(DatabaseError::DatabaseLocked);
        }
        if db_error.is_unique_violation() || db_error.is_check_violation() {
            return CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: db_error.message().to_string(),
            });
        }
    }

    if matches!(error, sqlx::Error::PoolClosed) {
        return CoreError::Database(DatabaseError::QueryFailed {
            query: format!("{} (store closed)", query),
        });
    }

    CoreError::Database(DatabaseError::Sql(error))
}
