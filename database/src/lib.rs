//! Vote dedup ledger.
//!
//! One row per `(item_id, bot_id)` records the action a bot already took on an
//! item, so the bot loop never repeats it. Different bots are independent: the
//! same item may carry one row per bot.

use async_trait::async_trait;
use votebot_core::{CoreError, ItemType, VoteAction};

mod sqlite;

pub use sqlite::SqliteVoteStore;

#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Upserts the record for `(item_id, bot_id)`. A second call for the same
    /// key replaces the stored action and timestamp.
    async fn record_vote(
        &self,
        item_id: &str,
        item_type: ItemType,
        action: VoteAction,
        bot_id: &str,
    ) -> Result<(), CoreError>;

    /// Returns the action recorded for `(item_id, bot_id)`, or `None` when the
    /// bot never acted on the item. `item_type` is informational only: item ids
    /// carry their kind prefix (`t1_`, `t3_`) and are unique on their own.
    async fn has_voted(
        &self,
        item_id: &str,
        item_type: ItemType,
        bot_id: &str,
    ) -> Result<Option<VoteAction>, CoreError>;

    /// Releases the underlying storage. Safe to call more than once.
    async fn close(&self) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests;
