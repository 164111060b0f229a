use crate::error::CoreError;
use crate::types::{Comment, Post, PostWithComments};
use async_trait::async_trait;

/// Remote operations a bot needs from Reddit. Every call may fail transiently.
#[async_trait]
pub trait RedditPlatform: Send + Sync {
    async fn list_new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError>;

    /// Fetches a post by its bare id (no `t3_` prefix) with its top-level comments.
    async fn get_post(&self, post_id: &str) -> Result<PostWithComments, CoreError>;

    async fn upvote(&self, full_id: &str) -> Result<(), CoreError>;

    async fn downvote(&self, full_id: &str) -> Result<(), CoreError>;

    async fn submit_comment(&self, parent_full_id: &str, text: &str) -> Result<Comment, CoreError>;

    async fn follow_user(&self, username: &str) -> Result<(), CoreError>;
}
