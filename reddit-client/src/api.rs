use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use votebot_core::{Comment, CoreError, Post, PostWithComments, RedditApiError};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub num_comments: u32,
    #[serde(default)]
    pub likes: Option<bool>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub likes: Option<bool>,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_param(&self) -> &'static str {
        match self {
            VoteDirection::Up => "1",
            VoteDirection::Down => "-1",
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    json: JsonEnvelopeBody,
}

#[derive(Debug, Deserialize)]
struct JsonEnvelopeBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    #[serde(default)]
    data: Option<JsonThings>,
}

#[derive(Debug, Deserialize)]
struct JsonThings {
    #[serde(default)]
    things: Vec<RedditListingChild<RedditCommentData>>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
}

impl RedditApiClient {
    pub fn new(user_agent: String, timeout: Duration) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::reddit_oauth()),
        })
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        body: RequestBody<'_>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let permit = self
            .rate_limiter
            .acquire_permit()
            .await
            .ok_or_else(|| CoreError::Internal {
                message: "rate limiter closed".to_string(),
            })?;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}, {} tokens left",
            method,
            endpoint,
            permit.queue_wait_time,
            self.rate_limiter.available_tokens().await
        );

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token);

        request_builder = match body {
            RequestBody::Query(params) => request_builder.query(params),
            RequestBody::Form(params) => request_builder.form(params),
            RequestBody::Json(value) => request_builder.json(value),
        };

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, endpoint, e);
            if e.is_timeout() {
                CoreError::RedditApi(RedditApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Err(error_for_status(status, endpoint, retry_after.as_deref()))
    }

    /// Newest posts of a subreddit, `GET /r/{subreddit}/new`.
    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: u32,
    ) -> Result<Vec<Post>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let limit = limit.to_string();
        let params = [("limit", limit.as_str()), ("raw_json", "1")];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, RequestBody::Query(&params))
            .await
            .map_err(|e| match e {
                CoreError::NotFound { .. } => CoreError::RedditApi(RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                }),
                other => other,
            })?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        let posts = posts_from_listing(listing);
        info!("Retrieved {} posts from r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    /// A post and its top-level comments, `GET /comments/{id}`.
    pub async fn get_post_with_comments(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<PostWithComments, CoreError> {
        let bare_id = post_id.trim_start_matches("t3_");
        let endpoint = format!("/comments/{}", bare_id);
        let params = [("raw_json", "1")];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, RequestBody::Query(&params))
            .await
            .map_err(|e| match e {
                CoreError::NotFound { .. } => CoreError::RedditApi(RedditApiError::PostNotFound {
                    post_id: bare_id.to_string(),
                }),
                other => other,
            })?;

        let listings: Vec<RedditListing<Value>> = response.json().await.map_err(|e| {
            error!("Failed to parse comments for {}: {}", bare_id, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comments for post {}", bare_id),
            })
        })?;

        let thread = thread_from_listings(bare_id, listings)?;
        debug!(
            "Retrieved post {} with {} top-level comments",
            thread.post.full_id,
            thread.comments.len()
        );
        Ok(thread)
    }

    /// Casts a vote on a post (`t3_`) or comment (`t1_`), `POST /api/vote`.
    pub async fn vote(
        &self,
        access_token: &str,
        full_id: &str,
        direction: VoteDirection,
    ) -> Result<(), CoreError> {
        let params = [("id", full_id), ("dir", direction.as_param())];
        self.make_request(Method::POST, "/api/vote", access_token, RequestBody::Form(&params))
            .await?;

        debug!("Voted {:?} on {}", direction, full_id);
        Ok(())
    }

    /// Replies to a post or comment, `POST /api/comment`.
    pub async fn submit_comment(
        &self,
        access_token: &str,
        parent_full_id: &str,
        text: &str,
    ) -> Result<Comment, CoreError> {
        let params = [
            ("api_type", "json"),
            ("thing_id", parent_full_id),
            ("text", text),
        ];
        let response = self
            .make_request(Method::POST, "/api/comment", access_token, RequestBody::Form(&params))
            .await?;

        let envelope: JsonEnvelope = response.json().await.map_err(|e| {
            error!("Failed to parse comment submission: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Failed to parse comment submission".to_string(),
            })
        })?;

        comment_from_envelope(envelope)
    }

    /// Adds `username` to the account's friends, `PUT /api/v1/me/friends/{username}`.
    pub async fn follow_user(&self, access_token: &str, username: &str) -> Result<(), CoreError> {
        let endpoint = format!("/api/v1/me/friends/{}", username);
        let body = serde_json::json!({ "name": username });

        self.make_request(Method::PUT, &endpoint, access_token, RequestBody::Json(&body))
            .await?;

        debug!("Followed user {}", username);
        Ok(())
    }
}

enum RequestBody<'a> {
    Query(&'a [(&'a str, &'a str)]),
    Form(&'a [(&'a str, &'a str)]),
    Json(&'a Value),
}

/// Maps a non-success status to the error the bot loop reasons about.
pub fn error_for_status(status: StatusCode, endpoint: &str, retry_after: Option<&str>) -> CoreError {
    match status.as_u16() {
        429 => {
            let retry_after = retry_after
                .and_then(|value| value.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!("Rate limited, retry after {} seconds", retry_after);
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after })
        }
        401 => CoreError::RedditApi(RedditApiError::InvalidToken),
        403 => CoreError::RedditApi(RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        }),
        404 => CoreError::NotFound {
            resource: endpoint.to_string(),
        },
        code if status.is_server_error() => {
            CoreError::RedditApi(RedditApiError::ServerError { status_code: code })
        }
        code => CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        }),
    }
}

pub fn posts_from_listing(listing: RedditListing<RedditPostData>) -> Vec<Post> {
    listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .map(|child| child.data.into())
        .collect()
}

/// `/comments/{id}` answers with two listings: the post, then its comment tree.
/// Only top-level `t1` comments are kept; `more` stubs are dropped.
pub fn thread_from_listings(
    post_id: &str,
    listings: Vec<RedditListing<Value>>,
) -> Result<PostWithComments, CoreError> {
    let mut listings = listings.into_iter();

    let post_value = listings
        .next()
        .and_then(|listing| {
            listing
                .data
                .children
                .into_iter()
                .find(|child| child.kind == "t3")
        })
        .ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::PostNotFound {
                post_id: post_id.to_string(),
            })
        })?;

    let post_data: RedditPostData = serde_json::from_value(post_value.data)?;

    let mut comments = Vec::new();
    if let Some(comment_listing) = listings.next() {
        for child in comment_listing.data.children {
            if child.kind != "t1" {
                continue;
            }
            match serde_json::from_value::<RedditCommentData>(child.data) {
                Ok(comment) => comments.push(comment.into()),
                Err(e) => warn!("Skipping unparseable comment in {}: {}", post_id, e),
            }
        }
    }

    Ok(PostWithComments {
        post: post_data.into(),
        comments,
    })
}

fn comment_from_envelope(envelope: JsonEnvelope) -> Result<Comment, CoreError> {
    if !envelope.json.errors.is_empty() {
        let errors = envelope
            .json
            .errors
            .iter()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(": ")
            })
            .collect();
        return Err(CoreError::RedditApi(RedditApiError::Rejected { errors }));
    }

    envelope
        .json
        .data
        .and_then(|data| data.things.into_iter().next())
        .map(|thing| thing.data.into())
        .ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Comment submission returned no comment".to_string(),
            })
        })
}

impl From<RedditPostData> for Post {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            full_id: post_data.name,
            author: post_data.author,
            title: post_data.title,
            body: post_data.selftext,
            likes: post_data.likes,
        }
    }
}

impl From<RedditCommentData> for Comment {
    fn from(comment_data: RedditCommentData) -> Self {
        Self {
            id: comment_data.id,
            full_id: comment_data.name,
            author: comment_data.author,
            body: comment_data.body,
            likes: comment_data.likes,
        }
    }
}
