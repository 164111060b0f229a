//! Reddit platform access for one bot account.
//!
//! Script-type Reddit apps authenticate with the OAuth2 resource-owner password
//! grant; the resulting bearer token is cached and renewed shortly before it
//! expires.

pub mod api;
pub mod rate_limiter;

use api::{RedditApiClient, VoteDirection};
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use votebot_core::{
    Comment, CoreError, Credential, Post, PostWithComments, RedditApiError, RedditPlatform,
};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are renewed this long before Reddit would reject them.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: Instant,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub enum AuthState {
    NotAuthenticated,
    Authenticated { token: RedditToken },
    TokenExpired,
}

pub struct RedditClient {
    credential: Credential,
    oauth_client: BasicClient,
    api: RedditApiClient,
    auth_state: Mutex<AuthState>,
}

impl RedditClient {
    pub fn new(
        credential: Credential,
        user_agent: String,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| CoreError::Internal {
            message: format!("invalid auth url: {}", e),
        })?;
        let token_url =
            TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| CoreError::Internal {
                message: format!("invalid token url: {}", e),
            })?;

        let oauth_client = BasicClient::new(
            ClientId::new(credential.client_id.clone()),
            Some(ClientSecret::new(credential.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            credential,
            oauth_client,
            api: RedditApiClient::new(user_agent, timeout)?,
            auth_state: Mutex::new(AuthState::NotAuthenticated),
        })
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["identity", "read", "vote", "submit", "subscribe"]
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }

    pub async fn get_auth_state(&self) -> AuthState {
        self.auth_state.lock().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(
            &*self.auth_state.lock().await,
            AuthState::Authenticated { token } if token.is_fresh()
        )
    }

    /// Runs the password grant and stores the new token.
    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        info!("Authenticating Reddit account {}", self.credential.username);

        let username = ResourceOwnerUsername::new(self.credential.username.clone());
        let password = ResourceOwnerPassword::new(self.credential.password.clone());
        let http_client = self.api.http_client().clone();

        let mut request = self.oauth_client.exchange_password(&username, &password);
        for scope in Self::get_required_scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let response = request
            .request_async(|req| token_http_client(http_client, req))
            .await
            .map_err(|e| {
                error!(
                    "Token request failed for {}: {}",
                    self.credential.username, e
                );
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        let token = RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: Instant::now() + response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
        };

        *self.auth_state.lock().await = AuthState::Authenticated {
            token: token.clone(),
        };
        debug!("Token for {} valid until {:?}", self.credential.username, token.expires_at);
        Ok(token)
    }

    /// A fresh bearer token, authenticating again when needed.
    async fn access_token(&self) -> Result<String, CoreError> {
        {
            let mut state = self.auth_state.lock().await;
            let cached = match &*state {
                AuthState::Authenticated { token } => Some(token.clone()),
                _ => None,
            };
            if let Some(token) = cached {
                if token.is_fresh() {
                    return Ok(token.access_token);
                }
                debug!("Token for {} expired", self.credential.username);
                *state = AuthState::TokenExpired;
            }
        }

        Ok(self.authenticate().await?.access_token)
    }

    /// Drops the cached token after Reddit rejected it, so the next call
    /// authenticates again.
    async fn on_error(&self, error: CoreError) -> CoreError {
        if matches!(error, CoreError::RedditApi(RedditApiError::InvalidToken)) {
            *self.auth_state.lock().await = AuthState::TokenExpired;
        }
        error
    }

    async fn vote(&self, full_id: &str, direction: VoteDirection) -> Result<(), CoreError> {
        let token = self.access_token().await?;
        match self.api.vote(&token, full_id, direction).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }
}

#[async_trait]
impl RedditPlatform for RedditClient {
    async fn list_new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, CoreError> {
        let token = self.access_token().await?;
        match self.api.get_new_posts(&token, subreddit, limit).await {
            Ok(posts) => Ok(posts),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn get_post(&self, post_id: &str) -> Result<PostWithComments, CoreError> {
        let token = self.access_token().await?;
        match self.api.get_post_with_comments(&token, post_id).await {
            Ok(thread) => Ok(thread),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn upvote(&self, full_id: &str) -> Result<(), CoreError> {
        self.vote(full_id, VoteDirection::Up).await
    }

    async fn downvote(&self, full_id: &str) -> Result<(), CoreError> {
        self.vote(full_id, VoteDirection::Down).await
    }

    async fn submit_comment(&self, parent_full_id: &str, text: &str) -> Result<Comment, CoreError> {
        let token = self.access_token().await?;
        match self.api.submit_comment(&token, parent_full_id, text).await {
            Ok(comment) => Ok(comment),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn follow_user(&self, username: &str) -> Result<(), CoreError> {
        let token = self.access_token().await?;
        match self.api.follow_user(&token, username).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }
}

/// Token requests go through the bot's own HTTP client so they carry its user
/// agent and timeout.
async fn token_http_client(
    client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url)
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests;
