use crate::api::{self, RedditListing, RedditPostData};
use crate::{AuthState, RedditClient, RedditToken};
use std::time::{Duration, Instant};
use votebot_core::{CoreError, Credential, RedditApiError};

fn create_test_credential() -> Credential {
    Credential {
        client_id: "test_client_id".to_string(),
        client_secret: "test_client_secret".to_string(),
        username: "test_user".to_string(),
        password: "test_password".to_string(),
    }
}

fn create_test_client() -> RedditClient {
    RedditClient::new(
        create_test_credential(),
        "votebot/1.0 by test_user".to_string(),
        Duration::from_secs(30),
    )
    .expect("client should build")
}

#[test]
fn test_client_creation() {
    let client = create_test_client();
    assert_eq!(client.username(), "test_user");

    let state = tokio_test::block_on(client.get_auth_state());
    assert!(matches!(state, AuthState::NotAuthenticated));
    assert!(!tokio_test::block_on(client.is_authenticated()));
}

#[test]
fn test_required_scopes() {
    let scopes = RedditClient::get_required_scopes();
    assert_eq!(scopes, vec!["identity", "read", "vote", "submit", "subscribe"]);
}

#[test]
fn test_token_freshness() {
    let fresh = RedditToken {
        access_token: "fresh".to_string(),
        expires_at: Instant::now() + Duration::from_secs(3600),
        scope: vec!["vote".to_string()],
    };
    assert!(fresh.is_fresh());

    let about_to_expire = RedditToken {
        access_token: "stale".to_string(),
        expires_at: Instant::now() + Duration::from_secs(30),
        scope: vec![],
    };
    assert!(!about_to_expire.is_fresh());
}

#[test]
fn test_post_listing_parsing() {
    let listing: RedditListing<RedditPostData> = serde_json::from_value(serde_json::json!({
        "kind": "Listing",
        "data": {
            "after": "t3_def",
            "before": null,
            "children": [
                { "kind": "t3", "data": {
                    "id": "abc", "name": "t3_abc", "title": "Golang tips",
                    "selftext": "I love Golang", "author": "alice", "subreddit": "golang",
                    "likes": null, "score": 3
                } },
                { "kind": "t3", "data": {
                    "id": "def", "name": "t3_def", "title": "Link post",
                    "selftext": "", "author": "bob", "likes": true
                } }
            ]
        }
    }))
    .unwrap();

    let posts = api::posts_from_listing(listing);
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].full_id, "t3_abc");
    assert_eq!(posts[0].id, "abc");
    assert_eq!(posts[0].body, "I love Golang");
    assert_eq!(posts[0].likes, None);
    assert_eq!(posts[1].likes, Some(true));
}

#[test]
fn test_thread_parsing_skips_more_stubs() {
    let listings: Vec<RedditListing<serde_json::Value>> = serde_json::from_value(serde_json::json!([
        { "kind": "Listing", "data": { "after": null, "before": null, "children": [
            { "kind": "t3", "data": { "id": "abc", "name": "t3_abc", "author": "op", "selftext": "" } }
        ] } },
        { "kind": "Listing", "data": { "after": null, "before": null, "children": [
            { "kind": "t1", "data": { "id": "c1", "name": "t1_c1", "author": "alice", "body": "golang rocks", "likes": null } },
            { "kind": "t1", "data": { "id": "c2", "name": "t1_c2", "author": "bob", "body": "meh", "likes": false } },
            { "kind": "more", "data": { "count": 12, "children": ["c3", "c4"] } }
        ] } }
    ]))
    .unwrap();

    let thread = api::thread_from_listings("abc", listings).unwrap();
    assert_eq!(thread.post.author, "op");
    assert_eq!(thread.comments.len(), 2);
    assert_eq!(thread.comments[0].full_id, "t1_c1");
    assert_eq!(thread.comments[1].likes, Some(false));
}

#[test]
fn test_thread_parsing_without_post() {
    let listings: Vec<RedditListing<serde_json::Value>> = Vec::new();

    match api::thread_from_listings("gone", listings) {
        Err(CoreError::RedditApi(RedditApiError::PostNotFound { post_id })) => {
            assert_eq!(post_id, "gone");
        }
        other => panic!("Expected PostNotFound, got {:?}", other),
    }
}
