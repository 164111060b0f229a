use crate::{SqliteVoteStore, VoteStore};
use std::env;
use std::sync::Arc;
use votebot_core::{ItemType, VoteAction};

async fn setup_test_db() -> (SqliteVoteStore, std::path::PathBuf) {
    let db_path = env::temp_dir().join(format!("test_votebot_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());

    let store = SqliteVoteStore::connect(&db_url)
        .await
        .expect("Failed to open test database");
    (store, db_path)
}

async fn memory_store() -> SqliteVoteStore {
    SqliteVoteStore::connect("sqlite::memory:")
        .await
        .expect("Failed to open memory database")
}

#[tokio::test]
async fn test_database_connection_and_migrations() {
    let (store, path) = setup_test_db().await;
    assert!(path.exists());
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_has_voted_false_before_record() {
    let store = memory_store().await;

    let voted = store
        .has_voted("t3_abc", ItemType::Post, "bot0")
        .await
        .unwrap();
    assert_eq!(voted, None);
}

#[tokio::test]
async fn test_record_then_has_voted_is_per_bot() {
    let store = memory_store().await;

    store
        .record_vote("t3_abc", ItemType::Post, VoteAction::Upvote, "bot0")
        .await
        .unwrap();

    assert_eq!(
        store.has_voted("t3_abc", ItemType::Post, "bot0").await.unwrap(),
        Some(VoteAction::Upvote)
    );
    assert_eq!(
        store.has_voted("t3_abc", ItemType::Post, "bot1").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_record_vote_is_last_write_wins() {
    let store = memory_store().await;

    store
        .record_vote("t1_xyz", ItemType::Comment, VoteAction::Upvote, "bot0")
        .await
        .unwrap();
    store
        .record_vote("t1_xyz", ItemType::Comment, VoteAction::Downvote, "bot0")
        .await
        .unwrap();

    assert_eq!(
        store
            .has_voted("t1_xyz", ItemType::Comment, "bot0")
            .await
            .unwrap(),
        Some(VoteAction::Downvote)
    );

    let history = store.votes_for_bot("bot0").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, VoteAction::Downvote);
}

#[tokio::test]
async fn test_get_vote_returns_full_record() {
    let store = memory_store().await;

    store
        .record_vote("t1_q", ItemType::Comment, VoteAction::Upvote, "bot3")
        .await
        .unwrap();

    let record = store.get_vote("t1_q", "bot3").await.unwrap().unwrap();
    assert_eq!(record.item_id, "t1_q");
    assert_eq!(record.item_type, ItemType::Comment);
    assert_eq!(record.bot_id, "bot3");
    assert!(record.created_at <= chrono::Utc::now());

    assert!(store.get_vote("t1_q", "bot4").await.unwrap().is_none());
}

#[tokio::test]
async fn test_votes_for_bot_only_lists_that_bot() {
    let store = memory_store().await;

    for (item, bot) in [("t3_a", "bot0"), ("t3_b", "bot0"), ("t3_a", "bot1")] {
        store
            .record_vote(item, ItemType::Post, VoteAction::Upvote, bot)
            .await
            .unwrap();
    }

    let bot0 = store.votes_for_bot("bot0").await.unwrap();
    assert_eq!(bot0.len(), 2);
    assert!(bot0.iter().all(|record| record.bot_id == "bot0"));

    assert_eq!(store.votes_for_bot("bot1").await.unwrap().len(), 1);
    assert!(store.votes_for_bot("bot9").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let (store, path) = setup_test_db().await;
    store
        .record_vote("t3_keep", ItemType::Post, VoteAction::Downvote, "bot0")
        .await
        .unwrap();
    store.close().await.unwrap();

    let reopened = SqliteVoteStore::connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    assert_eq!(
        reopened
            .has_voted("t3_keep", ItemType::Post, "bot0")
            .await
            .unwrap(),
        Some(VoteAction::Downvote)
    );
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let store = memory_store().await;
    store.close().await.unwrap();
    store.close().await.unwrap();

    assert!(store
        .has_voted("t3_abc", ItemType::Post, "bot0")
        .await
        .is_err());
}

#[tokio::test]
async fn test_concurrent_bots_share_one_file() {
    let (first, path) = setup_test_db().await;
    let url = format!("sqlite://{}", path.display());
    let second = SqliteVoteStore::connect(&url).await.unwrap();

    let stores: Vec<Arc<dyn VoteStore>> = vec![Arc::new(first), Arc::new(second)];

    let writes = stores.iter().enumerate().flat_map(|(bot, store)| {
        (0..20).map(move |n| {
            let store = store.clone();
            async move {
                store
                    .record_vote(
                        &format!("t3_{}", n),
                        ItemType::Post,
                        VoteAction::Upvote,
                        &format!("bot{}", bot),
                    )
                    .await
            }
        })
    });

    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }

    let check = SqliteVoteStore::connect(&url).await.unwrap();
    assert_eq!(check.votes_for_bot("bot0").await.unwrap().len(), 20);
    assert_eq!(check.votes_for_bot("bot1").await.unwrap().len(), 20);
}
