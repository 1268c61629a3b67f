//! Store contract laws, checked against the in-memory reference backend.
mod support;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use hydrocarbon::app::plugin::Plugin;
use hydrocarbon::app::scheduler::{Scheduler, SchedulerConfig};
use hydrocarbon::domain::fact::Fact;
use hydrocarbon::domain::model::{
    PostDraft, ScrapeConfig, ScrapeCounters, ScrapeSchedule, ScrapeState, ScheduleRequest,
};
use hydrocarbon::infra::memory_repo::MemoryStore;
use hydrocarbon::infra::system_clock::SystemClock;
use hydrocarbon::ports::store::{Store, StoreError};

use support::{claim_one, post_fact, registry, session_key, TestPlugin};

#[tokio::test]
async fn fact_write_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;

    let fact = post_fact("A", "x", "https://example.com/posts/1");
    store.write_fact(scrape.id, &fact).await.unwrap();
    store.write_fact(scrape.id, &fact).await.unwrap();

    let posts = store
        .get_feed_posts(&key, scrape.feed_id, 50, 0)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn url_conflict_refreshes_the_stored_post() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;

    store
        .write_fact(
            scrape.id,
            &post_fact("draft title", "old body", "https://example.com/posts/1"),
        )
        .await
        .unwrap();
    store
        .write_fact(
            scrape.id,
            &post_fact("final title", "new body", "https://example.com/posts/1"),
        )
        .await
        .unwrap();

    let posts = store
        .get_feed_posts(&key, scrape.feed_id, 50, 0)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "final title");

    let full = store.get_post(&key, posts[0].id).await.unwrap();
    assert_eq!(full.body.as_deref(), Some("new body"));
}

#[tokio::test]
async fn write_then_read_observes_the_post() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;

    let draft = PostDraft {
        title: "A".to_string(),
        author: "author".to_string(),
        body: "body text".to_string(),
        url: "https://example.com/posts/1".to_string(),
        posted_at: Utc::now(),
    };
    store
        .write_fact(scrape.id, &Fact::Post(draft.clone()))
        .await
        .unwrap();

    let posts = store
        .get_feed_posts(&key, scrape.feed_id, 50, 0)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, draft.url);
    assert!(!posts[0].read);
}

#[tokio::test]
async fn schedule_insert_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let request = ScheduleRequest {
        feed_id: Uuid::new_v4(),
        plugin: "example".to_string(),
        latest_scrapes: Vec::new(),
        latest_posts: Vec::new(),
    };
    let schedule = ScrapeSchedule {
        scheduled_start_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
        config: ScrapeConfig::from_entrypoints(vec!["https://example.com/1".to_string()]),
    };

    store
        .insert_schedule(&request, std::slice::from_ref(&schedule))
        .await
        .unwrap();
    store
        .insert_schedule(&request, std::slice::from_ref(&schedule))
        .await
        .unwrap();

    let waiting = store.list_scrapes(ScrapeState::Waiting, 50, 0).await.unwrap();
    assert_eq!(waiting.len(), 1);
}

#[tokio::test]
async fn concurrent_claims_are_disjoint() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    for n in 0..5 {
        store
            .add_feed(
                &key,
                None,
                "feed",
                "example",
                &format!("https://example.com/feed/{n}"),
                &ScrapeConfig::from_entrypoints(vec![format!("https://example.com/feed/{n}")]),
            )
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(store.start_scrapes(10), store.start_scrapes(10));
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len() + b.len(), 5);
    for scrape in &a {
        assert!(!b.iter().any(|s| s.id == scrape.id));
    }
}

#[tokio::test]
async fn future_schedules_are_not_claimable() {
    let store = Arc::new(MemoryStore::new());
    let request = ScheduleRequest {
        feed_id: Uuid::new_v4(),
        plugin: "example".to_string(),
        latest_scrapes: Vec::new(),
        latest_posts: Vec::new(),
    };
    store
        .insert_schedule(
            &request,
            &[ScrapeSchedule {
                scheduled_start_at: Utc::now() + chrono::Duration::hours(6),
                config: ScrapeConfig::from_entrypoints(vec!["https://example.com/1".to_string()]),
            }],
        )
        .await
        .unwrap();

    assert!(store.start_scrapes(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_schedule_scan_tolerates_feeds_without_posts() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    // the feed's only scrape is RUNNING, so it has no WAITING schedule
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;

    let requests = store.find_missing_schedules(10).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].feed_id, scrape.feed_id);
    assert_eq!(requests[0].latest_scrapes.len(), 1);
    assert!(requests[0].latest_posts.is_empty());
}

#[tokio::test]
async fn feeds_with_waiting_scrapes_are_skipped_by_the_scan() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    store
        .add_feed(
            &key,
            None,
            "feed",
            "example",
            "https://example.com/1",
            &ScrapeConfig::from_entrypoints(vec!["https://example.com/1".to_string()]),
        )
        .await
        .unwrap();

    // the initial scrape is still WAITING
    assert!(store.find_missing_schedules(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn scheduler_tick_inserts_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;
    store
        .end_scrape(
            scrape.id,
            ScrapeState::Success,
            ScrapeCounters::default(),
            &[],
        )
        .await
        .unwrap();

    let plugin: Arc<dyn Plugin> = Arc::new(
        TestPlugin::new("example", "example.com", Vec::new())
            .with_schedule_at(Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap()),
    );
    let scheduler = Scheduler::new(
        store.clone(),
        registry(vec![plugin]),
        Arc::new(SystemClock),
        SchedulerConfig::default(),
    );

    assert_eq!(scheduler.tick().await.unwrap(), 1);
    // the feed now has a WAITING scrape, so the next tick proposes nothing
    assert_eq!(scheduler.tick().await.unwrap(), 0);

    let waiting = store.list_scrapes(ScrapeState::Waiting, 50, 0).await.unwrap();
    assert_eq!(waiting.len(), 1);
}

#[tokio::test]
async fn end_scrape_rejects_non_terminal_states() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;

    let err = store
        .end_scrape(
            scrape.id,
            ScrapeState::Waiting,
            ScrapeCounters::default(),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::BadTransition(_)));
}

#[tokio::test]
async fn mark_read_is_idempotent_and_visible() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    let scrape = claim_one(&store, &key, "example", "https://example.com/1").await;
    store
        .write_fact(
            scrape.id,
            &post_fact("A", "x", "https://example.com/posts/1"),
        )
        .await
        .unwrap();

    let posts = store
        .get_feed_posts(&key, scrape.feed_id, 50, 0)
        .await
        .unwrap();
    store.mark_read(&key, posts[0].id).await.unwrap();
    store.mark_read(&key, posts[0].id).await.unwrap();

    let posts = store
        .get_feed_posts(&key, scrape.feed_id, 50, 0)
        .await
        .unwrap();
    assert!(posts[0].read);
}

#[tokio::test]
async fn invalid_and_deactivated_keys_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    assert!(matches!(
        store.verify_key("no-such-key").await.unwrap_err(),
        StoreError::InvalidKey
    ));

    let key = session_key(&store).await;
    store.verify_key(&key).await.unwrap();
    store.deactivate_session(&key).await.unwrap();
    assert!(matches!(
        store.verify_key(&key).await.unwrap_err(),
        StoreError::InvalidKey
    ));
}

#[tokio::test]
async fn login_tokens_are_single_use() {
    let store = Arc::new(MemoryStore::new());
    let user_id = store.create_or_get_user("reader@example.com").await.unwrap();
    let token = store
        .create_login_token(user_id, "tests", "127.0.0.1")
        .await
        .unwrap();

    assert_eq!(store.activate_login_token(&token).await.unwrap(), user_id);
    assert!(matches!(
        store.activate_login_token(&token).await.unwrap_err(),
        StoreError::InvalidToken
    ));
}

#[tokio::test]
async fn existing_feeds_are_linked_not_duplicated() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    store
        .add_feed(
            &key,
            None,
            "feed",
            "example",
            "https://example.com/1",
            &ScrapeConfig::from_entrypoints(vec!["https://example.com/1".to_string()]),
        )
        .await
        .unwrap();

    let folder = store.add_folder(&key, "fiction").await.unwrap();
    let existing = store
        .check_if_feed_exists(&key, Some(folder), "example", "https://example.com/1")
        .await
        .unwrap();
    assert!(existing.is_some());

    let feeds = store
        .get_feeds_for_folder(&key, folder, 50, 0)
        .await
        .unwrap();
    assert_eq!(feeds.len(), 1);

    assert!(store
        .check_if_feed_exists(&key, None, "example", "https://other.example/1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn folders_nest_their_feeds() {
    let store = Arc::new(MemoryStore::new());
    let key = session_key(&store).await;
    store
        .add_feed(
            &key,
            None,
            "feed one",
            "example",
            "https://example.com/1",
            &ScrapeConfig::from_entrypoints(vec!["https://example.com/1".to_string()]),
        )
        .await
        .unwrap();

    let folders = store.get_folders_with_feeds(&key).await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].title, "default");
    assert_eq!(folders[0].feeds.len(), 1);
    assert_eq!(folders[0].feeds[0].title, "feed one");

    store
        .remove_feed(&key, folders[0].id, folders[0].feeds[0].id)
        .await
        .unwrap();
    let folders = store.get_folders_with_feeds(&key).await.unwrap();
    assert!(folders[0].feeds.is_empty());
}
