#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    unreachable_pub
)]
mod common;

use amora_server::adapters::collection::{
    MemoryMessageCollection, MemoryProfileDirectory, MessageCollection, ParticipantFilter, PgMessageCollection,
    PgProfileDirectory, ProfileDirectory,
};
use amora_server::adapters::database::DbPool;
use amora_server::adapters::redis::ChangeRepository;
use amora_server::adapters::redis::change_repo::DEFAULT_CHANNEL_PREFIX;
use amora_server::domain::conversation::ViewState;
use amora_server::domain::message::{Message, NewMessage, ParticipantPair};
use amora_server::domain::notification::ChangeEvent;
use amora_server::services::conversation_service::{ConversationService, ViewStream};
use amora_server::services::notification::{ChangeNotifier, LocalChangeNotifier, RedisChangeNotifier};
use common::{get_test_pool, get_test_pubsub, test_config};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

async fn insert_profile(pool: &DbPool, name: &str, photos: &[&str]) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO profiles (user_id, name, photos) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(name)
        .bind(photos.iter().map(ToString::to_string).collect::<Vec<_>>())
        .execute(pool)
        .await
        .unwrap();
    user_id
}

#[tokio::test]
async fn test_pg_add_query_and_mark_read() {
    let Some(pool) = get_test_pool().await else { return };
    let collection = PgMessageCollection::new(pool);
    let (alex, sam, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let message = collection.add(NewMessage::new(alex, sam, "  hello  ", 100).unwrap()).await.unwrap();
    assert_eq!(message.content(), "hello");
    assert_eq!(message.sender_id(), alex);
    assert!(message.created_at().is_some());
    assert!(!message.is_read());

    for participant in [alex, sam] {
        let found = collection.query(ParticipantFilter::new(participant)).await.unwrap();
        assert_eq!(found, vec![message.clone()]);
    }
    assert!(collection.query(ParticipantFilter::new(stranger)).await.unwrap().is_empty());

    // Only the recipient can flag it.
    assert!(!collection.mark_read(message.id(), alex).await.unwrap());
    assert!(!collection.get(message.id()).await.unwrap().unwrap().is_read());

    assert!(collection.mark_read(message.id(), sam).await.unwrap());
    assert!(collection.get(message.id()).await.unwrap().unwrap().is_read());

    assert!(!collection.mark_read(Uuid::new_v4(), sam).await.unwrap());
    assert!(collection.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pg_schema_rejects_inconsistent_participants() {
    let Some(pool) = get_test_pool().await else { return };
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let insert = "INSERT INTO messages (sender_id, recipient_id, content, participants) VALUES ($1, $2, 'x', $3)";

    let self_addressed = sqlx::query(insert).bind(a).bind(a).bind(vec![a, a]).execute(&pool).await;
    assert!(self_addressed.is_err());

    let mismatched = sqlx::query(insert).bind(a).bind(b).bind(vec![a, c]).execute(&pool).await;
    assert!(mismatched.is_err());

    let valid = sqlx::query(insert).bind(a).bind(b).bind(vec![b, a]).execute(&pool).await;
    assert!(valid.is_ok());
}

#[tokio::test]
async fn test_pg_profile_directory() {
    let Some(pool) = get_test_pool().await else { return };
    let alex = insert_profile(&pool, "Alex", &["https://cdn.test/alex.jpg"]).await;
    let directory = PgProfileDirectory::new(pool);

    let summary = directory.get(alex).await.unwrap().unwrap().summary();
    assert_eq!(summary.name, "Alex");
    assert_eq!(summary.photo_url.as_deref(), Some("https://cdn.test/alex.jpg"));

    assert!(directory.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pg_backed_conversations() {
    let Some(pool) = get_test_pool().await else { return };
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let sam = insert_profile(&pool, "Sam", &[]).await;
    let alex = insert_profile(&pool, "Alex", &[]).await;

    let service = ConversationService::new(
        Arc::new(PgMessageCollection::new(pool.clone())),
        Arc::new(PgProfileDirectory::new(pool)),
        Arc::new(LocalChangeNotifier::new(16, 60, shutdown_rx)),
        100,
    );

    service.send(alex, sam, "first").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.send(sam, alex, "second").await.unwrap();

    let list = service.list(sam).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].counterpart.name, "Alex");
    assert_eq!(list[0].last_message.content(), "second");
    assert_eq!(list[0].unread_count, 1);

    let thread = service.thread(alex, sam).await.unwrap();
    let contents: Vec<&str> = thread.messages.iter().map(Message::content).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

async fn redis_node(shutdown_rx: watch::Receiver<bool>) -> Option<Arc<RedisChangeNotifier>> {
    let pubsub = get_test_pubsub(shutdown_rx.clone()).await?;
    let repo = Arc::new(ChangeRepository::new(pubsub, DEFAULT_CHANNEL_PREFIX.to_string()));
    Some(Arc::new(RedisChangeNotifier::new(repo, &test_config().messaging, shutdown_rx).await.unwrap()))
}

#[tokio::test]
async fn test_redis_notifier_reaches_other_node() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let Some(node_a) = redis_node(shutdown_rx.clone()).await else { return };
    let Some(node_b) = redis_node(shutdown_rx).await else { return };
    let (alex, sam, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let mut sam_on_b = node_b.watch(sam);
    let mut stranger_on_b = node_b.watch(stranger);

    node_a.publish(ParticipantPair::new(alex, sam).unwrap()).await;

    let event = tokio::time::timeout(Duration::from_secs(5), sam_on_b.recv()).await.unwrap().unwrap();
    assert_eq!(event, ChangeEvent::MessagesChanged);
    assert!(tokio::time::timeout(Duration::from_millis(200), stranger_on_b.recv()).await.is_err());
}

async fn next_view<T>(view: &mut ViewStream<T>) -> ViewState<T> {
    tokio::time::timeout(Duration::from_secs(5), view.next()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_live_list_follows_send_on_other_node() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let Some(notifier_a) = redis_node(shutdown_rx.clone()).await else { return };
    let Some(notifier_b) = redis_node(shutdown_rx).await else { return };

    let collection = Arc::new(MemoryMessageCollection::new());
    let profiles = Arc::new(MemoryProfileDirectory::new());
    let node_a = ConversationService::new(collection.clone(), profiles.clone(), notifier_a, 100);
    let node_b = ConversationService::new(collection, profiles, notifier_b, 100);
    let (alex, sam) = (Uuid::new_v4(), Uuid::new_v4());

    let (mut view, _handle) = node_b.live_list(sam);
    assert_eq!(next_view(&mut view).await, ViewState::Loading);
    assert_eq!(next_view(&mut view).await, ViewState::Loaded(Vec::new()));

    node_a.send(alex, sam, "across nodes").await.unwrap();

    let ViewState::Loaded(list) = next_view(&mut view).await else {
        panic!("expected a loaded list");
    };
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].counterpart_id, alex);
    assert_eq!(list[0].unread_count, 1);
}
