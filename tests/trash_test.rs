//! Deferred deletion: queue primitive and end-to-end sweep.

#![cfg(feature = "lua")]

use coopstore::{
    Config, Database, Document, ManualClock, ObjectStore, Pop, Registry, Store, StoreError,
    Timestamp, TrashEntry, TrashQueue, Trashable,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NOTES_DELETED: AtomicUsize = AtomicUsize::new(0);
static CURSED_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    text: String,
}

impl Document for Note {
    const TAG: &'static str = "Note";
}

impl Trashable for Note {
    fn delete<'a>(
        self: Arc<Self>,
        key: &'a str,
        objects: &'a ObjectStore,
    ) -> Pin<Box<dyn Future<Output = coopstore::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            NOTES_DELETED.fetch_add(1, Ordering::SeqCst);
            objects.delete(key).await?;
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cursed {
    text: String,
}

impl Document for Cursed {
    const TAG: &'static str = "Cursed";
}

impl Trashable for Cursed {
    fn delete<'a>(
        self: Arc<Self>,
        _key: &'a str,
        _objects: &'a ObjectStore,
    ) -> Pin<Box<dyn Future<Output = coopstore::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            CURSED_ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("cannot delete".to_string()))
        })
    }
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_trashable::<Note>().unwrap();
    registry.register_trashable::<Cursed>().unwrap();
    registry
}

// =============================================================================
// pop_ready
// =============================================================================

#[tokio::test]
async fn test_pop_ready_lifecycle() {
    let clock = Arc::new(ManualClock::new(10_000));
    let queue = TrashQueue::new(Store::memory(), "trash", clock.clone(), Duration::from_secs(1));

    assert_eq!(queue.pop_ready().await.unwrap(), Pop::Empty);

    queue.schedule("list:1", Timestamp(12_000)).await.unwrap();
    assert_eq!(queue.pop_ready().await.unwrap(), Pop::Pending(Timestamp(12_000)));
    assert_eq!(queue.pop_ready().await.unwrap(), Pop::Pending(Timestamp(12_000)));
    assert_eq!(queue.len().await.unwrap(), 1);

    clock.set(12_000);
    assert_eq!(
        queue.pop_ready().await.unwrap(),
        Pop::Ready(TrashEntry {
            key: "list:1".to_string(),
            ready_at: Timestamp(12_000),
        })
    );
    assert_eq!(queue.pop_ready().await.unwrap(), Pop::Empty);
}

#[tokio::test]
async fn test_pop_ready_takes_earliest_first() {
    let clock = Arc::new(ManualClock::new(0));
    let queue = TrashQueue::new(Store::memory(), "trash", clock.clone(), Duration::from_secs(1));
    queue.schedule("late", Timestamp(300)).await.unwrap();
    queue.schedule("early", Timestamp(100)).await.unwrap();

    clock.set(1_000);
    let Pop::Ready(first) = queue.pop_ready().await.unwrap() else {
        panic!("expected a ready entry");
    };
    assert_eq!(first.key, "early");
    let Pop::Ready(second) = queue.pop_ready().await.unwrap() else {
        panic!("expected a ready entry");
    };
    assert_eq!(second.key, "late");
}

// =============================================================================
// End-to-end sweep
// =============================================================================

#[tokio::test]
async fn test_trashed_object_is_deleted_once_after_retention() {
    let db = Database::open(Config::test(), registry()).await.unwrap();
    let note = Arc::new(Note {
        text: "old".to_string(),
    });
    db.objects().set("note:1", &note).await.unwrap();
    drop(note);

    db.trash().trash("note:1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(NOTES_DELETED.load(Ordering::SeqCst), 0);
    assert!(db.store().exists("note:1").await.unwrap());

    tokio::time::sleep(Duration::from_millis(200)).await;
    for _ in 0..50 {
        if NOTES_DELETED.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(NOTES_DELETED.load(Ordering::SeqCst), 1);
    assert!(!db.store().exists("note:1").await.unwrap());
    assert!(db.trash().is_empty().await.unwrap());
    assert_eq!(db.sweeper_stats().purged(), 1);
    db.shutdown().await;
}

#[tokio::test]
async fn test_failed_delete_is_rescheduled() {
    let db = Database::open(Config::test(), registry()).await.unwrap();
    db.objects()
        .set(
            "cursed:1",
            &Arc::new(Cursed {
                text: "stuck".to_string(),
            }),
        )
        .await
        .unwrap();

    let first_ready = db.trash().trash("cursed:1").await.unwrap();
    for _ in 0..100 {
        if CURSED_ATTEMPTS.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(CURSED_ATTEMPTS.load(Ordering::SeqCst) >= 1);
    let ready = db.trash().ready_time("cursed:1").await.unwrap();
    assert!(matches!(ready, Some(at) if at > first_ready));
    assert_eq!(db.trash().len().await.unwrap(), 1);
    assert!(db.store().exists("cursed:1").await.unwrap());
    assert!(db.sweeper_stats().failed() >= 1);
    db.shutdown().await;
}

#[tokio::test]
async fn test_restored_object_survives_sweep() {
    let db = Database::open(Config::test(), registry()).await.unwrap();
    db.objects()
        .set(
            "note:keep",
            &Arc::new(Note {
                text: "keep me".to_string(),
            }),
        )
        .await
        .unwrap();

    db.trash().trash("note:keep").await.unwrap();
    assert!(db.trash().restore("note:keep").await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(db.store().exists("note:keep").await.unwrap());
    db.shutdown().await;
}
