//! Object store: round trips, identity cache, fallbacks.

use coopstore::{Document, ErrorKind, Fallback, ObjectStore, Registry, Store, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    title: String,
    checked: bool,
}

impl Document for Item {
    const TAG: &'static str = "Item";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

impl Document for User {
    const TAG: &'static str = "User";
}

fn objects(caching: bool) -> ObjectStore {
    let mut registry = Registry::new();
    registry.register::<Item>().unwrap();
    registry.register::<User>().unwrap();
    ObjectStore::new(Store::memory(), registry, caching)
}

fn item(title: &str) -> Arc<Item> {
    Arc::new(Item {
        title: title.to_string(),
        checked: false,
    })
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn test_set_then_get_returns_same_instance() {
    let objects = objects(true);
    let milk = item("Milk");
    objects.set("item:1", &milk).await.unwrap();

    let got = objects.get::<Item>("item:1").await.unwrap().unwrap();
    assert_eq!(*got, *milk);
    assert!(Arc::ptr_eq(&got, &milk));
}

#[tokio::test]
async fn test_decoded_instance_is_shared_while_alive() {
    let objects = objects(true);
    objects.set("item:1", &item("Eggs")).await.unwrap();

    let first = objects.get::<Item>("item:1").await.unwrap().unwrap();
    let second = objects.get::<Item>("item:1").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

/// Write `obj` behind the cache's back so the next reads all miss.
async fn store_raw(objects: &ObjectStore, key: &str, obj: &Item) {
    let raw = objects.encode(obj).unwrap();
    objects.store().set(key, raw).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_misses_share_one_instance() {
    let objects = objects(true);
    store_raw(&objects, "item:1", &item("Jam")).await;

    let (a, b) = tokio::join!(objects.get::<Item>("item:1"), objects.get::<Item>("item:1"));
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let c = objects.get::<Item>("item:1").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&b, &c));
}

#[tokio::test]
async fn test_get_many_with_repeated_key_shares_one_instance() {
    let objects = objects(true);
    store_raw(&objects, "item:1", &item("Rice")).await;

    let keys = vec!["item:1".to_string(), "item:1".to_string()];
    let got = objects.get_many::<Item>(&keys).await.unwrap();
    let first = got[0].clone().unwrap();
    let second = got[1].clone().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let again = objects.get::<Item>("item:1").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
}

#[tokio::test]
async fn test_caching_disabled_gives_distinct_instances() {
    let objects = objects(false);
    let bread = item("Bread");
    objects.set("item:1", &bread).await.unwrap();

    let first = objects.get::<Item>("item:1").await.unwrap().unwrap();
    let second = objects.get::<Item>("item:1").await.unwrap().unwrap();
    assert_eq!(first, second);
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &bread));
}

#[tokio::test]
async fn test_switching_caching_off_drops_identity() {
    let objects = objects(true);
    let tea = item("Tea");
    objects.set("item:1", &tea).await.unwrap();
    objects.set_caching(false);

    let got = objects.get::<Item>("item:1").await.unwrap().unwrap();
    assert_eq!(got, tea);
    assert!(!Arc::ptr_eq(&got, &tea));
}

// =============================================================================
// Missing keys and fallbacks
// =============================================================================

#[tokio::test]
async fn test_missing_key_yields_fallback() {
    let objects = objects(true);
    let default = item("default");

    assert!(objects.get::<Item>("missing").await.unwrap().is_none());
    let got = objects
        .get_or("missing", Fallback::Value(default.clone()))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&got, &default));

    let err = objects
        .get_or::<Item>("missing", Fallback::Error(StoreError::NotFound("list".to_string())))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::NotFound("list".to_string()));

    let err = objects.require::<Item>("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Decoding failures
// =============================================================================

#[tokio::test]
async fn test_expected_type_mismatch() {
    let objects = objects(true);
    objects
        .set(
            "user:1",
            &Arc::new(User {
                name: "ada".to_string(),
            }),
        )
        .await
        .unwrap();

    let err = objects.get::<Item>("user:1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);

    let obj = objects.get_object("user:1").await.unwrap().unwrap();
    assert!(obj.is::<User>());
    assert_eq!(obj.tag(), "User");
}

#[tokio::test]
async fn test_malformed_payload_is_protocol_error() {
    let objects = objects(true);
    objects.store().set("raw", "plain text").await.unwrap();
    objects
        .store()
        .set("future", r#"{"__type__":"Unknown","x":1}"#)
        .await
        .unwrap();

    assert_eq!(objects.get::<Item>("raw").await.unwrap_err().kind(), ErrorKind::Protocol);
    assert_eq!(objects.get::<Item>("future").await.unwrap_err().kind(), ErrorKind::Protocol);
}

// =============================================================================
// Batches
// =============================================================================

#[tokio::test]
async fn test_batch_round_trip() {
    let objects = objects(false);
    let batch: Vec<(String, Arc<Item>)> = (0..5)
        .map(|i| (format!("item:{}", i), item(&format!("thing {}", i))))
        .collect();
    objects.set_many(&batch).await.unwrap();

    let mut keys: Vec<String> = batch.iter().map(|(k, _)| k.clone()).collect();
    keys.push("item:none".to_string());
    let got = objects.get_many::<Item>(&keys).await.unwrap();

    assert_eq!(got.len(), 6);
    for ((_, expected), got) in batch.iter().zip(&got) {
        assert_eq!(got.as_deref(), Some(&**expected));
    }
    assert!(got[5].is_none());
}
