//! Lexical index consistency across create, rename and delete.

#![cfg(feature = "lua")]

use coopstore::{Conflict, Document, Indexed, IndexedCollection, ObjectStore, Registry, Store, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct List {
    title: String,
}

impl Document for List {
    const TAG: &'static str = "List";
}

impl Indexed for List {
    fn sort_field(&self) -> &str {
        &self.title
    }
}

fn list(title: &str) -> Arc<List> {
    Arc::new(List {
        title: title.to_string(),
    })
}

fn lists() -> IndexedCollection<List> {
    let mut registry = Registry::new();
    registry.register::<List>().unwrap();
    IndexedCollection::new(ObjectStore::new(Store::memory(), registry, true), "user:1:lists")
}

async fn titles(lists: &IndexedCollection<List>) -> Vec<String> {
    lists
        .by_sort_field()
        .slice(..)
        .await
        .unwrap()
        .iter()
        .map(|l| l.title.clone())
        .collect()
}

async fn assert_consistent(lists: &IndexedCollection<List>) {
    let primary: BTreeSet<String> = lists.by_order().sequence().all().await.unwrap().into_iter().collect();
    let lexical: BTreeSet<String> = lists.lexical().ids().await.unwrap().into_iter().collect();
    assert_eq!(primary, lexical);
}

#[tokio::test]
async fn test_create_rename_delete_keep_index_consistent() {
    let lists = lists();
    lists.create("list:b", &list("B")).await.unwrap();
    lists.create("list:a", &list("A")).await.unwrap();
    lists.create("list:c", &list("C")).await.unwrap();

    assert_eq!(lists.lexical().ids().await.unwrap(), vec!["list:a", "list:b", "list:c"]);
    assert_eq!(titles(&lists).await, vec!["A", "B", "C"]);
    assert_consistent(&lists).await;

    lists.rename("list:b", &list("Z")).await.unwrap();
    assert_eq!(lists.lexical().ids().await.unwrap(), vec!["list:a", "list:c", "list:b"]);
    assert_eq!(titles(&lists).await, vec!["A", "C", "Z"]);
    assert_consistent(&lists).await;

    lists.delete("list:a", &[]).await.unwrap();
    assert!(!lists.by_order().sequence().contains("list:a").await.unwrap());
    assert!(!lists.lexical().contains("list:a").await.unwrap());
    assert_eq!(titles(&lists).await, vec!["C", "Z"]);
    assert_consistent(&lists).await;
}

#[tokio::test]
async fn test_primary_order_is_creation_order() {
    let lists = lists();
    for (id, title) in [("l:1", "Zebra"), ("l:2", "apple"), ("l:3", "Mango")] {
        lists.create(id, &list(title)).await.unwrap();
    }
    assert_eq!(lists.by_order().sequence().all().await.unwrap(), vec!["l:1", "l:2", "l:3"]);
    assert_eq!(lists.lexical().ids().await.unwrap(), vec!["l:2", "l:3", "l:1"]);
}

#[tokio::test]
async fn test_conflicts_leave_state_untouched() {
    let lists = lists();
    lists.create("list:a", &list("A")).await.unwrap();

    let err = lists.create("list:a", &list("Other")).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict(Conflict::AlreadyExists));
    let err = lists.delete("list:x", &[]).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict(Conflict::MemberMissing));

    assert_eq!(titles(&lists).await, vec!["A"]);
    assert_consistent(&lists).await;
}

#[tokio::test]
async fn test_prefix_search() {
    let lists = lists();
    for (id, title) in [("l:1", "Groceries"), ("l:2", "gardening"), ("l:3", "Travel")] {
        lists.create(id, &list(title)).await.unwrap();
    }
    let found: Vec<String> = lists.search("gr").await.unwrap().iter().map(|l| l.title.clone()).collect();
    assert_eq!(found, vec!["Groceries"]);
    assert_eq!(lists.lexical().search("G").await.unwrap(), vec!["l:2", "l:1"]);
    assert!(lists.search("x").await.unwrap().is_empty());
}
