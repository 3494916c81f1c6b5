//! The persisted subscription aggregate.
//!
//! One [`SubscriptionStore`] instance is the single mutable aggregate of the
//! process, owned by the composition root and passed by reference. It is
//! effectively single-writer (the engine inside a tick, command mutators
//! outside tick boundaries) with multiple readers. Every mutating call is
//! written through to the durable backend before it returns; the lock is
//! never held across an await.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WatchError;
use crate::persist::StateStore;
use crate::types::{Head, PoolEntry, Snapshot, SubKey, SubscriptionRecord};

// ─── StoreData ────────────────────────────────────────────────────────────────

/// The serialized form of the aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    /// Most recently observed finalized head.
    pub current_head: Option<Head>,
    /// The head before that — kept for observability, never read by the
    /// engine.
    pub last_head: Option<Head>,
    /// Per-pool on-chain state cache.
    pub pools: BTreeMap<u64, PoolEntry>,
    /// Global subscription records, keyed by `"{pid}_{account}"`.
    pub subscriptions: BTreeMap<String, SubscriptionRecord>,
    /// Per-chat sets of watched keys.
    pub subscription_maps: BTreeMap<String, BTreeSet<String>>,
}

// ─── SubscriptionStore ────────────────────────────────────────────────────────

/// In-memory aggregate with write-through persistence.
pub struct SubscriptionStore {
    name: String,
    data: RwLock<StoreData>,
    backend: Arc<dyn StateStore>,
}

impl SubscriptionStore {
    /// Restore the aggregate from the backend, or start empty if nothing was
    /// ever saved.
    pub async fn open(
        backend: Arc<dyn StateStore>,
        name: impl Into<String>,
    ) -> Result<Self, WatchError> {
        let name = name.into();
        let data = match backend.load(&name).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| WatchError::Storage(format!("corrupt state document: {e}")))?,
            None => StoreData::default(),
        };
        Ok(Self {
            name,
            data: RwLock::new(data),
            backend,
        })
    }

    // ─── Subscription operations ─────────────────────────────────────────────

    /// The record for `key` as seen by `chat` — present only if the chat
    /// watches the key and the global record exists.
    pub fn subscription(&self, chat: &str, key: &SubKey) -> Option<SubscriptionRecord> {
        let data = self.data.read().unwrap();
        let key = key.to_string();
        if !data
            .subscription_maps
            .get(chat)
            .is_some_and(|keys| keys.contains(&key))
        {
            return None;
        }
        data.subscriptions.get(&key).cloned()
    }

    /// Subscribe `chat` to `key`.
    ///
    /// Fails with [`WatchError::AlreadySubscribed`] (state unchanged) if the
    /// chat already watches the key. Creates the global record with all
    /// three snapshot slots empty if it does not exist yet, so the next tick
    /// populates it.
    pub async fn subscribe(&self, chat: &str, key: &SubKey) -> Result<(), WatchError> {
        {
            let mut data = self.data.write().unwrap();
            let key_str = key.to_string();
            let keys = data.subscription_maps.entry(chat.to_string()).or_default();
            if !keys.insert(key_str.clone()) {
                return Err(WatchError::AlreadySubscribed {
                    chat: chat.to_string(),
                    key: key_str,
                });
            }
            data.subscriptions.entry(key_str).or_default();
        }
        self.persist().await
    }

    /// Remove `chat`'s watch on `key`. A missing mapping is a no-op.
    ///
    /// The global record is retained even when no chat references it any
    /// longer (tombstone; pool/account cardinality is small, garbage
    /// collection is out of scope). Returns whether anything was removed.
    pub async fn unsubscribe(&self, chat: &str, key: &SubKey) -> Result<bool, WatchError> {
        let removed = {
            let mut data = self.data.write().unwrap();
            let key_str = key.to_string();
            match data.subscription_maps.get_mut(chat) {
                Some(keys) => {
                    let removed = keys.remove(&key_str);
                    if keys.is_empty() {
                        data.subscription_maps.remove(chat);
                    }
                    removed
                }
                None => false,
            }
        };
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Derived `pid → distinct accounts` projection over the union of all
    /// chats' watched keys. Recomputed from the live maps on every access.
    pub fn pool_relationship(&self) -> BTreeMap<u64, Vec<String>> {
        let data = self.data.read().unwrap();
        let mut distinct: BTreeSet<&str> = BTreeSet::new();
        for keys in data.subscription_maps.values() {
            distinct.extend(keys.iter().map(String::as_str));
        }

        let mut relationship: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for raw in distinct {
            match raw.parse::<SubKey>() {
                Ok(key) => relationship.entry(key.pid).or_default().push(key.account),
                Err(e) => warn!(key = raw, "skipping malformed subscription key: {e}"),
            }
        }
        relationship
    }

    // ─── Engine-facing operations ────────────────────────────────────────────

    /// Shift `last_head ← current_head` and install the new head.
    pub fn advance_head(&self, head: Head) {
        let mut data = self.data.write().unwrap();
        data.last_head = data.current_head.take();
        data.current_head = Some(head);
    }

    pub fn current_head(&self) -> Option<Head> {
        self.data.read().unwrap().current_head.clone()
    }

    pub fn last_head(&self) -> Option<Head> {
        self.data.read().unwrap().last_head.clone()
    }

    /// Overwrite the cached state for one pool.
    pub fn upsert_pool(&self, entry: PoolEntry) {
        self.data.write().unwrap().pools.insert(entry.pid, entry);
    }

    /// Fold a freshly computed snapshot into the record for `key`.
    ///
    /// The snapshot is fully built by the caller before this call, so
    /// readers never observe a partially constructed value.
    pub fn apply_snapshot(&self, key: &SubKey, snapshot: Snapshot) {
        let mut data = self.data.write().unwrap();
        data.subscriptions
            .entry(key.to_string())
            .or_default()
            .observe(snapshot);
    }

    /// Global record for `key`, regardless of which chats watch it.
    pub fn record(&self, key: &SubKey) -> Option<SubscriptionRecord> {
        self.data
            .read()
            .unwrap()
            .subscriptions
            .get(&key.to_string())
            .cloned()
    }

    /// Re-baseline every record (`previous_point ← current` where `current`
    /// exists). Invoked by the scheduling collaborator after a reporting
    /// pass.
    pub async fn rollover_baselines(&self) -> Result<(), WatchError> {
        {
            let mut data = self.data.write().unwrap();
            for record in data.subscriptions.values_mut() {
                record.rollover();
            }
        }
        self.persist().await
    }

    // ─── Persistence ─────────────────────────────────────────────────────────

    /// Write the aggregate through to the durable backend.
    pub async fn persist(&self) -> Result<(), WatchError> {
        let payload = {
            let data = self.data.read().unwrap();
            serde_json::to_vec(&*data)
                .map_err(|e| WatchError::Storage(format!("serialize state: {e}")))?
        };
        self.backend.save(&self.name, &payload).await
    }

    /// A point-in-time copy of the whole aggregate (inspection/reporting).
    pub fn export(&self) -> StoreData {
        self.data.read().unwrap().clone()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal in-memory backend for store tests.
    #[derive(Default)]
    struct TestBackend {
        docs: Mutex<HashMap<String, Vec<u8>>>,
        saves: Mutex<u32>,
    }

    #[async_trait]
    impl StateStore for TestBackend {
        async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, WatchError> {
            Ok(self.docs.lock().unwrap().get(name).cloned())
        }

        async fn save(&self, name: &str, payload: &[u8]) -> Result<(), WatchError> {
            *self.saves.lock().unwrap() += 1;
            self.docs
                .lock()
                .unwrap()
                .insert(name.to_string(), payload.to_vec());
            Ok(())
        }

        async fn delete(&self, name: &str) -> Result<(), WatchError> {
            self.docs.lock().unwrap().remove(name);
            Ok(())
        }
    }

    async fn fresh_store() -> (SubscriptionStore, Arc<TestBackend>) {
        let backend = Arc::new(TestBackend::default());
        let store = SubscriptionStore::open(backend.clone(), "test")
            .await
            .unwrap();
        (store, backend)
    }

    fn key(pid: u64, account: &str) -> SubKey {
        SubKey::new(pid, account)
    }

    #[tokio::test]
    async fn subscribe_then_get_returns_all_null_record() {
        let (store, _) = fresh_store().await;
        let k = key(1, "alice");

        store.subscribe("chat-a", &k).await.unwrap();

        let record = store.subscription("chat-a", &k).unwrap();
        assert_eq!(record, SubscriptionRecord::default());
    }

    #[tokio::test]
    async fn double_subscribe_fails_and_leaves_state_unchanged() {
        let (store, _) = fresh_store().await;
        let k = key(1, "alice");

        store.subscribe("chat-a", &k).await.unwrap();
        let before = store.export();

        let err = store.subscribe("chat-a", &k).await.unwrap_err();
        assert!(matches!(err, WatchError::AlreadySubscribed { .. }));

        let after = store.export();
        assert_eq!(
            serde_json::to_value(&before).unwrap(),
            serde_json::to_value(&after).unwrap()
        );
    }

    #[tokio::test]
    async fn two_chats_share_one_record() {
        let (store, _) = fresh_store().await;
        let k = key(1, "alice");

        store.subscribe("chat-a", &k).await.unwrap();
        store.subscribe("chat-b", &k).await.unwrap();

        assert_eq!(store.export().subscriptions.len(), 1);
        assert!(store.subscription("chat-b", &k).is_some());
    }

    #[tokio::test]
    async fn unsubscribe_hides_record_but_keeps_tombstone() {
        let (store, _) = fresh_store().await;
        let k = key(1, "alice");

        store.subscribe("chat-a", &k).await.unwrap();
        assert!(store.unsubscribe("chat-a", &k).await.unwrap());

        assert!(store.subscription("chat-a", &k).is_none());
        // Global record retained.
        assert!(store.record(&k).is_some());
    }

    #[tokio::test]
    async fn unsubscribe_missing_mapping_is_noop() {
        let (store, backend) = fresh_store().await;
        let k = key(1, "alice");

        assert!(!store.unsubscribe("chat-a", &k).await.unwrap());
        assert_eq!(*backend.saves.lock().unwrap(), 0); // nothing written
    }

    #[tokio::test]
    async fn relationship_groups_and_dedupes() {
        let (store, _) = fresh_store().await;
        store.subscribe("chat-a", &key(1, "alice")).await.unwrap();
        store.subscribe("chat-a", &key(1, "bob")).await.unwrap();
        // Same key from a second chat must not duplicate the account.
        store.subscribe("chat-b", &key(1, "alice")).await.unwrap();
        store.subscribe("chat-b", &key(2, "carol")).await.unwrap();

        let rel = store.pool_relationship();
        assert_eq!(rel[&1], vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(rel[&2], vec!["carol".to_string()]);
    }

    #[tokio::test]
    async fn relationship_is_pure_and_never_has_empty_lists() {
        let (store, _) = fresh_store().await;
        store.subscribe("chat-a", &key(1, "alice")).await.unwrap();
        store.unsubscribe("chat-a", &key(1, "alice")).await.unwrap();

        let rel = store.pool_relationship();
        // The tombstoned record contributes nothing; no empty pid entries.
        assert!(rel.is_empty());
        assert_eq!(rel, store.pool_relationship()); // idempotent recompute
    }

    #[tokio::test]
    async fn mutations_are_written_through() {
        let (store, backend) = fresh_store().await;
        store.subscribe("chat-a", &key(1, "alice")).await.unwrap();

        // A fresh store over the same backend sees the subscription.
        let reopened = SubscriptionStore::open(backend, "test").await.unwrap();
        assert!(reopened.subscription("chat-a", &key(1, "alice")).is_some());
    }

    #[tokio::test]
    async fn advance_head_shifts_last() {
        let (store, _) = fresh_store().await;
        let a = Head {
            hash: "0xa".into(),
            height: 100,
            updated_at: 0,
        };
        let b = Head {
            hash: "0xb".into(),
            height: 101,
            updated_at: 1,
        };

        store.advance_head(a.clone());
        store.advance_head(b.clone());

        assert_eq!(store.current_head(), Some(b));
        assert_eq!(store.last_head(), Some(a));
    }
}
