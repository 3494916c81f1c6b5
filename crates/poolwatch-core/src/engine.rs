//! Snapshot engine — one tick of reward accounting at a fixed head.
//!
//! A tick reads the pool→accounts relationship, fetches every pool and every
//! subscribed staker position concurrently against the at-head handle, and
//! folds the computed snapshots into the store. Re-running a tick for the
//! same head recomputes identical output given identical chain state.
//!
//! Failure policy: a branch that fails (pool fetch, account fetch, anomalous
//! arithmetic) is logged and skipped for this tick; it never aborts the
//! other branches. The tick completes only once every branch has resolved,
//! after which the aggregate is persisted.

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::chain::{AtHead, PoolState};
use crate::error::WatchError;
use crate::rewards::delegator_claimable;
use crate::store::SubscriptionStore;
use crate::types::{now_ms, PoolEntry, Snapshot, SubKey};

/// Run one snapshot tick at the given head height.
pub async fn tick<A: AtHead>(
    at: &A,
    height: u64,
    store: &SubscriptionStore,
) -> Result<(), WatchError> {
    let relationship = store.pool_relationship();

    // Fan out: one fetch per distinct pool.
    let fetches = relationship
        .keys()
        .map(|&pid| async move { (pid, at.pool(pid).await) });
    let mut pools: Vec<PoolState> = Vec::with_capacity(relationship.len());
    for (pid, result) in join_all(fetches).await {
        match result {
            Ok(Some(state)) => pools.push(state),
            // Pool no longer exists — its subscriptions simply are not
            // updated this tick.
            Ok(None) => debug!(pid, "pool absent at this head, skipping"),
            Err(e) => warn!(pid, "pool fetch failed, skipping for this tick: {e}"),
        }
    }

    // Fan out again: every (pool, account) snapshot concurrently.
    let snapshots = pools.iter().flat_map(|pool| {
        store.upsert_pool(PoolEntry {
            pid: pool.pid,
            info: pool.raw.clone(),
            reward_acc: pool.reward_acc,
            updated_at: now_ms(),
        });
        let accounts = relationship.get(&pool.pid).map(Vec::as_slice).unwrap_or(&[]);
        accounts.iter().map(move |account| async move {
            if let Err(e) = snapshot_account(at, pool, account, height, store).await {
                match &e {
                    WatchError::AnomalousNegativeReward { .. } => {
                        error!(pid = pool.pid, account, "reward anomaly: {e}")
                    }
                    _ => warn!(pid = pool.pid, account, "account snapshot failed: {e}"),
                }
            }
        })
    });
    join_all(snapshots).await;

    store.persist().await
}

/// Compute and apply one account's snapshot for one pool.
async fn snapshot_account<A: AtHead>(
    at: &A,
    pool: &PoolState,
    account: &str,
    height: u64,
    store: &SubscriptionStore,
) -> Result<(), WatchError> {
    let owner_claimable = if account == pool.owner {
        pool.owner_reward
    } else {
        0
    };

    let delegator_claimable = match at.staker_position(pool.pid, account).await? {
        Some(position) => delegator_claimable(
            pool.pid,
            account,
            position.shares,
            pool.reward_acc,
            position.reward_debt,
        )?,
        None => 0,
    };

    // Built fully before publication — readers never see a partial snapshot.
    let snapshot = Snapshot {
        height,
        updated_at: now_ms(),
        owner_claimable,
        delegator_claimable,
    };
    store.apply_snapshot(&SubKey::new(pool.pid, account), snapshot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StakerPosition;
    use crate::persist::StateStore;
    use crate::rewards::ACC_FRACTION_BITS;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const ONE: u128 = 1 << ACC_FRACTION_BITS;

    #[derive(Default)]
    struct NullBackend;

    #[async_trait]
    impl StateStore for NullBackend {
        async fn load(&self, _name: &str) -> Result<Option<Vec<u8>>, WatchError> {
            Ok(None)
        }
        async fn save(&self, _name: &str, _payload: &[u8]) -> Result<(), WatchError> {
            Ok(())
        }
        async fn delete(&self, _name: &str) -> Result<(), WatchError> {
            Ok(())
        }
    }

    /// Scripted at-head view over fixed pool/staker tables.
    #[derive(Default)]
    struct FakeAtHead {
        height: u64,
        pools: HashMap<u64, PoolState>,
        positions: HashMap<(u64, String), StakerPosition>,
        failing_accounts: Vec<String>,
        position_fetches: Mutex<u32>,
    }

    #[async_trait]
    impl AtHead for FakeAtHead {
        async fn height(&self) -> Result<u64, WatchError> {
            Ok(self.height)
        }

        async fn pool(&self, pid: u64) -> Result<Option<PoolState>, WatchError> {
            Ok(self.pools.get(&pid).cloned())
        }

        async fn staker_position(
            &self,
            pid: u64,
            account: &str,
        ) -> Result<Option<StakerPosition>, WatchError> {
            *self.position_fetches.lock().unwrap() += 1;
            if self.failing_accounts.iter().any(|a| a == account) {
                return Err(WatchError::Rpc("account fetch failed".into()));
            }
            Ok(self.positions.get(&(pid, account.to_string())).copied())
        }
    }

    fn pool(pid: u64, owner: &str, owner_reward: u128, reward_acc: u128) -> PoolState {
        PoolState {
            pid,
            owner: owner.into(),
            owner_reward,
            reward_acc,
            raw: serde_json::json!({ "pid": pid, "owner": owner }),
        }
    }

    async fn store_with(subs: &[(&str, u64, &str)]) -> SubscriptionStore {
        let store = SubscriptionStore::open(Arc::new(NullBackend), "test")
            .await
            .unwrap();
        for (chat, pid, account) in subs {
            store
                .subscribe(chat, &SubKey::new(*pid, *account))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn owner_gets_owner_reward_delegator_gets_zero() {
        let store = store_with(&[("chat", 1, "owner-acct"), ("chat", 1, "delegator")]).await;
        let mut at = FakeAtHead {
            height: 100,
            ..Default::default()
        };
        at.pools.insert(1, pool(1, "owner-acct", 777, 2 * ONE));
        at.positions.insert(
            (1, "delegator".into()),
            StakerPosition {
                shares: 10,
                reward_debt: 5,
            },
        );

        tick(&at, 100, &store).await.unwrap();

        let owner = store.record(&SubKey::new(1, "owner-acct")).unwrap();
        assert_eq!(owner.current.as_ref().unwrap().owner_claimable, 777);
        assert_eq!(owner.current.as_ref().unwrap().delegator_claimable, 0); // no position

        let delegator = store.record(&SubKey::new(1, "delegator")).unwrap();
        assert_eq!(delegator.current.as_ref().unwrap().owner_claimable, 0);
        assert_eq!(delegator.current.as_ref().unwrap().delegator_claimable, 15); // 10×2 − 5
    }

    #[tokio::test]
    async fn absent_pool_is_skipped_without_error() {
        let store = store_with(&[("chat", 9, "alice")]).await;
        let at = FakeAtHead {
            height: 50,
            ..Default::default()
        };

        tick(&at, 50, &store).await.unwrap();

        // Record untouched — still all-null.
        let record = store.record(&SubKey::new(9, "alice")).unwrap();
        assert!(record.current.is_none());
        // And no staker lookups were issued for the dead pool.
        assert_eq!(*at.position_fetches.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn one_account_failure_does_not_abort_others() {
        let store = store_with(&[("chat", 1, "broken"), ("chat", 1, "alice")]).await;
        let mut at = FakeAtHead {
            height: 10,
            failing_accounts: vec!["broken".into()],
            ..Default::default()
        };
        at.pools.insert(1, pool(1, "someone-else", 0, ONE));
        at.positions.insert(
            (1, "alice".into()),
            StakerPosition {
                shares: 4,
                reward_debt: 0,
            },
        );

        tick(&at, 10, &store).await.unwrap();

        assert!(store.record(&SubKey::new(1, "broken")).unwrap().current.is_none());
        let alice = store.record(&SubKey::new(1, "alice")).unwrap();
        assert_eq!(alice.current.unwrap().delegator_claimable, 4);
    }

    #[tokio::test]
    async fn anomalous_negative_reward_skips_the_account() {
        let store = store_with(&[("chat", 1, "alice")]).await;
        let mut at = FakeAtHead {
            height: 10,
            ..Default::default()
        };
        at.pools.insert(1, pool(1, "owner", 0, ONE));
        // Debt exceeds entitlement — must be surfaced, not stored as zero.
        at.positions.insert(
            (1, "alice".into()),
            StakerPosition {
                shares: 1,
                reward_debt: 2,
            },
        );

        tick(&at, 10, &store).await.unwrap();

        assert!(store.record(&SubKey::new(1, "alice")).unwrap().current.is_none());
    }

    #[tokio::test]
    async fn tick_refreshes_the_pool_cache() {
        let store = store_with(&[("chat", 1, "alice")]).await;
        let mut at = FakeAtHead {
            height: 10,
            ..Default::default()
        };
        at.pools.insert(1, pool(1, "owner", 0, 3 * ONE));

        tick(&at, 10, &store).await.unwrap();

        let cached = &store.export().pools[&1];
        assert_eq!(cached.reward_acc, 3 * ONE);
        assert_eq!(cached.info["owner"], "owner");
    }

    #[tokio::test]
    async fn rerunning_the_same_head_is_idempotent_for_current() {
        let store = store_with(&[("chat", 1, "alice")]).await;
        let mut at = FakeAtHead {
            height: 10,
            ..Default::default()
        };
        at.pools.insert(1, pool(1, "owner", 0, 2 * ONE));
        at.positions.insert(
            (1, "alice".into()),
            StakerPosition {
                shares: 8,
                reward_debt: 1,
            },
        );

        tick(&at, 10, &store).await.unwrap();
        let first = store.record(&SubKey::new(1, "alice")).unwrap();
        tick(&at, 10, &store).await.unwrap();
        let second = store.record(&SubKey::new(1, "alice")).unwrap();

        let a = first.current.unwrap();
        let b = second.current.unwrap();
        assert_eq!(a.height, b.height);
        assert_eq!(a.owner_claimable, b.owner_claimable);
        assert_eq!(a.delegator_claimable, b.delegator_claimable);
        // The baseline from the first observation is untouched.
        assert_eq!(
            second.previous_point.unwrap().delegator_claimable,
            a.delegator_claimable
        );
    }
}
