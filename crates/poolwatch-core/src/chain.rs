//! Chain client contract — the capabilities the watcher needs from a node.
//!
//! The concrete RPC transport lives outside this crate; the engine and the
//! head tracker only ever talk to these traits. Absent on-chain state (a
//! dissolved pool, an account with no stake) is `Ok(None)`, never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Decoded on-chain state of one staking pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub pid: u64,
    /// Account that owns the pool.
    pub owner: String,
    /// Rewards the owner can currently claim.
    pub owner_reward: u128,
    /// Fixed-point reward accumulator (2^64 scale).
    pub reward_acc: u128,
    /// Full decoded pool state, kept opaque for the pool cache.
    pub raw: serde_json::Value,
}

/// One account's staking position in one pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StakerPosition {
    pub shares: u128,
    pub reward_debt: u128,
}

/// A capability for querying chain state as of a specific finalized block.
#[async_trait]
pub trait AtHead: Send + Sync {
    /// Block height of the head this handle is bound to.
    async fn height(&self) -> Result<u64, WatchError>;

    /// Pool state, or `None` if the pool no longer exists.
    async fn pool(&self, pid: u64) -> Result<Option<PoolState>, WatchError>;

    /// The account's position in the pool, or `None` if it has no stake.
    async fn staker_position(
        &self,
        pid: u64,
        account: &str,
    ) -> Result<Option<StakerPosition>, WatchError>;
}

/// Client for the tracked chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    type At: AtHead;

    /// Hash of the most recent finalized head.
    async fn finalized_head(&self) -> Result<String, WatchError>;

    /// Open a point-in-time view bound to a finalized head hash.
    async fn at(&self, hash: &str) -> Result<Self::At, WatchError>;

    /// Transaction count of an account. Used by the subscribe-validation
    /// collaborator (nonce 0 = the account has never transacted).
    async fn account_nonce(&self, account: &str) -> Result<u64, WatchError>;
}

/// Whether an account has ever transacted on chain.
///
/// Subscribe commands run this before accepting an account string, so typos
/// are rejected instead of silently producing all-zero snapshots forever.
pub async fn account_exists<C: ChainClient>(client: &C, account: &str) -> Result<bool, WatchError> {
    Ok(client.account_nonce(account).await? > 0)
}
