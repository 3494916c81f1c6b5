//! Shared types for the watcher pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─── Head ─────────────────────────────────────────────────────────────────────

/// A finalized point on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    /// Finalized block hash (`0x…`).
    pub hash: String,
    /// Block height at that hash.
    pub height: u64,
    /// Unix timestamp (ms) of when this head was observed.
    pub updated_at: i64,
}

// ─── SubKey ───────────────────────────────────────────────────────────────────

/// Composite subscription identifier — one watched (pool, account) pair.
///
/// Serialized as `"{pid}_{account}"`; unique within the global subscription
/// map regardless of how many chats watch it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubKey {
    pub pid: u64,
    pub account: String,
}

impl SubKey {
    pub fn new(pid: u64, account: impl Into<String>) -> Self {
        Self {
            pid,
            account: account.into(),
        }
    }
}

impl fmt::Display for SubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.pid, self.account)
    }
}

impl FromStr for SubKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pid, account) = s
            .split_once('_')
            .ok_or_else(|| format!("malformed subscription key: {s}"))?;
        let pid: u64 = pid
            .parse()
            .map_err(|_| format!("malformed pool id in key: {s}"))?;
        if account.is_empty() {
            return Err(format!("empty account in key: {s}"));
        }
        Ok(Self::new(pid, account))
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// A point-in-time observation of one subscription's claimable rewards.
///
/// Immutable once created — the same snapshot value may be shared by the
/// `current`, `last`, and `previous_point` slots of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Height of the finalized head this snapshot was taken at.
    pub height: u64,
    /// Unix timestamp (ms) of when the snapshot was computed.
    pub updated_at: i64,
    /// What the pool owner can claim (0 unless the account owns the pool).
    pub owner_claimable: u128,
    /// What the account can claim as a delegator.
    pub delegator_claimable: u128,
}

// ─── SubscriptionRecord ───────────────────────────────────────────────────────

/// Snapshot history for one subscription key.
///
/// `previous_point` is set exactly once, at the first snapshot, and
/// thereafter only advanced by an explicit rollover. `last` always holds the
/// record's prior `current` value (one-tick lag) and is purely informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub current: Option<Snapshot>,
    pub last: Option<Snapshot>,
    pub previous_point: Option<Snapshot>,
}

impl SubscriptionRecord {
    /// Fold a freshly computed snapshot into the record.
    ///
    /// Bootstrap case: the first-ever observation becomes its own baseline,
    /// so the first reported delta is necessarily zero.
    pub fn observe(&mut self, snapshot: Snapshot) {
        if self.previous_point.is_none() {
            self.previous_point = Some(snapshot.clone());
        }
        self.last = self.current.take();
        self.current = Some(snapshot);
    }

    /// Establish a new baseline for the next reporting interval.
    ///
    /// No-op while the record has never been observed.
    pub fn rollover(&mut self) {
        if self.current.is_some() {
            self.previous_point = self.current.clone();
        }
    }
}

// ─── PoolEntry ────────────────────────────────────────────────────────────────

/// Cached on-chain state for one pool, overwritten wholesale on every tick
/// that touches the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub pid: u64,
    /// Opaque decoded pool state, kept for observability.
    pub info: serde_json::Value,
    /// Fixed-point reward accumulator (2^64 scale).
    pub reward_acc: u128,
    /// Unix timestamp (ms) of the last refresh.
    pub updated_at: i64,
}

/// Current time as a unix millisecond timestamp.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
