//! Finalized-head tracking.
//!
//! The tracker is a two-state machine — `Idle` until the first head is seen,
//! `Tracking` afterwards — expressed as an `Option` over the last observed
//! hash. Each [`TickSource::next`] call is one poll cycle: sleep the poll
//! interval (raced against shutdown), query the finalized head, and compare
//! by value against the last observed hash. An unchanged head yields a
//! no-op tick; a changed head opens an at-head handle, shifts the stored
//! head pointers, and yields one snapshot action bound to that handle.
//!
//! Transient query failures surface as errors from `next()` and are retried
//! by the [`RetryDriver`]; a non-transient failure (a reported disconnect)
//! or an exhausted attempt budget is treated as process-fatal by
//! [`StandardHooks`], which signals shutdown — without a head the watcher
//! cannot make progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::chain::{AtHead, ChainClient};
use crate::config::WatchConfig;
use crate::engine;
use crate::error::WatchError;
use crate::retry::{ErrorDirective, RetryDriver, RetryHooks, TickAction, TickItem, TickSource};
use crate::store::SubscriptionStore;
use crate::types::{now_ms, Head};

/// Create the shutdown signal pair for a watcher run.
///
/// Send `true` to stop accepting new ticks; an in-flight tick is allowed to
/// finish.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

// ─── SnapshotTick ─────────────────────────────────────────────────────────────

/// The tick action emitted when a new finalized head is observed.
pub struct SnapshotTick<A> {
    at: A,
    height: u64,
    store: Arc<SubscriptionStore>,
}

#[async_trait]
impl<A: AtHead> TickAction for SnapshotTick<A> {
    async fn run(&mut self) -> Result<(), WatchError> {
        engine::tick(&self.at, self.height, &self.store).await?;
        info!(height = self.height, "processed finalized head");
        Ok(())
    }
}

// ─── HeadTracker ──────────────────────────────────────────────────────────────

/// Polls the chain for the finalized head and emits one tick per change.
pub struct HeadTracker<C: ChainClient> {
    client: Arc<C>,
    store: Arc<SubscriptionStore>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
    /// `None` = idle (no head observed yet); `Some` = tracking.
    last_hash: Option<String>,
    first_poll: bool,
}

impl<C: ChainClient> HeadTracker<C> {
    pub fn new(
        client: Arc<C>,
        store: Arc<SubscriptionStore>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            store,
            poll_interval,
            shutdown,
            last_hash: None,
            first_poll: true,
        }
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Scheduled suspension between polls, raced against the shutdown
    /// signal. Returns `true` if shutdown fired.
    async fn sleep_or_shutdown(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            changed = self.shutdown.changed() => {
                // A dropped sender also means the composition root is gone.
                if changed.is_err() {
                    return true;
                }
            }
        }
        self.shutting_down()
    }
}

#[async_trait]
impl<C: ChainClient + 'static> TickSource for HeadTracker<C> {
    type Action = SnapshotTick<C::At>;

    async fn next(&mut self) -> Result<Option<TickItem<Self::Action>>, WatchError> {
        if self.shutting_down() {
            return Ok(None);
        }
        if self.first_poll {
            self.first_poll = false;
        } else if self.sleep_or_shutdown().await {
            return Ok(None);
        }

        let hash = self.client.finalized_head().await?;
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            return Ok(Some(TickItem::Skip));
        }

        let at = self.client.at(&hash).await?;
        let height = at.height().await?;

        self.last_hash = Some(hash.clone());
        self.store.advance_head(Head {
            hash,
            height,
            updated_at: now_ms(),
        });

        Ok(Some(TickItem::Run(SnapshotTick {
            at,
            height,
            store: self.store.clone(),
        })))
    }
}

// ─── StandardHooks ────────────────────────────────────────────────────────────

/// Retry hooks for the head loop: retry transient failures; escalate
/// non-transient failures and exhausted budgets to process shutdown.
pub struct StandardHooks {
    shutdown: watch::Sender<bool>,
}

impl StandardHooks {
    pub fn new(shutdown: watch::Sender<bool>) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl RetryHooks for StandardHooks {
    async fn on_error(&mut self, err: &WatchError, attempt: u32) -> ErrorDirective {
        // Retrying a disconnect (or any non-transient failure) cannot
        // succeed; shut down now instead of burning the attempt budget.
        if !err.is_transient() {
            error!("non-transient tick failure, shutting down: {err}");
            let _ = self.shutdown.send(true);
            return ErrorDirective::Ignore;
        }
        warn!(attempt, "tick failed, retrying: {err}");
        ErrorDirective::Retry
    }

    async fn on_fatal(&mut self, err: WatchError) {
        error!("tick attempts exhausted, shutting down: {err}");
        let _ = self.shutdown.send(true);
    }
}

// ─── Composition ──────────────────────────────────────────────────────────────

/// Run the head-tracking loop until shutdown.
///
/// Wires the tracker, the retry driver, and the standard hooks together the
/// way the composition root is expected to.
pub async fn watch_heads<C: ChainClient + 'static>(
    client: Arc<C>,
    store: Arc<SubscriptionStore>,
    config: &WatchConfig,
    shutdown: watch::Sender<bool>,
) {
    let mut tracker = HeadTracker::new(
        client,
        store,
        Duration::from_millis(config.poll_interval_ms),
        shutdown.subscribe(),
    );
    let mut hooks = StandardHooks::new(shutdown);
    RetryDriver::new(config.max_attempts)
        .run(&mut tracker, &mut hooks)
        .await;
}

// ─── Tests ────────────────────────────────────────────────────────────────────
