//! Bounded-retry tick driver.
//!
//! The driver pulls tick items from a [`TickSource`] strictly one at a time —
//! the next item is requested only once the previous action's retry cycle has
//! fully resolved (success, ignored failure, or fatal escalation). Ordering
//! is therefore one-tick-at-a-time even when an action fans out internally.
//!
//! Error hooks return a directive instead of mutating shared flags: a
//! recoverable failure asks the hooks whether to retry the same action or
//! abandon it, and exhausting the attempt budget escalates through
//! [`RetryHooks::on_fatal`]. Fatal means "give up on this tick" — whether
//! that terminates the process is hook policy, not driver policy.

use async_trait::async_trait;

use crate::error::WatchError;

/// One unit of work produced by a tick source.
#[async_trait]
pub trait TickAction: Send {
    async fn run(&mut self) -> Result<(), WatchError>;
}

/// One item of the tick sequence.
pub enum TickItem<A> {
    /// A no-op tick (e.g. the head did not change this poll cycle).
    Skip,
    /// An action to execute under the retry policy.
    Run(A),
}

/// A lazy, unbounded sequence of tick items.
///
/// `Ok(None)` ends the run (shutdown, or an exhausted test sequence).
/// Failures from `next()` itself go through the same bounded-retry
/// accounting as action failures.
#[async_trait]
pub trait TickSource: Send {
    type Action: TickAction;

    async fn next(&mut self) -> Result<Option<TickItem<Self::Action>>, WatchError>;
}

/// What to do after a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDirective {
    /// Execute the same action again.
    Retry,
    /// Abandon this action — no further retries, no escalation.
    Ignore,
}

/// Observer for failures inside the driver loop.
#[async_trait]
pub trait RetryHooks: Send {
    /// Called on each recoverable failure with a 1-based attempt number.
    async fn on_error(&mut self, err: &WatchError, attempt: u32) -> ErrorDirective;

    /// Called once when an action (or a source pull) exhausts its attempt
    /// budget. The sequence continues with the next item afterwards.
    async fn on_fatal(&mut self, err: WatchError);
}

/// Drives a tick source, executing each action with bounded retry.
pub struct RetryDriver {
    max_attempts: u32,
}

impl RetryDriver {
    /// `max_attempts` is the number of failures tolerated per item before
    /// escalating; failure `max_attempts + 1` is fatal.
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Run until the source is exhausted.
    pub async fn run<S, H>(&self, source: &mut S, hooks: &mut H)
    where
        S: TickSource,
        H: RetryHooks,
    {
        loop {
            // The attempt counter resets at the start of every item.
            let mut attempt: u32 = 0;
            let item = loop {
                match source.next().await {
                    Ok(item) => break Some(item),
                    Err(err) => {
                        attempt += 1;
                        if attempt > self.max_attempts {
                            hooks.on_fatal(err).await;
                            attempt = 0;
                            continue;
                        }
                        match hooks.on_error(&err, attempt).await {
                            ErrorDirective::Retry => continue,
                            ErrorDirective::Ignore => break None,
                        }
                    }
                }
            };

            let mut action = match item {
                None => continue,          // pull abandoned, ask for the next item
                Some(None) => return,      // source exhausted
                Some(Some(TickItem::Skip)) => continue,
                Some(Some(TickItem::Run(action))) => action,
            };

            let mut attempt: u32 = 0;
            loop {
                match action.run().await {
                    Ok(()) => break,
                    Err(err) => {
                        attempt += 1;
                        if attempt > self.max_attempts {
                            hooks.on_fatal(err).await;
                            break;
                        }
                        match hooks.on_error(&err, attempt).await {
                            ErrorDirective::Retry => continue,
                            ErrorDirective::Ignore => break,
                        }
                    }
                }
            }
        }
    }
}
