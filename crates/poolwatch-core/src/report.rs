//! Delta figures for the reporting collaborator.
//!
//! A report compares a record's `current` snapshot against its
//! `previous_point` baseline. Deltas are signed: claimables legitimately
//! shrink when rewards are withdrawn between rollovers. After the reporting
//! pass the scheduler calls
//! [`SubscriptionStore::rollover_baselines`](crate::store::SubscriptionStore::rollover_baselines)
//! to start the next interval.

use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::types::{Snapshot, SubKey, SubscriptionRecord};

/// Signed claimable movement since the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub owner: i128,
    pub delegator: i128,
}

/// Delta between `current` and `previous_point` for one record.
///
/// `Ok(None)` while the record has never been observed. Figures that do not
/// fit the signed width are surfaced as anomalies rather than wrapped.
pub fn record_delta(
    key: &SubKey,
    record: &SubscriptionRecord,
) -> Result<Option<Delta>, WatchError> {
    let Some(current) = &record.current else {
        return Ok(None);
    };
    let baseline = record.previous_point.as_ref().ok_or_else(|| {
        WatchError::Other(format!("record {key} has a current snapshot but no baseline"))
    })?;

    Ok(Some(Delta {
        owner: signed_diff(key, current.owner_claimable, baseline.owner_claimable)?,
        delegator: signed_diff(
            key,
            current.delegator_claimable,
            baseline.delegator_claimable,
        )?,
    }))
}

fn signed_diff(key: &SubKey, current: u128, baseline: u128) -> Result<i128, WatchError> {
    let to_signed = |v: u128| {
        i128::try_from(v).map_err(|_| WatchError::AnomalousNegativeReward {
            pid: key.pid,
            account: key.account.clone(),
            computed: v.to_string(),
        })
    };
    Ok(to_signed(current)? - to_signed(baseline)?)
}

/// Render the `previous → delta → current` report block the notification
/// collaborator sends for one subscription. `None` while unobserved.
pub fn format_report(key: &SubKey, record: &SubscriptionRecord) -> Result<Option<String>, WatchError> {
    let Some(delta) = record_delta(key, record)? else {
        return Ok(None);
    };
    // Both snapshots exist whenever a delta does.
    let current = record.current.as_ref().expect("checked by record_delta");
    let baseline = record.previous_point.as_ref().expect("checked by record_delta");

    Ok(Some(format!(
        "{account}\n\
         @Pool #{pid} from {since} to now\n\
         Owner claimable:     {prev_owner} -> {delta_owner:+} -> {cur_owner}\n\
         Delegator claimable: {prev_delegator} -> {delta_delegator:+} -> {cur_delegator}",
        account = key.account,
        pid = key.pid,
        since = format_ts(baseline),
        prev_owner = baseline.owner_claimable,
        delta_owner = delta.owner,
        cur_owner = current.owner_claimable,
        prev_delegator = baseline.delegator_claimable,
        delta_delegator = delta.delegator,
        cur_delegator = current.delegator_claimable,
    )))
}

fn format_ts(snapshot: &Snapshot) -> String {
    chrono::DateTime::from_timestamp_millis(snapshot.updated_at)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("#{}", snapshot.height))
}
