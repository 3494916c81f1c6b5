//! Fixed-point claimable-reward arithmetic.
//!
//! Pool reward accumulators are scaled by 2^64. A delegator's claimable
//! amount is `round(shares × reward_acc / 2^64) − reward_debt`. The multiply
//! runs before the divide, in 256-bit integers, so no precision is lost to
//! the fixed-point division — the same figure the runtime pays out.

use primitive_types::U256;

use crate::error::WatchError;

/// Number of fractional bits in the reward accumulator.
pub const ACC_FRACTION_BITS: u32 = 64;

/// Claimable delegator reward for a staking position.
///
/// A computation that lands below the stored debt means the accumulator and
/// debt disagree — surfaced as [`WatchError::AnomalousNegativeReward`], never
/// silently clamped to zero.
pub fn delegator_claimable(
    pid: u64,
    account: &str,
    shares: u128,
    reward_acc: u128,
    reward_debt: u128,
) -> Result<u128, WatchError> {
    let product = U256::from(shares) * U256::from(reward_acc);
    // Round half-up before dropping the fractional bits.
    let half = U256::one() << (ACC_FRACTION_BITS - 1);
    let entitled = (product + half) >> ACC_FRACTION_BITS;

    let debt = U256::from(reward_debt);
    if entitled < debt {
        let signed = format!("-{}", debt - entitled);
        return Err(WatchError::AnomalousNegativeReward {
            pid,
            account: account.to_string(),
            computed: signed,
        });
    }

    let claimable = entitled - debt;
    u128::try_from(claimable).map_err(|_| WatchError::AnomalousNegativeReward {
        pid,
        account: account.to_string(),
        computed: claimable.to_string(),
    })
}
