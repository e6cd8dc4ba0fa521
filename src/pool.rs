//! Pool arithmetic. Pure functions over a registry snapshot; nothing here
//! caches a running total or touches a store.

use serde::{Deserialize, Serialize};

use crate::actor::{Account, SubAccount};

/// Unallocated capacity left in an account's pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolHeadroom {
    /// `pool_limit == 0`: nothing downstream ever clamps.
    Unlimited,
    Capped(u64),
}

impl PoolHeadroom {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, PoolHeadroom::Unlimited)
    }

    pub fn capped(&self) -> Option<u64> {
        match self {
            PoolHeadroom::Unlimited => None,
            PoolHeadroom::Capped(remaining) => Some(*remaining),
        }
    }
}

/// Outcome of clamping a requested personal limit. A `true` `was_clamped` is
/// a warning for the caller to surface, never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampedLimit {
    pub value: u64,
    pub was_clamped: bool,
}

/// Pool capacity minus the personal limits of the currently active
/// sub-accounts, floored at zero. `exclude` keeps a sub-account's own prior
/// allocation from counting against its own re-evaluation.
pub fn remaining_pool(
    account: &Account,
    sub_accounts: &[SubAccount],
    exclude: Option<&str>,
) -> PoolHeadroom {
    let Some(pool_limit) = account.effective_pool_limit() else {
        return PoolHeadroom::Unlimited;
    };
    let allocated: u64 = sub_accounts
        .iter()
        .filter(|sub| sub.active)
        .filter(|sub| exclude != Some(sub.id.as_str()))
        .map(|sub| sub.personal_limit)
        .sum();
    PoolHeadroom::Capped(pool_limit.saturating_sub(allocated))
}

/// Floor the request at zero, then cap it at the remaining pool headroom.
pub fn clamp_personal_limit(
    account: &Account,
    sub_accounts: &[SubAccount],
    requested: i64,
    exclude: Option<&str>,
) -> ClampedLimit {
    let floored = requested.max(0) as u64;
    let value = match remaining_pool(account, sub_accounts, exclude) {
        PoolHeadroom::Unlimited => floored,
        PoolHeadroom::Capped(remaining) => floored.min(remaining),
    };
    ClampedLimit {
        value,
        was_clamped: value != floored,
    }
}
