use serde::{Deserialize, Serialize};

/// Subscription tier of an owning account. Controls how many sub-accounts
/// the account may sponsor (see [`crate::config::SponsorshipConfig`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTier {
    #[default]
    Free,
    Paid,
}

/// An owning account. `pool_limit` is the shared daily allowance for the
/// account and every sub-account it sponsors; `0` means unlimited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub pool_limit: u64,
    #[serde(default)]
    pub tier: AccountTier,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pool_limit: 0,
            tier: AccountTier::Free,
        }
    }

    pub fn effective_pool_limit(&self) -> Option<u64> {
        (self.pool_limit > 0).then_some(self.pool_limit)
    }
}

/// A sponsored actor under one account. Acts on its own behalf; consumption
/// is billed to the owner. `personal_limit` of `0` means no personal cap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccount {
    pub id: String,
    pub owner_account_id: String,
    #[serde(default)]
    pub personal_limit: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SubAccount {
    pub fn new(id: impl Into<String>, owner_account_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_account_id: owner_account_id.into(),
            personal_limit: 0,
            active: true,
        }
    }

    pub fn effective_personal_limit(&self) -> Option<u64> {
        (self.personal_limit > 0).then_some(self.personal_limit)
    }
}

/// The two roles a caller can act as. Closed variant: every decision in the
/// engine pattern-matches on this rather than probing optional fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Actor {
    #[serde(rename = "account")]
    Account(Account),
    #[serde(rename = "subaccount")]
    SubAccount(SubAccount),
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::Account(account) => &account.id,
            Actor::SubAccount(sub) => &sub.id,
        }
    }

    /// The account whose pool pays for this actor's consumption: the owner
    /// for a sub-account, the account itself otherwise.
    pub fn billing_account_id(&self) -> &str {
        match self {
            Actor::Account(account) => &account.id,
            Actor::SubAccount(sub) => &sub.owner_account_id,
        }
    }
}
