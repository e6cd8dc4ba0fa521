use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::actor::{Account, SubAccount};
use crate::error::Result;

/// Read access to current account limits and sub-account rosters. The engine
/// re-reads this on every decision; administrative writes happen outside the
/// engine (or through a store's own upsert API).
#[async_trait]
pub trait QuotaRegistry: Send + Sync {
    async fn account(&self, account_id: &str) -> Result<Option<Account>>;

    /// Active sub-accounts sponsored by `owner_account_id`.
    async fn active_sub_accounts(&self, owner_account_id: &str) -> Result<Vec<SubAccount>>;

    /// All sub-accounts under `owner_account_id`, active or not. Sponsorship
    /// allowance counts deactivated ones too.
    async fn sub_account_count(&self, owner_account_id: &str) -> Result<u64>;
}

#[derive(Debug, Default)]
struct RegistryState {
    accounts: HashMap<String, Account>,
    sub_accounts: HashMap<String, SubAccount>,
}

/// In-process registry for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: RwLock<RegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_account(&self, account: Account) {
        let mut state = self.state.write().await;
        state.accounts.insert(account.id.clone(), account);
    }

    pub async fn upsert_sub_account(&self, sub_account: SubAccount) {
        let mut state = self.state.write().await;
        state
            .sub_accounts
            .insert(sub_account.id.clone(), sub_account);
    }

    pub async fn remove_sub_account(&self, sub_account_id: &str) {
        let mut state = self.state.write().await;
        state.sub_accounts.remove(sub_account_id);
    }
}

#[async_trait]
impl QuotaRegistry for MemoryRegistry {
    async fn account(&self, account_id: &str) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(account_id).cloned())
    }

    async fn active_sub_accounts(&self, owner_account_id: &str) -> Result<Vec<SubAccount>> {
        let state = self.state.read().await;
        Ok(state
            .sub_accounts
            .values()
            .filter(|sub| sub.owner_account_id == owner_account_id && sub.active)
            .cloned()
            .collect())
    }

    async fn sub_account_count(&self, owner_account_id: &str) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .sub_accounts
            .values()
            .filter(|sub| sub.owner_account_id == owner_account_id)
            .count() as u64)
    }
}
