use serde::{Deserialize, Serialize};

use crate::actor::AccountTier;
use crate::error::{QuotaError, Result};

/// How many sub-accounts an account may sponsor, by subscription tier.
/// `0` means no cap for that tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipConfig {
    #[serde(default = "default_free_allowance")]
    pub free: u64,
    #[serde(default = "default_paid_allowance")]
    pub paid: u64,
}

fn default_free_allowance() -> u64 {
    1
}

fn default_paid_allowance() -> u64 {
    10
}

impl Default for SponsorshipConfig {
    fn default() -> Self {
        Self {
            free: default_free_allowance(),
            paid: default_paid_allowance(),
        }
    }
}

impl SponsorshipConfig {
    pub fn allowance(&self, tier: AccountTier) -> u64 {
        match tier {
            AccountTier::Free => self.free,
            AccountTier::Paid => self.paid,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub sponsorship: SponsorshipConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| QuotaError::Configuration {
            message: format!("invalid engine config: {err}"),
        })
    }
}
