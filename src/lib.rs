//! Daily-usage quota gating and usage accounting for a two-level account
//! hierarchy: an owning account holds a shared daily pool, sub-accounts it
//! sponsors draw personal caps from that pool, and every metered action is
//! admitted against both before being recorded in an append-only ledger.
//!
//! The engine decides; it never performs the metered action and never
//! commits usage on its own. Callers [`admit`](admission::QuotaEngine::admit)
//! a request, do the work, then [`commit_usage`](admission::QuotaEngine::commit_usage).
//! A fixed 15-minute grace window admits the later steps of a workflow whose
//! first step already paid for the same resource.

pub mod actor;
pub mod admission;
pub mod config;
mod error;
pub mod event;
pub mod grace;
pub mod ledger;
pub mod observability;
pub mod pool;
pub mod registry;
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
pub mod window;

pub use actor::{Account, AccountTier, Actor, SubAccount};
pub use admission::{
    AdmissionDecision, AdmissionRequest, Decision, DenyReason, QuotaEngine, UsageSnapshot,
    UsageSummary,
};
pub use config::{EngineConfig, SponsorshipConfig};
pub use error::{QuotaError, Result};
pub use event::{UsageEvent, normalize_resource_key, reason};
pub use grace::GRACE_WINDOW;
pub use ledger::{MemoryLedger, UsageLedger};
pub use observability::EngineMetricsSnapshot;
pub use pool::{ClampedLimit, PoolHeadroom, clamp_personal_limit, remaining_pool};
pub use registry::{MemoryRegistry, QuotaRegistry};
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
pub use window::{Clock, SystemClock, Window, utc_day_window, utc_month_window, utc_week_window};
