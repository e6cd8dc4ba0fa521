use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actor::{Account, Actor, SubAccount};
use crate::config::EngineConfig;
use crate::error::{QuotaError, Result};
use crate::event::{UsageEvent, normalize_resource_key, reason};
use crate::grace;
use crate::ledger::UsageLedger;
use crate::observability::{EngineMetrics, EngineMetricsSnapshot};
use crate::pool::{self, ClampedLimit, PoolHeadroom};
use crate::registry::QuotaRegistry;
use crate::window::{Clock, SystemClock, Window, utc_day_window, utc_month_window, utc_week_window};

/// One admission question: may this actor perform the metered action on
/// this resource right now?
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    ActorInactive,
    SubLimit,
    PoolLimit,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DenyReason::ActorInactive => "ACTOR_INACTIVE",
            DenyReason::SubLimit => "SUB_LIMIT",
            DenyReason::PoolLimit => "POOL_LIMIT",
        };
        f.write_str(tag)
    }
}

/// Today's usage against the applicable limits, for rendering "N of M used".
/// Limits follow the data model's convention: `0` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub pool_used: u64,
    pub pool_limit: u64,
    pub actor_used: u64,
    pub actor_limit: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub snapshot: UsageSnapshot,
    /// True when an exhausted limit was bypassed as the continuation of a
    /// recently billed workflow for the same resource.
    pub grace: bool,
}

impl AdmissionDecision {
    fn allow(snapshot: UsageSnapshot, grace: bool) -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
            snapshot,
            grace,
        }
    }

    fn deny(reason: DenyReason, snapshot: UsageSnapshot) -> Self {
        Self {
            decision: Decision::Deny,
            reason: Some(reason),
            snapshot,
            grace: false,
        }
    }

    pub fn allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    /// Fold the decision into the error channel for `?`-style call sites.
    pub fn into_result(self) -> Result<UsageSnapshot> {
        match (self.decision, self.reason) {
            (Decision::Allow, _) => Ok(self.snapshot),
            (Decision::Deny, Some(DenyReason::ActorInactive)) => Err(QuotaError::ActorInactive),
            (Decision::Deny, Some(scope)) => Err(QuotaError::QuotaExceeded { scope }),
            (Decision::Deny, None) => Err(QuotaError::config("deny decision without a reason")),
        }
    }
}

/// Per-actor usage counts over the standard overview windows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub today: u64,
    pub week: u64,
    pub month: u64,
}

/// The admission controller. Decides, and separately records, metered
/// consumption. Holds no state of its own beyond counters: every decision
/// re-reads the ledger and registry.
pub struct QuotaEngine {
    ledger: Arc<dyn UsageLedger>,
    registry: Arc<dyn QuotaRegistry>,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    metrics: EngineMetrics,
}

impl QuotaEngine {
    pub fn new(ledger: Arc<dyn UsageLedger>, registry: Arc<dyn QuotaRegistry>) -> Self {
        Self::with_clock(ledger, registry, Box::new(SystemClock))
    }

    pub fn with_clock(
        ledger: Arc<dyn UsageLedger>,
        registry: Arc<dyn QuotaRegistry>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            registry,
            config: EngineConfig::default(),
            clock,
            metrics: EngineMetrics::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Decide whether the metered action may proceed. Read-only: committing
    /// usage is the caller's separate, explicit step after the action
    /// actually happens.
    ///
    /// Storage faults during the check admit the request and log a warning;
    /// faults during [`commit_usage`](Self::commit_usage) propagate instead.
    pub async fn admit(&self, request: &AdmissionRequest) -> Result<AdmissionDecision> {
        self.metrics.record_request();
        let now = self.clock.now_utc();

        // An inactive actor is never admitted, recent activity or not.
        if let Actor::SubAccount(sub) = &request.actor {
            if !sub.active {
                self.metrics.record_denied_inactive();
                debug!(actor = %sub.id, "admission denied: actor inactive");
                let snapshot = UsageSnapshot {
                    actor_limit: sub.personal_limit,
                    ..UsageSnapshot::default()
                };
                return Ok(AdmissionDecision::deny(DenyReason::ActorInactive, snapshot));
            }
        }

        let today = utc_day_window(now);
        let (snapshot, candidate) = match self.evaluate_limits(&request.actor, today).await {
            Ok(outcome) => outcome,
            Err(QuotaError::Store { message }) => {
                self.metrics.record_store_fail_open();
                warn!(error = %message, "quota check unavailable, admitting without enforcement");
                return Ok(AdmissionDecision::allow(UsageSnapshot::default(), false));
            }
            Err(err) => return Err(err),
        };

        let Some(reason) = candidate else {
            self.metrics.record_allowed();
            return Ok(AdmissionDecision::allow(snapshot, false));
        };

        // Candidate denial: a recent event for the same key means this
        // request finishes a workflow that already paid.
        if let Some(key) = request
            .resource_key
            .as_deref()
            .and_then(normalize_resource_key)
        {
            match grace::recent_event_for_key(self.ledger.as_ref(), request.actor.id(), &key, now)
                .await
            {
                Ok(true) => {
                    self.metrics.record_allowed();
                    self.metrics.record_grace_bypass();
                    debug!(actor = %request.actor.id(), key = %key, %reason, "limit reached, admitting recent-workflow continuation");
                    return Ok(AdmissionDecision::allow(snapshot, true));
                }
                Ok(false) => {}
                Err(QuotaError::Store { message }) => {
                    self.metrics.record_store_fail_open();
                    warn!(error = %message, "grace probe unavailable, admitting without enforcement");
                    return Ok(AdmissionDecision::allow(snapshot, false));
                }
                Err(err) => return Err(err),
            }
        }

        match reason {
            DenyReason::SubLimit => self.metrics.record_denied_sub_limit(),
            DenyReason::PoolLimit => self.metrics.record_denied_pool_limit(),
            DenyReason::ActorInactive => self.metrics.record_denied_inactive(),
        }
        debug!(actor = %request.actor.id(), %reason, "admission denied");
        Ok(AdmissionDecision::deny(reason, snapshot))
    }

    async fn evaluate_limits(
        &self,
        actor: &Actor,
        today: Window,
    ) -> Result<(UsageSnapshot, Option<DenyReason>)> {
        let actor_used = self.ledger.count_by_actor(actor.id(), today).await?;
        let pool_used = self
            .ledger
            .count_by_account_pool(actor.billing_account_id(), today)
            .await?;

        let (pool_limit, actor_limit) = match actor {
            Actor::Account(account) => (account.pool_limit, account.pool_limit),
            Actor::SubAccount(sub) => {
                // An owner missing from the registry has nothing to enforce
                // at pool level.
                let pool_limit = self
                    .registry
                    .account(&sub.owner_account_id)
                    .await?
                    .map(|account| account.pool_limit)
                    .unwrap_or(0);
                (pool_limit, sub.personal_limit)
            }
        };

        let snapshot = UsageSnapshot {
            pool_used,
            pool_limit,
            actor_used,
            actor_limit,
        };

        if let Actor::SubAccount(sub) = actor {
            if let Some(limit) = sub.effective_personal_limit() {
                if actor_used >= limit {
                    return Ok((snapshot, Some(DenyReason::SubLimit)));
                }
            }
        }

        if pool_limit > 0 && pool_used >= pool_limit {
            return Ok((snapshot, Some(DenyReason::PoolLimit)));
        }

        Ok((snapshot, None))
    }

    /// Record one unit of consumption. Called by the caller only after it
    /// both received an allow and performed the action. Storage faults
    /// propagate here: a silently dropped commit would under-count usage.
    pub async fn commit_usage(
        &self,
        actor_id: &str,
        billed_to_account_id: &str,
        resource_key: Option<&str>,
        reason_tag: &str,
    ) -> Result<UsageEvent> {
        if billed_to_account_id.trim().is_empty() {
            return Err(QuotaError::config("a commit needs a billing account"));
        }
        let event = UsageEvent {
            actor_id: actor_id.to_string(),
            billed_to_account_id: Some(billed_to_account_id.to_string()),
            resource_key: resource_key.and_then(normalize_resource_key),
            reason_tag: reason_tag.to_string(),
            created_at: self.clock.now_utc(),
        };
        self.ledger.append(event).await
    }

    /// Record consumption inferred from a later workflow step, unless the
    /// actor already has an event for this key today. Returns `None` when
    /// today's ledger already covers the key.
    pub async fn commit_derived_usage(
        &self,
        actor_id: &str,
        billed_to_account_id: &str,
        resource_key: &str,
    ) -> Result<Option<UsageEvent>> {
        let Some(key) = normalize_resource_key(resource_key) else {
            return Err(QuotaError::config("a derived commit needs a resource key"));
        };
        let now = self.clock.now_utc();
        let today = utc_day_window(now);
        if self
            .ledger
            .count_by_actor_for_key(actor_id, &key, today)
            .await?
            > 0
        {
            return Ok(None);
        }
        let event = UsageEvent {
            actor_id: actor_id.to_string(),
            billed_to_account_id: Some(billed_to_account_id.to_string()),
            resource_key: Some(key),
            reason_tag: reason::DERIVED.to_string(),
            created_at: now,
        };
        self.ledger.append(event).await.map(Some)
    }

    /// Unallocated headroom in `account_id`'s pool. Admin-time operation:
    /// unknown accounts and store faults fail closed.
    pub async fn remaining_pool(
        &self,
        account_id: &str,
        exclude_sub_account_id: Option<&str>,
    ) -> Result<PoolHeadroom> {
        let (account, roster) = self.pool_snapshot(account_id).await?;
        Ok(pool::remaining_pool(
            &account,
            &roster,
            exclude_sub_account_id,
        ))
    }

    /// Clamp a requested personal limit to what the pool has left. Pass the
    /// sub-account's own id as `exclude_sub_account_id` when re-evaluating
    /// an existing cap, so its prior allocation is not held against it.
    pub async fn clamp_sub_account_limit(
        &self,
        account_id: &str,
        requested_limit: i64,
        exclude_sub_account_id: Option<&str>,
    ) -> Result<ClampedLimit> {
        let (account, roster) = self.pool_snapshot(account_id).await?;
        Ok(pool::clamp_personal_limit(
            &account,
            &roster,
            requested_limit,
            exclude_sub_account_id,
        ))
    }

    async fn pool_snapshot(&self, account_id: &str) -> Result<(Account, Vec<SubAccount>)> {
        let account = self
            .registry
            .account(account_id)
            .await?
            .ok_or_else(|| QuotaError::config(format!("unknown account: {account_id}")))?;
        let roster = self.registry.active_sub_accounts(account_id).await?;
        Ok((account, roster))
    }

    /// May `account_id` sponsor another sub-account under its tier
    /// allowance? Counts deactivated sub-accounts too.
    pub async fn check_sponsorship(&self, account_id: &str) -> Result<()> {
        let account = self
            .registry
            .account(account_id)
            .await?
            .ok_or_else(|| QuotaError::config(format!("unknown account: {account_id}")))?;
        let limit = self.config.sponsorship.allowance(account.tier);
        if limit == 0 {
            return Ok(());
        }
        let count = self.registry.sub_account_count(account_id).await?;
        if count >= limit {
            return Err(QuotaError::SponsorLimitReached { limit });
        }
        Ok(())
    }

    /// Usage counts over the standard overview windows, all UTC.
    pub async fn usage_summary(&self, actor_id: &str) -> Result<UsageSummary> {
        let now = self.clock.now_utc();
        let today = self
            .ledger
            .count_by_actor(actor_id, utc_day_window(now))
            .await?;
        let week = self
            .ledger
            .count_by_actor(actor_id, utc_week_window(now))
            .await?;
        let month = self
            .ledger
            .count_by_actor(actor_id, utc_month_window(now))
            .await?;
        Ok(UsageSummary { today, week, month })
    }
}
