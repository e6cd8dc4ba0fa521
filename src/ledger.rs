use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{QuotaError, Result};
use crate::event::UsageEvent;
use crate::window::Window;

/// Append-only store of consumption events plus the windowed counts the
/// admission check needs. Implementations must not enforce limits here:
/// `append` is a storage primitive, not a gate.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Events performed by `actor_id` inside `window`.
    async fn count_by_actor(&self, actor_id: &str, window: Window) -> Result<u64>;

    /// Events charged to `account_id`'s pool inside `window`. Legacy events
    /// with no billing account count when the actor is the account itself.
    async fn count_by_account_pool(&self, account_id: &str, window: Window) -> Result<u64>;

    /// Events by `actor_id` for one exact normalized `resource_key` inside
    /// `window`. Drives both the grace recency probe and same-day dedup of
    /// derived commits.
    async fn count_by_actor_for_key(
        &self,
        actor_id: &str,
        resource_key: &str,
        window: Window,
    ) -> Result<u64>;

    /// Insert one immutable event and return it.
    async fn append(&self, event: UsageEvent) -> Result<UsageEvent>;
}

pub(crate) fn validate_event(event: &UsageEvent) -> Result<()> {
    if event.actor_id.trim().is_empty() {
        return Err(QuotaError::config("usage event is missing an actor id"));
    }
    Ok(())
}

/// In-process ledger for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    events: RwLock<Vec<UsageEvent>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, in insertion order.
    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl UsageLedger for MemoryLedger {
    async fn count_by_actor(&self, actor_id: &str, window: Window) -> Result<u64> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.actor_id == actor_id && window.contains(event.created_at))
            .count() as u64)
    }

    async fn count_by_account_pool(&self, account_id: &str, window: Window) -> Result<u64> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| window.contains(event.created_at))
            .filter(|event| match &event.billed_to_account_id {
                Some(billed_to) => billed_to == account_id,
                None => event.actor_id == account_id,
            })
            .count() as u64)
    }

    async fn count_by_actor_for_key(
        &self,
        actor_id: &str,
        resource_key: &str,
        window: Window,
    ) -> Result<u64> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| {
                event.actor_id == actor_id
                    && event.resource_key.as_deref() == Some(resource_key)
                    && window.contains(event.created_at)
            })
            .count() as u64)
    }

    async fn append(&self, event: UsageEvent) -> Result<UsageEvent> {
        validate_event(&event)?;
        self.events.write().await.push(event.clone());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::window::utc_day_window;

    fn event(actor: &str, billed_to: Option<&str>, key: Option<&str>) -> UsageEvent {
        UsageEvent {
            actor_id: actor.to_string(),
            billed_to_account_id: billed_to.map(str::to_string),
            resource_key: key.map(str::to_string),
            reason_tag: crate::event::reason::EXPLICIT.to_string(),
            created_at: datetime!(2025-03-14 12:00:00 UTC),
        }
    }

    #[tokio::test]
    async fn pool_count_includes_legacy_self_billed_events() {
        let ledger = MemoryLedger::new();
        let window = utc_day_window(datetime!(2025-03-14 13:00:00 UTC));

        // Legacy record: no billing account, actor is the account itself.
        ledger
            .append(event("acct-1", None, Some("K1")))
            .await
            .expect("append legacy");
        ledger
            .append(event("tech-1", Some("acct-1"), Some("K2")))
            .await
            .expect("append billed");
        // Legacy record from somebody else's actor is not acct-1's problem.
        ledger
            .append(event("tech-9", None, Some("K3")))
            .await
            .expect("append foreign");

        assert_eq!(
            ledger
                .count_by_account_pool("acct-1", window)
                .await
                .expect("count"),
            2
        );
    }

    #[tokio::test]
    async fn key_count_matches_exact_normalized_key_only() {
        let ledger = MemoryLedger::new();
        let window = utc_day_window(datetime!(2025-03-14 13:00:00 UTC));

        ledger
            .append(event("tech-1", Some("acct-1"), Some("AB12CDE")))
            .await
            .expect("append");

        assert_eq!(
            ledger
                .count_by_actor_for_key("tech-1", "AB12CDE", window)
                .await
                .expect("count"),
            1
        );
        // No prefix matching.
        assert_eq!(
            ledger
                .count_by_actor_for_key("tech-1", "AB12", window)
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn append_rejects_blank_actor_id() {
        let ledger = MemoryLedger::new();
        let err = ledger.append(event("  ", None, None)).await;
        assert!(matches!(err, Err(QuotaError::Configuration { .. })));
        assert!(ledger.events().await.is_empty());
    }
}
