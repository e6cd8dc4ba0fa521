//! Recency bypass for split workflows. A lookup followed moments later by a
//! step that references the same resource is one paid-for operation, so the
//! second step is admitted even when the lookup spent the last unit of quota.

use time::{Duration, OffsetDateTime};

use crate::error::Result;
use crate::ledger::UsageLedger;
use crate::window::Window;

/// Fixed recency bound. Not configurable per account.
pub const GRACE_WINDOW: Duration = Duration::minutes(15);

/// True when `actor_id` already recorded an event for exactly this
/// normalized key within `[now - GRACE_WINDOW, now)`. The caller decides
/// what to do with the answer; nothing is written here.
pub async fn recent_event_for_key(
    ledger: &dyn UsageLedger,
    actor_id: &str,
    resource_key: &str,
    now: OffsetDateTime,
) -> Result<bool> {
    let window = Window {
        start: now - GRACE_WINDOW,
        end: now,
    };
    let hits = ledger
        .count_by_actor_for_key(actor_id, resource_key, window)
        .await?;
    Ok(hits > 0)
}
