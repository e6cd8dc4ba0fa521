use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Well-known provenance tags. `reason_tag` itself stays free-form so the
/// host application can add its own.
pub mod reason {
    /// The caller performed the metered lookup directly.
    pub const EXPLICIT: &str = "explicit";
    /// Backfilled from a later workflow step that implies a lookup happened.
    pub const DERIVED: &str = "derived";
}

/// One immutable record of a metered action having occurred. Appended once,
/// never mutated. `billed_to_account_id` is `None` only on legacy records
/// written before pool billing existed; those count as self-billed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billed_to_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
    pub reason_tag: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Canonical form of a resource key: uppercased, all whitespace removed.
/// Returns `None` when nothing remains. Grace matching and same-day dedup
/// both compare this exact form.
pub fn normalize_resource_key(raw: &str) -> Option<String> {
    let key: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_uppercases_and_strips_whitespace() {
        assert_eq!(normalize_resource_key("ab12 cde"), Some("AB12CDE".into()));
        assert_eq!(normalize_resource_key("  ab12cde "), Some("AB12CDE".into()));
        assert_eq!(normalize_resource_key("AB12CDE"), Some("AB12CDE".into()));
    }

    #[test]
    fn blank_keys_normalize_to_none() {
        assert_eq!(normalize_resource_key(""), None);
        assert_eq!(normalize_resource_key("   \t"), None);
    }
}
