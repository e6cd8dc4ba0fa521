#![cfg(feature = "store-sqlite")]

use std::sync::Arc;

use tallygate::{
    Account, AccountTier, Actor, AdmissionRequest, Clock, Decision, DenyReason, QuotaEngine,
    SqliteStore, SubAccount, reason,
};
use time::OffsetDateTime;
use time::macros::datetime;

struct FixedClock(OffsetDateTime);

impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.0
    }
}

const NOON: OffsetDateTime = datetime!(2025-03-14 12:00:00 UTC);

fn engine_at(now: OffsetDateTime, store: &SqliteStore) -> QuotaEngine {
    QuotaEngine::with_clock(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Box::new(FixedClock(now)),
    )
}

fn sub_actor(id: &str, owner: &str, personal_limit: u64) -> Actor {
    Actor::SubAccount(SubAccount {
        id: id.to_string(),
        owner_account_id: owner.to_string(),
        personal_limit,
        active: true,
    })
}

fn request(actor: Actor, key: Option<&str>) -> AdmissionRequest {
    AdmissionRequest {
        actor,
        resource_key: key.map(str::to_string),
    }
}

#[tokio::test]
async fn full_admission_flow_runs_against_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::new(dir.path().join("quota.sqlite"));
    store.init().await.expect("init");

    store
        .upsert_account(&Account {
            id: "acct-1".to_string(),
            pool_limit: 2,
            tier: AccountTier::Paid,
        })
        .await
        .expect("account");
    store
        .upsert_sub_account(&SubAccount {
            id: "tech-1".to_string(),
            owner_account_id: "acct-1".to_string(),
            personal_limit: 2,
            active: true,
        })
        .await
        .expect("sub");

    let engine = engine_at(NOON, &store);
    let actor = sub_actor("tech-1", "acct-1", 2);

    let first = engine
        .admit(&request(actor.clone(), Some("AB12CDE")))
        .await
        .expect("admit");
    assert!(first.allowed());
    engine
        .commit_usage("tech-1", "acct-1", Some("AB12CDE"), reason::EXPLICIT)
        .await
        .expect("commit");

    let second = engine
        .admit(&request(actor.clone(), Some("XY99ZZZ")))
        .await
        .expect("admit");
    assert!(second.allowed());
    assert_eq!(second.snapshot.actor_used, 1);
    assert_eq!(second.snapshot.pool_used, 1);
    assert_eq!(second.snapshot.pool_limit, 2);
    engine
        .commit_usage("tech-1", "acct-1", Some("XY99ZZZ"), reason::EXPLICIT)
        .await
        .expect("commit");

    let third = engine
        .admit(&request(actor, Some("ZZ00AAA")))
        .await
        .expect("admit");
    assert_eq!(third.decision, Decision::Deny);
    assert_eq!(third.reason, Some(DenyReason::SubLimit));
}

#[tokio::test]
async fn grace_probe_reads_the_sqlite_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::new(dir.path().join("quota.sqlite"));
    store.init().await.expect("init");

    store
        .upsert_account(&Account::new("acct-1"))
        .await
        .expect("account");

    let at_lookup = engine_at(NOON, &store);
    at_lookup
        .commit_usage("tech-1", "acct-1", Some("AB12CDE"), reason::EXPLICIT)
        .await
        .expect("commit");

    let actor = sub_actor("tech-1", "acct-1", 1);
    let in_window = engine_at(NOON + time::Duration::minutes(10), &store);
    let decision = in_window
        .admit(&request(actor.clone(), Some("AB12CDE")))
        .await
        .expect("admit");
    assert!(decision.allowed());
    assert!(decision.grace);

    let past_window = engine_at(NOON + time::Duration::minutes(20), &store);
    let decision = past_window
        .admit(&request(actor, Some("AB12CDE")))
        .await
        .expect("admit");
    assert_eq!(decision.decision, Decision::Deny);
}

#[tokio::test]
async fn usage_survives_a_store_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("quota.sqlite");

    {
        let store = SqliteStore::new(&path);
        store.init().await.expect("init");
        store
            .upsert_account(&Account {
                id: "acct-1".to_string(),
                pool_limit: 1,
                tier: AccountTier::Free,
            })
            .await
            .expect("account");
        engine_at(NOON, &store)
            .commit_usage("acct-1", "acct-1", Some("AB12CDE"), reason::EXPLICIT)
            .await
            .expect("commit");
    }

    let store = SqliteStore::new(&path);
    let engine = engine_at(NOON + time::Duration::hours(1), &store);
    let decision = engine
        .admit(&request(
            Actor::Account(Account {
                id: "acct-1".to_string(),
                pool_limit: 1,
                tier: AccountTier::Free,
            }),
            Some("XY99ZZZ"),
        ))
        .await
        .expect("admit");
    assert_eq!(decision.decision, Decision::Deny);
    assert_eq!(decision.reason, Some(DenyReason::PoolLimit));
    assert_eq!(decision.snapshot.pool_used, 1);
}

#[tokio::test]
async fn clamping_reads_the_sqlite_roster() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::new(dir.path().join("quota.sqlite"));
    store.init().await.expect("init");

    store
        .upsert_account(&Account {
            id: "acct-1".to_string(),
            pool_limit: 5,
            tier: AccountTier::Free,
        })
        .await
        .expect("account");
    store
        .upsert_sub_account(&SubAccount {
            id: "tech-1".to_string(),
            owner_account_id: "acct-1".to_string(),
            personal_limit: 2,
            active: true,
        })
        .await
        .expect("sub");

    let engine = engine_at(NOON, &store);
    let clamped = engine
        .clamp_sub_account_limit("acct-1", 4, None)
        .await
        .expect("clamp");
    assert_eq!(clamped.value, 3);
    assert!(clamped.was_clamped);

    // Re-evaluating tech-1's own cap ignores its prior allocation.
    let own = engine
        .clamp_sub_account_limit("acct-1", 4, Some("tech-1"))
        .await
        .expect("clamp");
    assert_eq!(own.value, 4);
    assert!(!own.was_clamped);
}
