use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use time::OffsetDateTime;

use crate::actor::{Account, SubAccount};
use crate::error::{QuotaError, Result};
use crate::event::UsageEvent;
use crate::ledger::{UsageLedger, validate_event};
use crate::registry::QuotaRegistry;
use crate::window::Window;

/// Durable ledger and registry in a single SQLite file. Every call opens a
/// connection on a blocking thread; WAL keeps concurrent readers cheap.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> Result<()> {
        self.run(|_conn| Ok(())).await
    }

    pub async fn upsert_account(&self, account: &Account) -> Result<()> {
        let id = account.id.clone();
        let value_json = serde_json::to_string(account)
            .map_err(|err| QuotaError::config(format!("unencodable account: {err}")))?;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO accounts (id, value_json) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET value_json = excluded.value_json",
                rusqlite::params![id, value_json],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_sub_account(&self, sub_account: &SubAccount) -> Result<()> {
        let id = sub_account.id.clone();
        let owner = sub_account.owner_account_id.clone();
        let value_json = serde_json::to_string(sub_account)
            .map_err(|err| QuotaError::config(format!("unencodable sub-account: {err}")))?;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO sub_accounts (id, owner_account_id, value_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     owner_account_id = excluded.owner_account_id,
                     value_json = excluded.value_json",
                rusqlite::params![id, owner, value_json],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_sub_account(&self, sub_account_id: &str) -> Result<()> {
        let id = sub_account_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM sub_accounts WHERE id = ?1",
                rusqlite::params![id],
            )?;
            Ok(())
        })
        .await
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let mut conn = open_connection(path)?;
            init_schema(&conn)?;
            op(&mut conn)
        })
        .await
        .map_err(|err| store_error(format!("sqlite task join: {err}")))?
    }
}

#[async_trait]
impl UsageLedger for SqliteStore {
    async fn count_by_actor(&self, actor_id: &str, window: Window) -> Result<u64> {
        let actor_id = actor_id.to_string();
        let (start_ms, end_ms) = window_bounds_ms(window);
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM usage_events
                 WHERE actor_id = ?1 AND created_at_ms >= ?2 AND created_at_ms < ?3",
                rusqlite::params![actor_id, start_ms, end_ms],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn count_by_account_pool(&self, account_id: &str, window: Window) -> Result<u64> {
        let account_id = account_id.to_string();
        let (start_ms, end_ms) = window_bounds_ms(window);
        self.run(move |conn| {
            // Events from before pool billing existed have no billing
            // account and count as self-billed.
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM usage_events
                 WHERE (billed_to_account_id = ?1
                        OR (billed_to_account_id IS NULL AND actor_id = ?1))
                   AND created_at_ms >= ?2 AND created_at_ms < ?3",
                rusqlite::params![account_id, start_ms, end_ms],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn count_by_actor_for_key(
        &self,
        actor_id: &str,
        resource_key: &str,
        window: Window,
    ) -> Result<u64> {
        let actor_id = actor_id.to_string();
        let resource_key = resource_key.to_string();
        let (start_ms, end_ms) = window_bounds_ms(window);
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM usage_events
                 WHERE actor_id = ?1 AND resource_key = ?2
                   AND created_at_ms >= ?3 AND created_at_ms < ?4",
                rusqlite::params![actor_id, resource_key, start_ms, end_ms],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn append(&self, event: UsageEvent) -> Result<UsageEvent> {
        validate_event(&event)?;
        let stored = event.clone();
        let created_at_ms = timestamp_ms(event.created_at);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO usage_events
                     (actor_id, billed_to_account_id, resource_key, reason_tag, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    event.actor_id,
                    event.billed_to_account_id,
                    event.resource_key,
                    event.reason_tag,
                    created_at_ms,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(stored)
    }
}

#[async_trait]
impl QuotaRegistry for SqliteStore {
    async fn account(&self, account_id: &str) -> Result<Option<Account>> {
        let id = account_id.to_string();
        self.run(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value_json FROM accounts WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|err| store_error(format!("corrupt account row: {err}")))
            })
            .transpose()
        })
        .await
    }

    async fn active_sub_accounts(&self, owner_account_id: &str) -> Result<Vec<SubAccount>> {
        let owner = owner_account_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT value_json FROM sub_accounts WHERE owner_account_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(rusqlite::params![owner], |row| row.get::<_, String>(0))?;

            let mut roster = Vec::new();
            for row in rows {
                let raw = row?;
                let sub: SubAccount = serde_json::from_str(&raw)
                    .map_err(|err| store_error(format!("corrupt sub-account row: {err}")))?;
                if sub.active {
                    roster.push(sub);
                }
            }
            Ok(roster)
        })
        .await
    }

    async fn sub_account_count(&self, owner_account_id: &str) -> Result<u64> {
        let owner = owner_account_id.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sub_accounts WHERE owner_account_id = ?1",
                rusqlite::params![owner],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

impl From<rusqlite::Error> for QuotaError {
    fn from(err: rusqlite::Error) -> Self {
        store_error(err)
    }
}

fn store_error(message: impl std::fmt::Display) -> QuotaError {
    QuotaError::Store {
        message: message.to_string(),
    }
}

fn init_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY NOT NULL,
            value_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sub_accounts (
            id TEXT PRIMARY KEY NOT NULL,
            owner_account_id TEXT NOT NULL,
            value_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sub_accounts_owner
            ON sub_accounts(owner_account_id);

        CREATE TABLE IF NOT EXISTS usage_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id TEXT NOT NULL,
            billed_to_account_id TEXT,
            resource_key TEXT,
            reason_tag TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_usage_events_actor_time
            ON usage_events(actor_id, created_at_ms);
        CREATE INDEX IF NOT EXISTS idx_usage_events_billed_time
            ON usage_events(billed_to_account_id, created_at_ms);",
    )?;
    Ok(())
}

fn open_connection(path: PathBuf) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}

fn timestamp_ms(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

fn window_bounds_ms(window: Window) -> (i64, i64) {
    (timestamp_ms(window.start), timestamp_ms(window.end))
}
