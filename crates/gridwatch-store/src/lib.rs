//! # GridWatch Store
//!
//! SQLite persistence behind a connection mutex. Sole writer of schedule
//! snapshots and subscribers; the analyzer and dispatcher only ever see
//! read-only views handed out from here.
//!
//! Snapshot rotation keeps exactly one "latest" row per region plus the
//! previous one, so the analyzer always has something to diff against.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use gridwatch_core::error::{GridWatchError, Result};
use gridwatch_core::types::{ScheduleSnapshot, Subscriber};

fn db_err(e: impl std::fmt::Display) -> GridWatchError {
    GridWatchError::Persistence(e.to_string())
}

/// Durable store for snapshots, subscribers, and delivery records.
pub struct ScheduleStore {
    conn: Mutex<Connection>,
}

impl ScheduleStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::info!("Schedule store ready at {}", path.display());
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute_batch(
            "
            -- One row per fetched schedule version; exactly one latest per region.
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                region TEXT NOT NULL,
                version TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                is_latest INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_region ON snapshots(region, is_latest);

            -- Chat members who opted in; one registration per user per chat.
            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                group_id TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                UNIQUE(chat_id, user_id)
            );

            -- At-most-once notification bookkeeping per diff version.
            CREATE TABLE IF NOT EXISTS deliveries (
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                region TEXT NOT NULL,
                version TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id, region, version)
            );
            ",
        )
        .map_err(db_err)?;
        Ok(())
    }

    // ─── Snapshots ──────────────────────────────────────────

    /// Atomically install a new latest snapshot for its region.
    /// The demoted previous snapshot stays retrievable for one more cycle;
    /// anything older is pruned in the same transaction.
    pub fn save_snapshot(&self, snapshot: &ScheduleSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot).map_err(db_err)?;
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "UPDATE snapshots SET is_latest = 0 WHERE region = ?1 AND is_latest = 1",
            [&snapshot.region],
        )
        .map_err(db_err)?;
        tx.execute(
            "INSERT INTO snapshots (region, version, fetched_at, payload, is_latest)
             VALUES (?1, ?2, ?3, ?4, 1)",
            rusqlite::params![
                snapshot.region,
                snapshot.version,
                snapshot.fetched_at.to_rfc3339(),
                payload,
            ],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM snapshots
             WHERE region = ?1 AND is_latest = 0 AND id NOT IN (
                 SELECT id FROM snapshots
                 WHERE region = ?1 AND is_latest = 0
                 ORDER BY id DESC LIMIT 1
             )",
            [&snapshot.region],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        tracing::debug!(
            "Saved snapshot for '{}' (version {})",
            snapshot.region,
            &snapshot.version[..12.min(snapshot.version.len())]
        );
        Ok(())
    }

    /// The current latest snapshot for a region, if any.
    pub fn latest_snapshot(&self, region: &str) -> Result<Option<ScheduleSnapshot>> {
        self.snapshot_where(region, "is_latest = 1")
    }

    /// The snapshot that was latest before the current one.
    pub fn previous_snapshot(&self, region: &str) -> Result<Option<ScheduleSnapshot>> {
        self.snapshot_where(region, "is_latest = 0")
    }

    fn snapshot_where(&self, region: &str, clause: &str) -> Result<Option<ScheduleSnapshot>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let sql = format!(
            "SELECT payload FROM snapshots WHERE region = ?1 AND {clause} ORDER BY id DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let payload: Option<String> = stmt
            .query_row([region], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(db_err)?;
        match payload {
            Some(json) => {
                let snapshot = serde_json::from_str(&json).map_err(db_err)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    // ─── Subscribers ────────────────────────────────────────

    /// Register (or re-register) a subscriber. Idempotent: adding the same
    /// (chat, user) twice updates the name/group instead of duplicating.
    pub fn add_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO subscribers (chat_id, user_id, username, group_id, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                subscriber.chat_id,
                subscriber.user_id,
                subscriber.username,
                subscriber.group_id,
                subscriber.registered_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        tracing::info!(
            "Registered {} (group {}) in chat {}",
            subscriber.username,
            subscriber.group_id,
            subscriber.chat_id
        );
        Ok(())
    }

    /// Remove a subscriber. Removing a non-existent one is a no-op, not an
    /// error; returns whether a row actually existed.
    pub fn remove_subscriber(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(db_err)?;
        let removed = conn
            .execute(
                "DELETE FROM subscribers WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// Look up one subscriber by identity.
    pub fn subscriber(&self, chat_id: i64, user_id: i64) -> Result<Option<Subscriber>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT chat_id, user_id, username, group_id, registered_at FROM subscribers
                 WHERE chat_id = ?1 AND user_id = ?2",
            )
            .map_err(db_err)?;
        let result = stmt
            .query_row(rusqlite::params![chat_id, user_id], row_to_subscriber)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(db_err)?;
        Ok(result)
    }

    /// All subscribers of one outage group, across chats.
    pub fn subscribers_for_group(&self, group_id: &str) -> Result<Vec<Subscriber>> {
        self.subscribers_where("group_id = ?1", rusqlite::params![group_id])
    }

    /// All subscribers registered in one chat, oldest first.
    pub fn chat_subscribers(&self, chat_id: i64) -> Result<Vec<Subscriber>> {
        self.subscribers_where("chat_id = ?1", rusqlite::params![chat_id])
    }

    fn subscribers_where(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Subscriber>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let sql = format!(
            "SELECT chat_id, user_id, username, group_id, registered_at FROM subscribers
             WHERE {clause} ORDER BY registered_at ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map(params, row_to_subscriber).map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ─── Delivery records ───────────────────────────────────

    /// Whether this diff version was already notified to this subscriber.
    pub fn was_delivered(
        &self,
        chat_id: i64,
        user_id: i64,
        region: &str,
        version: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().map_err(db_err)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM deliveries
                 WHERE chat_id = ?1 AND user_id = ?2 AND region = ?3 AND version = ?4",
                rusqlite::params![chat_id, user_id, region, version],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Record a successful delivery. Safe to call twice.
    pub fn mark_delivered(
        &self,
        chat_id: i64,
        user_id: i64,
        region: &str,
        version: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT OR IGNORE INTO deliveries (chat_id, user_id, region, version, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![chat_id, user_id, region, version, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_subscriber(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscriber> {
    let registered_at_str: String = row.get(4)?;
    Ok(Subscriber {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        group_id: row.get(3)?,
        registered_at: DateTime::parse_from_rfc3339(&registered_at_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
