// src/store/bot_status.rs
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::config::bot::DEFAULT_POLL_INTERVAL_SECS;
use crate::error::StoreError;
use crate::store::{parse_ts, ts, SignalStore};

/// Persisted lifecycle record for one owning identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotStatus {
    pub id: i64,
    pub owner_key: String,
    pub is_enabled: bool,
    pub poll_interval: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLS: &str = "id, owner_key, is_enabled, poll_interval, last_poll_at, last_error, last_error_at, created_at, updated_at";

fn row_to_status(row: &Row) -> Result<BotStatus, rusqlite::Error> {
    let last_poll: Option<String> = row.get(4)?;
    let last_error_at: Option<String> = row.get(6)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(BotStatus {
        id: row.get(0)?,
        owner_key: row.get(1)?,
        is_enabled: row.get::<_, i64>(2)? != 0,
        poll_interval: row.get::<_, i64>(3)?.max(0) as u64,
        last_poll_at: last_poll.as_deref().map(parse_ts),
        last_error: row.get(5)?,
        last_error_at: last_error_at.as_deref().map(parse_ts),
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
    })
}

fn owner(key: &str) -> String {
    key.trim().to_lowercase()
}

fn select(conn: &Connection, owner_key: &str) -> Result<Option<BotStatus>, StoreError> {
    let sql = format!("SELECT {COLS} FROM bot_status WHERE owner_key = ?1");
    Ok(conn.query_row(&sql, params![owner_key], row_to_status).optional()?)
}

fn get_or_create_in(conn: &Connection, owner_key: &str) -> Result<BotStatus, StoreError> {
    let now = ts(Utc::now());
    conn.execute(
        "INSERT OR IGNORE INTO bot_status (owner_key, is_enabled, poll_interval, created_at, updated_at)
         VALUES (?1, 0, ?2, ?3, ?3)",
        params![owner_key, DEFAULT_POLL_INTERVAL_SECS as i64, now],
    )?;
    select(conn, owner_key)?.ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
}

impl SignalStore {
    /// Row for `owner_key` (case-insensitive), created disabled on first access.
    pub fn get_or_create_status(&self, owner_key: &str) -> Result<BotStatus, StoreError> {
        let conn = self.conn()?;
        get_or_create_in(&conn, &owner(owner_key))
    }

    fn update_status(&self, owner_key: &str, set: &str, extra: &[&dyn rusqlite::types::ToSql]) -> Result<BotStatus, StoreError> {
        let key = owner(owner_key);
        let conn = self.conn()?;
        get_or_create_in(&conn, &key)?;
        let sql = format!("UPDATE bot_status SET {set}, updated_at = ?1 WHERE owner_key = ?2");
        let now = ts(Utc::now());
        let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(2 + extra.len());
        values.push(&now);
        values.push(&key);
        values.extend_from_slice(extra);
        conn.execute(&sql, values.as_slice())?;
        select(&conn, &key)?.ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Enable and clear any previous error.
    pub fn enable(&self, owner_key: &str, poll_interval: u64) -> Result<BotStatus, StoreError> {
        let interval = poll_interval as i64;
        self.update_status(
            owner_key,
            "is_enabled = 1, poll_interval = ?3, last_error = NULL, last_error_at = NULL",
            &[&interval],
        )
    }

    pub fn disable(&self, owner_key: &str) -> Result<BotStatus, StoreError> {
        self.update_status(owner_key, "is_enabled = 0", &[])
    }

    pub fn record_poll(&self, owner_key: &str) -> Result<BotStatus, StoreError> {
        let now = ts(Utc::now());
        self.update_status(owner_key, "last_poll_at = ?3", &[&now])
    }

    pub fn record_error(&self, owner_key: &str, error: &str) -> Result<BotStatus, StoreError> {
        let now = ts(Utc::now());
        self.update_status(owner_key, "last_error = ?3, last_error_at = ?4", &[&error, &now])
    }

    pub fn set_poll_interval(&self, owner_key: &str, poll_interval: u64) -> Result<BotStatus, StoreError> {
        let interval = poll_interval as i64;
        self.update_status(owner_key, "poll_interval = ?3", &[&interval])
    }

    /// False for unknown owners; never creates a row.
    pub fn is_enabled(&self, owner_key: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        Ok(select(&conn, &owner(owner_key))?.is_some_and(|s| s.is_enabled))
    }

    pub fn get_enabled(&self) -> Result<Vec<BotStatus>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {COLS} FROM bot_status WHERE is_enabled = 1 ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_status)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
