//! SQLite persistence for news, signals and bot status.

pub mod bot_status;
pub mod migrations;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::analyze::signal::{PriceImpact, SentimentLevel, SentimentSignal, SignalStrength, Timeframe};
use crate::error::StoreError;
use crate::ingest::types::NewsItem;

pub use bot_status::BotStatus;

/// Fixed-width UTC timestamp: lexical order equals time order.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `now - age`, floored at the epoch so oversized windows cover everything stored.
fn cutoff_ts(age: Duration) -> String {
    let floor = DateTime::<Utc>::UNIX_EPOCH;
    ts(Utc::now().checked_sub_signed(age).unwrap_or(floor).max(floor))
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_ts)
}

fn json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub source_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub currencies: Vec<String>,
    pub raw_sentiment: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub id: i64,
    pub news_id: String,
    pub sentiment: SentimentLevel,
    pub confidence: f64,
    pub signal_strength: SignalStrength,
    pub price_impact: PriceImpact,
    pub timeframe: Timeframe,
    pub reasoning: String,
    pub assets: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
    pub is_actionable: bool,
    pub alert_sent: bool,
    pub alert_sent_at: Option<DateTime<Utc>>,
    pub alert_channel: Option<String>,
    /// Joined news row, when the query loads it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news: Option<NewsRecord>,
}

impl SignalRecord {
    /// Rebuild the in-flight form (title comes from the joined news row).
    pub fn to_signal(&self) -> SentimentSignal {
        SentimentSignal {
            news_id: self.news_id.clone(),
            title: self.news.as_ref().map(|n| n.title.clone()).unwrap_or_default(),
            sentiment: self.sentiment,
            confidence: self.confidence,
            signal_strength: self.signal_strength,
            price_impact: self.price_impact,
            timeframe: self.timeframe,
            reasoning: self.reasoning.clone(),
            assets: self.assets.clone(),
            analyzed_at: self.analyzed_at,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.news.as_ref().map(|n| n.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalStats {
    pub total: u64,
    pub actionable: u64,
    pub by_sentiment: BTreeMap<String, u64>,
    pub hours: u32,
}

impl SignalStats {
    pub fn count(&self, level: SentimentLevel) -> u64 {
        self.by_sentiment.get(level.as_str()).copied().unwrap_or(0)
    }

    pub fn bullish(&self) -> u64 {
        self.count(SentimentLevel::Bullish) + self.count(SentimentLevel::VeryBullish)
    }

    pub fn bearish(&self) -> u64 {
        self.count(SentimentLevel::Bearish) + self.count(SentimentLevel::VeryBearish)
    }

    pub fn neutral(&self) -> u64 {
        self.count(SentimentLevel::Neutral)
    }
}

/// Filters for `get_recent_signals`.
#[derive(Debug, Clone)]
pub struct SignalQuery {
    pub limit: usize,
    pub sentiment: Option<SentimentLevel>,
    pub asset: Option<String>,
    pub actionable_only: bool,
}

impl Default for SignalQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            sentiment: None,
            asset: None,
            actionable_only: false,
        }
    }
}

const NEWS_COLS: &str =
    "n.id, n.title, n.url, n.source, n.source_name, n.published_at, n.currencies, n.raw_sentiment, n.fetched_at";
const SIGNAL_COLS: &str = "s.id, s.news_id, s.sentiment, s.confidence, s.signal_strength, s.price_impact, s.timeframe, s.reasoning, s.assets, s.analyzed_at, s.is_actionable, s.alert_sent, s.alert_sent_at, s.alert_channel";

fn row_to_news(row: &Row, base: usize) -> Result<NewsRecord, rusqlite::Error> {
    let published: String = row.get(base + 5)?;
    let currencies: String = row.get(base + 6)?;
    let fetched: String = row.get(base + 8)?;
    Ok(NewsRecord {
        id: row.get(base)?,
        title: row.get(base + 1)?,
        url: row.get(base + 2)?,
        source: row.get(base + 3)?,
        source_name: row.get(base + 4)?,
        published_at: parse_ts(&published),
        currencies: json_list(&currencies),
        raw_sentiment: row.get(base + 7)?,
        fetched_at: parse_ts(&fetched),
    })
}

/// Signal columns first; news columns follow when `with_news` (LEFT JOIN, may be NULL).
fn row_to_signal(row: &Row, with_news: bool) -> Result<SignalRecord, rusqlite::Error> {
    let sentiment: String = row.get(2)?;
    let strength: String = row.get(4)?;
    let impact: String = row.get(5)?;
    let timeframe: String = row.get(6)?;
    let assets: String = row.get(8)?;
    let analyzed: String = row.get(9)?;
    let news = if with_news {
        let joined: Option<String> = row.get(14)?;
        match joined {
            Some(_) => Some(row_to_news(row, 14)?),
            None => None,
        }
    } else {
        None
    };
    Ok(SignalRecord {
        id: row.get(0)?,
        news_id: row.get(1)?,
        sentiment: SentimentLevel::from_label(&sentiment),
        confidence: row.get(3)?,
        signal_strength: SignalStrength::from_label(&strength),
        price_impact: PriceImpact::from_label(&impact),
        timeframe: Timeframe::from_label(&timeframe),
        reasoning: row.get(7)?,
        assets: json_list(&assets),
        analyzed_at: parse_ts(&analyzed),
        is_actionable: row.get::<_, i64>(10)? != 0,
        alert_sent: row.get::<_, i64>(11)? != 0,
        alert_sent_at: parse_opt_ts(row.get(12)?),
        alert_channel: row.get(13)?,
        news,
    })
}

fn insert_news(conn: &Connection, item: &NewsItem) -> Result<NewsRecord, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO sentiment_news
            (id, title, url, source, source_name, published_at, currencies, raw_sentiment, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            item.id,
            item.title,
            item.url,
            item.source.as_str(),
            item.source_name,
            ts(item.published_at),
            serde_json::to_string(&item.currencies)?,
            item.raw_sentiment,
            ts(item.fetched_at),
        ],
    )?;
    let sql = format!("SELECT {NEWS_COLS} FROM sentiment_news n WHERE n.id = ?1");
    Ok(conn.query_row(&sql, params![item.id], |r| row_to_news(r, 0))?)
}

fn upsert_signal(conn: &Connection, s: &SentimentSignal) -> Result<SignalRecord, StoreError> {
    conn.execute(
        "INSERT INTO sentiment_signals
            (news_id, sentiment, confidence, signal_strength, price_impact, timeframe, reasoning, assets, analyzed_at, is_actionable)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(news_id) DO UPDATE SET
            sentiment = excluded.sentiment,
            confidence = excluded.confidence,
            signal_strength = excluded.signal_strength,
            price_impact = excluded.price_impact,
            timeframe = excluded.timeframe,
            reasoning = excluded.reasoning,
            assets = excluded.assets,
            analyzed_at = excluded.analyzed_at,
            is_actionable = excluded.is_actionable",
        params![
            s.news_id,
            s.sentiment.as_str(),
            s.confidence,
            s.signal_strength.as_str(),
            s.price_impact.as_str(),
            s.timeframe.as_str(),
            s.reasoning,
            serde_json::to_string(&s.assets)?,
            ts(s.analyzed_at),
            s.is_actionable() as i64,
        ],
    )?;
    select_signal_by_news_id(conn, &s.news_id)?
        .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
}

fn select_signal_by_news_id(conn: &Connection, news_id: &str) -> Result<Option<SignalRecord>, StoreError> {
    let sql = format!(
        "SELECT {SIGNAL_COLS}, {NEWS_COLS} FROM sentiment_signals s
         LEFT JOIN sentiment_news n ON n.id = s.news_id
         WHERE s.news_id = ?1"
    );
    Ok(conn
        .query_row(&sql, params![news_id], |r| row_to_signal(r, true))
        .optional()?)
}

/// Repository over one SQLite connection.
pub struct SignalStore {
    conn: Mutex<Connection>,
}

impl SignalStore {
    /// Open (creating parent directories) and migrate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Idempotent: a second save of the same id returns the stored row unchanged.
    pub fn save_news(&self, item: &NewsItem) -> Result<NewsRecord, StoreError> {
        let conn = self.conn()?;
        insert_news(&conn, item)
    }

    pub fn news_exists(&self, news_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sentiment_news WHERE id = ?1",
                params![news_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert, or overwrite classification fields in place. Alert fields are untouched.
    pub fn save_signal(&self, signal: &SentimentSignal) -> Result<SignalRecord, StoreError> {
        let conn = self.conn()?;
        upsert_signal(&conn, signal)
    }

    /// Persist news then signals in one transaction.
    pub fn save_cycle(
        &self,
        news: &[NewsItem],
        signals: &[SentimentSignal],
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for item in news {
            insert_news(&tx, item)?;
        }
        let mut out = Vec::with_capacity(signals.len());
        for s in signals {
            out.push(upsert_signal(&tx, s)?);
        }
        tx.commit()?;
        Ok(out)
    }

    pub fn get_signal_by_news_id(&self, news_id: &str) -> Result<Option<SignalRecord>, StoreError> {
        let conn = self.conn()?;
        select_signal_by_news_id(&conn, news_id)
    }

    /// Set the alert flags once. Returns false if the signal was already marked or is unknown.
    pub fn mark_alert_sent(&self, signal_id: i64, channel: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE sentiment_signals SET alert_sent = 1, alert_sent_at = ?2, alert_channel = ?3
             WHERE id = ?1 AND alert_sent = 0",
            params![signal_id, ts(Utc::now()), channel],
        )?;
        Ok(n == 1)
    }

    /// Mark several signals in one transaction. Returns how many rows flipped.
    pub fn mark_alerts_sent(&self, signal_ids: &[i64], channel: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = ts(Utc::now());
        let mut flipped = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE sentiment_signals SET alert_sent = 1, alert_sent_at = ?2, alert_channel = ?3
                 WHERE id = ?1 AND alert_sent = 0",
            )?;
            for id in signal_ids {
                flipped += stmt.execute(params![id, now, channel])?;
            }
        }
        tx.commit()?;
        Ok(flipped)
    }

    /// Newest analyzed first.
    pub fn get_recent_signals(&self, q: &SignalQuery) -> Result<Vec<SignalRecord>, StoreError> {
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {SIGNAL_COLS}, {NEWS_COLS} FROM sentiment_signals s
             LEFT JOIN sentiment_news n ON n.id = s.news_id WHERE 1=1"
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(level) = q.sentiment {
            sql.push_str(&format!(" AND s.sentiment = ?{}", values.len() + 1));
            values.push(Box::new(level.as_str().to_string()));
        }
        if let Some(asset) = &q.asset {
            sql.push_str(&format!(" AND s.assets LIKE ?{} ESCAPE '\\'", values.len() + 1));
            let escaped = asset
                .trim()
                .to_ascii_uppercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            values.push(Box::new(format!("%\"{escaped}\"%")));
        }
        if q.actionable_only {
            sql.push_str(" AND s.is_actionable = 1");
        }
        sql.push_str(&format!(" ORDER BY s.analyzed_at DESC, s.id DESC LIMIT ?{}", values.len() + 1));
        values.push(Box::new(q.limit as i64));

        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(refs.as_slice(), |r| row_to_signal(r, true))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_unsent_actionable_signals(&self, limit: usize) -> Result<Vec<SignalRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SIGNAL_COLS}, {NEWS_COLS} FROM sentiment_signals s
             LEFT JOIN sentiment_news n ON n.id = s.news_id
             WHERE s.is_actionable = 1 AND s.alert_sent = 0
             ORDER BY s.analyzed_at DESC, s.id DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |r| row_to_signal(r, true))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_signal_stats(&self, hours: u32) -> Result<SignalStats, StoreError> {
        let conn = self.conn()?;
        let cutoff = cutoff_ts(Duration::hours(i64::from(hours)));

        let mut stmt = conn.prepare(
            "SELECT sentiment, COUNT(*), SUM(is_actionable) FROM sentiment_signals
             WHERE analyzed_at >= ?1 GROUP BY sentiment",
        )?;
        let rows = stmt.query_map(params![cutoff], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, Option<i64>>(2)?))
        })?;

        let mut stats = SignalStats {
            total: 0,
            actionable: 0,
            by_sentiment: BTreeMap::new(),
            hours,
        };
        for row in rows {
            let (sentiment, count, actionable) = row?;
            let count = count.max(0) as u64;
            stats.total += count;
            stats.actionable += actionable.unwrap_or(0).max(0) as u64;
            stats.by_sentiment.insert(sentiment, count);
        }
        Ok(stats)
    }

    /// Most-mentioned assets among signals of the last `hours`, highest count first.
    pub fn top_assets(&self, hours: u32, n: usize) -> Result<Vec<(String, u64)>, StoreError> {
        let conn = self.conn()?;
        let cutoff = cutoff_ts(Duration::hours(i64::from(hours)));
        let mut stmt = conn.prepare("SELECT assets FROM sentiment_signals WHERE analyzed_at >= ?1")?;
        let rows = stmt.query_map(params![cutoff], |r| r.get::<_, String>(0))?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in rows {
            for asset in json_list(&row?) {
                *counts.entry(asset).or_default() += 1;
            }
        }
        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Delete signals analyzed before the cutoff, then news older than the cutoff that
    /// no longer has a signal. Returns (signals, news) deleted.
    pub fn cleanup_old_records(&self, days: u32) -> Result<(usize, usize), StoreError> {
        let mut conn = self.conn()?;
        let cutoff = cutoff_ts(Duration::days(i64::from(days)));
        let tx = conn.transaction()?;
        let signals = tx.execute(
            "DELETE FROM sentiment_signals WHERE analyzed_at < ?1",
            params![cutoff],
        )?;
        let news = tx.execute(
            "DELETE FROM sentiment_news WHERE fetched_at < ?1
             AND id NOT IN (SELECT news_id FROM sentiment_signals)",
            params![cutoff],
        )?;
        tx.commit()?;
        tracing::info!(signals, news, days, "cleaned up old sentiment records");
        Ok((signals, news))
    }
}

/// Store handle that opens its database on first use.
pub struct LazyStore {
    path: Option<PathBuf>,
    cell: OnceCell<Arc<SignalStore>>,
}

impl LazyStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cell: OnceCell::new(),
        }
    }

    pub fn ready(store: Arc<SignalStore>) -> Self {
        Self {
            path: None,
            cell: OnceCell::with_value(store),
        }
    }

    pub fn get(&self) -> Result<Arc<SignalStore>, StoreError> {
        self.cell
            .get_or_try_init(|| {
                let path = self.path.as_deref().unwrap_or_else(|| Path::new(":memory:"));
                tracing::info!(path = %path.display(), "opening signal store");
                SignalStore::open(path).map(Arc::new)
            })
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::NewsSourceKind;

    fn news(n: u32) -> NewsItem {
        NewsItem::new(
            format!("BTC headline {n}"),
            format!("https://n.test/{n}"),
            NewsSourceKind::Cryptonews,
            "Desk",
            Utc::now(),
        )
        .with_currencies(["BTC"])
    }

    fn signal_for(item: &NewsItem, level: SentimentLevel) -> SentimentSignal {
        SentimentSignal {
            news_id: item.id.clone(),
            title: item.title.clone(),
            sentiment: level,
            confidence: 0.8,
            signal_strength: SignalStrength::Strong,
            price_impact: PriceImpact::Up,
            timeframe: Timeframe::Immediate,
            reasoning: "r".into(),
            assets: item.currencies.clone(),
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = ts(DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc));
        assert_eq!(a, "2024-01-01T00:00:00.000000Z");
    }

    #[test]
    fn signal_requires_existing_news() {
        let store = SignalStore::open_in_memory().unwrap();
        let item = news(1);
        assert!(store.save_signal(&signal_for(&item, SentimentLevel::Bullish)).is_err());
    }

    #[test]
    fn stats_group_by_sentiment() {
        let store = SignalStore::open_in_memory().unwrap();
        let items: Vec<_> = (0..3).map(news).collect();
        let signals = vec![
            signal_for(&items[0], SentimentLevel::Bullish),
            signal_for(&items[1], SentimentLevel::Bullish),
            signal_for(&items[2], SentimentLevel::Neutral),
        ];
        store.save_cycle(&items, &signals).unwrap();
        let stats = store.get_signal_stats(24).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.actionable, 2);
        assert_eq!(stats.bullish(), 2);
        assert_eq!(stats.neutral(), 1);
        assert_eq!(store.top_assets(24, 5).unwrap(), vec![("BTC".to_string(), 3)]);
    }

    #[test]
    fn oversized_windows_do_not_overflow() {
        let store = SignalStore::open_in_memory().unwrap();
        let item = news(7);
        store
            .save_cycle(std::slice::from_ref(&item), &[signal_for(&item, SentimentLevel::Bearish)])
            .unwrap();

        assert_eq!(store.get_signal_stats(u32::MAX).unwrap().total, 1);
        assert_eq!(store.top_assets(u32::MAX, 5).unwrap().len(), 1);
        assert_eq!(store.cleanup_old_records(100_000_000).unwrap(), (0, 0));
        assert_eq!(store.cleanup_old_records(u32::MAX).unwrap(), (0, 0));
        assert!(store.news_exists(&item.id).unwrap());
    }

    #[test]
    fn lazy_store_opens_once() {
        let dir = tempfile::tempdir().unwrap();
        let lazy = LazyStore::at(dir.path().join("nested/db.sqlite"));
        assert!(!lazy.is_initialized());
        let a = lazy.get().unwrap();
        let b = lazy.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(dir.path().join("nested/db.sqlite").exists());
    }
}
