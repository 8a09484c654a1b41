use rusqlite::Connection;

use crate::error::StoreError;

pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sentiment_news (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            source TEXT NOT NULL,
            source_name TEXT,
            published_at TEXT NOT NULL,
            currencies TEXT NOT NULL DEFAULT '[]',
            raw_sentiment TEXT,
            fetched_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sentiment_signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            news_id TEXT NOT NULL UNIQUE REFERENCES sentiment_news(id),
            sentiment TEXT NOT NULL,
            confidence REAL NOT NULL,
            signal_strength TEXT NOT NULL,
            price_impact TEXT NOT NULL DEFAULT 'neutral',
            timeframe TEXT NOT NULL DEFAULT 'short_term',
            reasoning TEXT NOT NULL DEFAULT '',
            assets TEXT NOT NULL DEFAULT '[]',
            analyzed_at TEXT NOT NULL,
            is_actionable INTEGER NOT NULL DEFAULT 0,
            alert_sent INTEGER NOT NULL DEFAULT 0,
            alert_sent_at TEXT,
            alert_channel TEXT
        );

        CREATE TABLE IF NOT EXISTS bot_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_key TEXT NOT NULL UNIQUE,
            is_enabled INTEGER NOT NULL DEFAULT 0,
            poll_interval INTEGER NOT NULL DEFAULT 300,
            last_poll_at TEXT,
            last_error TEXT,
            last_error_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_news_published ON sentiment_news(published_at);
        CREATE INDEX IF NOT EXISTS idx_news_source ON sentiment_news(source);
        CREATE INDEX IF NOT EXISTS idx_signal_sentiment ON sentiment_signals(sentiment);
        CREATE INDEX IF NOT EXISTS idx_signal_analyzed ON sentiment_signals(analyzed_at);
        CREATE INDEX IF NOT EXISTS idx_signal_actionable ON sentiment_signals(is_actionable, alert_sent);
        CREATE INDEX IF NOT EXISTS idx_bot_enabled ON bot_status(is_enabled);
        ",
    )?;
    Ok(())
}
