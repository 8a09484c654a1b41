//! Alert delivery: the `Notifier` seam, Discord formatting/transport and an in-memory notifier.

pub mod discord;
pub mod embed;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::analyze::signal::SentimentSignal;

pub use discord::DiscordWebhook;
pub use memory::{MemoryNotifier, NotifierEvent};

/// Overall tone of a summary window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Bullish,
    Bearish,
    Mixed,
}

/// Digest of recent signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub bullish: u64,
    pub bearish: u64,
    pub neutral: u64,
    /// (ticker, mentions), highest first.
    pub top_assets: Vec<(String, u64)>,
    pub period: String,
}

impl SentimentSummary {
    pub fn total(&self) -> u64 {
        self.bullish + self.bearish + self.neutral
    }

    /// Bullish/bearish only when one side outnumbers the other by more than 1.5×.
    pub fn mood(&self) -> Mood {
        let (bull, bear) = (self.bullish as f64, self.bearish as f64);
        if bull > bear * 1.5 {
            Mood::Bullish
        } else if bear > bull * 1.5 {
            Mood::Bearish
        } else {
            Mood::Mixed
        }
    }
}

/// Outbound alert channel. Every method reports success as a bool and never errors:
/// delivery problems are logged and counted by the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel label stored with sent alerts.
    fn channel(&self) -> &'static str;

    async fn send_signal_alert(&self, signal: &SentimentSignal, url: Option<&str>) -> bool;

    /// Deliver alerts in channel-sized chunks. Returns the news ids whose chunk went out.
    async fn deliver_batch(
        &self,
        signals: &[SentimentSignal],
        urls: &HashMap<String, String>,
    ) -> Vec<String>;

    /// Number of alerts delivered.
    async fn send_batch(&self, signals: &[SentimentSignal], urls: &HashMap<String, String>) -> usize {
        self.deliver_batch(signals, urls).await.len()
    }

    async fn send_summary(&self, summary: &SentimentSummary) -> bool;
    async fn send_error(&self, message: &str) -> bool;
    async fn send_startup(&self) -> bool;
    async fn send_shutdown(&self) -> bool;
    async fn test_connection(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(bullish: u64, bearish: u64) -> SentimentSummary {
        SentimentSummary {
            bullish,
            bearish,
            neutral: 0,
            top_assets: vec![],
            period: "p".into(),
        }
    }

    #[test]
    fn mood_needs_a_clear_margin() {
        assert_eq!(summary(4, 2).mood(), Mood::Bullish);
        assert_eq!(summary(3, 2).mood(), Mood::Mixed);
        assert_eq!(summary(1, 2).mood(), Mood::Bearish);
        assert_eq!(summary(0, 0).mood(), Mood::Mixed);
    }
}
