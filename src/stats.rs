//! In-memory operator statistics: running totals plus the last few cycle reports.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::CycleReport;

#[derive(Debug, Clone, Default)]
struct Totals {
    total_polls: u64,
    total_errors: u64,
    total_signals: u64,
    total_actionable: u64,
    total_alerts: u64,
    last_poll_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    recent: VecDeque<CycleReport>,
}

/// Point-in-time view returned by `SentimentBot::get_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub is_running: bool,
    pub poll_interval: u64,
    pub total_polls: u64,
    pub total_errors: u64,
    pub total_signals: u64,
    pub total_actionable: u64,
    pub total_alerts: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Oldest first.
    pub recent_cycles: Vec<CycleReport>,
}

#[derive(Debug)]
pub struct BotStats {
    inner: Mutex<Totals>,
    cap: usize,
}

impl BotStats {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Totals::default()),
            cap: cap.clamp(1, 1_000),
        }
    }

    fn with_totals<R>(&self, f: impl FnOnce(&mut Totals) -> R) -> R {
        match self.inner.lock() {
            Ok(mut t) => f(&mut t),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        let cap = self.cap;
        self.with_totals(|t| {
            t.total_polls += 1;
            t.total_signals += report.analyzed as u64;
            t.total_actionable += report.actionable as u64;
            t.total_alerts += report.alerts_sent as u64;
            t.last_poll_at = Some(Utc::now());
            // a clean cycle clears the error; `last_error_at` keeps when it last happened
            t.last_error = None;
            t.recent.push_back(report.clone());
            while t.recent.len() > cap {
                t.recent.pop_front();
            }
        });
    }

    pub fn record_error(&self, message: &str) {
        self.with_totals(|t| {
            t.total_polls += 1;
            t.total_errors += 1;
            t.last_error = Some(message.to_string());
            t.last_error_at = Some(Utc::now());
        });
    }

    pub fn last_error(&self) -> Option<String> {
        self.with_totals(|t| t.last_error.clone())
    }

    pub fn snapshot(&self, is_running: bool, poll_interval: u64) -> StatsSnapshot {
        self.with_totals(|t| StatsSnapshot {
            is_running,
            poll_interval,
            total_polls: t.total_polls,
            total_errors: t.total_errors,
            total_signals: t.total_signals,
            total_actionable: t.total_actionable,
            total_alerts: t.total_alerts,
            last_poll_at: t.last_poll_at,
            last_error: t.last_error.clone(),
            last_error_at: t.last_error_at,
            recent_cycles: t.recent.iter().cloned().collect(),
        })
    }
}

impl Default for BotStats {
    fn default() -> Self {
        Self::with_capacity(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate_and_history_is_capped() {
        let stats = BotStats::with_capacity(2);
        for i in 0..3 {
            stats.record_cycle(&CycleReport {
                analyzed: 2,
                actionable: 1,
                alerts_sent: i % 2,
                ..CycleReport::default()
            });
        }
        stats.record_error("boom");
        let s = stats.snapshot(true, 300);
        assert_eq!(s.total_polls, 4);
        assert_eq!(s.total_errors, 1);
        assert_eq!(s.total_signals, 6);
        assert_eq!(s.total_actionable, 3);
        assert_eq!(s.total_alerts, 1);
        assert_eq!(s.recent_cycles.len(), 2);
        assert_eq!(s.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn successful_cycle_clears_last_error() {
        let stats = BotStats::default();
        stats.record_error("database is locked");
        assert_eq!(stats.last_error().as_deref(), Some("database is locked"));

        stats.record_cycle(&CycleReport::default());
        let s = stats.snapshot(true, 300);
        assert_eq!(s.last_error, None);
        assert!(s.last_error_at.is_some());
        assert_eq!(s.total_errors, 1);
        assert_eq!(s.total_polls, 2);
    }
}
