//! One poll cycle: fetch → drop known → classify → persist → alert → mark sent.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use crate::analyze::classifier::SentimentClassifier;
use crate::analyze::signal::SentimentSignal;
use crate::ingest::NewsAggregator;
use crate::notify::Notifier;
use crate::store::SignalStore;

/// Outcome of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Items returned by the aggregator.
    pub fetched: usize,
    /// Items not yet in the store.
    pub new_items: usize,
    pub analyzed: usize,
    pub actionable: usize,
    pub alerts_sent: usize,
    pub alert_failures: usize,
}

pub struct PollPipeline {
    aggregator: Arc<NewsAggregator>,
    classifier: Arc<SentimentClassifier>,
    notifier: Arc<dyn Notifier>,
    limit_per_source: usize,
}

impl PollPipeline {
    pub fn new(
        aggregator: Arc<NewsAggregator>,
        classifier: Arc<SentimentClassifier>,
        notifier: Arc<dyn Notifier>,
        limit_per_source: usize,
    ) -> Self {
        Self {
            aggregator,
            classifier,
            notifier,
            limit_per_source: limit_per_source.max(1),
        }
    }

    pub fn aggregator(&self) -> &Arc<NewsAggregator> {
        &self.aggregator
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Run one cycle against `store`. Persistence errors propagate; source, model and
    /// delivery failures are absorbed by the stages themselves.
    pub async fn run_cycle(&self, store: &SignalStore) -> Result<CycleReport> {
        let started = Utc::now();
        let t0 = std::time::Instant::now();
        let mut report = CycleReport {
            started_at: Some(started),
            ..CycleReport::default()
        };

        let items = self.aggregator.fetch_all(self.limit_per_source).await;
        report.fetched = items.len();

        let mut fresh = Vec::with_capacity(items.len());
        for item in items {
            if !store.news_exists(&item.id).context("checking known news")? {
                fresh.push(item);
            }
        }
        report.new_items = fresh.len();
        if fresh.is_empty() {
            tracing::debug!(fetched = report.fetched, "no new news this cycle");
            report.duration_ms = t0.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let signals = self.classifier.analyze_batch(&fresh).await;
        report.analyzed = signals.len();

        let records = store
            .save_cycle(&fresh, &signals)
            .context("persisting news and signals")?;
        counter!("sentiment_signals_total").increment(records.len() as u64);

        let record_ids: HashMap<&str, i64> = records
            .iter()
            .filter(|r| r.is_actionable && !r.alert_sent)
            .map(|r| (r.news_id.as_str(), r.id))
            .collect();
        let actionable: Vec<SentimentSignal> = signals
            .into_iter()
            .filter(|s| record_ids.contains_key(s.news_id.as_str()))
            .collect();
        report.actionable = actionable.len();
        counter!("sentiment_actionable_total").increment(actionable.len() as u64);

        if !actionable.is_empty() {
            let urls: HashMap<String, String> = fresh
                .iter()
                .map(|it| (it.id.clone(), it.url.clone()))
                .collect();
            let delivered = self.notifier.deliver_batch(&actionable, &urls).await;
            let ids: Vec<i64> = delivered
                .iter()
                .filter_map(|news_id| record_ids.get(news_id.as_str()).copied())
                .collect();
            store
                .mark_alerts_sent(&ids, self.notifier.channel())
                .context("marking alerts sent")?;
            report.alerts_sent = ids.len();
            report.alert_failures = actionable.len() - ids.len();
        }

        report.duration_ms = t0.elapsed().as_millis() as u64;
        tracing::info!(
            fetched = report.fetched,
            new = report.new_items,
            analyzed = report.analyzed,
            actionable = report.actionable,
            alerts = report.alerts_sent,
            "poll cycle complete"
        );
        Ok(report)
    }
}
