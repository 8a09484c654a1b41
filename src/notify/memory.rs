use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Notifier, SentimentSummary};
use crate::analyze::signal::SentimentSignal;

/// What a `MemoryNotifier` was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifierEvent {
    Alert { news_id: String, url: Option<String> },
    Batch { news_ids: Vec<String> },
    Summary(SentimentSummary),
    Error(String),
    Startup,
    Shutdown,
    Test,
}

/// Records every call instead of delivering it. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<NotifierEvent>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send is recorded but reported as failed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<NotifierEvent> {
        match self.events.lock() {
            Ok(e) => e.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// News ids delivered through alerts or batches, in order.
    pub fn alerted_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .flat_map(|e| match e {
                NotifierEvent::Alert { news_id, .. } => vec![news_id],
                NotifierEvent::Batch { news_ids } => news_ids,
                _ => vec![],
            })
            .collect()
    }

    fn record(&self, e: NotifierEvent) -> bool {
        match self.events.lock() {
            Ok(mut v) => v.push(e),
            Err(poisoned) => poisoned.into_inner().push(e),
        }
        !self.failing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    fn channel(&self) -> &'static str {
        "memory"
    }

    async fn send_signal_alert(&self, signal: &SentimentSignal, url: Option<&str>) -> bool {
        self.record(NotifierEvent::Alert {
            news_id: signal.news_id.clone(),
            url: url.map(str::to_string),
        })
    }

    async fn deliver_batch(
        &self,
        signals: &[SentimentSignal],
        _urls: &HashMap<String, String>,
    ) -> Vec<String> {
        if signals.is_empty() {
            return Vec::new();
        }
        let ids: Vec<String> = signals.iter().map(|s| s.news_id.clone()).collect();
        if self.record(NotifierEvent::Batch { news_ids: ids.clone() }) {
            ids
        } else {
            Vec::new()
        }
    }

    async fn send_summary(&self, summary: &SentimentSummary) -> bool {
        self.record(NotifierEvent::Summary(summary.clone()))
    }

    async fn send_error(&self, message: &str) -> bool {
        self.record(NotifierEvent::Error(message.to_string()))
    }

    async fn send_startup(&self) -> bool {
        self.record(NotifierEvent::Startup)
    }

    async fn send_shutdown(&self) -> bool {
        self.record(NotifierEvent::Shutdown)
    }

    async fn test_connection(&self) -> bool {
        self.record(NotifierEvent::Test)
    }
}
