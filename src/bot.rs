//! Poll orchestrator: owns the recurring job and the Stopped/Running lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::analyze::ai_adapter::{AnthropicClient, DynLlm};
use crate::analyze::classifier::SentimentClassifier;
use crate::analyze::signal::{PriceImpact, SentimentLevel, SentimentSignal, SignalStrength, Timeframe};
use crate::config::bot::clamp_poll_interval;
use crate::config::{AssetUniverse, BotConfig};
use crate::error::{BotError, ConfigError};
use crate::ingest::providers::{CryptoCompareSource, CryptoPanicSource, NitterSource};
use crate::ingest::NewsAggregator;
use crate::notify::{DiscordWebhook, Notifier, SentimentSummary};
use crate::pipeline::{CycleReport, PollPipeline};
use crate::stats::{BotStats, StatsSnapshot};
use crate::store::bot_status::BotStatus;
use crate::store::{LazyStore, SignalStore};

const CLEANUP_EVERY: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_ERROR_ALERT_CHARS: usize = 500;

/// Lifecycle knobs that are not part of the pipeline itself.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub owner_key: String,
    pub poll_interval_secs: u64,
    pub retention_days: u32,
    pub announce_lifecycle: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            owner_key: "default".into(),
            poll_interval_secs: crate::config::bot::DEFAULT_POLL_INTERVAL_SECS,
            retention_days: 30,
            announce_lifecycle: true,
        }
    }
}

impl From<&BotConfig> for BotSettings {
    fn from(cfg: &BotConfig) -> Self {
        Self {
            owner_key: cfg.owner_key.clone(),
            poll_interval_secs: cfg.poll_interval_secs,
            retention_days: cfg.retention_days,
            announce_lifecycle: cfg.announce_lifecycle,
        }
    }
}

struct JobHandle {
    stop: oneshot::Sender<()>,
    interval: watch::Sender<u64>,
    task: JoinHandle<()>,
}

struct BotInner {
    owner_key: String,
    retention_days: u32,
    announce: bool,
    store: LazyStore,
    pipeline: PollPipeline,
    stats: BotStats,
    running: AtomicBool,
    poll_interval: AtomicU64,
    /// Guards start/stop transitions.
    lifecycle: Mutex<Option<JobHandle>>,
    /// Held for the duration of a cycle.
    cycle: Mutex<()>,
}

/// The single orchestrator instance, cheap to clone into handlers.
#[derive(Clone)]
pub struct SentimentBot {
    inner: Arc<BotInner>,
}

impl SentimentBot {
    /// Wire the production components. Fails fast on missing credentials.
    pub fn from_config(cfg: &BotConfig, universe: AssetUniverse) -> Result<Self, BotError> {
        let invalid = |var: &'static str| {
            move |e: anyhow::Error| ConfigError::Invalid {
                var,
                reason: format!("{e:#}"),
            }
        };

        let mut aggregator = NewsAggregator::new(universe, cfg.filter_by_assets);
        match cfg.cryptopanic_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                let src = CryptoPanicSource::new(key).map_err(invalid("CRYPTOPANIC_API_KEY"))?;
                aggregator = aggregator.with_source(Arc::new(src));
            }
            _ => tracing::warn!("CRYPTOPANIC_API_KEY not set, primary news source disabled"),
        }
        let secondary = CryptoCompareSource::new().map_err(invalid("http client"))?;
        aggregator = aggregator.with_source(Arc::new(secondary));
        if !cfg.social_accounts.is_empty() {
            let social = NitterSource::new(&cfg.social_accounts, &cfg.social_mirrors)
                .map_err(invalid("SENTIMENT_SOCIAL_ACCOUNTS"))?;
            aggregator = aggregator.with_social(Arc::new(social));
        }

        let llm = AnthropicClient::new(&cfg.anthropic_api_key, cfg.anthropic_model.as_deref())
            .map_err(invalid("ANTHROPIC_API_KEY"))?;
        let llm: DynLlm = Arc::new(llm);
        let notifier = DiscordWebhook::new(&cfg.discord_webhook_url, &cfg.bot_name)?;

        tracing::info!(
            sources = ?aggregator.source_names(),
            model = %cfg.anthropic_model.as_deref().unwrap_or(crate::analyze::ai_adapter::DEFAULT_MODEL),
            db = %cfg.database_path.display(),
            "sentiment bot configured"
        );

        Ok(Self::with_components(
            PollPipeline::new(
                Arc::new(aggregator),
                Arc::new(SentimentClassifier::new(llm)),
                Arc::new(notifier),
                cfg.limit_per_source,
            ),
            LazyStore::at(cfg.database_path.clone()),
            BotSettings::from(cfg),
        ))
    }

    pub fn with_components(pipeline: PollPipeline, store: LazyStore, settings: BotSettings) -> Self {
        Self {
            inner: Arc::new(BotInner {
                owner_key: settings.owner_key.trim().to_lowercase(),
                retention_days: settings.retention_days,
                announce: settings.announce_lifecycle,
                store,
                pipeline,
                stats: BotStats::default(),
                running: AtomicBool::new(false),
                poll_interval: AtomicU64::new(clamp_poll_interval(settings.poll_interval_secs)),
                lifecycle: Mutex::new(None),
                cycle: Mutex::new(()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn poll_interval(&self) -> u64 {
        self.inner.poll_interval.load(Ordering::SeqCst)
    }

    pub fn owner_key(&self) -> &str {
        &self.inner.owner_key
    }

    pub fn aggregator(&self) -> &Arc<NewsAggregator> {
        self.inner.pipeline.aggregator()
    }

    /// Opens the database on first use.
    pub fn store(&self) -> Result<Arc<SignalStore>, BotError> {
        Ok(self.inner.store.get()?)
    }

    /// Stopped → Running. Installs the job, kicks off one detached poll.
    pub async fn start(&self) -> Result<(), BotError> {
        let mut job = self.inner.lifecycle.lock().await;
        if job.is_some() {
            return Err(BotError::AlreadyRunning);
        }

        let store = self.inner.store.get()?;
        let interval = self.poll_interval();
        store.enable(&self.inner.owner_key, interval)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let (interval_tx, interval_rx) = watch::channel(interval);
        let task = tokio::spawn(run_job(self.inner.clone(), interval_rx, stop_rx));
        *job = Some(JobHandle {
            stop: stop_tx,
            interval: interval_tx,
            task,
        });
        self.inner.running.store(true, Ordering::SeqCst);
        drop(job);
        tracing::info!(interval_secs = interval, owner = %self.inner.owner_key, "sentiment bot started");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _cycle = inner.cycle.lock().await;
            let _ = inner.run_cycle_guarded().await;
        });

        if self.inner.announce {
            self.inner.pipeline.notifier().send_startup().await;
        }
        Ok(())
    }

    /// Running → Stopped. A cycle already in progress finishes; no further ticks fire.
    pub async fn stop(&self) -> Result<(), BotError> {
        let mut job = self.inner.lifecycle.lock().await;
        let handle = job.take().ok_or(BotError::NotRunning)?;
        let _ = handle.stop.send(());
        drop(handle.task);
        self.inner.running.store(false, Ordering::SeqCst);
        drop(job);
        tracing::info!(owner = %self.inner.owner_key, "sentiment bot stopped");

        if let Err(e) = self
            .inner
            .store
            .get()
            .and_then(|s| s.disable(&self.inner.owner_key))
        {
            tracing::warn!(error = %e, "failed to persist disabled status");
        }
        if self.inner.announce {
            self.inner.pipeline.notifier().send_shutdown().await;
        }
        Ok(())
    }

    /// Clamp into [60, 3600], persist, and reschedule the live job. Returns the applied value.
    pub async fn set_poll_interval(&self, secs: u64) -> Result<u64, BotError> {
        let secs = clamp_poll_interval(secs);
        let job = self.inner.lifecycle.lock().await;
        self.inner.poll_interval.store(secs, Ordering::SeqCst);
        self.inner
            .store
            .get()?
            .set_poll_interval(&self.inner.owner_key, secs)?;
        if let Some(handle) = job.as_ref() {
            let _ = handle.interval.send(secs);
        }
        tracing::info!(interval_secs = secs, "poll interval updated");
        Ok(secs)
    }

    /// Run one cycle now, waiting for any in-flight cycle first.
    pub async fn poll_now(&self) -> Result<CycleReport, BotError> {
        if !self.is_running() {
            return Err(BotError::NotRunning);
        }
        let _cycle = self.inner.cycle.lock().await;
        self.inner.run_cycle_guarded().await
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot(self.is_running(), self.poll_interval())
    }

    /// Persisted lifecycle row for this bot's owner.
    pub fn status(&self) -> Result<BotStatus, BotError> {
        Ok(self.store()?.get_or_create_status(&self.inner.owner_key)?)
    }

    /// Deliver a canned bullish alert through the live channel.
    pub async fn send_test_alert(&self) -> bool {
        let signal = SentimentSignal {
            news_id: "test-alert".into(),
            title: "Test alert: Bitcoin ETF inflows hit record high".into(),
            sentiment: SentimentLevel::Bullish,
            confidence: 0.85,
            signal_strength: SignalStrength::Strong,
            price_impact: PriceImpact::Up,
            timeframe: Timeframe::ShortTerm,
            reasoning: "This is a test alert to verify the webhook configuration.".into(),
            assets: vec!["BTC".into()],
            analyzed_at: Utc::now(),
        };
        self.inner
            .pipeline
            .notifier()
            .send_signal_alert(&signal, None)
            .await
    }

    pub async fn test_notifier(&self) -> bool {
        self.inner.pipeline.notifier().test_connection().await
    }

    /// Post a digest of the last `hours` of signals.
    pub async fn send_summary(&self, hours: u32) -> Result<bool, BotError> {
        let store = self.store()?;
        let stats = store.get_signal_stats(hours)?;
        let summary = SentimentSummary {
            bullish: stats.bullish(),
            bearish: stats.bearish(),
            neutral: stats.neutral(),
            top_assets: store.top_assets(hours, 5)?,
            period: format!("Last {hours} hours"),
        };
        Ok(self.inner.pipeline.notifier().send_summary(&summary).await)
    }

    /// Start at boot when the stored status says the bot was left enabled.
    pub async fn resume_if_enabled(&self) -> Result<bool, BotError> {
        let store = self.store()?;
        if !store.is_enabled(&self.inner.owner_key)? {
            return Ok(false);
        }
        let status = store.get_or_create_status(&self.inner.owner_key)?;
        self.inner
            .poll_interval
            .store(clamp_poll_interval(status.poll_interval), Ordering::SeqCst);
        match self.start().await {
            Ok(()) => Ok(true),
            Err(BotError::AlreadyRunning) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl BotInner {
    /// One cycle with bookkeeping. Failures land in `last_error` and the alert channel.
    async fn run_cycle_guarded(&self) -> Result<CycleReport, BotError> {
        let t0 = std::time::Instant::now();
        counter!("sentiment_polls_total").increment(1);

        let result = match self.store.get() {
            Ok(store) => self
                .pipeline
                .run_cycle(&store)
                .await
                .map(|report| (store, report)),
            Err(e) => Err(anyhow::Error::new(e).context("opening signal store")),
        };
        histogram!("sentiment_poll_duration_ms").record(t0.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok((store, report)) => {
                self.stats.record_cycle(&report);
                gauge!("sentiment_last_poll_ts").set(Utc::now().timestamp() as f64);
                if let Err(e) = store.record_poll(&self.owner_key) {
                    tracing::warn!(error = %e, "failed to record poll time");
                }
                Ok(report)
            }
            Err(e) => {
                let message = format!("{e:#}");
                counter!("sentiment_poll_errors_total").increment(1);
                tracing::error!(error = %message, "poll cycle failed");
                self.stats.record_error(&message);
                if let Ok(store) = self.store.get() {
                    if let Err(e) = store.record_error(&self.owner_key, &message) {
                        tracing::warn!(error = %e, "failed to record poll error");
                    }
                }
                let alert: String = message.chars().take(MAX_ERROR_ALERT_CHARS).collect();
                self.pipeline
                    .notifier()
                    .send_error(&format!("Poll error: {alert}"))
                    .await;
                Err(BotError::Poll(message))
            }
        }
    }

    fn cleanup_due(&self, last: &mut Option<Instant>) {
        if self.retention_days == 0 {
            return;
        }
        if last.is_some_and(|t| t.elapsed() < CLEANUP_EVERY) {
            return;
        }
        *last = Some(Instant::now());
        match self.store.get() {
            Ok(store) => {
                if let Err(e) = store.cleanup_old_records(self.retention_days) {
                    tracing::warn!(error = %e, "retention cleanup failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "retention cleanup skipped"),
        }
    }
}

fn ticker(secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(secs);
    let mut t = tokio::time::interval_at(Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Skip);
    t
}

async fn run_job(inner: Arc<BotInner>, mut interval_rx: watch::Receiver<u64>, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticks = ticker(*interval_rx.borrow_and_update());
    let mut last_cleanup: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let secs = *interval_rx.borrow_and_update();
                ticks = ticker(secs);
                tracing::debug!(interval_secs = secs, "job rescheduled");
            }
            _ = ticks.tick() => {
                match inner.cycle.try_lock() {
                    Ok(_cycle) => {
                        let _ = inner.run_cycle_guarded().await;
                        inner.cleanup_due(&mut last_cleanup);
                    }
                    Err(_) => {
                        counter!("sentiment_poll_skipped_total").increment(1);
                        tracing::debug!("previous cycle still running, tick skipped");
                    }
                }
            }
        }
    }
    tracing::debug!("poll job exited");
}
