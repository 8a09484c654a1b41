use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::embed::{self, truncate_chars, DiscordEmbed, MAX_CONTENT, MAX_EMBEDS_PER_MESSAGE};
use super::{Notifier, SentimentSummary};
use crate::analyze::signal::SentimentSignal;
use crate::config::bot::validate_webhook_url;
use crate::error::ConfigError;
use crate::http::{client_with_timeout, send_with_retry, RetryPolicy};
use crate::throttle::Throttle;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Minimum spacing between webhook calls.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(2);
/// Used when a 429 body carries no `retry_after`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct WebhookPayload {
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embeds: Option<Vec<DiscordEmbed>>,
}

/// Discord webhook client.
pub struct DiscordWebhook {
    webhook: String,
    bot_name: String,
    avatar_url: Option<String>,
    client: Client,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl DiscordWebhook {
    pub fn new(webhook: impl Into<String>, bot_name: impl Into<String>) -> Result<Self, ConfigError> {
        let webhook = webhook.into();
        if webhook.trim().is_empty() {
            return Err(ConfigError::Missing("DISCORD_WEBHOOK_URL"));
        }
        validate_webhook_url(&webhook)?;
        let client = client_with_timeout(REQUEST_TIMEOUT).map_err(|e| ConfigError::Invalid {
            var: "DISCORD_WEBHOOK_URL",
            reason: e.to_string(),
        })?;
        Ok(Self {
            webhook,
            bot_name: bot_name.into(),
            avatar_url: None,
            client,
            throttle: Throttle::new(MIN_REQUEST_INTERVAL),
            retry: RetryPolicy::new(4, Duration::from_secs(1)).without_rate_limit_retry(),
        })
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.throttle = Throttle::new(interval);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry.without_rate_limit_retry();
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    fn payload(&self, content: Option<String>, embeds: Option<Vec<DiscordEmbed>>) -> WebhookPayload {
        WebhookPayload {
            username: self.bot_name.clone(),
            avatar_url: self.avatar_url.clone(),
            content,
            embeds,
        }
    }

    async fn send_once(&self, payload: &WebhookPayload) -> anyhow::Result<reqwest::Response> {
        send_with_retry(self.retry, || self.client.post(&self.webhook).json(payload)).await
    }

    /// POST with spacing; a 429 sleeps `retry_after` and retries exactly once.
    async fn post(&self, payload: &WebhookPayload) -> bool {
        self.throttle.wait().await;

        let mut rsp = match self.send_once(payload).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = ?e, "discord webhook request failed");
                return false;
            }
        };

        if rsp.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(rsp).await;
            tracing::warn!(wait_ms = wait.as_millis() as u64, "discord rate limited, waiting");
            tokio::time::sleep(wait).await;
            rsp = match self.send_once(payload).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = ?e, "discord webhook retry failed");
                    return false;
                }
            };
        }

        if let Err(e) = rsp.error_for_status_ref() {
            tracing::error!(error = %e, "discord webhook http error");
            return false;
        }
        true
    }

    async fn send_embeds(&self, embeds: Vec<DiscordEmbed>) -> bool {
        if embeds.is_empty() {
            return true;
        }
        let embeds = embeds.into_iter().take(MAX_EMBEDS_PER_MESSAGE).collect();
        self.post(&self.payload(None, Some(embeds))).await
    }

    /// Plain text message, truncated to the content limit.
    pub async fn send_message(&self, content: &str) -> bool {
        self.post(&self.payload(Some(truncate_chars(content, MAX_CONTENT)), None))
            .await
    }
}

async fn retry_after(rsp: reqwest::Response) -> Duration {
    let secs = rsp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()))
        .filter(|s| s.is_finite() && *s >= 0.0);
    match secs {
        Some(s) => Duration::from_secs_f64(s).min(MAX_RETRY_AFTER),
        None => DEFAULT_RETRY_AFTER,
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    fn channel(&self) -> &'static str {
        "discord"
    }

    async fn send_signal_alert(&self, signal: &SentimentSignal, url: Option<&str>) -> bool {
        let ok = self
            .send_embeds(vec![embed::alert_embed(signal, url, &self.bot_name)])
            .await;
        if ok {
            counter!("sentiment_alerts_sent_total").increment(1);
        } else {
            counter!("sentiment_alert_failures_total").increment(1);
        }
        ok
    }

    async fn deliver_batch(
        &self,
        signals: &[SentimentSignal],
        urls: &HashMap<String, String>,
    ) -> Vec<String> {
        let mut delivered = Vec::with_capacity(signals.len());
        for chunk in signals.chunks(MAX_EMBEDS_PER_MESSAGE) {
            let embeds = chunk
                .iter()
                .map(|s| embed::batch_embed(s, urls.get(&s.news_id).map(String::as_str)))
                .collect();
            if self.send_embeds(embeds).await {
                counter!("sentiment_alerts_sent_total").increment(chunk.len() as u64);
                delivered.extend(chunk.iter().map(|s| s.news_id.clone()));
            } else {
                counter!("sentiment_alert_failures_total").increment(chunk.len() as u64);
            }
        }
        tracing::info!(sent = delivered.len(), total = signals.len(), "sent alerts to discord");
        delivered
    }

    async fn send_summary(&self, summary: &SentimentSummary) -> bool {
        if summary.total() == 0 {
            return true;
        }
        self.send_embeds(vec![embed::summary_embed(summary, &self.bot_name)])
            .await
    }

    async fn send_error(&self, message: &str) -> bool {
        self.send_embeds(vec![embed::error_embed(message)]).await
    }

    async fn send_startup(&self) -> bool {
        self.send_embeds(vec![embed::startup_embed(&self.bot_name)]).await
    }

    async fn send_shutdown(&self) -> bool {
        self.send_embeds(vec![embed::shutdown_embed(&self.bot_name)]).await
    }

    async fn test_connection(&self) -> bool {
        self.send_message("🔧 Webhook test successful!").await
    }
}
