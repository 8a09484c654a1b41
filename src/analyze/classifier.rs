// src/analyze/classifier.rs
use std::time::Duration;

use metrics::counter;

use crate::analyze::ai_adapter::DynLlm;
use crate::analyze::parse::{parse_batch, parse_single};
use crate::analyze::signal::SentimentSignal;
use crate::ingest::types::NewsItem;
use crate::throttle::Throttle;

pub const MAX_BATCH_SIZE: usize = 10;
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

pub const SYSTEM_PROMPT: &str = "You are a crypto market sentiment analyzer. Analyze news headlines for their potential impact on cryptocurrency prices.

For each headline, provide:
1. sentiment: very_bullish, bullish, neutral, bearish, or very_bearish
2. confidence: 0.0 to 1.0 (how certain you are)
3. signal_strength: strong, moderate, weak, or none
4. price_impact: up, down, or neutral
5. timeframe: immediate (hours), short_term (days), or long_term (weeks+)
6. reasoning: Brief 1-sentence explanation

Consider:
- Regulatory news (SEC, legal) - usually high impact
- Exchange listings/delistings - moderate to high impact
- Partnership announcements - varies by partner significance
- Technical updates/upgrades - usually positive
- Security breaches/hacks - very negative
- Whale movements - short-term impact
- Macroeconomic factors - broad market impact

Be conservative with \"strong\" signals - only major events warrant them.
Return valid JSON only, no markdown.";

/// LLM-backed headline classifier with client-side request spacing.
pub struct SentimentClassifier {
    llm: DynLlm,
    throttle: Throttle,
}

impl SentimentClassifier {
    pub fn new(llm: DynLlm) -> Self {
        Self::with_min_interval(llm, MIN_REQUEST_INTERVAL)
    }

    pub fn with_min_interval(llm: DynLlm, min_interval: Duration) -> Self {
        Self {
            llm,
            throttle: Throttle::new(min_interval),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.llm.provider_name()
    }

    async fn call(&self, prompt: &str) -> anyhow::Result<String> {
        self.throttle.wait().await;
        self.llm.complete(SYSTEM_PROMPT, prompt).await
    }

    /// Classify one item. `None` when the model call or its reply is unusable.
    pub async fn analyze_single(&self, item: &NewsItem) -> Option<SentimentSignal> {
        let reply = match self.call(&single_prompt(item)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(news_id = %item.id, error = ?e, "classifier call failed");
                return None;
            }
        };
        match parse_single(&reply) {
            Ok(raw) => Some(raw.into_signal(item)),
            Err(e) => {
                tracing::warn!(news_id = %item.id, error = ?e, "classifier reply unparseable");
                None
            }
        }
    }

    /// Classify in chunks of ten. Failed chunks (and unusable elements) fall back to
    /// per-item analysis; items that still fail are dropped.
    pub async fn analyze_batch(&self, items: &[NewsItem]) -> Vec<SentimentSignal> {
        let mut out = Vec::with_capacity(items.len());
        for chunk in items.chunks(MAX_BATCH_SIZE) {
            let parsed = match self.call(&batch_prompt(chunk)).await {
                Ok(reply) => parse_batch(&reply),
                Err(e) => Err(e),
            };
            let parsed = match parsed {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(size = chunk.len(), error = ?e, "batch classification failed, falling back to individual");
                    counter!("sentiment_classifier_fallbacks_total").increment(chunk.len() as u64);
                    Vec::new()
                }
            };

            let mut slots = parsed.into_iter();
            for item in chunk {
                match slots.next().flatten() {
                    Some(raw) => out.push(raw.into_signal(item)),
                    None => {
                        if let Some(s) = self.analyze_single(item).await {
                            out.push(s);
                        }
                    }
                }
            }
        }
        tracing::info!(analyzed = out.len(), total = items.len(), "classified news batch");
        out
    }

    /// Classify and keep only actionable signals.
    pub async fn actionable_signals(&self, items: &[NewsItem]) -> Vec<SentimentSignal> {
        let all = self.analyze_batch(items).await;
        all.into_iter().filter(|s| s.is_actionable()).collect()
    }
}

fn single_prompt(item: &NewsItem) -> String {
    let assets = if item.currencies.is_empty() {
        "None specified".to_string()
    } else {
        item.currencies.join(", ")
    };
    format!(
        "Analyze this crypto news headline:\n\nTitle: {}\nSource: {}\nAssets mentioned: {}\nPublished: {}\n\nReturn JSON with: sentiment, confidence, signal_strength, price_impact, timeframe, reasoning",
        item.title,
        item.source_name,
        assets,
        item.published_at.to_rfc3339()
    )
}

fn batch_prompt(chunk: &[NewsItem]) -> String {
    let headlines = chunk
        .iter()
        .enumerate()
        .map(|(i, it)| {
            let tag = if it.currencies.is_empty() {
                "CRYPTO".to_string()
            } else {
                it.currencies.join(", ")
            };
            format!("{}. [{}] {}", i + 1, tag, it.title)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Analyze these {} crypto news headlines for market sentiment.\n\nHeadlines:\n{}\n\nReturn a JSON array with one object per headline, in the same order, each containing:\nsentiment, confidence, signal_strength, price_impact, timeframe, reasoning\n\nExample format:\n[\n  {{\"sentiment\": \"bullish\", \"confidence\": 0.8, \"signal_strength\": \"moderate\", \"price_impact\": \"up\", \"timeframe\": \"short_term\", \"reasoning\": \"...\"}},\n  ...\n]",
        chunk.len(),
        headlines
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::ScriptedLlm;
    use crate::analyze::signal::SentimentLevel;
    use crate::ingest::types::NewsSourceKind;
    use chrono::Utc;
    use std::sync::Arc;

    fn items(n: usize) -> Vec<NewsItem> {
        (0..n)
            .map(|i| {
                NewsItem::new(
                    format!("headline {i}"),
                    format!("https://n.test/{i}"),
                    NewsSourceKind::Cryptonews,
                    "src",
                    Utc::now(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn batch_prompt_lists_every_headline() {
        let p = batch_prompt(&items(3));
        assert!(p.contains("Analyze these 3 crypto news headlines"));
        assert!(p.contains("3. [CRYPTO] headline 2"));
    }

    #[tokio::test]
    async fn short_array_falls_back_for_missing_items() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_reply(r#"[{"sentiment": "bullish", "confidence": 0.9, "signal_strength": "strong"}]"#)
                .then_reply(r#"{"sentiment": "bearish"}"#),
        );
        let c = SentimentClassifier::with_min_interval(llm.clone(), Duration::ZERO);
        let out = c.analyze_batch(&items(2)).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sentiment, SentimentLevel::Bullish);
        assert_eq!(out[1].sentiment, SentimentLevel::Bearish);
        assert_eq!(llm.calls(), 2);
    }
}
