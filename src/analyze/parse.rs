// src/analyze/parse.rs
//! Decoding of model replies into strongly-typed classifications.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::analyze::signal::{PriceImpact, SentimentLevel, SentimentSignal, SignalStrength, Timeframe};
use crate::ingest::types::NewsItem;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Loose intermediate form: every field optional, any JSON type accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClassification {
    #[serde(default)]
    pub sentiment: Value,
    #[serde(default)]
    pub confidence: Value,
    #[serde(default)]
    pub signal_strength: Value,
    #[serde(default)]
    pub price_impact: Value,
    #[serde(default)]
    pub timeframe: Value,
    #[serde(default)]
    pub reasoning: Value,
    #[serde(default)]
    pub assets: Value,
}

fn label(v: &Value) -> &str {
    v.as_str().unwrap_or_default()
}

/// Number or numeric string, clamped to [0, 1]; anything else is 0.5.
pub fn confidence_from(v: &Value) -> f64 {
    let raw = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

impl RawClassification {
    /// Apply defaults and bind to the item. Item currencies win over model-reported assets.
    pub fn into_signal(self, item: &NewsItem) -> SentimentSignal {
        let assets = if item.currencies.is_empty() {
            match &self.assets {
                Value::Array(a) => a
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
                _ => Vec::new(),
            }
        } else {
            item.currencies.clone()
        };

        SentimentSignal {
            news_id: item.id.clone(),
            title: item.title.clone(),
            sentiment: SentimentLevel::from_label(label(&self.sentiment)),
            confidence: confidence_from(&self.confidence),
            signal_strength: SignalStrength::from_label(label(&self.signal_strength)),
            price_impact: PriceImpact::from_label(label(&self.price_impact)),
            timeframe: Timeframe::from_label(label(&self.timeframe)),
            reasoning: label(&self.reasoning).trim().to_string(),
            assets,
            analyzed_at: Utc::now(),
        }
    }
}

/// Remove a surrounding ``` / ```json fence if present.
pub fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").or_else(|| rest.strip_prefix("JSON")).unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Parse a single-object reply.
pub fn parse_single(reply: &str) -> Result<RawClassification> {
    let body = strip_code_fence(reply);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        // Some replies wrap the object in prose
        Err(e) => match (body.find('{'), body.rfind('}')) {
            (Some(a), Some(b)) if a < b => {
                serde_json::from_str(&body[a..=b]).context("parsing embedded classification object")?
            }
            _ => return Err(e).context("parsing classification object"),
        },
    };
    if !value.is_object() {
        bail!("classification reply is not a JSON object");
    }
    serde_json::from_value(value).context("decoding classification object")
}

/// Parse a batch reply. Non-object elements come back as `None` so the caller can
/// retry just those items.
pub fn parse_batch(reply: &str) -> Result<Vec<Option<RawClassification>>> {
    let body = strip_code_fence(reply);
    let value: Value = serde_json::from_str(body).context("parsing batch classification reply")?;
    let Value::Array(items) = value else {
        bail!("batch classification reply is not a JSON array");
    };
    Ok(items
        .into_iter()
        .map(|v| {
            if v.is_object() {
                serde_json::from_value(v).ok()
            } else {
                None
            }
        })
        .collect())
}
