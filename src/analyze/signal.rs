// src/analyze/signal.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum confidence for an alert.
pub const ACTIONABLE_MIN_CONFIDENCE: f64 = 0.6;

/// Five-point market sentiment, ordered bearish → bullish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLevel {
    VeryBearish,
    Bearish,
    Neutral,
    Bullish,
    VeryBullish,
}

impl SentimentLevel {
    pub const ALL: [SentimentLevel; 5] = [
        SentimentLevel::VeryBullish,
        SentimentLevel::Bullish,
        SentimentLevel::Neutral,
        SentimentLevel::Bearish,
        SentimentLevel::VeryBearish,
    ];

    /// Unknown labels fall back to `Neutral`.
    pub fn from_label(s: &str) -> Self {
        Self::parse(s).unwrap_or(SentimentLevel::Neutral)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "very_bullish" => Some(Self::VeryBullish),
            "bullish" => Some(Self::Bullish),
            "neutral" => Some(Self::Neutral),
            "bearish" => Some(Self::Bearish),
            "very_bearish" => Some(Self::VeryBearish),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryBullish => "very_bullish",
            Self::Bullish => "bullish",
            Self::Neutral => "neutral",
            Self::Bearish => "bearish",
            Self::VeryBearish => "very_bearish",
        }
    }

    /// -2 ..= 2
    pub fn score(&self) -> i8 {
        match self {
            Self::VeryBearish => -2,
            Self::Bearish => -1,
            Self::Neutral => 0,
            Self::Bullish => 1,
            Self::VeryBullish => 2,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.score() > 0
    }

    pub fn is_bearish(&self) -> bool {
        self.score() < 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Strong,
    Moderate,
    Weak,
    None,
}

impl SignalStrength {
    /// Unknown labels fall back to `None`.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strong" => Self::Strong,
            "moderate" => Self::Moderate,
            "weak" => Self::Weak,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceImpact {
    Up,
    Down,
    Neutral,
}

impl PriceImpact {
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Self::Up,
            "down" => Self::Down,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Immediate,
    ShortTerm,
    LongTerm,
}

impl Timeframe {
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "immediate" => Self::Immediate,
            "long_term" => Self::LongTerm,
            _ => Self::ShortTerm,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
        }
    }
}

macro_rules! display_via_as_str {
    ($($t:ty),*) => {$(
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )*};
}
display_via_as_str!(SentimentLevel, SignalStrength, PriceImpact, Timeframe);

/// Alert gate: strong/moderate strength, confidence ≥ 0.6, and not neutral.
pub fn is_actionable(strength: SignalStrength, confidence: f64, sentiment: SentimentLevel) -> bool {
    matches!(strength, SignalStrength::Strong | SignalStrength::Moderate)
        && confidence >= ACTIONABLE_MIN_CONFIDENCE
        && sentiment != SentimentLevel::Neutral
}

/// Classification of one news item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub news_id: String,
    /// Headline, carried along for alert formatting.
    pub title: String,
    pub sentiment: SentimentLevel,
    /// Always within [0, 1].
    pub confidence: f64,
    pub signal_strength: SignalStrength,
    pub price_impact: PriceImpact,
    pub timeframe: Timeframe,
    pub reasoning: String,
    pub assets: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl SentimentSignal {
    pub fn is_actionable(&self) -> bool {
        is_actionable(self.signal_strength, self.confidence, self.sentiment)
    }
}
