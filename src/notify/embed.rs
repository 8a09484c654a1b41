// src/notify/embed.rs
//! Discord embed model and the alert/summary/lifecycle layouts, with channel limits applied.

use chrono::Utc;
use serde::Serialize;

use crate::analyze::signal::{SentimentLevel, SentimentSignal, SignalStrength};
use crate::notify::{Mood, SentimentSummary};

pub const MAX_TITLE: usize = 256;
pub const MAX_DESCRIPTION: usize = 4096;
pub const MAX_FIELDS: usize = 25;
pub const MAX_FIELD_NAME: usize = 256;
pub const MAX_FIELD_VALUE: usize = 1024;
pub const MAX_FOOTER: usize = 2048;
pub const MAX_CONTENT: usize = 2000;
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

const COLOR_ERROR: u32 = 0xFF6B6B;
const COLOR_ONLINE: u32 = 0x00BFFF;
const COLOR_OFFLINE: u32 = 0x808080;

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: &str, value: &str, inline: bool) -> Self {
        Self {
            name: truncate_chars(name, MAX_FIELD_NAME),
            value: truncate_chars(value, MAX_FIELD_VALUE),
            inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DiscordEmbed {
    pub fn new(title: &str, description: &str, color: u32) -> Self {
        Self {
            title: truncate_chars(title, MAX_TITLE),
            description: truncate_chars(description, MAX_DESCRIPTION),
            color,
            fields: Vec::new(),
            footer: None,
            timestamp: None,
            url: None,
        }
    }

    /// Fields past the 25th are dropped.
    pub fn field(mut self, name: &str, value: &str, inline: bool) -> Self {
        if self.fields.len() < MAX_FIELDS {
            self.fields.push(EmbedField::new(name, value, inline));
        }
        self
    }

    pub fn footer(mut self, text: &str) -> Self {
        self.footer = Some(EmbedFooter {
            text: truncate_chars(text, MAX_FOOTER),
        });
        self
    }

    pub fn timestamp_now(mut self) -> Self {
        self.timestamp = Some(Utc::now().to_rfc3339());
        self
    }

    pub fn url(mut self, url: Option<&str>) -> Self {
        self.url = url.filter(|u| !u.trim().is_empty()).map(str::to_string);
        self
    }
}

pub fn color_for(level: SentimentLevel) -> u32 {
    match level {
        SentimentLevel::VeryBullish => 0x00FF00,
        SentimentLevel::Bullish => 0x90EE90,
        SentimentLevel::Neutral => 0x808080,
        SentimentLevel::Bearish => 0xFFA500,
        SentimentLevel::VeryBearish => 0xFF0000,
    }
}

pub fn sentiment_emoji(level: SentimentLevel) -> &'static str {
    match level {
        SentimentLevel::VeryBullish => "🚀",
        SentimentLevel::Bullish => "📈",
        SentimentLevel::Neutral => "➖",
        SentimentLevel::Bearish => "📉",
        SentimentLevel::VeryBearish => "💀",
    }
}

pub fn strength_emoji(strength: SignalStrength) -> &'static str {
    match strength {
        SignalStrength::Strong => "⚡",
        SignalStrength::Moderate => "📊",
        SignalStrength::Weak => "💤",
        SignalStrength::None => "—",
    }
}

fn headline_title(s: &SentimentSignal) -> String {
    let mut title = format!(
        "{} {}",
        sentiment_emoji(s.sentiment),
        s.sentiment.as_str().replace('_', " ").to_uppercase()
    );
    if matches!(s.signal_strength, SignalStrength::Strong | SignalStrength::Moderate) {
        title.push(' ');
        title.push_str(strength_emoji(s.signal_strength));
    }
    title
}

fn assets_label(s: &SentimentSignal, empty: &str) -> String {
    if s.assets.is_empty() {
        empty.to_string()
    } else {
        s.assets.join(", ")
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        Some(f) => f.to_uppercase().chain(c).collect(),
        None => String::new(),
    }
}

/// Full single-alert layout.
pub fn alert_embed(s: &SentimentSignal, url: Option<&str>, footer: &str) -> DiscordEmbed {
    let reasoning = if s.reasoning.is_empty() {
        "No analysis provided"
    } else {
        s.reasoning.as_str()
    };
    let mut embed = DiscordEmbed::new(&headline_title(s), &format!("**{}**", s.title), color_for(s.sentiment))
        .field("Assets", &assets_label(s, "General Crypto"), true)
        .field("Confidence", &format!("{}%", (s.confidence * 100.0) as u32), true)
        .field("Signal", &capitalize(s.signal_strength.as_str()), true)
        .field(
            "Price Impact",
            &format!(
                "{} ({})",
                s.price_impact.as_str().to_uppercase(),
                s.timeframe.as_str().replace('_', " ")
            ),
            true,
        )
        .field("Analysis", reasoning, false)
        .footer(footer)
        .url(url);
    embed.timestamp = Some(s.analyzed_at.to_rfc3339());
    embed
}

/// Compact layout used when several alerts share one message.
pub fn batch_embed(s: &SentimentSignal, url: Option<&str>) -> DiscordEmbed {
    let description = format!(
        "**{}**\n\n{}",
        truncate_chars(&s.title, 200),
        truncate_chars(&s.reasoning, 500)
    );
    DiscordEmbed::new(&headline_title(s), &description, color_for(s.sentiment))
        .field("Assets", &assets_label(s, "Crypto"), true)
        .field("Confidence", &format!("{}%", (s.confidence * 100.0) as u32), true)
        .field("Impact", &s.price_impact.as_str().to_uppercase(), true)
        .url(url)
}

pub fn summary_embed(summary: &SentimentSummary, footer: &str) -> DiscordEmbed {
    let (color, overall) = match summary.mood() {
        Mood::Bullish => (color_for(SentimentLevel::Bullish), "📈 Bullish"),
        Mood::Bearish => (color_for(SentimentLevel::Bearish), "📉 Bearish"),
        Mood::Mixed => (color_for(SentimentLevel::Neutral), "➖ Mixed"),
    };
    let mut description = format!(
        "**Overall Sentiment:** {overall}\n\n🟢 Bullish: {}\n🔴 Bearish: {}\n⚪ Neutral: {}\n",
        summary.bullish, summary.bearish, summary.neutral
    );
    if !summary.top_assets.is_empty() {
        let assets = summary
            .top_assets
            .iter()
            .take(5)
            .map(|(a, c)| format!("**{a}** ({c})"))
            .collect::<Vec<_>>()
            .join(", ");
        description.push_str(&format!("\n**Trending Assets:** {assets}"));
    }
    DiscordEmbed::new(
        &format!("📊 Sentiment Summary | {}", summary.period),
        &description,
        color,
    )
    .footer(footer)
    .timestamp_now()
}

pub fn error_embed(message: &str) -> DiscordEmbed {
    DiscordEmbed::new(
        "⚠️ Sentiment Bot Error",
        &format!("```\n{}\n```", truncate_chars(message, 3000)),
        COLOR_ERROR,
    )
    .footer("Check logs for details")
    .timestamp_now()
}

pub fn startup_embed(footer: &str) -> DiscordEmbed {
    DiscordEmbed::new(
        "🤖 Sentiment Bot Online",
        "Monitoring crypto news for trading signals...",
        COLOR_ONLINE,
    )
    .field(
        "Features",
        "• Real-time news monitoring\n• AI sentiment analysis\n• Actionable trading signals",
        false,
    )
    .footer(footer)
    .timestamp_now()
}

pub fn shutdown_embed(footer: &str) -> DiscordEmbed {
    DiscordEmbed::new(
        "🔴 Sentiment Bot Offline",
        "Bot has been stopped. No more alerts will be sent.",
        COLOR_OFFLINE,
    )
    .footer(footer)
    .timestamp_now()
}
