//! Crypto Sentiment Bot: binary entrypoint
//! Loads configuration, wires the bot, and serves the control API plus `/metrics`.

use crypto_sentiment_bot::config::{AssetUniverse, BotConfig};
use crypto_sentiment_bot::metrics::Metrics;
use crypto_sentiment_bot::{create_router, SentimentBot};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Structured logs to stdout; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crypto_sentiment_bot=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already have installed a subscriber.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = BotConfig::from_env().map_err(anyhow::Error::from)?;
    let universe = AssetUniverse::load_default().map_err(anyhow::Error::from)?;
    let metrics = Metrics::init(config.poll_interval_secs)?;

    let bot = SentimentBot::from_config(&config, universe).map_err(anyhow::Error::from)?;
    if config.autostart {
        match bot.resume_if_enabled().await {
            Ok(true) => tracing::info!("resumed sentiment bot from stored status"),
            Ok(false) => tracing::info!("sentiment bot idle until enabled"),
            Err(e) => tracing::warn!(error = %e, "could not resume sentiment bot"),
        }
    }

    let router = create_router(bot).merge(metrics.router());
    Ok(router.into())
}
