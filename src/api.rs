use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::signal::SentimentLevel;
use crate::bot::SentimentBot;
use crate::error::BotError;
use crate::pipeline::CycleReport;
use crate::stats::StatsSnapshot;
use crate::store::bot_status::BotStatus;
use crate::store::{SignalQuery, SignalRecord, SignalStats};

const MAX_LIST_LIMIT: usize = 500;
const MAX_SUMMARY_HOURS: u32 = 24 * 30;

#[derive(Clone)]
pub struct AppState {
    bot: SentimentBot,
}

/// Control and query routes. `/metrics` is merged separately by the entrypoint.
pub fn create_router(bot: SentimentBot) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/sentiment/status", get(status))
        .route("/api/sentiment/enable", post(enable))
        .route("/api/sentiment/disable", post(disable))
        .route("/api/sentiment/poll", post(poll))
        .route("/api/sentiment/test-alert", post(test_alert))
        .route("/api/sentiment/interval", post(set_interval))
        .route("/api/sentiment/summary", post(summary))
        .route("/api/sentiment/signals", get(signals))
        .route("/api/sentiment/signals/pending", get(pending_signals))
        .route("/api/sentiment/stats", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { bot })
}

pub struct ApiError(BotError);

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BotError::AlreadyRunning | BotError::NotRunning => StatusCode::CONFLICT,
            BotError::Poll(_) => StatusCode::BAD_GATEWAY,
            BotError::Config(_) | BotError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "api request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct StatusOut {
    is_running: bool,
    poll_interval: u64,
    owner_key: String,
    sources: Vec<&'static str>,
    tracked_assets: usize,
    social_accounts: Vec<String>,
    persisted: BotStatus,
    last_error: Option<String>,
}

async fn status(State(state): State<AppState>) -> ApiResult<StatusOut> {
    let bot = &state.bot;
    let agg = bot.aggregator();
    Ok(Json(StatusOut {
        is_running: bot.is_running(),
        poll_interval: bot.poll_interval(),
        owner_key: bot.owner_key().to_string(),
        sources: agg.source_names(),
        tracked_assets: agg.tracked_assets().len(),
        social_accounts: agg.social().map(|s| s.accounts()).unwrap_or_default(),
        persisted: bot.status()?,
        last_error: bot.get_stats().last_error,
    }))
}

#[derive(Serialize)]
struct Ack {
    success: bool,
    message: String,
}

async fn enable(State(state): State<AppState>) -> ApiResult<Ack> {
    state.bot.start().await?;
    Ok(Json(Ack {
        success: true,
        message: format!("Sentiment bot enabled, polling every {}s", state.bot.poll_interval()),
    }))
}

async fn disable(State(state): State<AppState>) -> ApiResult<Ack> {
    state.bot.stop().await?;
    Ok(Json(Ack {
        success: true,
        message: "Sentiment bot disabled".into(),
    }))
}

async fn poll(State(state): State<AppState>) -> ApiResult<CycleReport> {
    Ok(Json(state.bot.poll_now().await?))
}

async fn test_alert(State(state): State<AppState>) -> Json<Ack> {
    let success = state.bot.send_test_alert().await;
    Json(Ack {
        success,
        message: if success {
            "Test alert sent".into()
        } else {
            "Test alert could not be delivered".into()
        },
    })
}

#[derive(Deserialize)]
struct IntervalReq {
    seconds: u64,
}

#[derive(Serialize)]
struct IntervalOut {
    poll_interval: u64,
}

async fn set_interval(
    State(state): State<AppState>,
    Json(req): Json<IntervalReq>,
) -> ApiResult<IntervalOut> {
    let poll_interval = state.bot.set_poll_interval(req.seconds).await?;
    Ok(Json(IntervalOut { poll_interval }))
}

#[derive(Deserialize)]
struct HoursParams {
    hours: Option<u32>,
}

impl HoursParams {
    fn hours(&self) -> u32 {
        self.hours.unwrap_or(24).clamp(1, MAX_SUMMARY_HOURS)
    }
}

async fn summary(State(state): State<AppState>, Query(q): Query<HoursParams>) -> ApiResult<Ack> {
    let hours = q.hours();
    let success = state.bot.send_summary(hours).await?;
    Ok(Json(Ack {
        success,
        message: format!("Summary for the last {hours} hours"),
    }))
}

#[derive(Deserialize)]
struct SignalsParams {
    limit: Option<usize>,
    sentiment: Option<String>,
    asset: Option<String>,
    #[serde(default)]
    actionable: bool,
}

async fn signals(
    State(state): State<AppState>,
    Query(q): Query<SignalsParams>,
) -> ApiResult<Vec<SignalRecord>> {
    let query = SignalQuery {
        limit: q.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT),
        sentiment: q.sentiment.as_deref().and_then(SentimentLevel::parse),
        asset: q.asset.filter(|a| !a.trim().is_empty()),
        actionable_only: q.actionable,
    };
    let store = state.bot.store()?;
    Ok(Json(store.get_recent_signals(&query).map_err(BotError::from)?))
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

async fn pending_signals(
    State(state): State<AppState>,
    Query(q): Query<LimitParams>,
) -> ApiResult<Vec<SignalRecord>> {
    let limit = q.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
    let store = state.bot.store()?;
    Ok(Json(
        store
            .get_unsent_actionable_signals(limit)
            .map_err(BotError::from)?,
    ))
}

#[derive(Serialize)]
struct StatsOut {
    bot: StatsSnapshot,
    signals: SignalStats,
    top_assets: Vec<(String, u64)>,
}

async fn stats(State(state): State<AppState>, Query(q): Query<HoursParams>) -> ApiResult<StatsOut> {
    let hours = q.hours();
    let store = state.bot.store()?;
    Ok(Json(StatsOut {
        bot: state.bot.get_stats(),
        signals: store.get_signal_stats(hours).map_err(BotError::from)?,
        top_assets: store.top_assets(hours, 10).map_err(BotError::from)?,
    }))
}
