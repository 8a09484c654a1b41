// tests/discord_webhook.rs
//
// Discord transport against a local capture server: chunking, 429 handling,
// failure reporting and payload shape.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crypto_sentiment_bot::analyze::signal::{
    PriceImpact, SentimentLevel, SentimentSignal, SignalStrength, Timeframe,
};
use crypto_sentiment_bot::http::RetryPolicy;
use crypto_sentiment_bot::notify::{DiscordWebhook, Notifier, SentimentSummary};

#[derive(Clone, Default)]
struct Capture {
    bodies: Arc<Mutex<Vec<Value>>>,
    calls: Arc<AtomicUsize>,
    /// Respond with this status for the first N calls.
    fail_first: Arc<Mutex<Option<(usize, StatusCode, Value)>>>,
}

async fn hook(State(cap): State<Capture>, Json(body): Json<Value>) -> Response {
    let n = cap.calls.fetch_add(1, Ordering::SeqCst);
    cap.bodies.lock().push(body);
    if let Some((count, status, reply)) = cap.fail_first.lock().clone() {
        if n < count {
            return (status, Json(reply)).into_response();
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn serve(cap: Capture) -> String {
    let app = Router::new()
        .route("/api/webhooks/1/token", post(hook))
        .with_state(cap);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { shuttle_axum::axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/api/webhooks/1/token")
}

fn webhook(url: &str) -> DiscordWebhook {
    DiscordWebhook::new(url, "Sentiment Bot")
        .unwrap()
        .with_min_interval(Duration::ZERO)
        .with_retry(RetryPolicy::new(1, Duration::from_millis(1)))
}

fn signal(i: usize) -> SentimentSignal {
    SentimentSignal {
        news_id: format!("news-{i}"),
        title: format!("Headline number {i}"),
        sentiment: SentimentLevel::Bullish,
        confidence: 0.8,
        signal_strength: SignalStrength::Strong,
        price_impact: PriceImpact::Up,
        timeframe: Timeframe::ShortTerm,
        reasoning: "inflows".into(),
        assets: vec!["BTC".into()],
        analyzed_at: Utc::now(),
    }
}

#[tokio::test]
async fn twelve_alerts_go_out_in_two_messages() {
    let cap = Capture::default();
    let url = serve(cap.clone()).await;
    let hook = webhook(&url);

    let signals: Vec<_> = (0..12).map(signal).collect();
    let urls: HashMap<String, String> = [("news-0".to_string(), "https://n.test/0".to_string())].into();
    let delivered = hook.deliver_batch(&signals, &urls).await;

    assert_eq!(delivered.len(), 12);
    assert_eq!(cap.calls.load(Ordering::SeqCst), 2);
    let bodies = cap.bodies.lock().clone();
    assert_eq!(bodies[0]["embeds"].as_array().unwrap().len(), 10);
    assert_eq!(bodies[1]["embeds"].as_array().unwrap().len(), 2);
    assert_eq!(bodies[0]["username"], "Sentiment Bot");
    assert_eq!(bodies[0]["embeds"][0]["url"], "https://n.test/0");
}

#[tokio::test]
async fn rate_limit_waits_retry_after_then_retries_once() {
    let cap = Capture::default();
    *cap.fail_first.lock() = Some((
        1,
        StatusCode::TOO_MANY_REQUESTS,
        json!({"message": "You are being rate limited.", "retry_after": 0.05, "global": false}),
    ));
    let url = serve(cap.clone()).await;

    let started = std::time::Instant::now();
    assert!(webhook(&url).send_signal_alert(&signal(1), None).await);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(cap.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_rate_limit_is_a_failure() {
    let cap = Capture::default();
    *cap.fail_first.lock() = Some((5, StatusCode::TOO_MANY_REQUESTS, json!({"retry_after": 0.01})));
    let url = serve(cap.clone()).await;

    assert!(!webhook(&url).send_signal_alert(&signal(1), None).await);
    assert_eq!(cap.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_chunk_is_not_reported_delivered() {
    let cap = Capture::default();
    *cap.fail_first.lock() = Some((1, StatusCode::BAD_REQUEST, json!({"message": "Invalid Form Body"})));
    let url = serve(cap.clone()).await;

    let signals: Vec<_> = (0..11).map(signal).collect();
    let delivered = webhook(&url).deliver_batch(&signals, &HashMap::new()).await;
    assert_eq!(delivered, vec!["news-10".to_string()]);
    assert_eq!(cap.calls.load(Ordering::SeqCst), 2, "400 is not retried");
}

#[tokio::test]
async fn lifecycle_and_text_messages() {
    let cap = Capture::default();
    let url = serve(cap.clone()).await;
    let hook = webhook(&url);

    assert!(hook.test_connection().await);
    assert!(hook.send_startup().await);
    assert!(hook.send_error("Poll error: database is locked").await);

    let empty = SentimentSummary {
        bullish: 0,
        bearish: 0,
        neutral: 0,
        top_assets: vec![],
        period: "Last 24 hours".into(),
    };
    assert!(hook.send_summary(&empty).await, "empty summary is skipped, not failed");

    let bodies = cap.bodies.lock().clone();
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0]["content"].as_str().unwrap().contains("Webhook test successful"));
    assert!(bodies[0].get("embeds").is_none());
    assert!(bodies[2]["embeds"][0]["description"]
        .as_str()
        .unwrap()
        .contains("database is locked"));
}
