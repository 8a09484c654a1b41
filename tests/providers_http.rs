// tests/providers_http.rs
//
// News providers against local axum servers standing in for the remote APIs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shuttle_axum::axum::{
    extract::Query,
    http::StatusCode,
    routing::get,
    Router,
};

use crypto_sentiment_bot::http::RetryPolicy;
use crypto_sentiment_bot::ingest::providers::{CryptoCompareSource, CryptoPanicSource, NitterSource};
use crypto_sentiment_bot::ingest::types::{NewsSource, NewsSourceKind};

const PANIC_JSON: &str = include_str!("fixtures/cryptopanic_posts.json");
const COMPARE_JSON: &str = include_str!("fixtures/cryptocompare_news.json");
const NITTER_RSS: &str = include_str!("fixtures/nitter_rss.xml");

const FAST_RETRY: RetryPolicy = RetryPolicy::new(1, Duration::from_millis(1));

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        shuttle_axum::axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn cryptopanic_sends_token_and_maps_votes() {
    let seen: Arc<Mutex<Option<HashMap<String, String>>>> = Arc::new(Mutex::new(None));
    let seen_c = seen.clone();
    let app = Router::new().route(
        "/api/posts/",
        get(move |Query(q): Query<HashMap<String, String>>| {
            let seen = seen_c.clone();
            async move {
                *seen.lock() = Some(q);
                PANIC_JSON
            }
        }),
    );
    let base = serve(app).await;

    let src = CryptoPanicSource::new("secret-token")
        .unwrap()
        .with_endpoint(format!("{base}/api/posts/"))
        .with_retry(FAST_RETRY);
    let items = src.fetch(10).await.unwrap();

    let q = seen.lock().clone().expect("request captured");
    assert_eq!(q.get("auth_token").map(String::as_str), Some("secret-token"));
    assert_eq!(q.get("kind").map(String::as_str), Some("news"));
    assert_eq!(q.get("filter").map(String::as_str), Some("hot"));
    assert_eq!(q.get("public").map(String::as_str), Some("true"));

    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.source == NewsSourceKind::Cryptopanic));
    assert_eq!(items[0].source_name, "CoinDesk");
    assert_eq!(items[0].currencies, vec!["BTC"]);
    assert_eq!(items[0].raw_sentiment.as_deref(), Some("positive"));
    assert_eq!(items[1].raw_sentiment.as_deref(), Some("negative"));
    assert_eq!(items[2].raw_sentiment.as_deref(), Some("neutral"));
    assert_eq!(items[2].source_name, "Unknown");
}

#[tokio::test]
async fn cryptopanic_server_error_is_a_source_failure() {
    let app = Router::new().route(
        "/api/posts/",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let base = serve(app).await;
    let src = CryptoPanicSource::new("k")
        .unwrap()
        .with_endpoint(format!("{base}/api/posts/"))
        .with_retry(FAST_RETRY);
    assert!(src.fetch(10).await.is_err());
}

#[tokio::test]
async fn cryptocompare_reads_latest_english_news() {
    let seen: Arc<Mutex<Option<HashMap<String, String>>>> = Arc::new(Mutex::new(None));
    let seen_c = seen.clone();
    let app = Router::new().route(
        "/news/",
        get(move |Query(q): Query<HashMap<String, String>>| {
            let seen = seen_c.clone();
            async move {
                *seen.lock() = Some(q);
                COMPARE_JSON
            }
        }),
    );
    let base = serve(app).await;

    let src = CryptoCompareSource::new()
        .unwrap()
        .with_endpoint(format!("{base}/news/"))
        .with_retry(FAST_RETRY);
    let items = src.fetch(1).await.unwrap();

    let q = seen.lock().clone().expect("request captured");
    assert_eq!(q.get("lang").map(String::as_str), Some("EN"));
    assert_eq!(q.get("sortOrder").map(String::as_str), Some("latest"));

    assert_eq!(items.len(), 1, "limit applies");
    assert_eq!(items[0].source, NewsSourceKind::Cryptonews);
    assert_eq!(items[0].source_name, "CoinDesk");
    assert_eq!(items[0].published_at.timestamp(), 1_715_680_800);
}

#[tokio::test]
async fn nitter_falls_back_to_next_healthy_mirror() {
    let broken = Router::new().route("/", get(|| async { StatusCode::BAD_GATEWAY }));
    let healthy = Router::new()
        .route("/", get(|| async { "nitter" }))
        .route("/watcherguru/rss", get(|| async { NITTER_RSS }));
    let broken_base = serve(broken).await;
    let healthy_base = serve(healthy).await;

    let src = NitterSource::new(["@WatcherGuru"], [broken_base.as_str(), healthy_base.as_str()])
        .unwrap()
        .with_retry(FAST_RETRY);
    let items = src.fetch(10).await.unwrap();

    assert_eq!(src.healthy_mirror().await.as_deref(), Some(healthy_base.as_str()));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url, "https://twitter.com/WatcherGuru/status/1790000000001");
    assert_eq!(items[0].source_name, "@watcherguru");
    assert!(items[0].title.starts_with("JUST IN: $BTC reclaims $70,000 for the first time"));
    assert!(items[0].published_at > items[1].published_at);
}

#[tokio::test]
async fn nitter_reprobes_when_cached_mirror_goes_down() {
    let first_up = Arc::new(AtomicBool::new(true));
    let flag = first_up.clone();
    let first = Router::new()
        .route(
            "/",
            get(move || {
                let flag = flag.clone();
                async move {
                    if flag.load(Ordering::SeqCst) {
                        (StatusCode::OK, "nitter")
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, "down")
                    }
                }
            }),
        )
        .route("/watcherguru/rss", get(|| async { NITTER_RSS }));
    let second = Router::new()
        .route("/", get(|| async { "nitter" }))
        .route("/watcherguru/rss", get(|| async { NITTER_RSS }));
    let first_base = serve(first).await;
    let second_base = serve(second).await;

    let src = NitterSource::new(["watcherguru"], [first_base.as_str(), second_base.as_str()])
        .unwrap()
        .with_retry(FAST_RETRY);

    assert_eq!(src.fetch(10).await.unwrap().len(), 2);
    assert_eq!(src.healthy_mirror().await.as_deref(), Some(first_base.as_str()));

    first_up.store(false, Ordering::SeqCst);
    assert_eq!(src.fetch(10).await.unwrap().len(), 2);
    assert_eq!(src.healthy_mirror().await.as_deref(), Some(second_base.as_str()));
}

#[tokio::test]
async fn nitter_without_healthy_mirror_fails() {
    let broken = Router::new().route("/", get(|| async { StatusCode::NOT_FOUND }));
    let base = serve(broken).await;
    let src = NitterSource::new(["someone"], [base.as_str()])
        .unwrap()
        .with_retry(FAST_RETRY);
    let err = src.fetch(5).await.unwrap_err();
    assert!(err.to_string().contains("no healthy social mirror"));
}

#[tokio::test]
async fn nitter_with_no_accounts_is_empty_not_an_error() {
    let src = NitterSource::new(Vec::<String>::new(), ["http://127.0.0.1:9"]).unwrap();
    assert!(src.fetch(5).await.unwrap().is_empty());
}
