// src/ingest/providers/mod.rs
pub mod cryptocompare;
pub mod cryptopanic;
pub mod nitter;

use std::time::Duration;

use crate::http::RetryPolicy;

/// News API request timeout.
pub const NEWS_TIMEOUT: Duration = Duration::from_secs(10);
/// Social mirror request timeout.
pub const SOCIAL_TIMEOUT: Duration = Duration::from_secs(15);
/// Mirror health probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub const SOURCE_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(500));

pub use cryptocompare::CryptoCompareSource;
pub use cryptopanic::CryptoPanicSource;
pub use nitter::NitterSource;
