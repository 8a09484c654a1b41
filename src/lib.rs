// src/lib.rs
// Library surface shared by the Shuttle entrypoint and the integration tests.

pub mod analyze;
pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod throttle;

pub use crate::api::create_router;
pub use crate::bot::{BotSettings, SentimentBot};
pub use crate::config::{AssetUniverse, BotConfig};
pub use crate::error::{BotError, ConfigError, StoreError};
pub use crate::pipeline::{CycleReport, PollPipeline};
