//! Sentiment classification: typed signals, reply parsing, the LLM seam and the classifier.

pub mod ai_adapter;
pub mod classifier;
pub mod parse;
pub mod signal;

pub use ai_adapter::{AnthropicClient, DynLlm, LlmClient, ScriptedLlm};
pub use classifier::SentimentClassifier;
pub use signal::{
    is_actionable, PriceImpact, SentimentLevel, SentimentSignal, SignalStrength, Timeframe,
};
