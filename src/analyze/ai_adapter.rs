//! LLM transport: provider abstraction, the Anthropic Messages client and a scripted
//! client for tests/local runs.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::http::{client_with_timeout, send_with_retry, RetryPolicy};

pub const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const MAX_TOKENS: u32 = 1024;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const LLM_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(500));

/// Anything that can turn (system, user) prompts into a text completion.
pub trait LlmClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynLlm = Arc<dyn LlmClient>;

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    /// `model_override`: pass Some("claude-...") to override the default model.
    pub fn new(api_key: impl Into<String>, model_override: Option<&str>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("anthropic api key is empty");
        }
        Ok(Self {
            http: client_with_timeout(REQUEST_TIMEOUT)?,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: ANTHROPIC_ENDPOINT.to_string(),
            retry: LLM_RETRY,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_impl(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }

        let req = Req {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Msg {
                role: "user",
                content: user,
            }],
        };

        let rsp = send_with_retry(self.retry, || {
            self.http
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&req)
        })
        .await
        .context("anthropic request")?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "anthropic http {status}: {}",
                body.chars().take(300).collect::<String>()
            ));
        }

        let parsed: Resp = rsp.json().await.context("anthropic response json")?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            bail!("anthropic response had no text content");
        }
        Ok(text)
    }
}

impl LlmClient for AnthropicClient {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete_impl(system, user))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

/// Deterministic client for tests/local runs.
///
/// Replies are served in order; once the script is exhausted the fallback reply
/// (if any) is repeated, otherwise the call fails. Every user prompt is recorded.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `reply` once the script runs out.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    fn push(&self, r: Result<String, String>) {
        match self.replies.lock() {
            Ok(mut q) => q.push_back(r),
            Err(poisoned) => poisoned.into_inner().push_back(r),
        }
    }

    /// User prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }

    fn next_reply(&self, user: &str) -> Result<String> {
        match self.prompts.lock() {
            Ok(mut p) => p.push(user.to_string()),
            Err(poisoned) => poisoned.into_inner().push(user.to_string()),
        }
        let next = match self.replies.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        match next {
            Some(Ok(r)) => Ok(r),
            Some(Err(e)) => Err(anyhow!(e)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted llm has no reply left")),
        }
    }
}

impl LlmClient for ScriptedLlm {
    fn complete<'a>(
        &'a self,
        _system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let reply = self.next_reply(user);
        Box::pin(async move { reply })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
