//! Chat completion client with a fixed-delay retry policy.
//!
//! # Architecture
//!
//! - [`ChatCompletion`] - the seam the chat pipeline and the librarian call through
//! - [`CompletionClient`] - HTTP implementation against an OpenAI-compatible
//!   `/chat/completions` endpoint
//! - [`retry`] - attempt ceiling and inter-attempt delay
//! - [`wire_types`] - request encoding and [`CompletionPayload`] response decoding
//!
//! # Error Handling
//!
//! Every attempt either yields a result or one of the [`CompletionError`] kinds.
//! All kinds are retried. When the ceiling is reached the caller receives
//! [`RetryExhausted`] carrying the last error; nothing panics and nothing is
//! fatal.

pub mod retry;
pub mod wire_types;

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use parley_types::{ApiKey, SamplingParams, Turn};

pub use parley_types;
pub use retry::{Attempted, RetryConfig, RetryExhausted};
pub use wire_types::CompletionPayload;

use wire_types::ChatRequest;

/// Canonical OpenAI API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

const CONNECT_TIMEOUT_SECS: u64 = 30;

// TCP keepalive and pool settings mirror httpx defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Build an HTTP client whose every request is bounded by `timeout`.
pub fn http_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder().timeout(timeout).build()
}

/// Why a single attempt did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Connection failure, timeout, or an unreadable body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server reported a transient error of its own.
    #[error("transient server error: {payload}")]
    TransientServer { payload: Value },
    /// The body was neither a result nor a recognised error.
    #[error("malformed completion payload: {payload}")]
    Malformed { payload: Value },
}

impl CompletionError {
    /// The last payload seen, if the server answered at all.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Transport(_) => None,
            Self::TransientServer { payload } | Self::Malformed { payload } => Some(payload),
        }
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

pub type CompletionResult = Result<Completion, RetryExhausted<CompletionError>>;

/// Anything that can turn a prompt into a completion.
///
/// Implementations own their retry behaviour; callers only distinguish
/// success from exhaustion.
pub trait ChatCompletion: Send + Sync {
    fn complete(
        &self,
        messages: &[Turn],
        params: &SamplingParams,
    ) -> impl Future<Output = CompletionResult> + Send;
}

/// HTTP client for an OpenAI-compatible chat completions endpoint.
///
/// One `reqwest::Client` is built per instance and reused for every attempt of
/// every call, so connections are pooled across retries.
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: ApiKey,
    retry: RetryConfig,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .finish_non_exhaustive() // api_key intentionally hidden
    }
}

impl CompletionClient {
    pub fn new(api_key: ApiKey, base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            http: http_client_with_timeout(timeout)?,
            endpoint,
            api_key,
            retry: RetryConfig::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(
        &self,
        request: &ChatRequest<'_>,
        attempt: u32,
    ) -> Result<String, CompletionError> {
        tracing::debug!(attempt, endpoint = %self.endpoint, ?request, "Sending completion request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let payload: Value = response.json().await?;

        tracing::debug!(attempt, %status, response = %payload, "Completion response");

        match CompletionPayload::classify(payload) {
            CompletionPayload::Success(content) => Ok(content),
            CompletionPayload::TransientError(payload) => {
                Err(CompletionError::TransientServer { payload })
            }
            CompletionPayload::Malformed(payload) => {
                tracing::warn!(
                    attempt,
                    %status,
                    response = %payload,
                    "Completion response has no choices; retrying"
                );
                Err(CompletionError::Malformed { payload })
            }
        }
    }
}

impl ChatCompletion for CompletionClient {
    async fn complete(&self, messages: &[Turn], params: &SamplingParams) -> CompletionResult {
        let request = ChatRequest { messages, params };

        let outcome =
            retry::retry_with_fixed_delay(&self.retry, |n| self.attempt(&request, n)).await;

        match outcome {
            Ok(Attempted { value, attempts }) => Ok(Completion {
                content: value,
                attempts,
            }),
            Err(exhausted) => {
                tracing::warn!(
                    attempts = exhausted.attempts,
                    error = %exhausted.last,
                    "Completion failed after exhausting retries"
                );
                Err(exhausted)
            }
        }
    }
}
