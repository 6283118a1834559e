// Blocking HTTP transport for the Gemini REST API
// Shared by the embedding client and the chat client


use anyhow::{Context, Result};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Clone)]
pub struct GeminiHttpClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl std::fmt::Debug for GeminiHttpClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiHttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

impl GeminiHttpClient {
    #[inline]
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is not configured");
        }

        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// URL for a model resource, optionally with a `:method` suffix.
    /// The API key travels as the `key` query parameter.
    #[inline]
    pub fn model_url(&self, model: &str, method: Option<&str>) -> Result<Url> {
        let path = match method {
            Some(method) => format!("/{}/models/{}:{}", API_VERSION, model, method),
            None => format!("/{}/models/{}", API_VERSION, model),
        };

        let mut url = self
            .base_url
            .join(&path)
            .with_context(|| format!("Failed to build URL for model {}", model))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    #[inline]
    pub fn get(&self, url: &Url) -> Result<String> {
        debug!("GET {}", url.path());
        self.make_request_with_retry(None, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn post_json<T: Serialize>(&self, url: &Url, body: &T) -> Result<String> {
        self.post_json_until(url, body, None)
    }

    /// Like `post_json`, but no retry is started once `deadline` would be
    /// passed before it could be sent.
    #[inline]
    pub fn post_json_until<T: Serialize>(
        &self,
        url: &Url,
        body: &T,
        deadline: Option<Instant>,
    ) -> Result<String> {
        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;

        debug!("POST {} ({} bytes)", url.path(), request_json.len());
        self.make_request_with_retry(deadline, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(
        &self,
        deadline: Option<Instant>,
        mut request_fn: F,
    ) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        if deadline.is_some_and(|deadline| Instant::now() + delay >= deadline) {
                            warn!(
                                "Deadline reached after attempt {}/{}, giving up",
                                attempt, self.retry_attempts
                            );
                            break;
                        }
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}
