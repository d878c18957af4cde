//! Generative-text assist for listing drafts.
//!
//! [`AssistClient`] wraps a [`GenerativeEndpoint`] with bounded retry and a
//! busy signal. Exhausted retries resolve to `None`, never to an error.
use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::assist::model::{Content, GenerateContentRequest, GenerateContentResponse};
use crate::config::Config;

pub mod model;
pub mod retry;

pub use retry::{RetryPolicy, RetryState};

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("failed to reach assist endpoint: {0}")]
    Transport(String),
    #[error("assist endpoint error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid assist response: {0}")]
    Decode(String),
}

/// One of the three fixed generative operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistTask {
    ImproveTitle,
    GenerateDescription,
    EstimatePrice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistRequest {
    pub task: AssistTask,
    pub prompt: String,
    pub system_instruction: String,
}

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new("[0-9]+").expect("valid digit regex"));

impl AssistTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistTask::ImproveTitle => "title",
            AssistTask::GenerateDescription => "description",
            AssistTask::EstimatePrice => "price",
        }
    }

    /// Pair the task's instruction template with the caller's text.
    pub fn request(&self, input: &str) -> AssistRequest {
        let (prompt, system) = match self {
            AssistTask::ImproveTitle => (
                format!("Improve this title for selling: \"{}\"", input),
                "Marketing expert.",
            ),
            AssistTask::GenerateDescription => (
                format!("Write Instagram-style description for: {}", input),
                "Sport copywriter.",
            ),
            AssistTask::EstimatePrice => (
                format!("Used price in RUB for: {}. Number only.", input),
                "Valuator.",
            ),
        };
        AssistRequest {
            task: *self,
            prompt,
            system_instruction: system.to_string(),
        }
    }

    /// Post-process a response for this task. `None` means leave the field as is.
    pub fn postprocess(&self, response: &str) -> Option<String> {
        match self {
            AssistTask::ImproveTitle => Some(clean_title(response)),
            AssistTask::GenerateDescription => Some(response.trim().to_string()),
            AssistTask::EstimatePrice => extract_price(response),
        }
    }

    /// Apply a response to `field`. Returns true when the field changed.
    pub fn apply(&self, response: &str, field: &mut String) -> bool {
        match self.postprocess(response) {
            Some(value) if *field != value => {
                *field = value;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for AssistTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssistTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(AssistTask::ImproveTitle),
            "description" => Ok(AssistTask::GenerateDescription),
            "price" => Ok(AssistTask::EstimatePrice),
            other => Err(format!("unknown assist task: {}", other)),
        }
    }
}

/// Trim, then strip one leading and one trailing `"` if present.
pub fn clean_title(response: &str) -> String {
    let trimmed = response.trim();
    let trimmed = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    trimmed.to_string()
}

/// First maximal run of ASCII digits anywhere in the text.
pub fn extract_price(response: &str) -> Option<String> {
    DIGITS.find(response).map(|m| m.as_str().to_string())
}

/// A single request/response exchange with the generative endpoint.
/// `Ok(None)` is a successful exchange that carried no text.
#[async_trait]
pub trait GenerativeEndpoint: Send + Sync {
    async fn generate(&self, request: &AssistRequest) -> Result<Option<String>, AssistError>;
}

/// Gemini `generateContent` over HTTP.
#[derive(Clone)]
pub struct GeminiEndpoint {
    http: Client,
    base_url: Url,
    model: String,
    api_key: String,
}

impl fmt::Debug for GeminiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiEndpoint")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiEndpoint {
    pub fn with_base_url(model: String, api_key: String, base_url: Url) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("sport-resell/0.1")
            .no_proxy()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            model,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.assist.base_url).context("invalid assist.base_url")?;
        Self::with_base_url(cfg.assist.model.clone(), cfg.assist.api_key.clone(), base_url)
    }

    pub fn build_request(&self, request: &AssistRequest) -> Result<reqwest::Request, AssistError> {
        let mut endpoint = self
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .map_err(|e| AssistError::Transport(format!("invalid assist URL: {}", e)))?;
        endpoint.query_pairs_mut().append_pair("key", &self.api_key);

        let body = GenerateContentRequest {
            contents: vec![Content::text(request.prompt.clone())],
            system_instruction: Content::text(request.system_instruction.clone()),
        };
        self.http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .map_err(|e| AssistError::Transport(e.to_string()))
    }
}

#[async_trait]
impl GenerativeEndpoint for GeminiEndpoint {
    async fn generate(&self, request: &AssistRequest) -> Result<Option<String>, AssistError> {
        let req = self.build_request(request)?;
        debug!(model = %self.model, task = %request.task, "sending assist request");

        let res = self
            .http
            .execute(req)
            .await
            .map_err(|e| AssistError::Transport(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AssistError::Status { status, body });
        }

        let payload: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| AssistError::Decode(e.to_string()))?;
        Ok(payload
            .first_text()
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }
}

/// Clears the busy flag when the in-flight request finishes, however it ends.
struct BusyGuard<'a>(&'a watch::Sender<bool>);

impl<'a> BusyGuard<'a> {
    fn engage(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        BusyGuard(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// Retrying assist client. Callers must not issue a second request while
/// [`AssistClient::is_busy`] is true; the client does not enforce it.
pub struct AssistClient<E = GeminiEndpoint> {
    endpoint: E,
    policy: RetryPolicy,
    busy: watch::Sender<bool>,
}

impl<E: fmt::Debug> fmt::Debug for AssistClient<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistClient")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .field("busy", &*self.busy.borrow())
            .finish()
    }
}

impl AssistClient<GeminiEndpoint> {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let policy = RetryPolicy::new(
            cfg.assist.max_attempts,
            Duration::from_millis(cfg.assist.initial_backoff_ms),
        );
        Ok(Self::new(GeminiEndpoint::from_config(cfg)?, policy))
    }
}

impl<E: GenerativeEndpoint> AssistClient<E> {
    pub fn new(endpoint: E, policy: RetryPolicy) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            endpoint,
            policy,
            busy,
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn busy_signal(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Run `task` on `input`, returning the raw response text, or `None`
    /// when every attempt failed or the endpoint returned no text.
    pub async fn invoke(&self, task: AssistTask, input: &str) -> Option<String> {
        self.invoke_with_cancel(task, input, &CancellationToken::new())
            .await
    }

    /// Like [`invoke`](Self::invoke), but `cancel` is checked before each
    /// backoff sleep and interrupts it.
    #[instrument(skip_all, fields(task = %task))]
    pub async fn invoke_with_cancel(
        &self,
        task: AssistTask,
        input: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let request = task.request(input);
        let _busy = BusyGuard::engage(&self.busy);
        let mut state = self.policy.start();

        loop {
            let attempt = state.attempt();
            let err = match self.endpoint.generate(&request).await {
                Ok(text) => return text,
                Err(err) => err,
            };

            let Some(delay) = state.on_failure() else {
                warn!(%err, attempt, "assist unavailable; retries exhausted");
                return None;
            };
            warn!(%err, attempt, delay_ms = delay.as_millis() as u64, "assist attempt failed; backing off");

            if cancel.is_cancelled() {
                debug!("assist cancelled");
                return None;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("assist cancelled during backoff");
                    return None;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(base: &str) -> GeminiEndpoint {
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/'))).unwrap();
        GeminiEndpoint::with_base_url("test-model".into(), "k3y".into(), base).unwrap()
    }

    #[test]
    fn title_strips_one_quote_each_side() {
        assert_eq!(clean_title("  \"Nike Vaporfly\"  \n"), "Nike Vaporfly");
        assert_eq!(clean_title("\"\"Double\"\""), "\"Double\"");
        assert_eq!(clean_title("No quotes"), "No quotes");
        assert_eq!(clean_title("\""), "");
    }

    #[test]
    fn price_takes_first_digit_run() {
        assert_eq!(extract_price("Estimated value: 8500 RUB").as_deref(), Some("8500"));
        assert_eq!(extract_price("12 000 RUB").as_deref(), Some("12"));
        assert_eq!(extract_price("unknown"), None);
    }

    #[test]
    fn apply_leaves_price_unchanged_without_digits() {
        let mut price = "1000".to_string();
        assert!(!AssistTask::EstimatePrice.apply("unknown", &mut price));
        assert_eq!(price, "1000");
        assert!(AssistTask::EstimatePrice.apply("Estimated value: 8500 RUB", &mut price));
        assert_eq!(price, "8500");
    }

    #[test]
    fn description_is_trimmed_verbatim() {
        let mut desc = String::new();
        assert!(AssistTask::GenerateDescription.apply("\n  Fast shoes! \"Like new\"  ", &mut desc));
        assert_eq!(desc, "Fast shoes! \"Like new\"");
    }

    #[test]
    fn templates_pair_instruction_with_input() {
        let req = AssistTask::ImproveTitle.request("old bike");
        assert_eq!(req.prompt, "Improve this title for selling: \"old bike\"");
        assert_eq!(req.system_instruction, "Marketing expert.");

        let req = AssistTask::EstimatePrice.request("Garmin 255");
        assert_eq!(req.prompt, "Used price in RUB for: Garmin 255. Number only.");
        assert_eq!(req.system_instruction, "Valuator.");
    }

    #[test]
    fn task_parses_from_cli_names() {
        assert_eq!("title".parse::<AssistTask>().unwrap(), AssistTask::ImproveTitle);
        assert_eq!("Price".parse::<AssistTask>().unwrap(), AssistTask::EstimatePrice);
        assert!("haiku".parse::<AssistTask>().is_err());
    }

    #[test]
    fn build_request_targets_model_with_key() {
        let ep = endpoint("https://example.test");
        let req = ep.build_request(&AssistTask::ImproveTitle.request("x")).unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().path(), "/v1beta/models/test-model:generateContent");
        assert_eq!(req.url().query(), Some("key=k3y"));
    }

    #[test]
    fn client_from_config_targets_configured_model() {
        let mut cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        cfg.assist.base_url = "https://assist.example.test/".into();
        cfg.assist.api_key = "k3y".into();
        let client = AssistClient::from_config(&cfg).unwrap();
        assert!(!client.is_busy());

        let ep = GeminiEndpoint::from_config(&cfg).unwrap();
        let req = ep.build_request(&AssistTask::ImproveTitle.request("x")).unwrap();
        assert_eq!(req.url().host_str(), Some("assist.example.test"));
        assert_eq!(
            req.url().path(),
            "/v1beta/models/gemini-2.5-flash-preview-09-2025:generateContent"
        );
    }

    #[tokio::test]
    async fn gemini_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "k3y"))
            .and(body_partial_json(json!({
                "systemInstruction": { "parts": [{ "text": "Valuator." }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "About 8500" }] } }]
            })))
            .mount(&server)
            .await;

        let ep = endpoint(&server.uri());
        let text = ep.generate(&AssistTask::EstimatePrice.request("Garmin")).await.unwrap();
        assert_eq!(text.as_deref(), Some("About 8500"));
    }

    #[tokio::test]
    async fn gemini_without_candidates_is_success_without_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let ep = endpoint(&server.uri());
        let text = ep.generate(&AssistTask::ImproveTitle.request("x")).await.unwrap();
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn gemini_error_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let ep = endpoint(&server.uri());
        let err = ep.generate(&AssistTask::ImproveTitle.request("x")).await.unwrap_err();
        assert!(matches!(err, AssistError::Status { .. }));
    }

    #[tokio::test]
    async fn client_retries_until_endpoint_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "\"Shiny title\"" }] } }]
            })))
            .mount(&server)
            .await;

        let client = AssistClient::new(
            endpoint(&server.uri()),
            RetryPolicy::new(5, Duration::from_millis(5)),
        );
        let raw = client.invoke(AssistTask::ImproveTitle, "title").await.unwrap();
        assert_eq!(AssistTask::ImproveTitle.postprocess(&raw).as_deref(), Some("Shiny title"));
        assert!(!client.is_busy());
    }
}
