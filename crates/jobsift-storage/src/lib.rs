//! Concurrent page fetching with retry/backoff, and record stores for jobsift.

mod store;

pub use store::{
    JsonRecordStore, MemoryRecordStore, RecordIndex, RecordStore, StoreStats, JOBS_FILE,
    STATS_FILE,
};

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
pub use reqwest::Url;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "jobsift-storage";

/// Browser user agents rotated per attempt when no pool is configured.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Statuses worth another attempt. Everything else outside 2xx is final.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry_index` (0-based): min * 2^n, capped.
    pub fn delay_for_retry(&self, retry_index: usize) -> Duration {
        let factor = 1u32.checked_shl(retry_index as u32).unwrap_or(u32::MAX);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub backoff: BackoffPolicy,
    /// Rotated per attempt; [`DEFAULT_USER_AGENTS`] when empty.
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_concurrency: 8,
            backoff: BackoffPolicy::default(),
            user_agents: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn pick_user_agent(&self) -> String {
        let mut rng = rand::rng();
        self.user_agents
            .choose(&mut rng)
            .cloned()
            .or_else(|| DEFAULT_USER_AGENTS.choose(&mut rng).map(|ua| ua.to_string()))
            .unwrap_or_else(|| format!("jobsift/{}", env!("CARGO_PKG_VERSION")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Other,
}

/// Failure below the HTTP status layer, as reported by a [`PageClient`].
#[derive(Debug, Clone, Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != TransportErrorKind::Other
    }
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// One GET per call. Retry, timeout and rotation policy live in [`FetchOrchestrator`].
#[async_trait]
pub trait PageClient: Send + Sync + 'static {
    async fn get(
        &self,
        url: &Url,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<PageResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestPageClient {
    client: reqwest::Client,
}

impl ReqwestPageClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageClient for ReqwestPageClient {
    async fn get(
        &self,
        url: &Url,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<PageResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, user_agent)
            .timeout(timeout)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?
            .to_vec();

        Ok(PageResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    fn from_response(url: &str, response: PageResponse) -> Self {
        Self {
            url: url.to_string(),
            final_url: response.final_url,
            status: response.status,
            content_type: response.content_type,
            content_hash: sha256_hex(&response.body),
            body: response.body,
            fetched_at: Utc::now(),
        }
    }

    /// A page that did not come off the network (fixtures, local feeds).
    pub fn from_body(url: impl Into<String>, content_type: Option<&str>, body: Vec<u8>) -> Self {
        let url = url.into();
        Self::from_response(
            &url,
            PageResponse {
                status: 200,
                final_url: url.clone(),
                content_type: content_type.map(str::to_string),
                body,
            },
        )
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("gave up after {attempts} attempts: {reason}")]
    Transient { attempts: usize, reason: String },
    #[error("permanent failure{}: {reason}", status_suffix(.status))]
    Permanent { status: Option<u16>, reason: String },
    #[error("fetch cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (http {s})")).unwrap_or_default()
}

/// Exactly one per requested url.
#[derive(Debug)]
pub struct FetchResult {
    pub url: String,
    pub attempts: usize,
    pub outcome: Result<FetchedPage, FetchError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Retry state for one url, owned by the worker fetching it.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub url: String,
    pub attempt: usize,
    pub next_backoff: Duration,
}

impl FetchTask {
    fn new(url: String, policy: &BackoffPolicy) -> Self {
        Self {
            url,
            attempt: 0,
            next_backoff: policy.delay_for_retry(0),
        }
    }

    fn finish(self, outcome: Result<FetchedPage, FetchError>) -> FetchResult {
        FetchResult {
            url: self.url,
            attempts: self.attempt,
            outcome,
        }
    }
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Success(FetchedPage),
    Retryable(String),
    Terminal(FetchError),
}

fn parse_target(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url.trim()).map_err(|err| FetchError::Permanent {
        status: None,
        reason: format!("malformed url: {err}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::Permanent {
            status: None,
            reason: format!("unsupported url scheme {other:?}"),
        }),
    }
}

async fn attempt_fetch<C: PageClient>(
    client: &C,
    config: &FetchConfig,
    task: &FetchTask,
    target: &Url,
    user_agent: &str,
) -> AttemptOutcome {
    let request = client.get(target, user_agent, config.timeout);
    let response = match tokio::time::timeout(config.timeout, request).await {
        Err(_) => {
            return AttemptOutcome::Retryable(format!(
                "timed out after {}s",
                config.timeout.as_secs_f64()
            ))
        }
        Ok(Err(err)) if err.is_retryable() => return AttemptOutcome::Retryable(err.to_string()),
        Ok(Err(err)) => {
            return AttemptOutcome::Terminal(FetchError::Permanent {
                status: None,
                reason: err.to_string(),
            })
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status;
    if (200..300).contains(&status) {
        AttemptOutcome::Success(FetchedPage::from_response(&task.url, response))
    } else if is_retryable_status(status) {
        AttemptOutcome::Retryable(format!("http status {status}"))
    } else {
        AttemptOutcome::Terminal(FetchError::Permanent {
            status: Some(status),
            reason: format!("http status {status}"),
        })
    }
}

async fn run_fetch<C: PageClient>(
    client: Arc<C>,
    config: Arc<FetchConfig>,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
    url: String,
) -> FetchResult {
    let target = match parse_target(&url) {
        Ok(target) => target,
        Err(err) => {
            warn!(error = %err, "rejecting fetch target");
            return FetchResult {
                url,
                attempts: 0,
                outcome: Err(err),
            };
        }
    };
    let policy = config.backoff;
    let max_attempts = policy.max_attempts.max(1);
    let mut task = FetchTask::new(url, &policy);

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return task.finish(Err(FetchError::Cancelled)),
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return task.finish(Err(FetchError::Cancelled)),
            },
        };

        task.attempt += 1;
        let user_agent = config.pick_user_agent();
        debug!(attempt = task.attempt, user_agent = %user_agent, "fetch attempt");
        let outcome = attempt_fetch(client.as_ref(), &config, &task, &target, &user_agent).await;
        drop(permit);

        match outcome {
            AttemptOutcome::Success(page) => {
                debug!(attempt = task.attempt, status = page.status, "fetched");
                return task.finish(Ok(page));
            }
            AttemptOutcome::Terminal(err) => {
                warn!(attempt = task.attempt, error = %err, "fetch failed");
                return task.finish(Err(err));
            }
            AttemptOutcome::Retryable(reason) if task.attempt >= max_attempts => {
                warn!(attempts = task.attempt, reason = %reason, "fetch failed after retries");
                let attempts = task.attempt;
                return task.finish(Err(FetchError::Transient { attempts, reason }));
            }
            AttemptOutcome::Retryable(reason) => {
                let delay = task.next_backoff;
                warn!(
                    attempt = task.attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "retryable fetch failure"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return task.finish(Err(FetchError::Cancelled)),
                    _ = tokio::time::sleep(delay) => {}
                }
                task.next_backoff = policy.delay_for_retry(task.attempt);
            }
        }
    }
}

/// Fetches batches of urls concurrently under a shared concurrency limit.
#[derive(Debug)]
pub struct FetchOrchestrator<C = ReqwestPageClient> {
    client: Arc<C>,
    config: Arc<FetchConfig>,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl FetchOrchestrator<ReqwestPageClient> {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(ReqwestPageClient::new()?, config))
    }
}

impl<C: PageClient> FetchOrchestrator<C> {
    pub fn with_client(client: C, config: FetchConfig) -> Self {
        Self {
            client: Arc::new(client),
            limit: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Stop starting new attempts. Waiting and backing-off tasks finish as cancelled.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start fetching every url and stream results back as they complete.
    /// Must be called from within a tokio runtime.
    pub fn spawn_fetches<I, S>(&self, urls: I) -> mpsc::Receiver<FetchResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(urls.len().max(1));

        let mut set = JoinSet::new();
        let mut pending = HashMap::with_capacity(urls.len());
        for url in urls {
            let span = info_span!("http_fetch", url = %url);
            let task = run_fetch(
                self.client.clone(),
                self.config.clone(),
                self.limit.clone(),
                self.cancel.clone(),
                url.clone(),
            );
            let handle = set.spawn(task.instrument(span));
            pending.insert(handle.id(), url);
        }

        tokio::spawn(async move {
            while let Some(joined) = set.join_next_with_id().await {
                let result = match joined {
                    Ok((id, result)) => {
                        pending.remove(&id);
                        result
                    }
                    Err(err) => {
                        let url = pending.remove(&err.id()).unwrap_or_default();
                        warn!(url = %url, error = %err, "fetch task died");
                        FetchResult {
                            url,
                            attempts: 0,
                            outcome: Err(FetchError::Permanent {
                                status: None,
                                reason: format!("fetch task failed: {err}"),
                            }),
                        }
                    }
                };
                if tx.send(result).await.is_err() {
                    debug!("fetch result receiver dropped; aborting remaining fetches");
                    set.abort_all();
                    break;
                }
            }
        });

        rx
    }

    pub async fn fetch_all<I, S>(&self, urls: I) -> Vec<FetchResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rx = self.spawn_fetches(urls);
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}
