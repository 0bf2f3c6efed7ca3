use crate::rate_limit::{target_of, RateLimiter};
use crate::retry::{classify_status, parse_reset_header, RetryPolicy, StatusClass};
use crate::types::{CollectorError, FetchConfig, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound HTTP hop. The URL carries no query string; parameters live in `query`.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub bearer: Option<String>,
    pub basic_auth: Option<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form: None,
            bearer: None,
            basic_auth: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            form: Some(form),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// The network seam. Implementations report connection-level problems as
/// `Transient`/`Fatal` and return every HTTP status as a response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let target = target_of(&request.url)?;
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await.map_err(|e| classify_reqwest_error(&target, e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await.map_err(|e| classify_reqwest_error(&target, e))?;

        Ok(FetchResponse { status, headers, body })
    }
}

fn classify_reqwest_error(target: &str, err: reqwest::Error) -> CollectorError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        CollectorError::Transient {
            target: target.to_string(),
            status: None,
            reason: err.to_string(),
            reset_after: None,
        }
    } else {
        CollectorError::Fatal {
            target: target.to_string(),
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
        }
    }
}

/// Rate-limited, retrying front for an [`HttpTransport`].
///
/// Clones share the transport and the per-target limiter; the retry policy is
/// per clone so each source can set its own ceiling.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            transport,
            limiter,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let target = target_of(&request.url)?;
        let mut network_backoff = self.policy.network_backoff();
        let mut attempt = 0u32;

        loop {
            self.limiter.acquire(&target).await;
            let started = Instant::now();
            let outcome = self.dispatch(&target, request).await;

            match outcome {
                Ok(response) => {
                    debug!(
                        url = %request.url,
                        status = response.status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Fetched"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_transient() => {
                    let delay = self.policy.delay_for(&err, &mut network_backoff);
                    self.limiter.defer(&target, delay);

                    if attempt < self.policy.max_retries {
                        attempt += 1;
                        warn!(
                            url = %request.url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient failure, retrying"
                        );
                        continue;
                    }
                    error!(url = %request.url, attempts = attempt + 1, error = %err, "Giving up after retries");
                    return Err(err);
                }
                Err(err) => {
                    warn!(url = %request.url, error = %err, "Fatal fetch failure");
                    return Err(err);
                }
            }
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &FetchRequest) -> Result<T> {
        self.fetch(request).await?.json()
    }

    pub async fn fetch_text(&self, request: &FetchRequest) -> Result<String> {
        Ok(self.fetch(request).await?.body)
    }

    async fn dispatch(&self, target: &str, request: &FetchRequest) -> Result<FetchResponse> {
        let response = self.transport.send(request).await?;
        match classify_status(response.status) {
            StatusClass::Success => Ok(response),
            StatusClass::Transient => Err(CollectorError::Transient {
                target: target.to_string(),
                status: Some(response.status),
                reason: format!("HTTP {}", response.status),
                reset_after: if response.status == 429 {
                    parse_reset_header(&response.headers, Utc::now())
                } else {
                    None
                },
            }),
            StatusClass::Fatal => Err(CollectorError::Fatal {
                target: target.to_string(),
                status: Some(response.status),
                reason: format!("HTTP {}", response.status),
            }),
        }
    }
}
