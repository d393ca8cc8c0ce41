use std::env;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::auth::AuthProvider;
use crate::error::{CONCURRENT_REQUESTS_ENV, ClientError, RequestInfo, RespError};
use crate::rate_limit::rate_limit_wait;
use crate::retry::RetryPolicy;

/// Default width of the per-client request limiter.
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 5;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeouts are retried without spending a counted attempt, up to this many
/// extra tries per request.
const TIMEOUT_GRACE: u32 = 3;

const USER_AGENT: &str = concat!("strata/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub concurrent_requests: usize,
    pub request_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            concurrent_requests: DEFAULT_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl TransportOptions {
    /// Defaults, with the limiter width optionally overridden through the
    /// process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(value) = env::var(CONCURRENT_REQUESTS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(width) if width > 0 => options.concurrent_requests = width,
                _ => warn!("ignoring invalid {CONCURRENT_REQUESTS_ENV} value {value:?}"),
            }
        }
        options
    }
}

#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    None,
    Json(serde_json::Value),
    Raw {
        content_type: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::None,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }
}

/// One tenant response, successful or not, with enough request context for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
    pub request: RequestInfo,
}

impl Response {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_str(&self.body).map_err(|source| ClientError::ResponseParse {
            method: self.request.method.clone(),
            url: self.request.url.clone(),
            source,
        })
    }

    pub(crate) fn into_error(self, message: impl Into<String>) -> ClientError {
        ClientError::response(RespError::new(
            message,
            self.status,
            self.body,
            self.request,
        ))
    }
}

/// One authenticated HTTP pipe to a tenant. Composes the shared limiter, the
/// rate-limit waiter and the retry loop behind a single execute path.
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    auth: AuthProvider,
    limiter: Arc<Semaphore>,
}

impl Transport {
    pub fn new(
        base_url: &str,
        auth: AuthProvider,
        limiter: Arc<Semaphore>,
        options: &TransportOptions,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|source| ClientError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ClientError::Request {
                method: "BUILD".to_string(),
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url,
            auth,
            limiter,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        policy: &RetryPolicy,
    ) -> Result<Response, ClientError> {
        self.execute(RequestSpec::new(Method::GET, path).with_query(query), policy)
            .await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        policy: &RetryPolicy,
    ) -> Result<Response, ClientError> {
        self.execute(RequestSpec::new(Method::POST, path).with_json(body), policy)
            .await
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: serde_json::Value,
        policy: &RetryPolicy,
    ) -> Result<Response, ClientError> {
        self.execute(RequestSpec::new(Method::PUT, path).with_json(body), policy)
            .await
    }

    pub async fn delete(&self, path: &str, policy: &RetryPolicy) -> Result<Response, ClientError> {
        self.execute(RequestSpec::new(Method::DELETE, path), policy)
            .await
    }

    pub async fn post_raw(
        &self,
        path: &str,
        content_type: String,
        bytes: Vec<u8>,
        policy: &RetryPolicy,
    ) -> Result<Response, ClientError> {
        let mut spec = RequestSpec::new(Method::POST, path);
        spec.body = RequestBody::Raw {
            content_type,
            bytes,
        };
        self.execute(spec, policy).await
    }

    /// The single retrying execute path every request goes through: acquire
    /// a limiter slot, send, classify, wait, repeat.
    pub(crate) async fn execute(
        &self,
        spec: RequestSpec,
        policy: &RetryPolicy,
    ) -> Result<Response, ClientError> {
        let url = self.url_for(&spec)?;
        let mut attempt: u32 = 0;
        let mut timeout_grace = TIMEOUT_GRACE;

        loop {
            let response = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|_| ClientError::LimiterClosed)?;
                self.send_once(&spec, &url).await
            };

            match response {
                Ok(response) if (200..300).contains(&response.status) => return Ok(response),
                Ok(response) => {
                    if policy.is_retryable_status(response.status) && attempt + 1 < policy.max_attempts
                    {
                        let hint = if response.status == 429 {
                            rate_limit_wait(&response.headers)
                        } else {
                            None
                        };
                        let delay = policy.delay_for(attempt, hint);
                        warn!(
                            "{} {} answered HTTP {}, retrying in {}ms (attempt {}/{})",
                            spec.method,
                            url,
                            response.status,
                            delay.as_millis(),
                            attempt + 1,
                            policy.max_attempts,
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(response.into_error(format!(
                        "{} {} failed after {} attempt(s)",
                        spec.method,
                        url,
                        attempt + 1
                    )));
                }
                Err(SendFailure::Auth(error)) => return Err(error),
                Err(SendFailure::Transport(source)) if source.is_timeout() && timeout_grace > 0 => {
                    // A timed-out attempt does not count against the policy.
                    timeout_grace -= 1;
                    warn!("{} {} timed out, retrying ({timeout_grace} grace tries left)", spec.method, url);
                    continue;
                }
                Err(SendFailure::Transport(source)) => {
                    if attempt + 1 < policy.max_attempts {
                        let delay = policy.delay_for(attempt, None);
                        warn!(
                            "{} {} failed to send ({source}), retrying in {}ms",
                            spec.method,
                            url,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ClientError::Request {
                        method: spec.method.to_string(),
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn send_once(&self, spec: &RequestSpec, url: &Url) -> Result<Response, SendFailure> {
        let mut request = self.http.request(spec.method.clone(), url.clone());
        request = match &spec.body {
            RequestBody::None => request,
            RequestBody::Json(body) => request.json(body),
            RequestBody::Raw {
                content_type,
                bytes,
            } => request
                .header("Content-Type", content_type.clone())
                .body(bytes.clone()),
        };

        let request = self.auth.apply(request).await.map_err(SendFailure::Auth)?;

        debug!("{} {}", spec.method, url);
        let response = request.send().await.map_err(SendFailure::Transport)?;
        response_of(spec, url, response)
            .await
            .map_err(SendFailure::Transport)
    }

    fn url_for(&self, spec: &RequestSpec) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(&spec.path)
            .map_err(|source| ClientError::InvalidUrl {
                url: format!("{}{}", self.base_url, spec.path),
                source,
            })?;
        if !spec.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &spec.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

async fn response_of(
    spec: &RequestSpec,
    url: &Url,
    response: reqwest::Response,
) -> Result<Response, reqwest::Error> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(Response {
        status,
        body,
        headers,
        request: RequestInfo {
            method: spec.method.to_string(),
            url: url.to_string(),
        },
    })
}

enum SendFailure {
    Transport(reqwest::Error),
    Auth(ClientError),
}
