use thiserror::Error;

/// Name of the variable that widens or narrows the per-client request
/// limiter. Mentioned in the 403 hint because overly parallel clients are
/// the usual cause.
pub const CONCURRENT_REQUESTS_ENV: &str = "STRATA_CONCURRENT_REQUESTS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
}

/// A tenant response outside the success range, kept with enough context to
/// render a useful diagnostic.
#[derive(Debug, Error)]
#[error("{message} (HTTP {status_code})")]
pub struct RespError {
    pub message: String,
    pub status_code: u16,
    pub body: String,
    pub request: RequestInfo,
}

impl RespError {
    #[must_use]
    pub fn new(message: impl Into<String>, status_code: u16, body: String, request: RequestInfo) -> Self {
        Self {
            message: message.into(),
            status_code,
            body,
            request,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status_code == 404
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        self.status_code == 429
    }

    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        self.status_code == 409
    }

    /// A 403 usually means the tenant is shedding load; suggest narrowing
    /// the limiter.
    #[must_use]
    pub fn concurrency_hint(&self) -> Option<String> {
        if self.status_code == 403 {
            Some(format!(
                "a 403 response often means too many concurrent requests; reduce {CONCURRENT_REQUESTS_ENV} and retry"
            ))
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Response(#[from] Box<RespError>),
    #[error("failed to send {method} {url}")]
    Request {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid environment URL: {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to obtain OAuth access token from {endpoint}")]
    TokenExchange {
        endpoint: String,
        #[source]
        source: Box<ClientError>,
    },
    #[error("failed to parse response of {method} {url}")]
    ResponseParse {
        method: String,
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("environment {environment} has no {transport} transport configured")]
    TransportMissing {
        environment: String,
        transport: &'static str,
    },
    #[error("unknown classic API: {api}")]
    UnknownApi { api: String },
    #[error("request limiter closed")]
    LimiterClosed,
}

impl ClientError {
    #[must_use]
    pub fn response(error: RespError) -> Self {
        Self::Response(Box::new(error))
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Response(response) => Some(response.status_code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.status_code(), Some(404))
    }
}
