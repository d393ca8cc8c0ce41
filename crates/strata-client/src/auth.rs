use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::RequestBuilder;
use serde::Deserialize;
use strata_domain::{OAuthCredentials, Secret};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ClientError, RequestInfo, RespError};

/// Refresh slightly before the advertised expiry so in-flight requests never
/// race the token.
const EXPIRY_MARGIN_SECONDS: i64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECONDS) < self.expires_at
    }
}

/// OAuth2 client-credentials token source with an in-memory cache. Shared
/// per transport; the mutex makes concurrent refreshes single-flight.
pub struct OAuthTokenSource {
    credentials: OAuthCredentials,
    token_endpoint: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenSource {
    #[must_use]
    pub fn new(credentials: OAuthCredentials, token_endpoint: String, http: reqwest::Client) -> Self {
        Self {
            credentials,
            token_endpoint,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, refreshed through the token endpoint when the
    /// cached one is absent or about to expire.
    pub async fn bearer(&self) -> Result<String, ClientError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.access_token.clone());
        }

        debug!("requesting fresh access token from {}", self.token_endpoint);
        let token = self.exchange().await?;
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in),
        });
        Ok(access_token)
    }

    async fn exchange(&self) -> Result<TokenResponse, ClientError> {
        let endpoint = self.token_endpoint.clone();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.value()),
            ("client_secret", self.credentials.client_secret.value()),
        ];

        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|source| ClientError::TokenExchange {
                endpoint: endpoint.clone(),
                source: Box::new(ClientError::Request {
                    method: "POST".to_string(),
                    url: endpoint.clone(),
                    source,
                }),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ClientError::TokenExchange {
                endpoint: endpoint.clone(),
                source: Box::new(ClientError::response(RespError::new(
                    "token endpoint rejected the client credentials",
                    status.as_u16(),
                    body,
                    RequestInfo {
                        method: "POST".to_string(),
                        url: endpoint.clone(),
                    },
                ))),
            });
        }

        serde_json::from_str(&body).map_err(|source| ClientError::TokenExchange {
            endpoint: endpoint.clone(),
            source: Box::new(ClientError::ResponseParse {
                method: "POST".to_string(),
                url: endpoint,
                source,
            }),
        })
    }
}

/// How a transport authenticates its outbound requests.
pub enum AuthProvider {
    /// Classic tenants: static `Authorization: Api-Token <token>`.
    Token(Secret),
    /// Platform tenants: OAuth2 bearer, refreshed on demand.
    OAuth(OAuthTokenSource),
}

impl AuthProvider {
    pub(crate) async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        match self {
            Self::Token(secret) => {
                Ok(request.header("Authorization", format!("Api-Token {}", secret.value())))
            }
            Self::OAuth(source) => {
                let bearer = source.bearer().await?;
                Ok(request.header("Authorization", format!("Bearer {bearer}")))
            }
        }
    }
}
