use std::sync::Arc;

use serde_json::Value;
use strata_domain::{
    ConfigType, Coordinate, DeletePointer, Entity, EnvironmentDefinition, classic_api,
};
use tokio::sync::Semaphore;
use tracing::debug;

mod auth;
mod classic;
mod error;
mod external_id;
mod http;
mod pagination;
mod platform;
mod rate_limit;
mod retry;

pub use auth::{AuthProvider, OAuthTokenSource};
pub use classic::ClassicClient;
pub use error::{CONCURRENT_REQUESTS_ENV, ClientError, RequestInfo, RespError};
pub use external_id::external_id;
pub use http::{DEFAULT_CONCURRENT_REQUESTS, Response, Transport, TransportOptions};
pub use pagination::{PageShape, get_all_pages};
pub use platform::{IdentityResource, PlatformClient, automation_path};
pub use rate_limit::{MAX_RATE_LIMIT_WAIT, rate_limit_wait};
pub use retry::RetryPolicy;

/// The authenticated transports of one environment. Classic APIs need the
/// token transport; platform surfaces need the OAuth one. Settings work over
/// either, preferring OAuth when both are configured.
pub struct ClientSet {
    environment: String,
    classic: Option<ClassicClient>,
    platform: Option<PlatformClient>,
    platform_oauth: bool,
}

impl ClientSet {
    /// Build the transports an environment's auth section allows. Both
    /// transports share one request limiter.
    pub fn for_environment(
        definition: &EnvironmentDefinition,
        options: &TransportOptions,
    ) -> Result<Self, ClientError> {
        let limiter = Arc::new(Semaphore::new(options.concurrent_requests));

        let classic = match &definition.auth.token {
            Some(token) => {
                let transport = Transport::new(
                    &definition.url,
                    AuthProvider::Token(token.clone()),
                    Arc::clone(&limiter),
                    options,
                )?;
                Some(ClassicClient::new(transport))
            }
            None => None,
        };

        let mut platform_oauth = false;
        let platform = match &definition.auth.oauth {
            Some(oauth) => {
                platform_oauth = true;
                let endpoint = oauth.token_endpoint.clone().unwrap_or_else(|| {
                    format!("{}/oauth2/token", definition.url.trim_end_matches('/'))
                });
                let token_http = reqwest::Client::builder()
                    .timeout(options.request_timeout)
                    .build()
                    .map_err(|source| ClientError::Request {
                        method: "BUILD".to_string(),
                        url: endpoint.clone(),
                        source,
                    })?;
                let source = OAuthTokenSource::new(oauth.clone(), endpoint, token_http);
                let transport = Transport::new(
                    &definition.url,
                    AuthProvider::OAuth(source),
                    Arc::clone(&limiter),
                    options,
                )?;
                Some(PlatformClient::new(transport))
            }
            // Settings accept token auth; platform-only surfaces stay
            // unsupported without OAuth.
            None => match &definition.auth.token {
                Some(token) => {
                    let transport = Transport::new(
                        &definition.url,
                        AuthProvider::Token(token.clone()),
                        Arc::clone(&limiter),
                        options,
                    )?;
                    Some(PlatformClient::new(transport))
                }
                None => None,
            },
        };

        debug!(
            "built client set for {} ({}): classic={}, platform={}",
            definition.name,
            definition.kind,
            classic.is_some(),
            platform.is_some(),
        );

        Ok(Self {
            environment: definition.name.clone(),
            classic,
            platform,
            platform_oauth,
        })
    }

    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Whether this environment's transports can carry the given type.
    #[must_use]
    pub fn supports(&self, type_: &ConfigType) -> bool {
        match type_ {
            ConfigType::ClassicApi { .. } => self.classic.is_some(),
            ConfigType::SettingsSchema { .. } => self.platform.is_some(),
            _ => self.platform.is_some() && self.platform_oauth,
        }
    }

    fn classic(&self) -> Result<&ClassicClient, ClientError> {
        self.classic
            .as_ref()
            .ok_or_else(|| ClientError::TransportMissing {
                environment: self.environment.clone(),
                transport: "classic",
            })
    }

    fn platform(&self, needs_oauth: bool) -> Result<&PlatformClient, ClientError> {
        if needs_oauth && !self.platform_oauth {
            return Err(ClientError::TransportMissing {
                environment: self.environment.clone(),
                transport: "platform",
            });
        }
        self.platform
            .as_ref()
            .ok_or_else(|| ClientError::TransportMissing {
                environment: self.environment.clone(),
                transport: "platform",
            })
    }

    /// Dispatch one upsert to the transport that owns the config's type.
    pub async fn upsert(
        &self,
        type_: &ConfigType,
        coordinate: &Coordinate,
        name: &str,
        body: &Value,
        origin_object_id: Option<&str>,
    ) -> Result<Entity, ClientError> {
        match type_ {
            ConfigType::ClassicApi { api, .. } => {
                let api = classic_api(api).ok_or_else(|| ClientError::UnknownApi {
                    api: api.clone(),
                })?;
                self.classic()?.upsert(api, name, body).await
            }
            ConfigType::SettingsSchema { schema_id, scope } => {
                self.platform(false)?
                    .upsert_settings(schema_id, scope, coordinate, name, body, origin_object_id)
                    .await
            }
            ConfigType::Automation { resource } => {
                self.platform(true)?
                    .upsert_by_fingerprint(
                        automation_path(*resource),
                        &type_.name(),
                        coordinate,
                        name,
                        body,
                    )
                    .await
            }
            ConfigType::Bucket => {
                self.platform(true)?
                    .upsert_by_fingerprint(
                        PlatformClient::buckets_path(),
                        &type_.name(),
                        coordinate,
                        name,
                        body,
                    )
                    .await
            }
            ConfigType::Document { .. } => {
                self.platform(true)?
                    .upsert_by_fingerprint(
                        PlatformClient::documents_path(),
                        &type_.name(),
                        coordinate,
                        name,
                        body,
                    )
                    .await
            }
            ConfigType::OpenPipeline { pipeline_kind: kind } => {
                self.platform(true)?.upsert_openpipeline(kind, body).await
            }
            ConfigType::Policy => {
                self.platform(true)?
                    .upsert_identity(IdentityResource::Policy, name, body)
                    .await
            }
            ConfigType::Group => {
                self.platform(true)?
                    .upsert_identity(IdentityResource::Group, name, body)
                    .await
            }
            ConfigType::User => {
                self.platform(true)?
                    .upsert_identity(IdentityResource::User, name, body)
                    .await
            }
        }
    }

    /// Delete the remote object one delete-file entry addresses. Objects
    /// that are already gone are not errors.
    pub async fn delete(&self, pointer: &DeletePointer) -> Result<(), ClientError> {
        if let Some(api) = classic_api(&pointer.config_type) {
            return self.classic()?.delete_by_name(api, &pointer.identifier).await;
        }

        match pointer.config_type.as_str() {
            "policy" => {
                self.platform(true)?
                    .delete_identity(IdentityResource::Policy, &pointer.identifier)
                    .await
            }
            "group" => {
                self.platform(true)?
                    .delete_identity(IdentityResource::Group, &pointer.identifier)
                    .await
            }
            "user" => {
                self.platform(true)?
                    .delete_identity(IdentityResource::User, &pointer.identifier)
                    .await
            }
            "openpipeline" => {
                let path = format!(
                    "/platform/openpipeline/v1/configurations/{}",
                    pointer.identifier
                );
                self.platform(true)?.delete_object(&path).await
            }
            type_name => {
                let base_path = fingerprint_base_path(type_name).ok_or_else(|| {
                    ClientError::UnknownApi {
                        api: type_name.to_string(),
                    }
                })?;
                let project = pointer.project.clone().unwrap_or_default();
                let coordinate = Coordinate::new(project, type_name, pointer.identifier.clone());
                let id = external_id(type_name, &coordinate);
                self.platform(true)?
                    .delete_object(&format!("{base_path}/{id}"))
                    .await
            }
        }
    }
}

fn fingerprint_base_path(type_name: &str) -> Option<&'static str> {
    match type_name {
        "bucket" => Some(PlatformClient::buckets_path()),
        "document-dashboard" | "document-notebook" => Some(PlatformClient::documents_path()),
        "workflow" => Some(automation_path(strata_domain::AutomationResource::Workflow)),
        "business-calendar" => Some(automation_path(
            strata_domain::AutomationResource::BusinessCalendar,
        )),
        "scheduling-rule" => Some(automation_path(
            strata_domain::AutomationResource::SchedulingRule,
        )),
        _ => None,
    }
}

#[must_use]
pub fn supported_delete_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = strata_domain::CLASSIC_APIS.iter().map(|api| api.id).collect();
    types.extend([
        "bucket",
        "document-dashboard",
        "document-notebook",
        "workflow",
        "business-calendar",
        "scheduling-rule",
        "policy",
        "group",
        "user",
        "openpipeline",
    ]);
    types
}
