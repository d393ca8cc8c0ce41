use std::collections::HashMap;

use serde_json::{Value, json};
use strata_domain::{AutomationResource, Coordinate, Entity};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::external_id::external_id;
use crate::http::Transport;
use crate::pagination::{PageShape, get_all_pages};
use crate::retry::RetryPolicy;

const SETTINGS_OBJECTS_PATH: &str = "/api/v2/settings/objects";
const BUCKETS_PATH: &str = "/platform/storage/management/v1/bucket-definitions";
const DOCUMENTS_PATH: &str = "/platform/document/v1/documents";
const OPENPIPELINE_PATH: &str = "/platform/openpipeline/v1/configurations";
const POLICIES_PATH: &str = "/platform/iam/v1/policies";
const GROUPS_PATH: &str = "/platform/iam/v1/groups";
const USERS_PATH: &str = "/platform/iam/v1/users";

#[must_use]
pub const fn automation_path(resource: AutomationResource) -> &'static str {
    match resource {
        AutomationResource::Workflow => "/platform/automation/v1/workflows",
        AutomationResource::BusinessCalendar => "/platform/automation/v1/business-calendars",
        AutomationResource::SchedulingRule => "/platform/automation/v1/scheduling-rules",
    }
}

/// Identity-style resources match by display name (policies, groups) or by
/// email (users) instead of by external fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityResource {
    Policy,
    Group,
    User,
}

impl IdentityResource {
    const fn path(self) -> &'static str {
        match self {
            Self::Policy => POLICIES_PATH,
            Self::Group => GROUPS_PATH,
            Self::User => USERS_PATH,
        }
    }

    const fn match_property(self) -> &'static str {
        match self {
            Self::Policy | Self::Group => "name",
            Self::User => "email",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Group => "group",
            Self::User => "user",
        }
    }
}

type ObjectIdsByExternalId = HashMap<String, String>;

/// Client for the platform surfaces. Settings upserts go through a per-schema
/// object cache so repeated deploys into one schema list the remote once.
pub struct PlatformClient {
    transport: Transport,
    settings_cache: Mutex<HashMap<String, ObjectIdsByExternalId>>,
}

impl PlatformClient {
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            settings_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Settings upsert by deterministic external id. A conflict invalidates
    /// the schema cache and the match runs once more against fresh state.
    pub async fn upsert_settings(
        &self,
        schema_id: &str,
        scope: &str,
        coordinate: &Coordinate,
        name: &str,
        value: &Value,
        origin_object_id: Option<&str>,
    ) -> Result<Entity, ClientError> {
        if let Some(origin) = origin_object_id {
            match self.update_settings_object(origin, value).await {
                Ok(mut entity) => {
                    entity.name = name.to_string();
                    return Ok(entity);
                }
                Err(error) if error.is_not_found() => {
                    debug!("origin object {origin} no longer exists, matching by external id");
                }
                Err(error) => return Err(error),
            }
        }

        let fingerprint = external_id(schema_id, coordinate);
        let result = self
            .settings_upsert_once(schema_id, scope, &fingerprint, value)
            .await;
        let mut entity = match result {
            Err(error) if error.status_code() == Some(409) => {
                debug!("settings upsert conflict for {coordinate}, invalidating {schema_id} cache");
                self.invalidate_schema(schema_id).await;
                self.settings_upsert_once(schema_id, scope, &fingerprint, value)
                    .await?
            }
            other => other?,
        };
        entity.name = name.to_string();
        Ok(entity)
    }

    async fn settings_upsert_once(
        &self,
        schema_id: &str,
        scope: &str,
        fingerprint: &str,
        value: &Value,
    ) -> Result<Entity, ClientError> {
        let object_id = self.settings_object_id(schema_id, fingerprint).await?;

        if let Some(object_id) = object_id {
            return self.update_settings_object(&object_id, value).await;
        }

        let body = json!([{
            "schemaId": schema_id,
            "scope": scope,
            "externalId": fingerprint,
            "value": value,
        }]);
        let response = self
            .transport
            .post_json(SETTINGS_OBJECTS_PATH, body, &RetryPolicy::reads())
            .await?;

        let created: Value = response.json()?;
        let object_id = created
            .get(0)
            .and_then(|entry| entry.get("objectId"))
            .and_then(Value::as_str)
            .unwrap_or(fingerprint)
            .to_string();

        let mut cache = self.settings_cache.lock().await;
        if let Some(by_external_id) = cache.get_mut(schema_id) {
            by_external_id.insert(fingerprint.to_string(), object_id.clone());
        }
        Ok(Entity::new(object_id, ""))
    }

    async fn update_settings_object(
        &self,
        object_id: &str,
        value: &Value,
    ) -> Result<Entity, ClientError> {
        let path = format!("{SETTINGS_OBJECTS_PATH}/{object_id}");
        self.transport
            .put_json(&path, json!({"value": value}), &RetryPolicy::reads())
            .await?;
        Ok(Entity::new(object_id, ""))
    }

    async fn settings_object_id(
        &self,
        schema_id: &str,
        fingerprint: &str,
    ) -> Result<Option<String>, ClientError> {
        let mut cache = self.settings_cache.lock().await;
        if let Some(by_external_id) = cache.get(schema_id) {
            return Ok(by_external_id.get(fingerprint).cloned());
        }

        let filters = vec![
            ("schemaIds".to_string(), schema_id.to_string()),
            ("fields".to_string(), "objectId,externalId".to_string()),
        ];
        let items = get_all_pages(
            &self.transport,
            SETTINGS_OBJECTS_PATH,
            filters,
            PageShape::standard("items"),
        )
        .await?;

        let mut by_external_id = ObjectIdsByExternalId::new();
        for item in items {
            if let (Some(object_id), Some(remote_fingerprint)) = (
                item.get("objectId").and_then(Value::as_str),
                item.get("externalId").and_then(Value::as_str),
            ) {
                by_external_id.insert(remote_fingerprint.to_string(), object_id.to_string());
            }
        }

        let found = by_external_id.get(fingerprint).cloned();
        cache.insert(schema_id.to_string(), by_external_id);
        Ok(found)
    }

    async fn invalidate_schema(&self, schema_id: &str) {
        self.settings_cache.lock().await.remove(schema_id);
    }

    /// Generic fingerprint upsert for automation, bucket and document
    /// objects: probe by id, update on hit, create on miss.
    pub async fn upsert_by_fingerprint(
        &self,
        base_path: &str,
        surface: &str,
        coordinate: &Coordinate,
        name: &str,
        body: &Value,
    ) -> Result<Entity, ClientError> {
        let id = external_id(surface, coordinate);
        let object_path = format!("{base_path}/{id}");

        let mut payload = body.clone();
        if let Value::Object(map) = &mut payload {
            map.insert("id".to_string(), Value::String(id.clone()));
        }

        let exists = match self
            .transport
            .get(&object_path, Vec::new(), &RetryPolicy::reads())
            .await
        {
            Ok(_) => true,
            Err(error) if error.is_not_found() => false,
            Err(error) => return Err(error),
        };

        if exists {
            self.transport
                .put_json(&object_path, payload, &RetryPolicy::upserts())
                .await?;
            debug!("updated {surface} object {id}");
        } else {
            self.transport
                .post_json(base_path, payload, &RetryPolicy::upserts())
                .await?;
            debug!("created {surface} object {id}");
        }
        Ok(Entity::new(id, name))
    }

    #[must_use]
    pub const fn buckets_path() -> &'static str {
        BUCKETS_PATH
    }

    #[must_use]
    pub const fn documents_path() -> &'static str {
        DOCUMENTS_PATH
    }

    /// OpenPipeline configurations are singletons per kind; the kind is the
    /// object address.
    pub async fn upsert_openpipeline(&self, kind: &str, body: &Value) -> Result<Entity, ClientError> {
        let path = format!("{OPENPIPELINE_PATH}/{kind}");
        self.transport
            .put_json(&path, body.clone(), &RetryPolicy::upserts())
            .await?;
        Ok(Entity::new(kind, kind))
    }

    /// Policies and groups match by name, users by email. Duplicate remote
    /// matches are taken in list order with a warning.
    pub async fn upsert_identity(
        &self,
        resource: IdentityResource,
        matcher: &str,
        body: &Value,
    ) -> Result<Entity, ClientError> {
        let items = get_all_pages(
            &self.transport,
            resource.path(),
            Vec::new(),
            PageShape::standard("items"),
        )
        .await?;

        let property = resource.match_property();
        let mut matches = items.iter().filter_map(|item| {
            let value = item.get(property).and_then(Value::as_str)?;
            (value == matcher).then(|| {
                item.get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(matcher)
                    .to_string()
            })
        });

        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            warn!(
                "found multiple {} objects with {property} {matcher:?}; updating the first match",
                resource.label()
            );
        }

        match first {
            Some(id) => {
                let path = format!("{}/{id}", resource.path());
                self.transport
                    .put_json(&path, body.clone(), &RetryPolicy::upserts())
                    .await?;
                Ok(Entity::new(id, matcher))
            }
            None => {
                let response = self
                    .transport
                    .post_json(resource.path(), body.clone(), &RetryPolicy::upserts())
                    .await?;
                let created: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
                let id = created
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(matcher)
                    .to_string();
                Ok(Entity::new(id, matcher))
            }
        }
    }

    /// Delete an identity object located by its name or email. Unknown
    /// matchers are not errors.
    pub async fn delete_identity(
        &self,
        resource: IdentityResource,
        matcher: &str,
    ) -> Result<(), ClientError> {
        let items = get_all_pages(
            &self.transport,
            resource.path(),
            Vec::new(),
            PageShape::standard("items"),
        )
        .await?;

        let property = resource.match_property();
        let found = items.iter().find_map(|item| {
            let value = item.get(property).and_then(Value::as_str)?;
            (value == matcher).then(|| item.get("id").and_then(Value::as_str).map(ToOwned::to_owned))?
        });

        let Some(id) = found else {
            debug!("no {} with {property} {matcher:?} found to delete", resource.label());
            return Ok(());
        };

        self.delete_object(&format!("{}/{id}", resource.path())).await
    }

    /// Delete one object by path; 404 means it is already gone.
    pub async fn delete_object(&self, path: &str) -> Result<(), ClientError> {
        match self.transport.delete(path, &RetryPolicy::reads()).await {
            Ok(_) => Ok(()),
            Err(error) if error.is_not_found() => {
                debug!("no object at {path} found to delete (HTTP 404)");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}
