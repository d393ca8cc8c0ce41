use rand::Rng;
use serde_json::Value;
use strata_domain::{ClassicApi, Entity};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::http::{Response, Transport};
use crate::pagination::{PageShape, get_all_pages};
use crate::retry::RetryPolicy;

/// Extensions create metrics with a delay; configs deployed right after an
/// upload race that creation without this pause.
const EXTENSION_SETTLE: std::time::Duration = std::time::Duration::from_secs(1);

/// Client for the classic configuration APIs: upsert matches by name, except
/// for single-instance APIs which address the one global object directly.
pub struct ClassicClient {
    transport: Transport,
}

impl ClassicClient {
    #[must_use]
    pub const fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Match-or-create by display name. Single-instance APIs skip the match
    /// step and PUT the global object.
    pub async fn upsert(
        &self,
        api: &ClassicApi,
        name: &str,
        body: &Value,
    ) -> Result<Entity, ClientError> {
        if api.single_instance {
            let response = self
                .transport
                .put_json(api.path, body.clone(), &RetryPolicy::upserts())
                .await?;
            debug!("updated single-instance {} object (HTTP {})", api.id, response.status);
            return Ok(Entity::new(api.id, name));
        }

        if api.id == "extension" {
            return self.upsert_extension(api, name, body).await;
        }

        let existing = self.find_by_name(api, name).await?;
        match existing {
            Some(id) => {
                let path = format!("{}/{id}", api.path);
                self.transport
                    .put_json(&path, body.clone(), &RetryPolicy::upserts())
                    .await?;
                debug!("updated {} {name} ({id})", api.id);
                Ok(Entity::new(id, name))
            }
            None => {
                let response = self
                    .transport
                    .post_json(api.path, body.clone(), &RetryPolicy::upserts())
                    .await?;
                let entity = created_entity(&response, name);
                debug!("created {} {name} ({})", api.id, entity.id);
                Ok(entity)
            }
        }
    }

    /// Delete by display name. Unknown names and 404 responses are not
    /// errors; the object is already gone.
    pub async fn delete_by_name(&self, api: &ClassicApi, name: &str) -> Result<(), ClientError> {
        let Some(id) = self.find_by_name(api, name).await? else {
            debug!("no {} named {name:?} found to delete", api.id);
            return Ok(());
        };

        let path = format!("{}/{id}", api.path);
        match self.transport.delete(&path, &RetryPolicy::reads()).await {
            Ok(_) => Ok(()),
            Err(error) if error.is_not_found() => {
                debug!("{} {name:?} vanished before the delete (HTTP 404)", api.id);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn find_by_name(
        &self,
        api: &ClassicApi,
        name: &str,
    ) -> Result<Option<String>, ClientError> {
        let shape = PageShape {
            items_property: api.list_property,
            page_key_property: "nextPageKey",
            total_count_property: Some("totalCount"),
        };
        let items = get_all_pages(&self.transport, api.path, Vec::new(), shape).await?;

        let mut matches = items.iter().filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?;
            let item_name = item.get("name").and_then(Value::as_str)?;
            (item_name == name).then(|| id.to_string())
        });

        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            warn!(
                "found multiple {} objects named {name:?}; updating the first match",
                api.id
            );
        }
        Ok(first)
    }

    /// Extension upload: version precheck, then a multipart form with one
    /// in-memory zip holding `custom/plugin.json`.
    async fn upsert_extension(
        &self,
        api: &ClassicApi,
        name: &str,
        payload: &Value,
    ) -> Result<Entity, ClientError> {
        match self.extension_status(api, name, payload).await? {
            ExtensionStatus::UpToDate => {
                info!("extension {name} already deployed in this version, skipping upload");
                return Ok(Entity::new(name, name));
            }
            ExtensionStatus::NeedsUpload => {}
        }

        let body = serde_json::to_vec(payload).unwrap_or_default();
        let zip = stored_zip("custom/plugin.json", &body);
        let (content_type, form) = multipart_form("file", &format!("{name}.zip"), &zip);

        self.transport
            .post_raw(api.path, content_type, form, &RetryPolicy::upserts())
            .await?;
        debug!("uploaded extension {name}");

        tokio::time::sleep(EXTENSION_SETTLE).await;
        Ok(Entity::new(name, name))
    }

    async fn extension_status(
        &self,
        api: &ClassicApi,
        name: &str,
        payload: &Value,
    ) -> Result<ExtensionStatus, ClientError> {
        let path = format!("{}/{}", api.path, name);
        let response = match self.transport.get(&path, Vec::new(), &RetryPolicy::reads()).await {
            Ok(response) => response,
            Err(error) if error.is_not_found() => return Ok(ExtensionStatus::NeedsUpload),
            Err(error) => return Err(error),
        };

        let deployed: Value = response.json()?;
        let deployed_version = deployed.get("version").and_then(Value::as_str);
        let local_version = payload.get("version").and_then(Value::as_str);

        match (deployed_version, local_version) {
            (Some(remote), Some(local)) if remote > local => Err(response.into_error(format!(
                "deployed version ({remote}) of extension {name} is newer than local ({local})"
            ))),
            (Some(remote), Some(local)) if remote == local => Ok(ExtensionStatus::UpToDate),
            _ => Ok(ExtensionStatus::NeedsUpload),
        }
    }
}

enum ExtensionStatus {
    UpToDate,
    NeedsUpload,
}

fn created_entity(response: &Response, fallback_name: &str) -> Entity {
    let body: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or(fallback_name);
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(fallback_name);
    Entity::new(id, name)
}

// ---------------------------------------------------------------------------
// Multipart + in-memory zip
// ---------------------------------------------------------------------------

/// Encode a single-file multipart/form-data body by hand; retries rebuild the
/// request from these bytes, which a streaming form would not allow.
fn multipart_form(field: &str, file_name: &str, content: &[u8]) -> (String, Vec<u8>) {
    let boundary: String = {
        let mut rng = rand::thread_rng();
        (0..30).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={boundary}"),
        body,
    )
}

/// Write a one-entry zip archive without compression. The handful of header
/// fields below is the whole of the format for the stored method.
fn stored_zip(entry_name: &str, content: &[u8]) -> Vec<u8> {
    let name = entry_name.as_bytes();
    let crc = crc32(content);
    let size = u32::try_from(content.len()).unwrap_or(u32::MAX);
    let name_len = u16::try_from(name.len()).unwrap_or(u16::MAX);

    let mut out = Vec::new();

    // local file header
    out.extend_from_slice(&[0x50, 0x4b, 0x03, 0x04]);
    put_u16(&mut out, 20); // version needed
    put_u16(&mut out, 0); // flags
    put_u16(&mut out, 0); // method: stored
    put_u16(&mut out, 0); // mod time
    put_u16(&mut out, 0); // mod date
    put_u32(&mut out, crc);
    put_u32(&mut out, size);
    put_u32(&mut out, size);
    put_u16(&mut out, name_len);
    put_u16(&mut out, 0); // extra length
    out.extend_from_slice(name);
    out.extend_from_slice(content);

    // central directory
    let central_offset = u32::try_from(out.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
    put_u16(&mut out, 20); // version made by
    put_u16(&mut out, 20); // version needed
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u32(&mut out, crc);
    put_u32(&mut out, size);
    put_u32(&mut out, size);
    put_u16(&mut out, name_len);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0); // comment length
    put_u16(&mut out, 0); // disk number
    put_u16(&mut out, 0); // internal attributes
    put_u32(&mut out, 0); // external attributes
    put_u32(&mut out, 0); // local header offset
    out.extend_from_slice(name);
    let central_size = u32::try_from(out.len()).unwrap_or(u32::MAX) - central_offset;

    // end of central directory
    out.extend_from_slice(&[0x50, 0x4b, 0x05, 0x06]);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 1); // entries on this disk
    put_u16(&mut out, 1); // entries total
    put_u32(&mut out, central_size);
    put_u32(&mut out, central_offset);
    put_u16(&mut out, 0); // comment length

    out
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for byte in data {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            let mask = 0u32.wrapping_sub(crc & 1);
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}
