use crate::config::StorageConfig;
use crate::domain::upload::{ObjectLocation, UploadedObject};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
    pub content_type: String,
    pub size: usize,
    /// Unix seconds; only present for signed URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl From<UploadedObject> for UploadResponse {
    fn from(object: UploadedObject) -> Self {
        let expires_at = match &object.location {
            ObjectLocation::Signed { expires_at, .. } => Some(expires_at.unix_timestamp()),
            ObjectLocation::Public(_) => None,
        };

        Self {
            url: object.location.url().to_string(),
            key: object.key.as_str().to_string(),
            content_type: object.content_type,
            size: object.size,
            expires_at,
        }
    }
}

/// Presence of the storage credentials. Values are never echoed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCheckResponse {
    pub project_id: &'static str,
    pub client_email: &'static str,
    pub private_key: &'static str,
    pub storage_bucket: &'static str,
    pub message: &'static str,
}

const fn presence<T>(value: Option<&T>) -> &'static str {
    if value.is_some() { "set" } else { "not set" }
}

impl From<&StorageConfig> for ConfigCheckResponse {
    fn from(config: &StorageConfig) -> Self {
        Self {
            project_id: presence(config.project_id.as_ref()),
            client_email: presence(config.client_email.as_ref()),
            private_key: presence(config.private_key.as_ref()),
            storage_bucket: presence(config.bucket.as_ref()),
            message: "Storage configuration check completed",
        }
    }
}
