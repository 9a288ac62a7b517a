use serde::{Deserialize, Serialize};

/// Connection settings for the S3-compatible archive store.
///
/// The bucket is not part of this: it is named per write, so one client can
/// serve any bucket the credentials can reach.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl StorageConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            endpoint: lookup("S3_ENDPOINT").filter(|v| !v.trim().is_empty()),
            region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key: lookup("S3_ACCESS_KEY")
                .or_else(|| lookup("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: lookup("S3_SECRET_KEY")
                .or_else(|| lookup("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: lookup("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}
