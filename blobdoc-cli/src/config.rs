use blobdoc_core::{BlobApiBuilder, DocError, Result, StoreConfig, ThrottleBackoff};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Blob backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub contents_api: Option<ContentsApiConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    ContentsApi,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::ContentsApi => "contents_api",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("BLOBDOC").separator("__"))
            .build()
            .map_err(|e| DocError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| DocError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn blob_api_builder(&self) -> Result<BlobApiBuilder> {
        let mut builder = BlobApiBuilder::new()
            .backend(self.backend.kind.as_str())
            .throttle(ThrottleBackoff::from_config(&self.store.throttle));

        if self.backend.kind == BackendKind::ContentsApi {
            let contents_api = self.backend.contents_api.as_ref().ok_or_else(|| {
                DocError::Config(
                    "contents_api configuration is required for contents_api backend".to_string(),
                )
            })?;

            builder = builder.base_url(contents_api.base_url.clone());
            if let Some(branch) = &contents_api.branch {
                builder = builder.branch(branch.clone());
            }
            if let Some(token) = &contents_api.token {
                builder = builder.token(token.clone());
            }
        }

        Ok(builder)
    }
}
