use super::{DynBlobApi, contents_api::ContentsApiClient, memory::InMemoryBlobApi};
use crate::{DocError, Result, ThrottleBackoff};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BlobApiBuilder {
    backend: Option<String>,
    base_url: Option<String>,
    branch: Option<String>,
    token: Option<String>,
    throttle: Option<ThrottleBackoff>,
}

impl BlobApiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn throttle(mut self, throttle: ThrottleBackoff) -> Self {
        self.throttle = Some(throttle);
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(DocError::Config(
                "blob backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    pub fn build(&self) -> Result<DynBlobApi> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "memory" => Ok(Arc::new(InMemoryBlobApi::new())),
            "contents_api" => {
                let base_url = self.base_url.as_deref().unwrap_or_default().trim();
                if base_url.is_empty() {
                    return Err(DocError::Config(
                        "base_url is required for contents_api backend".to_string(),
                    ));
                }

                let client = ContentsApiClient::new(
                    base_url,
                    self.branch.clone(),
                    self.token.clone(),
                    self.throttle.clone().unwrap_or_default(),
                )?;
                Ok(Arc::new(client))
            }
            other => Err(DocError::Config(format!(
                "unsupported blob backend: {}",
                other
            ))),
        }
    }
}
