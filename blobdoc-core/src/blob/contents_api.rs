use super::{BlobApi, BlobRecord, DeleteOutcome, DirEntry, EntryKind};
use crate::{DocError, Result, ThrottleBackoff, VersionToken};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("blobdoc/", env!("CARGO_PKG_VERSION"));

/// Blob API over a git-hosting "repository contents" endpoint: every blob
/// is a file in a repository, its version is the file's blob sha and every
/// mutation is a commit.
#[derive(Clone)]
pub struct ContentsApiClient {
    client: reqwest::Client,
    base_url: Url,
    branch: Option<String>,
    token: Option<String>,
    backoff: ThrottleBackoff,
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentListing {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Dir(Vec<ContentListing>),
    File(ContentFile),
}

#[derive(Debug, Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteContentsBody<'a> {
    message: &'a str,
    sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    content: ContentFile,
}

#[derive(Debug, PartialEq, Eq)]
enum ResponseClass {
    Success,
    NotFound,
    Conflict,
    Unprocessable,
    Throttled(Option<Duration>),
    ServerError,
    ClientError,
}

fn classify(status: StatusCode, headers: &HeaderMap) -> ResponseClass {
    let rate_limit_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0");

    match status {
        status if status.is_success() => ResponseClass::Success,
        StatusCode::NOT_FOUND => ResponseClass::NotFound,
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => ResponseClass::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY => ResponseClass::Unprocessable,
        StatusCode::TOO_MANY_REQUESTS => ResponseClass::Throttled(retry_after(headers)),
        StatusCode::FORBIDDEN if rate_limit_exhausted => {
            ResponseClass::Throttled(retry_after(headers))
        }
        status if status.is_server_error() => ResponseClass::ServerError,
        _ => ResponseClass::ClientError,
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn decode_content(path: &str, file: &ContentFile) -> Result<Bytes> {
    match file.encoding.as_deref() {
        Some("base64") | None => {}
        // Files past the API's inline limit come back without content.
        Some("none") => {
            let size = file
                .size
                .map(|size| format!("{} bytes", size))
                .unwrap_or_else(|| "unknown size".to_string());
            return Err(DocError::malformed(
                path,
                format!(
                    "blob ({}) is too large to be served inline; keep documents under the \
                     chunk ceiling or give them a splittable collection",
                    size
                ),
            ));
        }
        Some(other) => {
            return Err(DocError::InvalidRequest(format!(
                "{} is served with unsupported encoding '{}'",
                path, other
            )));
        }
    }

    let encoded: String = file
        .content
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|error| DocError::malformed(path, error))?;
    Ok(Bytes::from(decoded))
}

impl ContentsApiClient {
    pub fn new(
        base_url: &str,
        branch: Option<String>,
        token: Option<String>,
        backoff: ThrottleBackoff,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|error| DocError::Config(format!("invalid base_url '{}': {}", base_url, error)))?;
        if base_url.cannot_be_a_base() {
            return Err(DocError::Config(format!(
                "base_url '{}' cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| DocError::Config(error.to_string()))?;

        Ok(Self {
            client,
            base_url,
            branch: branch.filter(|value| !value.trim().is_empty()),
            token: token.filter(|value| !value.trim().is_empty()),
            backoff,
        })
    }

    fn contents_url(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DocError::Config("base_url cannot carry a path".to_string()))?;
            segments.pop_if_empty().push("contents");
            segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        Ok(url)
    }

    fn read_url(&self, path: &str) -> Result<Url> {
        let mut url = self.contents_url(path)?;
        if let Some(branch) = &self.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    /// Sends a request, retrying throttled responses with exponential
    /// backoff. Any other status is returned to the caller.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry = 0;
        loop {
            let mut request = build();
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|error| DocError::Transport {
                message: error.to_string(),
                retry_after: Some(self.backoff.delay_for(0, None)),
            })?;

            let ResponseClass::Throttled(hint) = classify(response.status(), response.headers())
            else {
                return Ok(response);
            };

            let delay = self.backoff.delay_for(retry, hint);
            if retry >= self.backoff.max_retries() {
                return Err(DocError::Transport {
                    message: format!("throttled by blob API: {}", response.status()),
                    retry_after: Some(delay),
                });
            }

            tracing::warn!(
                "blob API throttled {} (retry {} in {:?})",
                response.url(),
                retry + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    async fn failure(&self, path: &str, response: reqwest::Response) -> DocError {
        let status = response.status();
        let class = classify(status, response.headers());
        let body = response.text().await.unwrap_or_default();

        match class {
            ResponseClass::Conflict => DocError::VersionMismatch {
                path: path.to_string(),
            },
            ResponseClass::Unprocessable if body.contains("sha") => DocError::VersionMismatch {
                path: path.to_string(),
            },
            ResponseClass::ServerError => DocError::Transport {
                message: format!("{} on {}: {}", status, path, body),
                retry_after: Some(self.backoff.delay_for(0, None)),
            },
            _ => DocError::InvalidRequest(format!("{} on {}: {}", status, path, body)),
        }
    }
}

#[async_trait]
impl BlobApi for ContentsApiClient {
    async fn get_blob(&self, path: &str) -> Result<Option<BlobRecord>> {
        let url = self.read_url(path)?;
        let response = self.send(|| self.client.get(url.clone())).await?;

        match classify(response.status(), response.headers()) {
            ResponseClass::Success => {}
            ResponseClass::NotFound => return Ok(None),
            _ => return Err(self.failure(path, response).await),
        }

        let payload: ContentsResponse = response
            .json()
            .await
            .map_err(|error| DocError::transport(error.to_string()))?;
        let file = match payload {
            ContentsResponse::File(file) => file,
            ContentsResponse::Dir(_) => {
                return Err(DocError::InvalidRequest(format!("{} is a directory", path)));
            }
        };

        let content = decode_content(path, &file)?;
        tracing::debug!("fetched {} ({} bytes, sha {})", path, content.len(), file.sha);
        Ok(Some(BlobRecord {
            content,
            version: VersionToken::new(file.sha),
        }))
    }

    async fn put_blob(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken> {
        let url = self.contents_url(path)?;
        let body = PutContentsBody {
            message,
            content: STANDARD.encode(&content),
            sha: expected.map(VersionToken::as_str),
            branch: self.branch.as_deref(),
        };

        let response = self
            .send(|| self.client.put(url.clone()).json(&body))
            .await?;
        if classify(response.status(), response.headers()) != ResponseClass::Success {
            return Err(self.failure(path, response).await);
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|error| DocError::transport(error.to_string()))?;
        tracing::debug!("committed {} (sha {})", path, commit.content.sha);
        Ok(VersionToken::new(commit.content.sha))
    }

    async fn delete_blob(
        &self,
        path: &str,
        message: &str,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome> {
        let url = self.contents_url(path)?;
        let body = DeleteContentsBody {
            message,
            sha: expected.as_str(),
            branch: self.branch.as_deref(),
        };

        let response = self
            .send(|| self.client.delete(url.clone()).json(&body))
            .await?;
        match classify(response.status(), response.headers()) {
            ResponseClass::Success => Ok(DeleteOutcome::Deleted),
            ResponseClass::NotFound => Ok(DeleteOutcome::NotFound),
            _ => Err(self.failure(path, response).await),
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let url = self.read_url(path)?;
        let response = self.send(|| self.client.get(url.clone())).await?;

        match classify(response.status(), response.headers()) {
            ResponseClass::Success => {}
            ResponseClass::NotFound => return Ok(Vec::new()),
            _ => return Err(self.failure(path, response).await),
        }

        let payload: ContentsResponse = response
            .json()
            .await
            .map_err(|error| DocError::transport(error.to_string()))?;
        let ContentsResponse::Dir(listing) = payload else {
            return Err(DocError::InvalidRequest(format!("{} is not a directory", path)));
        };

        Ok(listing
            .into_iter()
            .map(|entry| DirEntry {
                kind: if entry.kind == "dir" {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                },
                name: entry.name,
                path: entry.path,
            })
            .collect())
    }
}
