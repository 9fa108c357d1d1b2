//! Repository host client: repository creation and single-file read/write
//! over the host's REST contents API.

use crate::config::HostConfig;
use crate::domain::RemoteFile;
use crate::error::{FetchError, FetchResult, HostError, HostResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("scaffold-pipeline/", env!("CARGO_PKG_VERSION"));

/// Author details for API commits
#[derive(Debug, Clone, Serialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Version-control host operations used by the pipeline
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Create a repository owned by the token's user.
    ///
    /// A name clash surfaces as [`HostError::NamingConflict`].
    async fn create_repository(&self, token: &str, name: &str, description: &str)
        -> HostResult<()>;

    /// Read one file from `branch`
    async fn fetch_file(
        &self,
        owner: &str,
        token: Option<&str>,
        repository: &str,
        path: &str,
        branch: &str,
    ) -> FetchResult<RemoteFile>;

    /// Create or update one file; `sha` must be the current hash when updating.
    /// Returns the new content hash.
    #[allow(clippy::too_many_arguments)]
    async fn commit_file(
        &self,
        owner: &str,
        token: &str,
        repository: &str,
        path: &str,
        content: &[u8],
        message: &str,
        author: &CommitAuthor,
        sha: Option<&str>,
    ) -> HostResult<String>;
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    content: CommitContent,
}

#[derive(Debug, Deserialize)]
struct CommitContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRepositoryBody<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
}

#[derive(Debug, Serialize)]
struct CommitFileBody<'a> {
    message: &'a str,
    content: String,
    committer: &'a CommitAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// GitHub REST implementation
pub struct GitHubHost {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubHost {
    pub fn new(api_base: &str, timeout: Duration) -> HostResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &HostConfig) -> HostResult<Self> {
        Self::new(&config.api_base, Duration::from_secs(config.timeout_seconds))
    }

    fn contents_url(&self, owner: &str, repository: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            owner,
            repository,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RepositoryHost for GitHubHost {
    async fn create_repository(
        &self,
        token: &str,
        name: &str,
        description: &str,
    ) -> HostResult<()> {
        let url = format!("{}/user/repos", self.api_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&CreateRepositoryBody {
                name,
                description,
                private: true,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            if status.as_u16() == 422 {
                return Err(HostError::NamingConflict(name.to_string()));
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        tracing::info!("Created repository {}", name);
        Ok(())
    }

    async fn fetch_file(
        &self,
        owner: &str,
        token: Option<&str>,
        repository: &str,
        path: &str,
        branch: &str,
    ) -> FetchResult<RemoteFile> {
        let mut request = self
            .client
            .get(self.contents_url(owner, repository, path))
            .query(&[("ref", branch)]);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await.map_err(HostError::from)?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(FetchError::NotFound {
                repository: format!("{owner}/{repository}"),
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body).into());
        }

        let contents: ContentsResponse = resp
            .json()
            .await
            .map_err(|e| HostError::InvalidResponse(e.to_string()))?;

        if let Some(encoding) = contents.encoding.as_deref() {
            if encoding != "base64" {
                return Err(FetchError::Decode(format!("unsupported encoding {encoding}")));
            }
        }

        Ok(RemoteFile {
            content: decode_content(&contents.content)?,
            sha: contents.sha,
        })
    }

    async fn commit_file(
        &self,
        owner: &str,
        token: &str,
        repository: &str,
        path: &str,
        content: &[u8],
        message: &str,
        author: &CommitAuthor,
        sha: Option<&str>,
    ) -> HostResult<String> {
        let resp = self
            .client
            .put(self.contents_url(owner, repository, path))
            .bearer_auth(token)
            .json(&CommitFileBody {
                message,
                content: STANDARD.encode(content),
                committer: author,
                sha,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let committed: CommitResponse = resp
            .json()
            .await
            .map_err(|e| HostError::InvalidResponse(e.to_string()))?;
        Ok(committed.content.sha)
    }
}

/// Map a non-success status onto the host error taxonomy.
///
/// A 422 only means a name clash on repository creation, which maps it itself.
pub fn status_error(status: u16, message: String) -> HostError {
    match status {
        401 | 403 => HostError::Unauthorized(status),
        _ => HostError::Status { status, message },
    }
}

/// Decode a base64 content field; the host wraps it at 60 columns
pub fn decode_content(encoded: &str) -> FetchResult<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| FetchError::Decode(e.to_string()))
}
