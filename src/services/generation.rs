//! Remote generation service client.
//!
//! The create call answers with the project archive as a streamed body; every
//! transport callback is funnelled into the request's [`ArchiveStream`] queue.

use crate::config::GenerationConfig;
use crate::domain::{
    ArchiveDigest, ArchiveStream, ChunkEvent, GenerationRequest, UpdateRequest, UpdateResponse,
};
use crate::error::{GenerationError, GenerationResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

/// Header carrying the archive's hex SHA-256, when the service sends one
pub const ARCHIVE_SHA256_HEADER: &str = "x-archive-sha256";

/// Opaque collaborator that turns a design into source code
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Start generation; chunks arrive on the returned stream
    async fn create_project(&self, request: &GenerationRequest) -> GenerationResult<ArchiveStream>;

    /// Regenerate from a design delta and return the service's answer unchanged
    async fn update_project(&self, request: &UpdateRequest) -> GenerationResult<UpdateResponse>;
}

/// HTTP implementation of [`GenerationClient`]
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoint: String,
    queue_capacity: usize,
}

impl HttpGenerationClient {
    pub fn new(
        endpoint: &str,
        connect_timeout: Duration,
        queue_capacity: usize,
    ) -> GenerationResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            queue_capacity,
        })
    }

    pub fn from_config(config: &GenerationConfig, queue_capacity: usize) -> GenerationResult<Self> {
        Self::new(
            &config.endpoint,
            Duration::from_secs(config.timeout_seconds),
            queue_capacity,
        )
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn create_project(&self, request: &GenerationRequest) -> GenerationResult<ArchiveStream> {
        let url = format!("{}/create_project", self.endpoint);
        let resp = self.client.post(&url).json(request).send().await?;
        let (tx, stream) = ArchiveStream::channel(self.queue_capacity);

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = if body.is_empty() {
                format!("generation service returned status {}", status.as_u16())
            } else {
                body
            };
            tx.send(ChunkEvent::Error(detail)).await;
            return Ok(stream);
        }

        let digest = ArchiveDigest {
            size: resp.content_length(),
            sha256: resp
                .headers()
                .get(ARCHIVE_SHA256_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };
        let project = request.project_name.clone();

        tokio::spawn(async move {
            let mut body = resp.bytes_stream();
            let completed = loop {
                // A stalled body must not outlive the consumer.
                let item = tokio::select! {
                    item = body.next() => item,
                    _ = tx.closed() => break false,
                };
                let event = match item {
                    Some(Ok(chunk)) => ChunkEvent::Data(chunk),
                    Some(Err(e)) => {
                        tx.send(ChunkEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => break true,
                };
                if !tx.send(event).await {
                    break false;
                }
            };

            if completed {
                let declared =
                    (digest.size.is_some() || digest.sha256.is_some()).then_some(digest);
                tx.send(ChunkEvent::End(declared)).await;
            } else {
                tracing::debug!("Archive consumer for {} went away, abandoning stream", project);
            }
        });

        Ok(stream)
    }

    async fn update_project(&self, request: &UpdateRequest) -> GenerationResult<UpdateResponse> {
        let url = format!("{}/update_project", self.endpoint);
        let resp = self.client.post(&url).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        resp.json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))
    }
}
