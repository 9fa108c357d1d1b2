//! Pipeline orchestrator: sequences workspace, streaming, extraction and
//! publishing into one create run with exactly one terminal result.

use crate::config::PipelineConfig;
use crate::domain::{
    DesignSnapshot, GenerationRequest, PipelineResult, PipelineStage, PipelineState,
    RepositoryHandle, UpdateRequest, UpdateResponse, Workspace,
};
use crate::error::{
    FetchError, GenerationResult, HostError, PipelineError, PublishError, Result,
};
use crate::services::{
    assembler, extractor, CommitAuthor, Committer, GenerationClient, GitHubHost, GitReconciler,
    HttpGenerationClient, IdentityStore, PublishOutcome, RepositoryHost, StaticIdentityStore,
    WorkspaceManager,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Commit message for design document updates
const DESIGN_COMMIT_MESSAGE: &str = "updated project from ui";

/// Per-run knobs derived from configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub strip_components: usize,
    pub timeout: Duration,
    pub clone_base: String,
    pub design_document_path: String,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            strip_components: config.pipeline.strip_components,
            timeout: Duration::from_secs(config.pipeline.timeout_seconds),
            clone_base: config.host.clone_base.clone(),
            design_document_path: config.host.design_document_path.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// The delivery pipeline with its injected collaborators
pub struct Pipeline {
    generator: Arc<dyn GenerationClient>,
    host: Arc<dyn RepositoryHost>,
    identities: Arc<dyn IdentityStore>,
    reconciler: GitReconciler,
    workspaces: WorkspaceManager,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn GenerationClient>,
        host: Arc<dyn RepositoryHost>,
        identities: Arc<dyn IdentityStore>,
        reconciler: GitReconciler,
        workspaces: WorkspaceManager,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            host,
            identities,
            reconciler,
            workspaces,
            settings,
        }
    }

    /// Wire the HTTP generation client, GitHub host and static identities
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let generator = HttpGenerationClient::from_config(
            &config.generation,
            config.pipeline.chunk_queue_capacity,
        )?;
        let host = GitHubHost::from_config(&config.host)?;
        let identities = StaticIdentityStore::new(config.identities.clone());

        Ok(Self::new(
            Arc::new(generator),
            Arc::new(host),
            Arc::new(identities),
            GitReconciler::from_config(&config.git),
            WorkspaceManager::new(config.workspace.base_directory()),
            PipelineSettings::from_config(config),
        ))
    }

    /// Get the workspace manager
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Generate a project and publish it to the user's repository.
    ///
    /// Never fails: every outcome, including timeouts and infrastructure
    /// errors, is folded into the returned result. The workspace is released
    /// exactly once on every path; if this future is dropped mid-run the
    /// workspace guard releases it instead.
    pub async fn create_project(&self, request: &GenerationRequest) -> PipelineResult {
        let span = tracing::info_span!(
            "create_project",
            project = %request.project_name,
            user = %request.user_name
        );

        async move {
            let mut state = PipelineState::default();

            let guard = match self.workspaces.acquire_guarded(&request.project_name).await {
                Ok(guard) => guard,
                Err(e) => {
                    let stage = state.fail();
                    return failure(request, stage, &e.into());
                }
            };

            let run = self.run_create(request, guard.workspace(), &mut state);
            let outcome = tokio::time::timeout(self.settings.timeout, run).await;
            guard.release().await;

            let result = match outcome {
                Ok(Ok(published)) => {
                    if published == PublishOutcome::NoChanges {
                        tracing::info!("Generated tree identical to remote, nothing pushed");
                    }
                    success(request)
                }
                Ok(Err(e)) => failure(request, state.fail(), &e),
                Err(_) => failure(
                    request,
                    state.fail(),
                    &PipelineError::Timeout(self.settings.timeout),
                ),
            };

            if result.success {
                tracing::info!("{}", result.message);
            } else {
                tracing::error!("{} (stage {}): {}", result.message, result.stage, result.error);
            }
            result
        }
        .instrument(span)
        .await
    }

    /// REQUESTED → STREAMING → ASSEMBLED → EXTRACTED → PUBLISHING → DONE
    async fn run_create(
        &self,
        request: &GenerationRequest,
        workspace: &Workspace,
        state: &mut PipelineState,
    ) -> Result<PublishOutcome> {
        transition(state);
        let stream = self.generator.create_project(request).await?;
        let archive = assembler::assemble(stream, workspace.archive_path()).await?;

        transition(state);
        extractor::extract(
            &archive.path,
            workspace.extracted_dir(),
            self.settings.strip_components,
        )
        .await?;

        transition(state);
        transition(state);
        let credential = self.push_credential(&request.user_name).await?;
        let handle = RepositoryHandle::new(
            &request.user_name,
            &request.repository.name,
            &request.repository.branch,
            credential,
            &self.settings.clone_base,
            workspace.checkout_dir().to_path_buf(),
        );
        let committer = Committer::new(&request.user_name, &request.email);
        let outcome = self
            .reconciler
            .publish(&handle, workspace.extracted_dir(), &committer)
            .await?;

        transition(state);
        Ok(outcome)
    }

    /// Regenerate from a design delta; the service's answer is passed through
    pub async fn update_project(
        &self,
        request: &UpdateRequest,
    ) -> GenerationResult<UpdateResponse> {
        tracing::info!("Updating project {} for {}", request.project_name, request.user_name);
        let response = self.generator.update_project(request).await;
        if let Err(e) = &response {
            tracing::warn!("Update of {} failed: {}", request.project_name, e);
        }
        response
    }

    /// Create the remote repository and commit the first design snapshot.
    ///
    /// A repository name clash yields a distinct, actionable message.
    pub async fn register_project(&self, request: &GenerationRequest) -> PipelineResult {
        let outcome: Result<()> = async {
            let token = self.push_credential(&request.user_name).await?;
            self.host
                .create_repository(&token, &request.repository.name, &request.project_name)
                .await?;
            self.save_design(request).await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => PipelineResult {
                success: true,
                project_name: request.project_name.clone(),
                repository_name: request.repository.name.clone(),
                user_name: request.user_name.clone(),
                stage: PipelineStage::Done,
                message: format!(
                    "Repository '{}' created and design document committed for '{}'",
                    request.repository.name, request.project_name
                ),
                error: String::new(),
            },
            Err(e) => {
                let result = failure(request, PipelineStage::Publishing, &e);
                tracing::error!("{}: {}", result.message, result.error);
                result
            }
        }
    }

    /// Commit the request's design document, updating it in place when the
    /// remote already has one. Returns the new content hash.
    pub async fn save_design(&self, request: &GenerationRequest) -> Result<String> {
        let owner = &request.user_name;
        let repository = &request.repository.name;
        let path = &self.settings.design_document_path;
        let token = self.push_credential(owner).await?;

        let current_sha = match self
            .host
            .fetch_file(owner, Some(&token), repository, path, &request.repository.branch)
            .await
        {
            Ok(file) => Some(file.sha),
            Err(FetchError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let content = serde_json::to_vec_pretty(&request.design)
            .map_err(|e| HostError::InvalidResponse(e.to_string()))?;
        let author = CommitAuthor {
            name: owner.clone(),
            email: request.email.clone(),
        };
        let sha = self
            .host
            .commit_file(
                owner,
                &token,
                repository,
                path,
                &content,
                DESIGN_COMMIT_MESSAGE,
                &author,
                current_sha.as_deref(),
            )
            .await?;

        tracing::info!("Committed {} to {}/{}", path, owner, repository);
        Ok(sha)
    }

    /// Read the design document snapshot back from the remote.
    ///
    /// A repository without the document yet is "no remote state", not an error.
    pub async fn sync_back(
        &self,
        owner: &str,
        repository: &str,
        branch: &str,
    ) -> Result<Option<DesignSnapshot>> {
        let token = self.identities.push_credential(owner).await;
        let path = &self.settings.design_document_path;

        let file = match self
            .host
            .fetch_file(owner, token.as_deref(), repository, path, branch)
            .await
        {
            Ok(file) => file,
            Err(FetchError::NotFound { .. }) => {
                tracing::info!("No {} in {}/{} yet", path, owner, repository);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let document = serde_json::from_slice(&file.content)
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Some(DesignSnapshot {
            document,
            sha: file.sha,
        }))
    }

    async fn push_credential(&self, user: &str) -> Result<String> {
        self.identities
            .push_credential(user)
            .await
            .ok_or_else(|| PublishError::MissingCredential(user.to_string()).into())
    }
}

fn transition(state: &mut PipelineState) {
    let stage = state.advance();
    tracing::info!("Pipeline stage: {}", stage);
}

fn success(request: &GenerationRequest) -> PipelineResult {
    PipelineResult {
        success: true,
        project_name: request.project_name.clone(),
        repository_name: request.repository.name.clone(),
        user_name: request.user_name.clone(),
        stage: PipelineStage::Done,
        message: format!(
            "created project: {} and saved in repository : {} successfully",
            request.project_name, request.repository.name
        ),
        error: String::new(),
    }
}

fn failure(
    request: &GenerationRequest,
    stage: PipelineStage,
    err: &PipelineError,
) -> PipelineResult {
    let message = match err {
        _ if !err.is_user_actionable() => {
            format!("unable to create project : {}", request.project_name)
        }
        PipelineError::Host(HostError::NamingConflict(_)) => format!(
            "Repository for '{}' couldn't be created. Please choose different Repository Name.",
            request.project_name
        ),
        other => format!("unable to create project : {}. {}", request.project_name, other),
    };

    PipelineResult {
        success: false,
        project_name: request.project_name.clone(),
        repository_name: request.repository.name.clone(),
        user_name: request.user_name.clone(),
        stage,
        message,
        error: err.detail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArchiveStream, ChunkEvent, ChunkSender, RemoteFile, RepositoryDescriptor};
    use crate::error::{FetchResult, GenerationError, HostResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tempfile::TempDir;

    enum Script {
        Events(Vec<ChunkEvent>),
        Hang,
        Unreachable,
    }

    struct ScriptedGenerator {
        script: Script,
        held: Mutex<Vec<ChunkSender>>,
    }

    impl ScriptedGenerator {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                held: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedGenerator {
        async fn create_project(&self, _: &GenerationRequest) -> GenerationResult<ArchiveStream> {
            match &self.script {
                Script::Events(events) => Ok(ArchiveStream::from_events(events.clone())),
                Script::Hang => {
                    let (tx, stream) = ArchiveStream::channel(1);
                    self.held.lock().unwrap().push(tx);
                    Ok(stream)
                }
                Script::Unreachable => Err(GenerationError::Connection("refused".into())),
            }
        }

        async fn update_project(
            &self,
            request: &UpdateRequest,
        ) -> GenerationResult<UpdateResponse> {
            Ok(UpdateResponse {
                file_chunk: format!("updated {}", request.project_name),
            })
        }
    }

    #[derive(Default)]
    struct FakeHost {
        conflict: bool,
        /// Status every commit is refused with
        commit_rejection: Option<u16>,
        files: Mutex<Vec<(String, Vec<u8>, Option<String>)>>,
    }

    #[async_trait]
    impl RepositoryHost for FakeHost {
        async fn create_repository(&self, _: &str, name: &str, _: &str) -> HostResult<()> {
            if self.conflict {
                return Err(HostError::NamingConflict(name.to_string()));
            }
            Ok(())
        }

        async fn fetch_file(
            &self,
            owner: &str,
            _: Option<&str>,
            repository: &str,
            path: &str,
            _: &str,
        ) -> FetchResult<RemoteFile> {
            let files = self.files.lock().unwrap();
            match files.iter().rev().find(|(p, _, _)| p == path) {
                Some((_, content, _)) => Ok(RemoteFile {
                    content: content.clone(),
                    sha: format!("sha-{}", files.len()),
                }),
                None => Err(FetchError::NotFound {
                    repository: format!("{owner}/{repository}"),
                    path: path.to_string(),
                }),
            }
        }

        #[allow(clippy::too_many_arguments)]
        async fn commit_file(
            &self,
            _: &str,
            _: &str,
            _: &str,
            path: &str,
            content: &[u8],
            _: &str,
            _: &CommitAuthor,
            sha: Option<&str>,
        ) -> HostResult<String> {
            if let Some(status) = self.commit_rejection {
                return Err(HostError::Status {
                    status,
                    message: "sha wasn't supplied".into(),
                });
            }
            let mut files = self.files.lock().unwrap();
            files.push((path.to_string(), content.to_vec(), sha.map(str::to_string)));
            Ok(format!("sha-{}", files.len()))
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "demo",
            "alice",
            RepositoryDescriptor::new("demo-repo", "main"),
            "alice@example.com",
        )
        .with_design(serde_json::json!({"nodes": {"n1": {"name": "svc"}}}))
    }

    fn pipeline(
        temp: &TempDir,
        generator: Arc<ScriptedGenerator>,
        host: Arc<FakeHost>,
    ) -> Pipeline {
        let settings = PipelineSettings {
            timeout: Duration::from_millis(500),
            clone_base: temp.path().join("remotes").to_string_lossy().to_string(),
            ..PipelineSettings::default()
        };
        Pipeline::new(
            generator,
            host,
            Arc::new(StaticIdentityStore::default().with_credential("alice", "token-a")),
            GitReconciler::new("git", "project generated"),
            WorkspaceManager::new(temp.path().join("stage")),
            settings,
        )
    }

    fn assert_released(p: &Pipeline, temp: &TempDir) {
        let stats = p.workspaces().stats();
        assert_eq!(stats.acquired, stats.released);
        assert!(!temp.path().join("stage/demo_downloaded").exists());
    }

    #[tokio::test]
    async fn test_stream_error_fails_without_extraction() {
        let temp = TempDir::new().unwrap();
        let generator = ScriptedGenerator::new(Script::Events(vec![
            ChunkEvent::Data(Bytes::from_static(b"\x1f\x8b")),
            ChunkEvent::Error("generator crashed".into()),
        ]));
        let p = pipeline(&temp, generator, Arc::new(FakeHost::default()));

        let result = p.create_project(&request()).await;
        assert!(!result.success);
        assert_eq!(result.stage, PipelineStage::Streaming);
        assert_eq!(result.error, "generator crashed");
        assert_released(&p, &temp);

        insta::assert_json_snapshot!(result, @r###"
        {
          "success": false,
          "projectName": "demo",
          "repositoryName": "demo-repo",
          "userName": "alice",
          "stage": "streaming",
          "message": "unable to create project : demo",
          "error": "generator crashed"
        }
        "###);
    }

    #[tokio::test]
    async fn test_unreachable_generator_fails_streaming() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Unreachable),
            Arc::new(FakeHost::default()),
        );

        let result = p.create_project(&request()).await;
        assert!(!result.success);
        assert_eq!(result.stage, PipelineStage::Streaming);
        assert_released(&p, &temp);
    }

    #[tokio::test]
    async fn test_corrupt_archive_fails_after_assembly() {
        let temp = TempDir::new().unwrap();
        let generator = ScriptedGenerator::new(Script::Events(vec![
            ChunkEvent::Data(Bytes::from_static(b"PK\x03\x04")),
            ChunkEvent::Data(Bytes::from_static(b"...")),
            ChunkEvent::End(None),
        ]));
        let p = pipeline(&temp, generator, Arc::new(FakeHost::default()));

        let result = p.create_project(&request()).await;
        assert!(!result.success);
        assert_eq!(result.stage, PipelineStage::Assembled);
        assert!(result.error.contains("Corrupt archive"));
        assert_released(&p, &temp);
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out_and_releases() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Hang),
            Arc::new(FakeHost::default()),
        );

        let result = p.create_project(&request()).await;
        assert!(!result.success);
        assert_eq!(result.stage, PipelineStage::Streaming);
        assert_eq!(result.error, "Pipeline timed out after 500ms");
        assert_released(&p, &temp);
    }

    #[tokio::test]
    async fn test_dropped_run_still_releases() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Hang),
            Arc::new(FakeHost::default()),
        );

        let req = request();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), p.create_project(&req)).await;
        assert!(abandoned.is_err());
        assert_released(&p, &temp);
    }

    #[tokio::test]
    async fn test_register_naming_conflict_is_distinct() {
        let temp = TempDir::new().unwrap();
        let conflict = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Unreachable),
            Arc::new(FakeHost {
                conflict: true,
                ..FakeHost::default()
            }),
        );
        let result = conflict.register_project(&request()).await;
        assert!(!result.success);
        assert!(result.message.contains("Please choose different Repository Name."));

        let ok = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Unreachable),
            Arc::new(FakeHost::default()),
        );
        let result = ok.register_project(&request()).await;
        assert!(result.success, "{:?}", result);
    }

    #[tokio::test]
    async fn test_rejected_design_commit_is_not_a_naming_conflict() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Unreachable),
            Arc::new(FakeHost {
                commit_rejection: Some(422),
                ..FakeHost::default()
            }),
        );

        let result = p.register_project(&request()).await;
        assert!(!result.success);
        assert_eq!(result.message, "unable to create project : demo");
        assert!(result.error.contains("422"));
    }

    #[tokio::test]
    async fn test_missing_credential_message() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Unreachable),
            Arc::new(FakeHost::default()),
        );
        let mut req = request();
        req.user_name = "mallory".into();

        let result = p.register_project(&req).await;
        assert!(!result.success);
        assert!(result
            .message
            .contains("No push credential stored for user: mallory"));
    }

    #[tokio::test]
    async fn test_save_design_passes_current_sha() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let p = pipeline(&temp, ScriptedGenerator::new(Script::Unreachable), host.clone());

        p.save_design(&request()).await.unwrap();
        p.save_design(&request()).await.unwrap();

        let files = host.files.lock().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].2, None);
        assert_eq!(files[1].2.as_deref(), Some("sha-1"));
    }

    #[tokio::test]
    async fn test_sync_back_without_remote_state() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::default());
        let p = pipeline(&temp, ScriptedGenerator::new(Script::Unreachable), host.clone());

        assert_eq!(p.sync_back("alice", "demo-repo", "main").await.unwrap(), None);

        p.save_design(&request()).await.unwrap();
        let snapshot = p.sync_back("alice", "demo-repo", "main").await.unwrap().unwrap();
        assert_eq!(snapshot.document["nodes"]["n1"]["name"], "svc");
        assert_eq!(snapshot.sha, "sha-1");
    }

    #[tokio::test]
    async fn test_update_project_pass_through() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(
            &temp,
            ScriptedGenerator::new(Script::Unreachable),
            Arc::new(FakeHost::default()),
        );
        let update = UpdateRequest {
            project_name: "demo".into(),
            user_name: "alice".into(),
            repository_name: "demo-repo".into(),
            design: serde_json::Value::Null,
        };
        let response = p.update_project(&update).await.unwrap();
        assert_eq!(response.file_chunk, "updated demo");
    }
}
