//! Configuration management for scaffold-pipeline.
//!
//! Supports layered configuration: defaults → explicit file → user → env

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub pipeline: RunConfig,
    /// User name → push token, seeds the static identity store
    #[serde(default)]
    pub identities: HashMap<String, String>,
}

impl PipelineConfig {
    /// Load configuration with hierarchy: defaults → explicit file → user → env
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            config::File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Explicit config file (must exist when given)
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        // 3. User config (~/.config/scaffold-pipeline/config.toml)
        if let Some(dirs) =
            directories::ProjectDirs::from("com", "scaffold-pipeline", "scaffold-pipeline")
        {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        // 4. Environment variables (SCAFFOLD_PIPELINE__*)
        builder = builder.add_source(
            Environment::with_prefix("SCAFFOLD_PIPELINE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values that would make every run fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.git.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("git.binary must not be empty".to_string()));
        }
        if self.host.design_document_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "host.design_document_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Staging area configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding per-project staging trees; empty means the system temp dir
    #[serde(default)]
    pub base_directory: Option<PathBuf>,
}

impl WorkspaceConfig {
    /// Resolved base directory
    pub fn base_directory(&self) -> PathBuf {
        match &self.base_directory {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => std::env::temp_dir(),
        }
    }
}

/// Remote generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the generation service
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    /// Connect timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            timeout_seconds: default_generation_timeout(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "http://localhost:50051".to_string()
}

fn default_generation_timeout() -> u64 {
    30
}

/// Repository host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base used to build clone URLs (`<base>/<owner>/<repo>.git`)
    #[serde(default = "default_clone_base")]
    pub clone_base: String,
    /// Path of the design document snapshot inside the repository
    #[serde(default = "default_design_document_path")]
    pub design_document_path: String,
    /// Request timeout in seconds
    #[serde(default = "default_host_timeout")]
    pub timeout_seconds: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            clone_base: default_clone_base(),
            design_document_path: default_design_document_path(),
            timeout_seconds: default_host_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_clone_base() -> String {
    "https://github.com".to_string()
}

fn default_design_document_path() -> String {
    ".compage/config.json".to_string()
}

fn default_host_timeout() -> u64 {
    30
}

/// Git-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Git executable
    #[serde(default = "default_git_binary")]
    pub binary: String,
    /// Message used for generated-project commits
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            commit_message: default_commit_message(),
        }
    }
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_commit_message() -> String {
    "project generated and pushed to repository".to_string()
}

/// Per-run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Leading path segments dropped from every archive entry
    #[serde(default = "default_strip_components")]
    pub strip_components: usize,
    /// Upper bound for one create run, in seconds
    #[serde(default = "default_run_timeout")]
    pub timeout_seconds: u64,
    /// Capacity of the per-request chunk queue
    #[serde(default = "default_chunk_queue")]
    pub chunk_queue_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strip_components: default_strip_components(),
            timeout_seconds: default_run_timeout(),
            chunk_queue_capacity: default_chunk_queue(),
        }
    }
}

fn default_strip_components() -> usize {
    1
}

fn default_run_timeout() -> u64 {
    300
}

fn default_chunk_queue() -> usize {
    64
}
