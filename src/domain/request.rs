//! Generation request and related payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target repository for a generated project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    /// Repository name on the host
    pub name: String,
    /// Branch commits are pushed to
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branch: branch.into(),
        }
    }
}

/// A request to generate a project and publish it to the user's repository.
///
/// Immutable once submitted; the pipeline only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub project_name: String,
    pub user_name: String,
    /// Design document graph, opaque to the pipeline
    #[serde(default)]
    pub design: Value,
    pub repository: RepositoryDescriptor,
    /// Email recorded on the generated commit
    pub email: String,
    /// Free-form metadata forwarded to the generation service
    #[serde(default)]
    pub metadata: Value,
}

impl GenerationRequest {
    pub fn new(
        project_name: impl Into<String>,
        user_name: impl Into<String>,
        repository: RepositoryDescriptor,
        email: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            user_name: user_name.into(),
            design: Value::Null,
            repository,
            email: email.into(),
            metadata: Value::Null,
        }
    }

    /// Attach the design document
    pub fn with_design(mut self, design: Value) -> Self {
        self.design = design;
        self
    }
}

/// Payload for the non-streaming update call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub project_name: String,
    pub user_name: String,
    pub repository_name: String,
    /// Design document delta
    #[serde(default)]
    pub design: Value,
}

/// Response of the update call, passed through unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    /// Generated content returned by the service
    #[serde(default)]
    pub file_chunk: String,
}
