//! Infrastructure services for scaffold-pipeline.
//!
//! This module contains:
//! - WorkspaceManager: Staging directory lifecycle
//! - assembler: Chunk stream to archive file
//! - extractor: Archive file to project tree
//! - GitReconciler: Clone, overlay, commit and push
//! - RepositoryHost: Host REST API (repository creation, single-file read/write)
//! - GenerationClient: Remote generation service
//! - IdentityStore: Push credential lookup

pub mod assembler;
pub mod extractor;
mod generation;
mod git;
mod host;
mod identity;
mod workspace;

pub use extractor::ExtractionSummary;
pub use generation::{GenerationClient, HttpGenerationClient, ARCHIVE_SHA256_HEADER};
pub use git::{Committer, GitReconciler, PublishOutcome};
pub use host::{CommitAuthor, GitHubHost, RepositoryHost};
pub use identity::{IdentityStore, StaticIdentityStore};
pub use workspace::{WorkspaceGuard, WorkspaceManager, WorkspaceStats};
