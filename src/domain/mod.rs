//! Domain entities for scaffold-pipeline.
//!
//! This module contains the core data types:
//! - GenerationRequest: What the user asked to generate and where to put it
//! - Workspace: The staging directory layout for one request
//! - ArchiveStream: Ordered chunk events from the generation service
//! - RepositoryHandle: A remote repository ready to clone and push
//! - PipelineResult: The single terminal outcome of a create run

mod archive;
mod pipeline;
mod repository;
mod request;
mod workspace;

pub use archive::{ArchiveDigest, ArchiveStream, AssembledArchive, ChunkEvent, ChunkSender};
pub use pipeline::{PipelineResult, PipelineStage, PipelineState};
pub use repository::{DesignSnapshot, RemoteFile, RepositoryHandle};
pub use request::{GenerationRequest, RepositoryDescriptor, UpdateRequest, UpdateResponse};
pub use workspace::Workspace;
