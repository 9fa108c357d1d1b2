//! scaffold-pipeline: project artifact delivery pipeline
//!
//! This crate requests project generation from a remote service, reassembles
//! the streamed archive, extracts it into a request-scoped workspace and
//! publishes the result to the user's git repository.

pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod services;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineSettings};
