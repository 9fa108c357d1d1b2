//! Workspace value: the request-scoped staging area layout.

use crate::error::{WorkspaceError, WorkspaceResult};
use std::path::{Path, PathBuf};

/// Suffix appended to the project name for the staging root
const STAGING_SUFFIX: &str = "_downloaded";

/// Layout of one project's staging tree.
///
/// Every path is derived once from the base directory and project name;
/// nothing downstream concatenates path strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    project_name: String,
    /// `<base>/<name>_downloaded`
    root: PathBuf,
    /// `<root>/<name>_downloaded.tar.gz`
    archive_path: PathBuf,
    /// `<root>/generated`, the extracted project tree
    extracted_dir: PathBuf,
    /// `<root>/checkout`, the repository clone
    checkout_dir: PathBuf,
}

impl Workspace {
    /// Build the layout for a project, validating the name
    pub fn new(base: &Path, project_name: &str) -> WorkspaceResult<Self> {
        validate_project_name(project_name)?;

        let staging = format!("{project_name}{STAGING_SUFFIX}");
        let root = base.join(&staging);
        let archive_path = root.join(format!("{staging}.tar.gz"));
        let extracted_dir = root.join("generated");
        let checkout_dir = root.join("checkout");

        Ok(Self {
            project_name: project_name.to_string(),
            root,
            archive_path,
            extracted_dir,
            checkout_dir,
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn extracted_dir(&self) -> &Path {
        &self.extracted_dir
    }

    pub fn checkout_dir(&self) -> &Path {
        &self.checkout_dir
    }
}

fn validate_project_name(name: &str) -> WorkspaceResult<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(WorkspaceError::InvalidName(name.to_string()));
    }
    Ok(())
}
