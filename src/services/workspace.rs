//! Workspace manager: creates, purges and releases staging directories.

use crate::domain::Workspace;
use crate::error::{WorkspaceError, WorkspaceResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;

/// Lifetime counters, shared by the manager and its guards
#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    residue_purged: AtomicU64,
}

/// Snapshot of the manager's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceStats {
    pub acquired: u64,
    pub released: u64,
    pub residue_purged: u64,
}

/// Owns the staging area namespace under one base directory.
///
/// Two concurrent requests for the same project name are not coordinated;
/// the second acquire purges the first one's tree.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: PathBuf,
    counters: Arc<Counters>,
}

impl WorkspaceManager {
    /// Create a manager rooted at `base`
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Create a fresh staging tree for a project.
    ///
    /// A pre-existing tree is residue from a run that never cleaned up: it is
    /// purged and creation is retried once.
    pub async fn acquire(&self, project_name: &str) -> WorkspaceResult<Workspace> {
        let workspace = Workspace::new(&self.base, project_name)?;

        fs::create_dir_all(&self.base)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: self.base.clone(),
                source,
            })?;

        match fs::create_dir(workspace.root()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(
                    "Purging residue of a previous run at {}",
                    workspace.root().display()
                );
                purge(workspace.root())
                    .await
                    .map_err(|source| WorkspaceError::Purge {
                        path: workspace.root().to_path_buf(),
                        source,
                    })?;
                self.counters.residue_purged.fetch_add(1, Ordering::SeqCst);

                fs::create_dir(workspace.root())
                    .await
                    .map_err(|source| WorkspaceError::Create {
                        path: workspace.root().to_path_buf(),
                        source,
                    })?;
            }
            Err(source) => {
                return Err(WorkspaceError::Create {
                    path: workspace.root().to_path_buf(),
                    source,
                })
            }
        }

        if let Err(source) = fs::create_dir(workspace.extracted_dir()).await {
            // Not yet handed out, so nobody else will release it.
            let _ = fs::remove_dir_all(workspace.root()).await;
            return Err(WorkspaceError::Create {
                path: workspace.extracted_dir().to_path_buf(),
                source,
            });
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Acquired workspace for {} at {}",
            workspace.project_name(),
            workspace.root().display()
        );
        Ok(workspace)
    }

    /// Acquire and wrap in a guard that releases on drop
    pub async fn acquire_guarded(&self, project_name: &str) -> WorkspaceResult<WorkspaceGuard> {
        let workspace = self.acquire(project_name).await?;
        Ok(WorkspaceGuard {
            workspace,
            counters: Arc::clone(&self.counters),
            released: false,
        })
    }

    /// Delete a staging tree.
    ///
    /// Failures are logged and swallowed so they never mask the run's result.
    pub async fn release(&self, workspace: Workspace) {
        release_async(&self.counters, workspace).await;
    }

    /// Current counter values
    pub fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
            residue_purged: self.counters.residue_purged.load(Ordering::SeqCst),
        }
    }
}

/// Exclusive owner of an acquired workspace.
///
/// `release` consumes the guard; a guard dropped without release (timeout,
/// cancelled future, unwinding) deletes the tree synchronously instead.
#[derive(Debug)]
pub struct WorkspaceGuard {
    workspace: Workspace,
    counters: Arc<Counters>,
    released: bool,
}

impl WorkspaceGuard {
    /// Get the guarded workspace
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Release the workspace
    pub async fn release(mut self) {
        release_async(&self.counters, self.workspace.clone()).await;
        // Only set once the counter moved; a cancelled release falls back to drop.
        self.released = true;
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if !self.released {
            let workspace = &self.workspace;
            tracing::debug!(
                "Workspace {} released on drop",
                workspace.root().display()
            );
            if let Err(e) = std::fs::remove_dir_all(workspace.root()) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to clean up {}: {}",
                        workspace.root().display(),
                        e
                    );
                }
            }
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

async fn release_async(counters: &Counters, workspace: Workspace) {
    match fs::remove_dir_all(workspace.root()).await {
        Ok(()) => tracing::debug!("{} is cleaned up", workspace.root().display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            "Failed to clean up {}: {}",
            workspace.root().display(),
            e
        ),
    }
    counters.released.fetch_add(1, Ordering::SeqCst);
}

/// Remove whatever occupies `path`, directory or not
async fn purge(path: &Path) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}
