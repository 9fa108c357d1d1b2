//! Repository reconciler: clones the target repository, overlays the
//! generated tree and pushes the result.
//!
//! Uses the git CLI through `tokio::process` so a running clone or push
//! suspends the pipeline instead of blocking a worker.

use crate::config::GitConfig;
use crate::domain::RepositoryHandle;
use crate::error::{PublishError, PublishResult};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tokio::process::Command;

/// Identity recorded on generated commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// How a publish ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A commit was created and pushed
    Pushed { commit: String },
    /// The generated tree matched the remote; nothing was pushed
    NoChanges,
}

/// Git-backed publisher for generated projects
#[derive(Debug, Clone)]
pub struct GitReconciler {
    binary: String,
    commit_message: String,
}

impl GitReconciler {
    /// Create a reconciler using `binary` as the git executable
    pub fn new(binary: impl Into<String>, commit_message: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            commit_message: commit_message.into(),
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(config.binary.clone(), config.commit_message.clone())
    }

    /// Clone `handle`, overlay `generated_tree` onto it, commit and push.
    ///
    /// Files from the generated tree overwrite same-path files in the clone;
    /// files only present in the clone are kept. Nothing is retried.
    pub async fn publish(
        &self,
        handle: &RepositoryHandle,
        generated_tree: &Path,
        committer: &Committer,
    ) -> PublishResult<PublishOutcome> {
        self.clone_repository(handle).await?;
        let workdir = handle.local_path.as_path();

        let source = generated_tree.to_path_buf();
        let target = handle.local_path.clone();
        let copied = tokio::task::spawn_blocking(move || overlay(&source, &target))
            .await
            .map_err(|e| PublishError::Git {
                operation: "overlay".to_string(),
                detail: e.to_string(),
            })??;
        tracing::debug!("Overlaid {} files onto {}", copied, workdir.display());

        self.run("add", &["add", "-A"], Some(workdir)).await?;

        let status = self
            .run("status", &["status", "--porcelain"], Some(workdir))
            .await?;
        if status.trim().is_empty() {
            tracing::info!("{} already up to date, nothing to push", handle.full_name());
            return Ok(PublishOutcome::NoChanges);
        }

        let name_cfg = format!("user.name={}", committer.name);
        let email_cfg = format!("user.email={}", committer.email);
        self.run(
            "commit",
            &[
                "-c",
                &name_cfg,
                "-c",
                &email_cfg,
                "commit",
                "-m",
                &self.commit_message,
            ],
            Some(workdir),
        )
        .await?;

        let commit = self
            .run("rev-parse", &["rev-parse", "HEAD"], Some(workdir))
            .await?
            .trim()
            .to_string();

        let refspec = format!("HEAD:refs/heads/{}", handle.default_branch);
        self.run("push", &["push", "origin", &refspec], Some(workdir))
            .await?;

        tracing::info!(
            "Pushed {} to {} ({})",
            commit,
            handle.display_url(),
            handle.default_branch
        );
        Ok(PublishOutcome::Pushed { commit })
    }

    /// Fresh clone of the default branch into the handle's local path.
    ///
    /// A repository without that branch yet (freshly created, empty) is cloned
    /// as-is and the branch is started locally.
    async fn clone_repository(&self, handle: &RepositoryHandle) -> PublishResult<()> {
        let url = handle.clone_url();
        let local = handle.local_path.to_string_lossy().to_string();

        let branch_clone = self
            .run(
                "clone",
                &["clone", "--branch", &handle.default_branch, &url, &local],
                None,
            )
            .await;

        match branch_clone {
            Ok(_) => Ok(()),
            Err(PublishError::Git { detail, .. }) if detail.contains("not found in upstream") => {
                tracing::debug!(
                    "Branch {} missing on {}, starting it locally",
                    handle.default_branch,
                    handle.display_url()
                );
                if handle.local_path.exists() {
                    fs::remove_dir_all(&handle.local_path)?;
                }
                self.run("clone", &["clone", &url, &local], None).await?;
                self.run(
                    "checkout",
                    &["checkout", "-B", &handle.default_branch],
                    Some(&handle.local_path),
                )
                .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run one git command, returning stdout or a classified error
    async fn run(
        &self,
        operation: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> PublishResult<String> {
        let mut command = Command::new(&self.binary);
        // A dropped run (timeout, cancellation) must not leave git writing
        // into a released workspace or pushing after the result is out.
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| PublishError::Git {
            operation: operation.to_string(),
            detail: format!("Failed to run {}: {}", self.binary, e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(operation, &scrub_credentials(&stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Map git's stderr onto the publish error taxonomy
pub fn classify_failure(operation: &str, stderr: &str) -> PublishError {
    let detail = stderr.trim().to_string();
    let lower = detail.to_lowercase();

    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("invalid username or password")
        || lower.contains("permission denied")
        || lower.contains("returned error: 403")
    {
        return PublishError::Authentication(detail);
    }

    if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
        || (operation == "clone" && lower.contains("does not exist"))
    {
        return PublishError::RepositoryNotFound(detail);
    }

    if lower.contains("[rejected]")
        || lower.contains("non-fast-forward")
        || lower.contains("failed to push some refs")
    {
        return PublishError::Rejected(detail);
    }

    PublishError::Git {
        operation: operation.to_string(),
        detail,
    }
}

/// Replace `user:token@` in any URL with `***@`
pub fn scrub_credentials(text: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"(https?://)[^/@\s]+@").expect("valid pattern"));
    pattern.replace_all(text, "${1}***@").to_string()
}

/// Copy `source` over `target`, returning the number of files written.
///
/// Same-path files are overwritten, target-only files survive, and any
/// `.git` entry in the source is ignored.
pub fn overlay(source: &Path, target: &Path) -> std::io::Result<u64> {
    let mut copied = 0;
    fs::create_dir_all(target)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }

        let from = entry.path();
        let to = target.join(&name);
        let file_type = entry.file_type()?;
        let existing = fs::symlink_metadata(&to).ok();

        if file_type.is_dir() {
            if existing.as_ref().is_some_and(|m| !m.is_dir()) {
                fs::remove_file(&to)?;
            }
            copied += overlay(&from, &to)?;
            continue;
        }

        if let Some(meta) = existing {
            if meta.is_dir() {
                fs::remove_dir_all(&to)?;
            } else if file_type.is_symlink() || meta.file_type().is_symlink() {
                fs::remove_file(&to)?;
            }
        }

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
        copied += 1;
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    let link = fs::read_link(from)?;
    std::os::unix::fs::symlink(link, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
