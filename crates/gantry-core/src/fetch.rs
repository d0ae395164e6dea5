//! Fetch collaborator: materializes package working copies.
//!
//! The engine asks a [`Fetcher`] for a working copy of a repository at a
//! branch and never looks behind the contract. The production implementation
//! drives the `git` binary; tests substitute a directory-copying stub.

use crate::error::DeployError;
use crate::ssh::SshOptions;
use std::path::Path;
use std::process::Command;

/// Materializes a working copy of a remote source tree.
pub trait Fetcher {
    /// Fetch `repo` at `reference` into `dest`, an existing empty directory.
    fn fetch(&self, repo: &str, reference: &str, dest: &Path) -> Result<(), DeployError>;
}

/// Full repository locator for `package` under `base`.
///
/// The base gains a trailing `/` when it lacks one. GitLab needs a `.git`
/// suffix on HTTP(S) paths, so it is appended there; manifests stay free of
/// the suffix.
pub fn repo_uri(base: &str, package: &str) -> String {
    let separator = if base.ends_with('/') { "" } else { "/" };
    if is_http(base) && !package.ends_with(".git") {
        format!("{base}{separator}{package}.git")
    } else {
        format!("{base}{separator}{package}")
    }
}

fn is_http(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Whether `uri` names an SSH remote.
pub fn is_ssh(uri: &str) -> bool {
    uri.starts_with("ssh://")
}

/// Fetches working copies by shelling out to the `git` binary.
#[derive(Debug, Default)]
pub struct GitFetcher {
    ssh: Option<SshOptions>,
}

impl GitFetcher {
    /// A fetcher, authenticating with `ssh` when given.
    pub fn new(ssh: Option<SshOptions>) -> Self {
        Self { ssh }
    }
}

impl Fetcher for GitFetcher {
    fn fetch(&self, repo: &str, reference: &str, dest: &Path) -> Result<(), DeployError> {
        let git = which::which("git").map_err(|e| DeployError::Fetch {
            repo: repo.to_string(),
            reference: reference.to_string(),
            reason: format!("git executable not found: {e}"),
        })?;

        let mut cmd = Command::new(git);
        cmd.arg("clone")
            .arg("--quiet")
            .arg("--depth=1")
            .arg("--branch")
            .arg(reference)
            .arg(repo)
            .arg(dest);

        if let Some(ssh) = &self.ssh {
            // BatchMode keeps a passphrase-protected key from hanging the
            // run on a prompt nobody will answer.
            cmd.env(
                "GIT_SSH_COMMAND",
                format!(
                    "ssh -i {} -o IdentitiesOnly=yes -o BatchMode=yes",
                    ssh.key.display()
                ),
            );
            if ssh.pass.is_some() {
                tracing::warn!(
                    "a key passphrase cannot be fed through the git transport; \
                     load the key into an agent for {}@{repo}",
                    ssh.user
                );
            }
        }

        let output = cmd
            .output()
            .map_err(|e| DeployError::fs("could not run git", e))?;

        if !output.status.success() {
            let mut reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if self.ssh.is_some() {
                reason.push_str(" (check the SSH key; it may require a passphrase)");
            }
            return Err(DeployError::Fetch {
                repo: repo.to_string(),
                reference: reference.to_string(),
                reason,
            });
        }

        remove_dot_git(dest)
    }
}

/// Strip the VCS bookkeeping directory from a fresh working copy so it is
/// never treated as installable content.
pub fn remove_dot_git(dir: &Path) -> Result<(), DeployError> {
    let dot_git = dir.join(".git");
    if dot_git.exists() {
        std::fs::remove_dir_all(&dot_git).map_err(|e| {
            DeployError::fs(format!("could not remove {}", dot_git.display()), e)
        })?;
    }
    Ok(())
}
