//! SSH material resolution for git remotes.
//!
//! The engine never speaks SSH itself; it validates the key material up
//! front and hands it to the fetch collaborator, so a bad key path fails the
//! run before anything is cloned.

use crate::error::DeployError;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Resolved SSH options for an `ssh://` repository base.
#[derive(Clone)]
pub struct SshOptions {
    /// Private key used for authentication.
    pub key: PathBuf,
    /// Public half, derived as `<key>.pub`.
    pub pubkey: PathBuf,
    /// Key passphrase, if one was supplied.
    pub pass: Option<String>,
    /// User name extracted from the repository URI.
    pub user: String,
}

impl std::fmt::Debug for SshOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshOptions")
            .field("key", &self.key)
            .field("pubkey", &self.pubkey)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl SshOptions {
    /// Validate the key pair on disk and resolve the remote user name.
    pub fn init(
        key: &Path,
        pass: Option<String>,
        repository: &str,
    ) -> Result<Self, DeployError> {
        valid_key(key, "Private key")?;
        let pubkey = public_key_path(key);
        valid_key(&pubkey, "Public key")?;

        Ok(Self {
            key: key.to_path_buf(),
            pubkey,
            pass,
            user: find_user_name(repository),
        })
    }
}

/// Path of the public key belonging to `private`.
pub fn public_key_path(private: &Path) -> PathBuf {
    let mut name = private.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}

/// User name embedded in `repository`, or `git` when none is.
pub fn find_user_name(repository: &str) -> String {
    if repository.contains('@') {
        let user = Regex::new(r"([[:word:]]+)@").unwrap();
        if let Some(found) = user.captures(repository) {
            return found[1].to_string();
        }
    }
    "git".to_string()
}

// Keys must be named by absolute, readable paths: the deployer often runs in
// a minimal container where a relative or ~-based path points nowhere useful.
fn valid_key(path: &Path, description: &str) -> Result<(), DeployError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(DeployError::SshConfig("no SSH key specified".to_string()));
    }
    if text.starts_with('~') || text.contains("..") {
        return Err(DeployError::SshConfig(format!(
            "path to {description} must be absolute, is {text}"
        )));
    }
    std::fs::metadata(path).map_err(|e| {
        DeployError::SshConfig(format!("cannot read {description} {text}: {e}"))
    })?;
    Ok(())
}
