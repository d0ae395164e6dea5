//! Run-wide configuration.
//!
//! One immutable value, built by the front end from its flag surface and
//! passed by reference through the whole recursive resolution. Deep helpers
//! read strictness and paths from here instead of process-global state.

use gantry_schema::MANIFEST_FILE;
use std::path::PathBuf;

/// Branch checked out when neither the caller nor a dependency names one.
pub const DEFAULT_BRANCH: &str = "master";

/// Hash algorithm used for content verification unless configured otherwise.
pub const DEFAULT_HASH_ALGO: &str = "sha256";

/// Configuration for one deployment run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Base URI under which package repositories live.
    pub repo_base: String,
    /// Branch or ref for the root package and the fallback for dependencies.
    pub branch: String,
    /// Install root on the destination filesystem.
    pub destination: PathBuf,
    /// Prefix into each fetched tree; installed paths keep the prefix.
    pub prefix: String,
    /// Strict mode: integrity failures are fatal and the manifest signature
    /// is verified. Lenient mode degrades checksum failures to warnings and
    /// skips signature checking.
    pub strict: bool,
    /// Hash algorithm name looked up in content entries.
    pub hash_algo: String,
    /// File name of the detached manifest signature within the tree.
    pub signature_file: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repo_base: String::new(),
            branch: DEFAULT_BRANCH.to_string(),
            destination: PathBuf::from("/"),
            prefix: String::new(),
            strict: true,
            hash_algo: DEFAULT_HASH_ALGO.to_string(),
            signature_file: format!("{MANIFEST_FILE}.sig"),
        }
    }
}
