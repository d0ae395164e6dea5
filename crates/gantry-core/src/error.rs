//! Domain errors for a deployment run.
//!
//! Every error here is fatal to the run except where the caller explicitly
//! degrades it: lenient mode downgrades checksum failures to warnings before
//! they become errors, and symlink creation failures are logged and skipped
//! by the installer. Nothing is retried.

use gantry_schema::ValidationError;
use thiserror::Error;

/// Failure modes of a deployment run.
#[derive(Error, Debug)]
pub enum DeployError {
    /// The manifest (or one of its dependencies' manifests) failed validation.
    #[error("invalid manifest: {0}")]
    Validation(#[from] ValidationError),

    /// The dependency chain grew past [`crate::MAX_DEPTH`] open frames.
    #[error("maximum depth reached, cowardly refusing to add {name:?}")]
    DepthExceeded {
        /// The dependency that would have exceeded the bound.
        name: String,
    },

    /// The manifest signature did not verify against the keyring.
    #[error("INVALID signature for {file}")]
    SignatureInvalid {
        /// File the signature was supposed to cover.
        file: String,
    },

    /// Strict mode requires a digest for every installed file.
    #[error("no {algo} checksum found in manifest for {path}")]
    ChecksumMissing {
        /// Tree-relative path of the file.
        path: String,
        /// Algorithm that was looked up.
        algo: String,
    },

    /// The computed digest does not match the manifest.
    #[error("checksum mismatch for {path} ({algo})")]
    ChecksumMismatch {
        /// Tree-relative path of the file.
        path: String,
        /// Algorithm used for the comparison.
        algo: String,
    },

    /// The configured hash algorithm has no implementation.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The public keyring could not be loaded or holds no usable key.
    #[error("keyring error: {0}")]
    Keyring(String),

    /// SSH material for the fetch collaborator could not be resolved.
    #[error("SSH configuration error: {0}")]
    SshConfig(String),

    /// The fetch collaborator failed to materialize a working copy.
    #[error("could not fetch {repo} ({reference}): {reason}")]
    Fetch {
        /// Repository locator that was fetched.
        repo: String,
        /// Branch or ref requested.
        reference: String,
        /// Collaborator-supplied description, credential hints included.
        reason: String,
    },

    /// A filesystem operation failed during installation.
    #[error("{context}: {source}")]
    Filesystem {
        /// What the engine was doing.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    /// Wrap an I/O error with a description of the failed operation.
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }
}
