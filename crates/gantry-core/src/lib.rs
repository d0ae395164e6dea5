//! gantry-core - the deployment engine.
//!
//! Given a package name and a repository base, the engine fetches the
//! package's source tree into an ephemeral working copy, validates its
//! manifest, verifies integrity, resolves declared dependencies depth-first,
//! and installs the resulting file trees onto the destination filesystem.
//!
//! # Architecture
//!
//! - **Collaborator traits**: fetching ([`Fetcher`]) and signature math
//!   ([`SignatureVerifier`]) sit behind narrow traits so the engine never
//!   couples to git or a concrete signature scheme.
//! - **Explicit context**: one immutable [`RunConfig`] is threaded through
//!   the recursion; there are no process-global flags.
//! - **Run-scoped state**: a single [`DependencyChain`] carries cycle
//!   suppression, the depth bound, and install-once memoization.
//!
//! Execution is single-threaded and synchronous by design: dependencies are
//! fully installed before their dependents, siblings in manifest order.

pub mod chain;
pub mod config;
pub mod error;
pub mod fetch;
pub mod install;
pub mod integrity;
pub mod resolver;
pub mod ssh;

pub use chain::{DependencyChain, MAX_DEPTH};
pub use config::{DEFAULT_BRANCH, DEFAULT_HASH_ALGO, RunConfig};
pub use error::DeployError;
pub use fetch::{Fetcher, GitFetcher};
pub use integrity::{Ed25519Verifier, SignatureVerifier, Verification};
pub use resolver::{PackageSpec, Resolver};
pub use ssh::SshOptions;
