//! Depth-first package resolution.
//!
//! `Resolver::resolve` drives one deployment run: fetch the package's tree
//! into an ephemeral working copy, validate its manifest, gate it on the
//! detached signature in strict mode, recurse into its dependencies in
//! manifest order, then install the package's own files. A dependency's
//! files are therefore always on disk before its dependents' -- a dependent
//! may overwrite a dependency, never the reverse.

use crate::chain::DependencyChain;
use crate::config::RunConfig;
use crate::error::DeployError;
use crate::fetch::{Fetcher, repo_uri};
use crate::install::{InstallationContext, install_tree};
use crate::integrity::SignatureVerifier;
use gantry_schema::{MANIFEST_FILE, Manifest, PackageName};
use std::path::Path;
use tempfile::TempDir;

/// What to resolve: a package under a repository base, at an optional branch.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    /// Package (and repository) name.
    pub name: PackageName,
    /// Repository base URI the package lives under.
    pub repo: String,
    /// Branch or ref; the resolving package's branch when absent.
    pub branch: Option<String>,
}

/// Recursive resolution driver for one run.
pub struct Resolver<'a> {
    config: &'a RunConfig,
    fetcher: &'a dyn Fetcher,
    verifier: Option<&'a dyn SignatureVerifier>,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    /// A resolver over `config`. The verifier is only consulted in strict
    /// mode and must be present there.
    pub fn new(
        config: &'a RunConfig,
        fetcher: &'a dyn Fetcher,
        verifier: Option<&'a dyn SignatureVerifier>,
    ) -> Self {
        Self {
            config,
            fetcher,
            verifier,
        }
    }

    /// Resolve and install `spec` and everything it depends on.
    pub fn resolve(
        &self,
        spec: &PackageSpec,
        chain: &mut DependencyChain,
    ) -> Result<(), DeployError> {
        self.resolve_at(spec, &self.config.branch, &self.config.destination, chain)
    }

    fn resolve_at(
        &self,
        spec: &PackageSpec,
        branch: &str,
        destination: &Path,
        chain: &mut DependencyChain,
    ) -> Result<(), DeployError> {
        let branch = spec.branch.as_deref().unwrap_or(branch);

        // The working copy is scoped to this frame: dropped on success and
        // on every error path out of it.
        let workdir = TempDir::new()
            .map_err(|e| DeployError::fs("could not create working directory", e))?;
        tracing::debug!("using {} to store temporary files", workdir.path().display());

        let uri = repo_uri(&spec.repo, spec.name.as_str());
        tracing::info!("fetching {} ({branch})...", spec.name);
        self.fetcher.fetch(&uri, branch, workdir.path())?;

        let manifest = read_manifest(workdir.path())?;

        if self.config.strict {
            self.check_signature(workdir.path())?;
        }

        tracing::info!("installing {} {}", manifest.name, manifest.version_string());

        // A `destination` in the manifest overrides the caller's install
        // root for this package and its whole dependency subtree.
        let destination = manifest.destination.as_deref().unwrap_or(destination);

        let mut descended = false;
        for dep in &manifest.dependencies {
            if chain.installed(&dep.name) {
                tracing::info!("already installed {}, skipping", dep.name);
                continue;
            }
            if !chain.push(&dep.name)? {
                // On the current path already: a cycle, suppressed.
                tracing::debug!("{} is already being resolved, skipping", dep.name);
                continue;
            }

            tracing::info!("{} depends on: {}", spec.name, dep.name);
            descended = true;

            let dep_spec = PackageSpec {
                name: dep.name.clone(),
                repo: dep.repo.clone(),
                branch: dep.branch.clone(),
            };
            self.resolve_at(&dep_spec, branch, destination, chain)?;
        }
        if descended {
            tracing::info!("returning to installation of {}", spec.name);
        }

        let ctx = InstallationContext {
            source_root: workdir.path(),
            destination,
            prefix: &self.config.prefix,
            manifest: &manifest,
        };
        install_tree(&ctx, self.config)?;

        chain.mark_done(&spec.name);
        tracing::info!("finished installation of {}", spec.name);

        Ok(())
    }

    fn check_signature(&self, workdir: &Path) -> Result<(), DeployError> {
        let verifier = self.verifier.ok_or_else(|| {
            DeployError::Keyring("strict mode requires a public keyring".to_string())
        })?;

        let manifest_path = workdir.join(MANIFEST_FILE);
        let manifest_bytes = std::fs::read(&manifest_path).map_err(|e| {
            DeployError::fs(format!("could not read {}", manifest_path.display()), e)
        })?;

        let signature_path = workdir.join(&self.config.signature_file);
        let signature_bytes = std::fs::read(&signature_path).map_err(|e| {
            DeployError::fs(format!("could not read {}", signature_path.display()), e)
        })?;

        let verification = verifier.verify(&manifest_bytes, &signature_bytes)?;
        if !verification.valid {
            return Err(DeployError::SignatureInvalid {
                file: MANIFEST_FILE.to_string(),
            });
        }

        tracing::info!("signature for {MANIFEST_FILE} verified");
        tracing::info!("signed by: {}", verification.signers.join(", "));
        Ok(())
    }
}

fn read_manifest(workdir: &Path) -> Result<Manifest, DeployError> {
    let path = workdir.join(MANIFEST_FILE);
    let document = std::fs::read_to_string(&path)
        .map_err(|e| DeployError::fs(format!("could not read {}", path.display()), e))?;
    Ok(Manifest::parse(&document)?)
}
