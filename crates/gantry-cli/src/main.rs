//! gantry - deploys manifest-described packages onto a filesystem.

use anyhow::{Context, Result, bail};
use clap::Parser;
use gantry_core::{
    DEFAULT_BRANCH, DEFAULT_HASH_ALGO, DependencyChain, Ed25519Verifier, GitFetcher, PackageSpec,
    Resolver, RunConfig, SignatureVerifier, SshOptions, fetch,
};
use gantry_schema::PackageName;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gantry",
    about = "Fetches a package tree, resolves its dependencies, and installs it",
    version
)]
struct Cli {
    /// Name of the package to deploy
    #[arg(long)]
    package: String,

    /// Branch or version to check out
    #[arg(long, default_value = DEFAULT_BRANCH)]
    branch: String,

    /// Destination for the package on the filesystem
    #[arg(long, default_value = "/")]
    destination: PathBuf,

    /// URI of the repository base
    #[arg(long, default_value = "https://git.gantry.dev/")]
    repo: String,

    /// Path to the SSH private key for ssh:// repositories
    #[arg(long, default_value = "/home/gantry/.ssh/id_rsa")]
    sshkey: PathBuf,

    /// SSH private key passphrase
    #[arg(long)]
    sshpass: Option<String>,

    /// Prefix into the repository to the files
    #[arg(long, default_value = "")]
    prefix: String,

    /// Degrade checksum failures to warnings and skip signature checking
    #[arg(long)]
    lenient: bool,

    /// Path to the public keyring for manifest signatures
    #[arg(long, default_value = "/home/gantry/trusted.keys")]
    pubkey: PathBuf,

    /// File name of the manifest signature
    #[arg(long, default_value = "MANIFEST.toml.sig")]
    sig: String,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(long)]
    debug: bool,

    /// Remove the deployer and its SSH key material after deployment
    #[arg(long)]
    clean: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.package.trim().is_empty() {
        bail!("No package specified to load");
    }

    let destination_meta = std::fs::metadata(&cli.destination)
        .with_context(|| format!("Destination directory {}", cli.destination.display()))?;
    if !destination_meta.is_dir() {
        bail!("Destination {} is not a directory", cli.destination.display());
    }

    let ssh = if fetch::is_ssh(&cli.repo) {
        Some(SshOptions::init(&cli.sshkey, cli.sshpass.clone(), &cli.repo)?)
    } else {
        None
    };

    let config = RunConfig {
        repo_base: cli.repo.clone(),
        branch: cli.branch.clone(),
        destination: cli.destination.clone(),
        prefix: cli.prefix.clone(),
        strict: !cli.lenient,
        hash_algo: DEFAULT_HASH_ALGO.to_string(),
        signature_file: cli.sig.clone(),
    };

    // The keyring only has to exist when strict mode will consult it.
    let verifier = if config.strict {
        Some(Ed25519Verifier::from_keyring_file(&cli.pubkey)?)
    } else {
        None
    };

    let root = PackageName::new(&cli.package);
    let mut chain = DependencyChain::new(&root);
    let spec = PackageSpec {
        name: root,
        repo: config.repo_base.clone(),
        branch: None,
    };

    let fetcher = GitFetcher::new(ssh.clone());
    let resolver = Resolver::new(
        &config,
        &fetcher,
        verifier.as_ref().map(|v| v as &dyn SignatureVerifier),
    );
    resolver.resolve(&spec, &mut chain)?;

    // Residual depth means a frame was opened and never closed somewhere.
    if cli.debug && chain.depth() != 0 {
        bail!("Non-zero dependency chain depth: {}", chain.depth());
    }

    if cli.clean {
        clean_self(ssh.as_ref())?;
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let default = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// Container-bootstrap housekeeping: once the payload is deployed there is no
// reason to leave the deployer or its credentials on the filesystem.
fn clean_self(ssh: Option<&SshOptions>) -> Result<()> {
    if let Some(ssh) = ssh {
        for key in [&ssh.key, &ssh.pubkey] {
            match std::fs::remove_file(key) {
                Ok(()) => tracing::debug!("removed {}", key.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => bail!("Could not remove {}: {e}", key.display()),
            }
        }
    }

    let own_exe = std::env::current_exe().context("Could not resolve own executable path")?;
    std::fs::remove_file(&own_exe)
        .with_context(|| format!("Could not remove {}", own_exe.display()))?;
    tracing::debug!("removed {}", own_exe.display());
    Ok(())
}
