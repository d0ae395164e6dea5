//! `gantry-pkg` - the manifest maintainer tool.
//!
//! Companion to `gantry`: validates manifests before they are pushed,
//! generates `[[contents]]` entries for a source tree, and manages the
//! Ed25519 material behind detached manifest signatures.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gantry_schema::{MANIFEST_FILE, Manifest};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "gantry-pkg", about = "Maintains gantry package manifests", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a manifest
    Check {
        /// Path to the manifest
        #[arg(default_value = MANIFEST_FILE)]
        file: PathBuf,
    },
    /// Emit [[contents]] entries for a source tree
    Contents {
        /// Root of the tree to hash
        tree: PathBuf,
        /// Hash algorithm to record
        #[arg(long, default_value = gantry_core::DEFAULT_HASH_ALGO)]
        algo: String,
    },
    /// Generate a new Ed25519 signing keypair
    Keygen,
    /// Detached-sign a manifest using `GANTRY_SIGNING_KEY`
    Sign {
        /// Manifest to sign
        #[arg(short, long)]
        input: PathBuf,
        /// Output signature file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => cmd_check(&file),
        Commands::Contents { tree, algo } => cmd_contents(&tree, &algo),
        Commands::Keygen => cmd_keygen(),
        Commands::Sign { input, output } => cmd_sign(&input, &output),
    }
}

fn cmd_check(file: &Path) -> Result<()> {
    let document = fs::read_to_string(file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    let manifest = Manifest::parse(&document)
        .with_context(|| format!("Invalid manifest {}", file.display()))?;

    println!("  {} {}", manifest.name, manifest.version_string());
    println!("  maintainer: {}", manifest.maintainer);
    println!("  architecture: {}", manifest.architecture.join(", "));
    println!(
        "  {} dependencies, {} content entries, {} ignore patterns",
        manifest.dependencies.len(),
        manifest.contents.len(),
        manifest.ignore.len()
    );
    println!("  manifest ok");
    Ok(())
}

fn cmd_contents(tree: &Path, algo: &str) -> Result<()> {
    let signature_file = format!("{MANIFEST_FILE}.sig");
    let skip = [".gitignore", MANIFEST_FILE, signature_file.as_str(), "README.md"];

    for entry in WalkDir::new(tree).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        // Only regular files carry digests; the installer never checksums
        // directories or symlinks.
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if skip.contains(&name.as_ref()) {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(tree)
            .context("walk left the tree root")?;
        let digest = gantry_core::integrity::digest_file(entry.path(), algo)?;
        let mode = entry.metadata()?.permissions().mode() & 0o7777;

        println!("[[contents]]");
        println!("path = \"{}\"", rel.display());
        println!("{algo} = \"{digest}\"");
        println!("mode = \"{mode:04o}\"");
        println!();
    }
    Ok(())
}

fn cmd_keygen() -> Result<()> {
    use base64::Engine;
    use ed25519_dalek::SigningKey;
    use rand::RngCore;

    println!("  generating ed25519 keypair");

    let mut secret_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut secret_bytes);
    let signing_key = SigningKey::from_bytes(&secret_bytes);
    let verify_key = signing_key.verifying_key();

    let secret_b64 = base64::engine::general_purpose::STANDARD.encode(signing_key.to_bytes());
    let public_b64 = base64::engine::general_purpose::STANDARD.encode(verify_key.to_bytes());

    println!();
    println!("  secret (keep safe):");
    println!("  {secret_b64}");
    println!();
    println!("  public (add to the trusted keyring):");
    println!("  {public_b64}");
    println!();

    let keyfile_path = Path::new("gantry.key");
    if !keyfile_path.exists() {
        let mut f = fs::File::create(keyfile_path)?;
        f.write_all(secret_b64.as_bytes())?;
        println!("  wrote ./gantry.key");
    }

    Ok(())
}

fn cmd_sign(input: &Path, output: &Path) -> Result<()> {
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};

    let secret_b64 = std::env::var("GANTRY_SIGNING_KEY").context("GANTRY_SIGNING_KEY not set")?;

    let secret_bytes = base64::engine::general_purpose::STANDARD
        .decode(secret_b64.trim())
        .context("Invalid Base64 signing key")?;

    if secret_bytes.len() != 32 {
        bail!("GANTRY_SIGNING_KEY must be a 32-byte Ed25519 private key");
    }

    let mut key_arr = [0u8; 32];
    key_arr.copy_from_slice(&secret_bytes);
    let signing_key = SigningKey::from_bytes(&key_arr);

    let data = fs::read(input).context("Failed to read input file")?;
    let signature = signing_key.sign(&data);
    let sig_b64 = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

    fs::write(output, sig_b64).context("Failed to write signature file")?;
    println!("  signed {} -> {}", input.display(), output.display());

    Ok(())
}
