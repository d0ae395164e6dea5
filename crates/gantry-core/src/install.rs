//! Tree installation: walking a working copy and materializing it at the
//! destination.
//!
//! The walk is lexical and skips its own root. Each entry is classified
//! exactly once into [`EntryKind`] from its lstat (symlinks are never
//! dereferenced), filtered against the unconditional skip list and the
//! manifest's ignore patterns, then installed per kind. Filesystem errors
//! are fatal with one exception: a symlink that cannot be created is logged
//! and skipped.

use crate::config::RunConfig;
use crate::error::DeployError;
use crate::integrity;
use gantry_schema::{MANIFEST_FILE, Manifest, is_ignored};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

// Tree housekeeping that is never deployable content.
const SKIP_FILES: [&str; 3] = [".gitignore", MANIFEST_FILE, "README.md"];

/// What a walked entry is, decided once from its lstat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    Symlink,
    File,
}

impl EntryKind {
    fn classify(entry: &walkdir::DirEntry) -> Self {
        let file_type = entry.file_type();
        // The symlink test comes first: is_dir() on a dangling or cyclic
        // link would have to dereference it.
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Dir
        } else {
            Self::File
        }
    }
}

/// Per-package installer state, rebuilt for every package in the run.
#[derive(Debug)]
pub struct InstallationContext<'a> {
    /// Root of the fetched working copy.
    pub source_root: &'a Path,
    /// Install root for this package.
    pub destination: &'a Path,
    /// Prefix into the tree: only `source_root/prefix` is walked, and
    /// installed paths keep the prefix.
    pub prefix: &'a str,
    /// The package manifest, for content entries and ignore patterns.
    pub manifest: &'a Manifest,
}

/// Install the package's own tree into the destination.
pub fn install_tree(ctx: &InstallationContext<'_>, config: &RunConfig) -> Result<(), DeployError> {
    let walk_root = if ctx.prefix.is_empty() {
        ctx.source_root.to_path_buf()
    } else {
        ctx.source_root.join(ctx.prefix)
    };
    tracing::debug!(
        "installing from {} into {}",
        walk_root.display(),
        ctx.destination.display()
    );

    let walk = WalkDir::new(&walk_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walk {
        let entry = entry.map_err(|e| DeployError::fs("walk failed", e.into()))?;

        let rel = entry.path().strip_prefix(ctx.source_root).map_err(|e| {
            DeployError::fs("walked outside the source root", io::Error::other(e))
        })?;
        let rel_str = rel.to_string_lossy();

        let name = entry.file_name().to_string_lossy();
        if SKIP_FILES.contains(&name.as_ref()) || name == config.signature_file {
            tracing::debug!("skipping {rel_str}");
            continue;
        }
        if is_ignored(&ctx.manifest.ignore, &rel_str) {
            tracing::debug!("ignoring {rel_str}");
            continue;
        }

        let dest_path = ctx.destination.join(rel);
        match EntryKind::classify(&entry) {
            EntryKind::Dir => {
                tracing::info!("installing {rel_str}/");
                fs::create_dir_all(&dest_path).map_err(|e| {
                    DeployError::fs(format!("could not create directory {rel_str}"), e)
                })?;
                apply_mode(ctx.manifest, &rel_str, &dest_path, true)?;
            }
            EntryKind::Symlink => {
                tracing::info!("installing {rel_str}");
                // Checksums are never computed over symlinks.
                let target = fs::read_link(entry.path()).map_err(|e| {
                    DeployError::fs(format!("could not read link {rel_str}"), e)
                })?;
                if let Err(e) = std::os::unix::fs::symlink(&target, &dest_path) {
                    tracing::warn!(
                        "could not install symlink {rel_str} -> {}: {e}",
                        target.display()
                    );
                }
            }
            EntryKind::File => {
                tracing::info!("installing {rel_str}");
                integrity::check_file(ctx.manifest, entry.path(), &rel_str, config)?;
                copy_file(entry.path(), &dest_path, &rel_str)?;
                apply_mode(ctx.manifest, &rel_str, &dest_path, false)?;
            }
        }
    }

    Ok(())
}

// Byte-for-byte copy through open/create: an unhinted file keeps the created
// file's default permission bits rather than inheriting the source's.
fn copy_file(src: &Path, dest: &Path, rel: &str) -> Result<(), DeployError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DeployError::fs(format!("could not create directory {}", parent.display()), e)
        })?;
    }

    let mut from = fs::File::open(src)
        .map_err(|e| DeployError::fs(format!("could not open {rel}"), e))?;
    let mut to = fs::File::create(dest)
        .map_err(|e| DeployError::fs(format!("could not install {rel}"), e))?;
    io::copy(&mut from, &mut to)
        .map_err(|e| DeployError::fs(format!("could not install {rel}"), e))?;
    Ok(())
}

fn apply_mode(
    manifest: &Manifest,
    rel: &str,
    dest: &Path,
    is_dir: bool,
) -> Result<(), DeployError> {
    if let Some(mode) = manifest.mode_for(rel, is_dir) {
        fs::set_permissions(dest, fs::Permissions::from_mode(mode))
            .map_err(|e| DeployError::fs(format!("could not set mode on {rel}"), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixture {
        _dirs: (tempfile::TempDir, tempfile::TempDir),
        source: PathBuf,
        dest: PathBuf,
    }

    fn fixture() -> Fixture {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let (source_path, dest_path) = (source.path().to_path_buf(), dest.path().to_path_buf());
        Fixture {
            _dirs: (source, dest),
            source: source_path,
            dest: dest_path,
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn manifest(extra: &str) -> Manifest {
        Manifest::parse(&format!(
            "name = \"t\"\nmaintainer = \"m\"\nversion = \"1\"\narchitecture = [\"any\"]\n{extra}"
        ))
        .unwrap()
    }

    fn lenient() -> RunConfig {
        RunConfig {
            strict: false,
            ..RunConfig::default()
        }
    }

    fn install(fx: &Fixture, manifest: &Manifest, config: &RunConfig) -> Result<(), DeployError> {
        let ctx = InstallationContext {
            source_root: &fx.source,
            destination: &fx.dest,
            prefix: "",
            manifest,
        };
        install_tree(&ctx, config)
    }

    #[test]
    fn housekeeping_files_are_never_installed() {
        let fx = fixture();
        write(&fx.source, "MANIFEST.toml", "name = \"t\"");
        write(&fx.source, "MANIFEST.toml.sig", "sig");
        write(&fx.source, ".gitignore", "build");
        write(&fx.source, "README.md", "# t");
        write(&fx.source, "etc/motd", "hello");

        install(&fx, &manifest(""), &lenient()).unwrap();

        assert!(fx.dest.join("etc/motd").exists());
        for skipped in ["MANIFEST.toml", "MANIFEST.toml.sig", ".gitignore", "README.md"] {
            assert!(!fx.dest.join(skipped).exists(), "{skipped} was installed");
        }
    }

    #[test]
    fn ignored_subtrees_are_skipped() {
        let fx = fixture();
        write(&fx.source, "build/output.o", "obj");
        write(&fx.source, "scratch/note.tmp", "tmp");
        write(&fx.source, "usr/bin/app", "bin");

        let m = manifest("ignore = [\"build\", \"*.tmp\"]");
        install(&fx, &m, &lenient()).unwrap();

        assert!(fx.dest.join("usr/bin/app").exists());
        assert!(!fx.dest.join("build").exists());
        assert!(!fx.dest.join("scratch/note.tmp").exists());
    }

    #[test]
    fn declared_mode_is_applied_and_absence_means_no_chmod() {
        let fx = fixture();
        write(&fx.source, "etc/app.conf", "conf");
        write(&fx.source, "etc/other.conf", "other");

        let m = manifest(
            "[[contents]]\npath = \"etc/app.conf\"\nmode = \"0640\"\n",
        );
        install(&fx, &m, &lenient()).unwrap();

        let mode = fs::metadata(fx.dest.join("etc/app.conf"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o640);
        assert!(fx.dest.join("etc/other.conf").exists());
    }

    #[test]
    fn symlinks_are_recreated_without_checksums() {
        let fx = fixture();
        write(&fx.source, "usr/lib/libapp.so.1", "elf");
        std::os::unix::fs::symlink("libapp.so.1", fx.source.join("usr/lib/libapp.so")).unwrap();

        // Strict mode with a digest only for the regular file: the symlink
        // must pass without one.
        let digest = integrity::digest_file(&fx.source.join("usr/lib/libapp.so.1"), "sha256")
            .unwrap();
        let m = manifest(&format!(
            "[[contents]]\npath = \"usr/lib/libapp.so.1\"\nsha256 = \"{digest}\"\n"
        ));
        install(&fx, &m, &RunConfig::default()).unwrap();

        let link = fx.dest.join("usr/lib/libapp.so");
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("libapp.so.1")
        );
    }

    #[test]
    fn existing_files_are_overwritten() {
        let fx = fixture();
        write(&fx.source, "etc/motd", "new");
        write(&fx.dest, "etc/motd", "old");

        install(&fx, &manifest(""), &lenient()).unwrap();
        assert_eq!(fs::read_to_string(fx.dest.join("etc/motd")).unwrap(), "new");
    }

    #[test]
    fn prefix_limits_the_walk_but_stays_in_the_path() {
        let fx = fixture();
        write(&fx.source, "payload/etc/motd", "hello");
        write(&fx.source, "docs/ignored.txt", "doc");

        let m = manifest("");
        let ctx = InstallationContext {
            source_root: &fx.source,
            destination: &fx.dest,
            prefix: "payload",
            manifest: &m,
        };
        install_tree(&ctx, &lenient()).unwrap();

        assert!(fx.dest.join("payload/etc/motd").exists());
        assert!(!fx.dest.join("docs").exists());
    }
}
