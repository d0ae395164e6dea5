//! Manifest parsing and validation.
//!
//! A package declares itself through a `MANIFEST.toml` at the root of its
//! source tree: identity metadata, an ordered dependency list, per-file
//! integrity and permission hints, and ignore rules. The document is
//! deserialized into loosely-optional raw structs and validated into the
//! typed [`Manifest`] in one pass, so downstream code never re-checks field
//! presence.

use crate::types::PackageName;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// File name of the manifest within a package source tree.
pub const MANIFEST_FILE: &str = "MANIFEST.toml";

/// Default permission bits for a file with a content entry but no mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default permission bits for a directory with a content entry but no mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// A manifest that failed validation.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    /// The document is not well-formed TOML.
    #[error("manifest is not valid TOML: {0}")]
    Syntax(#[from] Box<toml::de::Error>),

    /// A required top-level field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A required field is present but empty.
    #[error("field may not be empty: {0}")]
    EmptyField(&'static str),

    /// A dependency entry lacks one of its required fields.
    #[error("dependency {index} is missing required field: {field}")]
    DependencyField {
        /// Zero-based position of the offending entry in the dependency list.
        index: usize,
        /// The absent field.
        field: &'static str,
    },

    /// Revisions start at 1; a literal `"0"` is rejected.
    #[error("revision 0 is not a valid revision")]
    RevisionZero,
}

/// A validated package manifest, immutable after construction.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Package name.
    pub name: PackageName,
    /// Responsible maintainer.
    pub maintainer: String,
    /// Maintainer contact address, descriptive only.
    pub email: Option<String>,
    /// Project home page, descriptive only.
    pub homepage: Option<String>,
    /// Version string.
    pub version: String,
    /// Optional package revision.
    pub revision: Option<String>,
    /// Architectures this package may be deployed on.
    pub architecture: Vec<String>,
    /// Overrides the caller-supplied install root for this package and
    /// everything installed under it.
    pub destination: Option<PathBuf>,
    /// Dependencies, in installation order.
    pub dependencies: Vec<Dependency>,
    /// Per-path integrity and permission hints.
    pub contents: Vec<ContentEntry>,
    /// Ignore patterns excluding paths from installation.
    pub ignore: Vec<String>,
}

/// A single declared dependency.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Name of the dependency package.
    pub name: PackageName,
    /// Repository base URI the dependency is fetched from.
    pub repo: String,
    /// Branch or ref; the resolving package's own branch when absent.
    pub branch: Option<String>,
}

/// Integrity and permission hints for one tree-relative path.
///
/// The digest table maps hash-algorithm names (`sha256`, ...) to hex digests
/// and may cover any subset of algorithms, including none.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    /// Tree-relative path this entry describes.
    pub path: String,
    /// Declared permission mode as an octal string (e.g. `"0640"`).
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(flatten)]
    digests: BTreeMap<String, String>,
}

impl ContentEntry {
    /// The hex digest recorded for `algo`, if any.
    pub fn digest(&self, algo: &str) -> Option<&str> {
        self.digests.get(algo).map(String::as_str)
    }

    /// Whether this entry describes `path`. A leading `/` is insignificant
    /// on either side.
    pub fn matches(&self, path: &str) -> bool {
        trim_root(&self.path) == trim_root(path)
    }
}

fn trim_root(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    maintainer: Option<String>,
    email: Option<String>,
    homepage: Option<String>,
    version: Option<String>,
    #[serde(default, deserialize_with = "revision_field")]
    revision: Option<String>,
    architecture: Option<Vec<String>>,
    destination: Option<PathBuf>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    contents: Vec<ContentEntry>,
    #[serde(default)]
    ignore: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    name: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
}

// Manifest authors write `revision = 3` as often as `revision = "3"`.
fn revision_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Revision {
        Number(i64),
        Text(String),
    }

    Ok(Option::<Revision>::deserialize(deserializer)?.map(|r| match r {
        Revision::Number(n) => n.to_string(),
        Revision::Text(s) => s,
    }))
}

impl Manifest {
    /// Deserialize and validate a manifest document.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the offending field when the
    /// document is malformed, a required field is missing or empty, a
    /// dependency lacks `name` or `repo`, or the revision is `"0"`.
    pub fn parse(document: &str) -> Result<Self, ValidationError> {
        let raw: RawManifest = toml::from_str(document).map_err(Box::new)?;
        Self::validate(raw)
    }

    fn validate(raw: RawManifest) -> Result<Self, ValidationError> {
        let name = raw.name.ok_or(ValidationError::MissingField("name"))?;
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        let maintainer = raw
            .maintainer
            .ok_or(ValidationError::MissingField("maintainer"))?;
        let version = raw.version.ok_or(ValidationError::MissingField("version"))?;
        let architecture = raw
            .architecture
            .ok_or(ValidationError::MissingField("architecture"))?;
        if architecture.is_empty() {
            return Err(ValidationError::EmptyField("architecture"));
        }

        if raw.revision.as_deref() == Some("0") {
            return Err(ValidationError::RevisionZero);
        }

        let mut dependencies = Vec::with_capacity(raw.dependencies.len());
        for (index, dep) in raw.dependencies.into_iter().enumerate() {
            let name = dep
                .name
                .ok_or(ValidationError::DependencyField { index, field: "name" })?;
            let repo = dep
                .repo
                .ok_or(ValidationError::DependencyField { index, field: "repo" })?;
            dependencies.push(Dependency {
                name: PackageName::from(name),
                repo,
                branch: dep.branch,
            });
        }

        Ok(Self {
            name: PackageName::from(name),
            maintainer,
            email: raw.email,
            homepage: raw.homepage,
            version,
            revision: raw.revision,
            architecture,
            destination: raw.destination,
            dependencies,
            contents: raw.contents,
            ignore: raw.ignore,
        })
    }

    /// Human-readable version: `"<version> rev. <revision>"` when a revision
    /// is declared, the bare version otherwise.
    pub fn version_string(&self) -> String {
        match &self.revision {
            Some(revision) => format!("{} rev. {}", self.version, revision),
            None => self.version.clone(),
        }
    }

    /// The digest recorded for `path` under `algo`.
    ///
    /// Looks up the first content entry whose path matches; `None` when no
    /// entry matches or that entry lacks the algorithm.
    pub fn hash_for(&self, path: &str, algo: &str) -> Option<&str> {
        self.contents
            .iter()
            .find(|entry| entry.matches(path))
            .and_then(|entry| entry.digest(algo))
    }

    /// The permission mode to apply at `path`, or `None` for "do not change
    /// mode".
    ///
    /// A matching entry with a declared mode yields that mode; a matching
    /// entry without one yields the type-appropriate default. No entry, no
    /// mode change.
    pub fn mode_for(&self, path: &str, is_dir: bool) -> Option<u32> {
        let entry = self.contents.iter().find(|entry| entry.matches(path))?;
        let default = if is_dir { DEFAULT_DIR_MODE } else { DEFAULT_FILE_MODE };
        match &entry.mode {
            Some(mode) => Some(u32::from_str_radix(mode, 8).unwrap_or(default)),
            None => Some(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "webstack"
maintainer = "Build Crew"
email = "crew@example.org"
version = "2.1"
revision = 3
architecture = ["amd64", "arm64"]
destination = "/srv"
ignore = ["build", "*.tmp"]

[[dependencies]]
name = "libfoo"
repo = "https://git.example.org/"

[[dependencies]]
name = "libbar"
repo = "ssh://git@example.org/mirror/"
branch = "stable"

[[contents]]
path = "etc/app.conf"
sha256 = "AB12cd34"
mode = "0640"

[[contents]]
path = "/usr/bin/app"
sha256 = "ff00"
"#;

    #[test]
    fn parses_full_manifest() {
        let m = Manifest::parse(FULL).unwrap();
        assert_eq!(m.name, "webstack");
        assert_eq!(m.version_string(), "2.1 rev. 3");
        assert_eq!(m.architecture.len(), 2);
        assert_eq!(m.destination.as_deref(), Some(std::path::Path::new("/srv")));
        assert_eq!(m.dependencies.len(), 2);
        assert_eq!(m.dependencies[0].branch, None);
        assert_eq!(m.dependencies[1].branch.as_deref(), Some("stable"));
        assert_eq!(m.ignore, vec!["build", "*.tmp"]);
    }

    #[test]
    fn absent_lists_are_empty() {
        let m = Manifest::parse(
            r#"
name = "tiny"
maintainer = "m"
version = "1.0"
architecture = ["any"]
"#,
        )
        .unwrap();
        assert!(m.dependencies.is_empty());
        assert!(m.contents.is_empty());
        assert!(m.ignore.is_empty());
        assert_eq!(m.version_string(), "1.0");
    }

    #[test]
    fn missing_architecture_is_named() {
        let err = Manifest::parse(
            r#"
name = "x"
maintainer = "m"
version = "1.0"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("architecture")));
        assert!(err.to_string().contains("architecture"));
    }

    #[test]
    fn empty_name_rejected() {
        let err = Manifest::parse(
            r#"
name = "  "
maintainer = "m"
version = "1.0"
architecture = ["any"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyField("name")));
    }

    #[test]
    fn dependency_without_repo_rejected() {
        let err = Manifest::parse(
            r#"
name = "x"
maintainer = "m"
version = "1.0"
architecture = ["any"]

[[dependencies]]
name = "dep"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DependencyField { index: 0, field: "repo" }
        ));
    }

    #[test]
    fn revision_zero_rejected_as_string_and_number() {
        for revision in ["revision = \"0\"", "revision = 0"] {
            let err = Manifest::parse(&format!(
                "name = \"x\"\nmaintainer = \"m\"\nversion = \"1.0\"\n{revision}\narchitecture = [\"any\"]\n"
            ))
            .unwrap_err();
            assert!(matches!(err, ValidationError::RevisionZero));
        }
        // Only the literal "0" is rejected.
        let m = Manifest::parse(
            "name = \"x\"\nmaintainer = \"m\"\nversion = \"1.0\"\nrevision = \"-1\"\narchitecture = [\"any\"]\n",
        )
        .unwrap();
        assert_eq!(m.revision.as_deref(), Some("-1"));
    }

    #[test]
    fn hash_lookup_uses_first_matching_entry() {
        let m = Manifest::parse(FULL).unwrap();
        assert_eq!(m.hash_for("etc/app.conf", "sha256"), Some("AB12cd34"));
        // Leading slash is insignificant on either side.
        assert_eq!(m.hash_for("/etc/app.conf", "sha256"), Some("AB12cd34"));
        assert_eq!(m.hash_for("usr/bin/app", "sha256"), Some("ff00"));
        // Entry exists but lacks the algorithm.
        assert_eq!(m.hash_for("etc/app.conf", "sha512"), None);
        // No entry at all.
        assert_eq!(m.hash_for("/etc/x", "sha256"), None);
    }

    #[test]
    fn mode_lookup_defaults_and_sentinel() {
        let m = Manifest::parse(FULL).unwrap();
        assert_eq!(m.mode_for("etc/app.conf", false), Some(0o640));
        // Entry without a mode gets the type default.
        assert_eq!(m.mode_for("usr/bin/app", false), Some(0o644));
        assert_eq!(m.mode_for("usr/bin/app", true), Some(0o755));
        // No entry means "do not change mode".
        assert_eq!(m.mode_for("/etc/x", false), None);
        assert_eq!(m.mode_for("/etc/x", true), None);
    }
}
