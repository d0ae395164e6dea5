//! Integrity verification: per-file checksums and detached manifest
//! signatures.
//!
//! The checksum gate runs once per regular file during installation and
//! branches on strictness: strict mode turns a missing or mismatching digest
//! into a fatal error, lenient mode logs and lets the file through. The
//! signature gate runs once per package in strict mode; its math lives
//! behind [`SignatureVerifier`] so the engine never touches key formats
//! directly.

use crate::config::RunConfig;
use crate::error::DeployError;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use gantry_schema::Manifest;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Hex digest of the file at `path` under the named algorithm.
pub fn digest_file(path: &Path, algo: &str) -> Result<String, DeployError> {
    match algo {
        "sha256" => hash_file::<Sha256>(path),
        "sha512" => hash_file::<Sha512>(path),
        _ => Err(DeployError::UnsupportedAlgorithm(algo.to_string())),
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String, DeployError> {
    let mut file = File::open(path)
        .map_err(|e| DeployError::fs(format!("could not open {}", path.display()), e))?;
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| DeployError::fs(format!("could not read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Apply the checksum policy to one regular file.
///
/// `rel` is the tree-relative path used for the manifest lookup; `full` is
/// where the fetched file actually lives. Returns `Ok(())` when the file may
/// be installed.
pub fn check_file(
    manifest: &Manifest,
    full: &Path,
    rel: &str,
    config: &RunConfig,
) -> Result<(), DeployError> {
    let algo = config.hash_algo.as_str();

    let Some(expected) = manifest.hash_for(rel, algo) else {
        if config.strict {
            return Err(DeployError::ChecksumMissing {
                path: rel.to_string(),
                algo: algo.to_string(),
            });
        }
        tracing::warn!("no {algo} checksum found in manifest for {rel}, installing anyway");
        return Ok(());
    };

    let actual = digest_file(full, algo)?;
    if !actual.eq_ignore_ascii_case(expected) {
        if config.strict {
            return Err(DeployError::ChecksumMismatch {
                path: rel.to_string(),
                algo: algo.to_string(),
            });
        }
        tracing::warn!("checksum mismatch for {rel} ({algo})");
    }
    Ok(())
}

/// Outcome of a detached-signature verification.
#[derive(Debug)]
pub struct Verification {
    /// Whether any trusted key verified the signature.
    pub valid: bool,
    /// Identities of the keys that verified it. Reported, not enforced.
    pub signers: Vec<String>,
}

/// Verifies a detached signature over raw manifest bytes.
pub trait SignatureVerifier {
    /// Check `signature` against `manifest`. A malformed signature is an
    /// invalid one, not an error; errors are reserved for the verifier
    /// itself being unusable.
    fn verify(&self, manifest: &[u8], signature: &[u8]) -> Result<Verification, DeployError>;
}

/// Ed25519 verifier over a line-oriented keyring.
///
/// Each keyring line holds a base64-encoded verifying key, optionally
/// followed by an identity label; blank lines and `#` comments are skipped.
/// Signature files hold the base64 signature text that `gantry-pkg sign`
/// produces.
#[derive(Debug)]
pub struct Ed25519Verifier {
    keys: Vec<(String, VerifyingKey)>,
}

impl Ed25519Verifier {
    /// Load a keyring from `path`.
    pub fn from_keyring_file(path: &Path) -> Result<Self, DeployError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Keyring(format!("could not read {}: {e}", path.display()))
        })?;
        Self::from_keyring(&text)
    }

    /// Parse keyring text.
    pub fn from_keyring(text: &str) -> Result<Self, DeployError> {
        let mut keys = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (encoded, label) = match line.split_once(char::is_whitespace) {
                Some((encoded, label)) => (encoded, label.trim()),
                None => (line, ""),
            };

            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| DeployError::Keyring(format!("invalid base64 key: {e}")))?;
            let raw: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| DeployError::Keyring("key must be 32 bytes".to_string()))?;
            let key = VerifyingKey::from_bytes(&raw)
                .map_err(|e| DeployError::Keyring(format!("invalid Ed25519 key: {e}")))?;

            let identity = if label.is_empty() {
                // Short fingerprint stands in for an unlabeled key.
                hex::encode(&raw[..8])
            } else {
                label.to_string()
            };
            keys.push((identity, key));
        }

        if keys.is_empty() {
            return Err(DeployError::Keyring("keyring holds no usable keys".to_string()));
        }
        Ok(Self { keys })
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, manifest: &[u8], signature: &[u8]) -> Result<Verification, DeployError> {
        let invalid = Verification {
            valid: false,
            signers: Vec::new(),
        };

        let Ok(text) = std::str::from_utf8(signature) else {
            return Ok(invalid);
        };
        let Ok(raw) = base64::engine::general_purpose::STANDARD.decode(text.trim()) else {
            return Ok(invalid);
        };
        let Ok(sig) = Signature::from_slice(&raw) else {
            return Ok(invalid);
        };

        let signers: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, key)| key.verify_strict(manifest, &sig).is_ok())
            .map(|(identity, _)| identity.clone())
            .collect();

        Ok(Verification {
            valid: !signers.is_empty(),
            signers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use gantry_schema::Manifest;
    use std::io::Write;

    // sha256("abc")
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn manifest_with_digest(path: &str, digest: &str) -> Manifest {
        Manifest::parse(&format!(
            "name = \"t\"\nmaintainer = \"m\"\nversion = \"1\"\narchitecture = [\"any\"]\n\n[[contents]]\npath = \"{path}\"\nsha256 = \"{digest}\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn digest_file_sha256() {
        let file = write_temp(b"abc");
        assert_eq!(digest_file(file.path(), "sha256").unwrap(), ABC_SHA256);
    }

    #[test]
    fn unsupported_algorithm_is_fatal() {
        let file = write_temp(b"abc");
        let err = digest_file(file.path(), "crc32").unwrap_err();
        assert!(matches!(err, DeployError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn digest_comparison_is_case_insensitive() {
        let file = write_temp(b"abc");
        let manifest = manifest_with_digest("bin/app", &ABC_SHA256.to_uppercase());
        let config = RunConfig::default();
        check_file(&manifest, file.path(), "bin/app", &config).unwrap();
    }

    #[test]
    fn strict_mode_rejects_missing_and_mismatching_digests() {
        let file = write_temp(b"abc");
        let config = RunConfig::default();

        let manifest = manifest_with_digest("bin/app", "00ff00ff");
        let err = check_file(&manifest, file.path(), "bin/app", &config).unwrap_err();
        assert!(matches!(err, DeployError::ChecksumMismatch { .. }));

        let err = check_file(&manifest, file.path(), "bin/other", &config).unwrap_err();
        assert!(matches!(err, DeployError::ChecksumMissing { .. }));
    }

    #[test]
    fn lenient_mode_lets_failures_through() {
        let file = write_temp(b"abc");
        let config = RunConfig {
            strict: false,
            ..RunConfig::default()
        };

        let manifest = manifest_with_digest("bin/app", "00ff00ff");
        check_file(&manifest, file.path(), "bin/app", &config).unwrap();
        check_file(&manifest, file.path(), "bin/other", &config).unwrap();
    }

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn keyring_for(key: &SigningKey, label: &str) -> String {
        format!(
            "{} {label}\n",
            base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes())
        )
    }

    #[test]
    fn signature_round_trip() {
        let key = test_key();
        let manifest = b"name = \"t\"\n";
        let sig = base64::engine::general_purpose::STANDARD
            .encode(key.sign(manifest).to_bytes());

        let verifier =
            Ed25519Verifier::from_keyring(&keyring_for(&key, "Release Crew")).unwrap();
        let result = verifier.verify(manifest, sig.as_bytes()).unwrap();
        assert!(result.valid);
        assert_eq!(result.signers, vec!["Release Crew".to_string()]);

        // Tampered content fails, as does garbage in place of a signature.
        let result = verifier.verify(b"name = \"evil\"\n", sig.as_bytes()).unwrap();
        assert!(!result.valid);
        let result = verifier.verify(manifest, b"not base64 !!").unwrap();
        assert!(!result.valid);
    }

    #[test]
    fn untrusted_key_does_not_verify() {
        let signer = SigningKey::from_bytes(&[9u8; 32]);
        let manifest = b"payload";
        let sig = base64::engine::general_purpose::STANDARD
            .encode(signer.sign(manifest).to_bytes());

        let verifier = Ed25519Verifier::from_keyring(&keyring_for(&test_key(), "x")).unwrap();
        assert!(!verifier.verify(manifest, sig.as_bytes()).unwrap().valid);
    }

    #[test]
    fn empty_keyring_is_an_error() {
        let err = Ed25519Verifier::from_keyring("# comments only\n\n").unwrap_err();
        assert!(matches!(err, DeployError::Keyring(_)));
    }
}
