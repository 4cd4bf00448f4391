//! Hash manifests — the concrete inputs a fingerprint was derived from

use std::fmt;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HashError, Result};

/// An opaque, content-addressed fingerprint of a task invocation
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Shortened form for display (first 12 characters)
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    /// The full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The resolved inputs a fingerprint is computed from. Serialized to JSON
/// alongside cache entries so fingerprints can be inspected after the fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashManifest {
    /// Target the manifest belongs to
    pub target: String,
    /// Normalized command text
    pub command: String,
    /// Resolved argument values, in invocation order
    pub args: Vec<String>,
    /// Input files mapped to their content digests (sorted by path)
    pub inputs: BTreeMap<String, String>,
    /// Declared environment variable inputs (sorted by name)
    pub env: BTreeMap<String, String>,
    /// Resolved toolchain version identifiers (sorted)
    pub toolchains: Vec<String>,
}

impl HashManifest {
    /// Compute the fingerprint for this manifest. Deterministic: identical
    /// manifests always produce identical fingerprints, on any machine.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();

        hasher.update(self.command.as_bytes());
        hasher.update(b"\n");

        for arg in &self.args {
            hasher.update(arg.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\n");

        // BTreeMap iteration is sorted, keeping the digest
        // order-independent with respect to input enumeration
        for (path, digest) in &self.inputs {
            hasher.update(path.as_bytes());
            hasher.update(b"=");
            hasher.update(digest.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\n");

        for (name, value) in &self.env {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\n");

        for toolchain in &self.toolchains {
            hasher.update(toolchain.as_bytes());
            hasher.update(b"\x1f");
        }

        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

/// Load a manifest from a directory of `<hash>.json` files by full hash or
/// unambiguous short prefix
pub fn find_manifest(dir: &Path, query: &str) -> Result<(Fingerprint, HashManifest)> {
    if query.is_empty() {
        return Err(HashError::UnknownHash(query.to_string()));
    }

    let mut matches: Vec<String> = Vec::new();

    if dir.exists() {
        for entry in std::fs::read_dir(dir).map_err(HashError::Io)? {
            let entry = entry.map_err(HashError::Io)?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if stem.starts_with(query) {
                        matches.push(stem.to_string());
                    }
                }
            }
        }
    }

    match matches.len() {
        0 => Err(HashError::UnknownHash(query.to_string())),
        1 => {
            let hash = matches.remove(0);
            let path = dir.join(format!("{}.json", hash));
            debug!(hash = %hash, "loading hash manifest");

            let content = std::fs::read_to_string(&path).map_err(HashError::Io)?;
            let manifest = serde_json::from_str(&content).map_err(HashError::Json)?;
            Ok((Fingerprint(hash), manifest))
        }
        _ => {
            matches.sort();
            Err(HashError::AmbiguousPrefix {
                prefix: query.to_string(),
                matches,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest() -> HashManifest {
        HashManifest {
            target: "lib:build".to_string(),
            command: "cargo build".to_string(),
            args: vec!["--release".to_string()],
            inputs: BTreeMap::from([
                ("lib/src/a.rs".to_string(), "abc".to_string()),
                ("lib/src/b.rs".to_string(), "def".to_string()),
            ]),
            env: BTreeMap::from([("NODE_ENV".to_string(), "production".to_string())]),
            toolchains: vec!["node@20.11.0".to_string()],
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(manifest().fingerprint(), manifest().fingerprint());
    }

    #[test]
    fn test_fingerprint_sensitive_to_each_input() {
        let base = manifest().fingerprint();

        let mut changed = manifest();
        changed.command = "cargo build --verbose".to_string();
        assert_ne!(changed.fingerprint(), base);

        let mut changed = manifest();
        changed.args.push("--offline".to_string());
        assert_ne!(changed.fingerprint(), base);

        let mut changed = manifest();
        changed
            .inputs
            .insert("lib/src/a.rs".to_string(), "zzz".to_string());
        assert_ne!(changed.fingerprint(), base);

        let mut changed = manifest();
        changed.env.insert("CI".to_string(), "1".to_string());
        assert_ne!(changed.fingerprint(), base);

        let mut changed = manifest();
        changed.toolchains = vec!["node@21.0.0".to_string()];
        assert_ne!(changed.fingerprint(), base);
    }

    #[test]
    fn test_fingerprint_short() {
        let fp = manifest().fingerprint();
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
    }

    #[test]
    fn test_find_manifest_by_prefix() {
        let temp = TempDir::new().unwrap();
        let m = manifest();
        let fp = m.fingerprint();

        std::fs::write(
            temp.path().join(format!("{}.json", fp)),
            serde_json::to_string(&m).unwrap(),
        )
        .unwrap();

        let (found_fp, found) = find_manifest(temp.path(), &fp.as_str()[..8]).unwrap();
        assert_eq!(found_fp, fp);
        assert_eq!(found, m);
    }

    #[test]
    fn test_find_manifest_unknown() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            find_manifest(temp.path(), "deadbeef"),
            Err(HashError::UnknownHash(_))
        ));
    }

    #[test]
    fn test_find_manifest_ambiguous() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("aa11.json"), "{}").unwrap();
        std::fs::write(temp.path().join("aa22.json"), "{}").unwrap();

        assert!(matches!(
            find_manifest(temp.path(), "aa"),
            Err(HashError::AmbiguousPrefix { .. })
        ));
    }
}
