//! Deployable bundle packaging
//!
//! A bundle is a named package of (path, bytes) entries shipped to the
//! remote engine in one class-loading upload. Bundles serialize as
//! canonical tar archives: normalized timestamps, uid/gid 0, fixed modes,
//! with an embedded `manifest.json` describing every entry. Canonical
//! form keeps upload hashes stable across rebuilds of identical content.

mod manifest;

pub use manifest::{BundleManifest, BundleManifestEntry, SCHEMA_ID, SCHEMA_VERSION};

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io;

use tar::Header;

/// Name of the embedded manifest entry
pub const MANIFEST_PATH: &str = "manifest.json";

/// Errors for bundle packaging
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Manifest serialization error: {0}")]
    ManifestError(#[from] serde_json::Error),

    #[error("Bundle {bundle_id} size {actual_bytes} exceeds transfer limit {limit_bytes}")]
    SizeExceeded {
        /// The bundle that overflowed
        bundle_id: String,
        /// The serialized bundle size in bytes
        actual_bytes: u64,
        /// The configured transfer limit in bytes
        limit_bytes: u64,
    },

    #[error("Duplicate entry path in bundle {bundle_id}: {path}")]
    DuplicateEntry { bundle_id: String, path: String },
}

/// A named package of entries awaiting serialization.
#[derive(Debug, Clone)]
pub struct DeployableBundle {
    id: String,
    entries: Vec<(String, Vec<u8>)>,
}

impl DeployableBundle {
    /// Create an empty bundle with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: Vec::new(),
        }
    }

    /// Create a bundle holding a single entry.
    ///
    /// Oversized-resource chunks ship this way, one chunk per bundle.
    pub fn single(
        id: impl Into<String>,
        path: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let mut bundle = Self::new(id);
        bundle.push_entry(path, bytes);
        bundle
    }

    /// Append an entry. Entries keep insertion order.
    pub fn push_entry(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.push((path.into(), bytes.into()));
    }

    /// Bundle identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of entries (not counting the manifest).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of raw entry sizes.
    pub fn content_size(&self) -> u64 {
        self.entries.iter().map(|(_, b)| b.len() as u64).sum()
    }

    /// Serialize to canonical tar bytes, enforcing the transfer ceiling.
    ///
    /// A `limit_bytes` of 0 means no limit.
    pub fn seal(&self, limit_bytes: u64) -> Result<SealedBundle, BundleError> {
        let mut manifest_entries = Vec::with_capacity(self.entries.len());

        for (path, content) in &self.entries {
            if manifest_entries
                .iter()
                .any(|e: &BundleManifestEntry| e.path == *path)
            {
                return Err(BundleError::DuplicateEntry {
                    bundle_id: self.id.clone(),
                    path: path.clone(),
                });
            }
            manifest_entries.push(BundleManifestEntry {
                path: path.clone(),
                size: content.len() as u64,
                sha256: sha256_hex(content),
            });
        }

        let manifest = BundleManifest {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            bundle_id: self.id.clone(),
            entries: manifest_entries,
        };
        let manifest_json = manifest.to_json()?;

        let mut tar_buffer = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_buffer);

            append_canonical(&mut builder, MANIFEST_PATH, manifest_json.as_bytes())?;
            for (path, content) in &self.entries {
                append_canonical(&mut builder, path, content)?;
            }

            builder.finish()?;
        }

        let actual_bytes = tar_buffer.len() as u64;
        if limit_bytes > 0 && actual_bytes > limit_bytes {
            return Err(BundleError::SizeExceeded {
                bundle_id: self.id.clone(),
                actual_bytes,
                limit_bytes,
            });
        }

        let sha256 = sha256_hex(&tar_buffer);
        Ok(SealedBundle {
            bundle_id: self.id.clone(),
            tar_bytes: tar_buffer,
            sha256,
            manifest,
        })
    }
}

/// A serialized bundle ready for upload.
#[derive(Debug)]
pub struct SealedBundle {
    /// Identifier of the source bundle
    pub bundle_id: String,
    /// The canonical tar bytes
    pub tar_bytes: Vec<u8>,
    /// SHA-256 of the tar bytes
    pub sha256: String,
    /// Manifest embedded in the archive
    pub manifest: BundleManifest,
}

impl SealedBundle {
    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        self.tar_bytes.len() as u64
    }
}

/// Append one entry with canonical header fields.
fn append_canonical(
    builder: &mut tar::Builder<&mut Vec<u8>>,
    path: &str,
    content: &[u8],
) -> Result<(), BundleError> {
    let mut header = Header::new_gnu();
    header.set_path(path)?;
    header.set_size(content.len() as u64);
    header.set_mtime(0); // Epoch
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, content)?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Read;

    fn sample_bundle() -> DeployableBundle {
        let mut bundle = DeployableBundle::new("lane-code");
        bundle.push_entry("procs/is_flight_late", b"code bytes".to_vec());
        bundle.push_entry("procs/gbm.tar.gz", vec![3u8; 256]);
        bundle
    }

    /// Unpack a sealed bundle into (path, bytes) pairs.
    fn unpack(sealed: &SealedBundle) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(Cursor::new(&sealed.tar_bytes));
        let mut out = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            out.push((path, content));
        }
        out
    }

    #[test]
    fn test_seal_embeds_manifest_first() {
        let sealed = sample_bundle().seal(0).unwrap();
        let entries = unpack(&sealed);

        assert_eq!(entries[0].0, MANIFEST_PATH);
        let manifest = BundleManifest::from_json(std::str::from_utf8(&entries[0].1).unwrap())
            .unwrap();
        assert_eq!(manifest.bundle_id, "lane-code");
        assert_eq!(manifest.entries.len(), 2);
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let sealed = sample_bundle().seal(0).unwrap();
        let paths: Vec<String> = unpack(&sealed).into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                MANIFEST_PATH.to_string(),
                "procs/is_flight_late".to_string(),
                "procs/gbm.tar.gz".to_string(),
            ]
        );
    }

    #[test]
    fn test_canonical_headers() {
        let sealed = sample_bundle().seal(0).unwrap();
        let mut archive = tar::Archive::new(Cursor::new(&sealed.tar_bytes));

        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.mtime().unwrap(), 0);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            assert_eq!(header.mode().unwrap(), 0o644);
        }
    }

    #[test]
    fn test_manifest_hashes_content() {
        let sealed = sample_bundle().seal(0).unwrap();
        let entry = sealed.manifest.find_entry("procs/is_flight_late").unwrap();

        assert_eq!(entry.size, 10);
        assert_eq!(entry.sha256, sha256_hex(b"code bytes"));
    }

    #[test]
    fn test_transfer_limit_enforced() {
        let sealed = sample_bundle().seal(0).unwrap();
        let limit = sealed.size() - 1;

        let err = sample_bundle().seal(limit).unwrap_err();
        match err {
            BundleError::SizeExceeded {
                bundle_id,
                actual_bytes,
                limit_bytes,
            } => {
                assert_eq!(bundle_id, "lane-code");
                assert_eq!(actual_bytes, sealed.size());
                assert_eq!(limit_bytes, limit);
            }
            other => panic!("expected SizeExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_zero_means_no_limit() {
        assert!(sample_bundle().seal(0).is_ok());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut bundle = DeployableBundle::new("dup");
        bundle.push_entry("same", b"a".to_vec());
        bundle.push_entry("same", b"b".to_vec());

        let err = bundle.seal(0).unwrap_err();
        assert!(matches!(err, BundleError::DuplicateEntry { path, .. } if path == "same"));
    }

    #[test]
    fn test_single_entry_bundle() {
        let bundle = DeployableBundle::single("gbm.tar.gz.0", "procs/gbm.tar.gz.0", vec![1u8; 64]);
        assert_eq!(bundle.entry_count(), 1);
        assert_eq!(bundle.content_size(), 64);

        let sealed = bundle.seal(0).unwrap();
        let entries = unpack(&sealed);
        assert_eq!(entries.len(), 2); // manifest + chunk
        assert_eq!(entries[1].0, "procs/gbm.tar.gz.0");
    }

    #[test]
    fn test_identical_content_hashes_identically_in_manifest() {
        // Canonical headers mean rebuilds of the same content agree on
        // every per-entry hash; only the manifest timestamp varies.
        let a = sample_bundle().seal(0).unwrap();
        let b = sample_bundle().seal(0).unwrap();
        assert_eq!(a.manifest.entries, b.manifest.entries);
    }
}
