//! Bundle manifest
//!
//! Records the entries packed into a deployable bundle with their hashes.
//! The manifest travels inside the bundle as `manifest.json` so the remote
//! side can account for what it received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for manifest.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "delay-lane/bundle_manifest@1";

/// A single entry in the bundle manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifestEntry {
    /// Path of the entry within the bundle
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// SHA-256 hash of the entry content
    pub sha256: String,
}

/// Bundle manifest (manifest.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When the manifest was created
    pub created_at: DateTime<Utc>,

    /// Identifier of the bundle this manifest describes
    pub bundle_id: String,

    /// Entries in pack order
    pub entries: Vec<BundleManifestEntry>,
}

impl BundleManifest {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Total size of all entries
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Find an entry by path
    pub fn find_entry(&self, path: &str) -> Option<&BundleManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }
}
