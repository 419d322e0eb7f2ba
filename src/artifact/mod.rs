//! Model artifact handling
//!
//! A trained model ships as one logical gzip-compressed tar archive. The
//! remote engine caps the size of a single upload, so an archive that
//! exceeds the cap is split into numbered byte fragments on the way out
//! (`chunk`) and joined back into one archive on the way in (`reassemble`).
//! The fragment naming convention `name.0`, `name.1`, … is the contract
//! between the two halves.

mod chunk;
mod reassemble;

pub use chunk::{fragment_name, is_oversized, split_bytes, split_resource};
pub use reassemble::{reassemble, ReassembledArtifact, MAX_ENTRY_BYTES};

use std::io;

/// Errors for artifact reassembly and splitting.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact {name} doesn't exist whole or in fragments")]
    NotFound { name: String },

    #[error("Entry {entry} in artifact {name} is too large: {declared_bytes} bytes")]
    EntryTooLarge {
        /// Logical artifact name
        name: String,
        /// Offending archive entry
        entry: String,
        /// Declared (decompressed) entry size
        declared_bytes: u64,
    },

    #[error("I/O error reading artifact {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    pub(crate) fn io(name: &str, source: io::Error) -> Self {
        ArtifactError::Io {
            name: name.to_string(),
            source,
        }
    }
}
