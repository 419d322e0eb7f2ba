//! Artifact reassembly
//!
//! Join-on-read half of the fragment contract. A logical artifact is
//! either a single resource or a run of numbered fragments; either way the
//! recovered byte stream is one gzip-compressed tar archive, which is
//! materialized entry-by-entry into an owned map for the scoring backend.

use std::collections::BTreeMap;
use std::io::{self, Read};

use flate2::read::GzDecoder;

use crate::resource::ResourceLocator;

use super::{chunk::fragment_name, ArtifactError};

/// Largest accepted declared entry size.
///
/// Entries are materialized whole, and downstream model readers index
/// buffers with 32-bit offsets, so anything past `i32::MAX` is rejected
/// outright rather than truncated.
pub const MAX_ENTRY_BYTES: u64 = i32::MAX as u64;

/// Immutable snapshot of a reassembled model archive.
///
/// Owned by the caller; holds no reference to the fragment sources it was
/// built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledArtifact {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ReassembledArtifact {
    /// Content of the named entry, if present.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the archive had no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume into the underlying name → bytes map.
    pub fn into_entries(self) -> BTreeMap<String, Vec<u8>> {
        self.entries
    }
}

/// Reassemble the named logical artifact through the given locator.
///
/// Tries the whole resource first; if that cannot be opened, probes
/// `name.0`, `name.1`, … until a fragment is missing. Fragments are
/// concatenated in index order, so fragment `i` byte-precedes `i + 1`.
/// Fails with [`ArtifactError::NotFound`] when neither form exists and
/// with [`ArtifactError::EntryTooLarge`] when a declared entry size
/// exceeds [`MAX_ENTRY_BYTES`].
pub fn reassemble(
    locator: &dyn ResourceLocator,
    logical_name: &str,
) -> Result<ReassembledArtifact, ArtifactError> {
    let stream = open_sources(locator, logical_name)?;
    let mut archive = tar::Archive::new(GzDecoder::new(stream));

    let mut entries = BTreeMap::new();
    let iter = archive
        .entries()
        .map_err(|e| ArtifactError::io(logical_name, e))?;

    for entry in iter {
        let mut entry = entry.map_err(|e| ArtifactError::io(logical_name, e))?;

        let declared = entry
            .header()
            .size()
            .map_err(|e| ArtifactError::io(logical_name, e))?;
        let name = entry
            .path()
            .map_err(|e| ArtifactError::io(logical_name, e))?
            .to_string_lossy()
            .into_owned();

        if declared > MAX_ENTRY_BYTES {
            return Err(ArtifactError::EntryTooLarge {
                name: logical_name.to_string(),
                entry: name,
                declared_bytes: declared,
            });
        }

        let mut content = Vec::with_capacity(declared as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| ArtifactError::io(logical_name, e))?;
        entries.insert(name, content);
    }

    Ok(ReassembledArtifact { entries })
}

/// Open the artifact's byte sources as one ordered logical stream.
///
/// Whole resource takes precedence; fragments are only probed when the
/// whole form cannot be opened. Probing stops at the first missing index,
/// which is what bounds discovery for well-formed fragment runs.
fn open_sources(
    locator: &dyn ResourceLocator,
    logical_name: &str,
) -> Result<Box<dyn Read + Send>, ArtifactError> {
    if let Some(stream) = locator.try_open(logical_name) {
        return Ok(stream);
    }

    let mut chained: Box<dyn Read + Send> = Box::new(io::empty());
    let mut index = 0;
    while let Some(fragment) = locator.try_open(&fragment_name(logical_name, index)) {
        chained = Box::new(chained.chain(fragment));
        index += 1;
    }

    if index == 0 {
        return Err(ArtifactError::NotFound {
            name: logical_name.to_string(),
        });
    }

    Ok(chained)
}
