//! Artifact splitting
//!
//! Split-on-write half of the fragment contract. A resource whose size
//! reaches the chunk ceiling is cut into fixed-size windows named
//! `name.0`, `name.1`, …; `reassemble` consumes the same convention.
//!
//! Boundary rule: the splitter always emits a final window shorter than
//! the ceiling, so a resource of exactly `max_chunk_bytes` yields two
//! chunks (one full, one empty). Fragment count is therefore
//! `len / max_chunk_bytes + 1` and every fragment fits in one upload.

use std::io::Read;

use crate::resource::ResourceLocator;

use super::ArtifactError;

/// Name of fragment `index` of the logical resource `base`.
pub fn fragment_name(base: &str, index: usize) -> String {
    format!("{}.{}", base, index)
}

/// Classify a resource as oversized.
///
/// Reads up to `max_chunk_bytes` bytes; a resource that fills the whole
/// window must be split before upload. Size is discovered by reading
/// because locators do not expose length.
pub fn is_oversized(
    locator: &dyn ResourceLocator,
    name: &str,
    max_chunk_bytes: usize,
) -> Result<bool, ArtifactError> {
    let stream = locator.try_open(name).ok_or_else(|| ArtifactError::NotFound {
        name: name.to_string(),
    })?;

    let window = read_window(stream, max_chunk_bytes)
        .map_err(|e| ArtifactError::io(name, e))?;
    Ok(window.len() == max_chunk_bytes)
}

/// Split a resource into ordered chunks of at most `max_chunk_bytes` each.
///
/// The final chunk is always shorter than the ceiling (possibly empty, see
/// module docs). Concatenating the chunks in order reproduces the resource
/// byte-for-byte.
pub fn split_resource(
    locator: &dyn ResourceLocator,
    name: &str,
    max_chunk_bytes: usize,
) -> Result<Vec<Vec<u8>>, ArtifactError> {
    let mut stream = locator.try_open(name).ok_or_else(|| ArtifactError::NotFound {
        name: name.to_string(),
    })?;

    let mut chunks = Vec::new();
    loop {
        let window = read_window(&mut stream, max_chunk_bytes)
            .map_err(|e| ArtifactError::io(name, e))?;
        let full = window.len() == max_chunk_bytes;
        chunks.push(window);
        if !full {
            break;
        }
    }

    Ok(chunks)
}

/// In-memory variant of `split_resource`, same boundary rule.
pub fn split_bytes(bytes: &[u8], max_chunk_bytes: usize) -> Vec<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = bytes
        .chunks(max_chunk_bytes)
        .map(|c| c.to_vec())
        .collect();

    // chunks() never yields a trailing short window for exact multiples
    // (nor anything at all for empty input), so emit it here.
    if chunks.last().map_or(true, |c| c.len() == max_chunk_bytes) {
        chunks.push(Vec::new());
    }

    chunks
}

/// Read up to `max` bytes, short only at end of stream.
fn read_window(mut stream: impl Read, max: usize) -> std::io::Result<Vec<u8>> {
    let mut window = vec![0u8; max];
    let mut filled = 0;

    while filled < max {
        let n = stream.read(&mut window[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    window.truncate(filled);
    Ok(window)
}
