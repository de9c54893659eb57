//! Versioned, digest-checked encoding of the persisted coverage map.
//!
//! The on-disk form is a JSON envelope carrying the format version, a SHA256
//! hex digest of the payload, and the source entries in sorted order. Output
//! is deterministic for a given logical list; decoding rejects unknown
//! fields, unsupported versions, and digest mismatches.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::coverage::SourceCoveringTestsList;
use crate::error::SerializationError;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoverageEnvelope {
    version: u32,

    /// SHA256 hex digest of the compact-JSON `sources` payload.
    digest: String,

    sources: Vec<SourceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceEntry {
    path: String,
    covering_tests: Vec<String>,
}

fn payload(list: &SourceCoveringTestsList) -> Vec<SourceEntry> {
    list.iter()
        .map(|(path, tests)| SourceEntry {
            path: path.clone(),
            covering_tests: tests.iter().cloned().collect(),
        })
        .collect()
}

fn payload_digest(sources: &[SourceEntry]) -> Result<String, SerializationError> {
    let bytes = serde_json::to_vec(sources)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Encodes the list. Sources and covering tests are emitted in sorted order,
/// so the output is identical for equal logical lists.
pub fn serialize(list: &SourceCoveringTestsList) -> Result<Vec<u8>, SerializationError> {
    let sources = payload(list);
    let digest = payload_digest(&sources)?;
    let envelope = CoverageEnvelope {
        version: FORMAT_VERSION,
        digest,
        sources,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

/// Decodes previously serialized coverage data.
pub fn deserialize(bytes: &[u8]) -> Result<SourceCoveringTestsList, SerializationError> {
    let envelope: CoverageEnvelope = serde_json::from_slice(bytes)?;

    if envelope.version != FORMAT_VERSION {
        return Err(SerializationError::UnsupportedVersion {
            found: envelope.version,
            expected: FORMAT_VERSION,
        });
    }

    let actual = payload_digest(&envelope.sources)?;
    if actual != envelope.digest {
        return Err(SerializationError::DigestMismatch {
            expected: envelope.digest,
            actual,
        });
    }

    let mut list = SourceCoveringTestsList::new();
    for entry in envelope.sources {
        for test in entry.covering_tests {
            list.insert(entry.path.clone(), test);
        }
    }
    Ok(list)
}
