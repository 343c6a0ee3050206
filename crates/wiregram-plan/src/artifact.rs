//! Binary artifact persistence.
//!
//! Layout: 4 magic bytes, format version (u32 LE), manifest length
//! (u32 LE), the JSON manifest, payload checksum (u32 LE), then the
//! postcard-encoded module. The checksum covers only the module payload;
//! the manifest is readable without decoding the module.

use serde::{Deserialize, Serialize};

use crate::manifest::{Manifest, FORMAT_MAGIC, FORMAT_VERSION};
use crate::module::Module;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("not a wiregram artifact: bad magic bytes")]
    BadMagic,

    #[error("unsupported artifact version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("artifact truncated")]
    Truncated,

    #[error("artifact checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("invalid module payload: {0}")]
    Payload(#[from] postcard::Error),
}

/// A compiled module together with its manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub manifest: Manifest,
    pub module: Module,
}

impl Artifact {
    pub fn new(manifest: Manifest, module: Module) -> Self {
        Self { manifest, module }
    }

    /// Encode to the on-disk format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        let manifest = serde_json::to_vec(&self.manifest)?;
        let payload = postcard::to_allocvec(&self.module)?;
        let checksum = crc32fast::hash(&payload);

        let mut out = Vec::with_capacity(16 + manifest.len() + payload.len());
        out.extend_from_slice(FORMAT_MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(manifest.len() as u32).to_le_bytes());
        out.extend_from_slice(&manifest);
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode and validate an artifact.
    pub fn open(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let rest = bytes;
        let (magic, rest) = split(rest, 4)?;
        if magic != FORMAT_MAGIC {
            return Err(ArtifactError::BadMagic);
        }

        let (version, rest) = split_u32(rest)?;
        if version != FORMAT_VERSION {
            return Err(ArtifactError::VersionMismatch {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let (manifest_len, rest) = split_u32(rest)?;
        let (manifest_bytes, rest) = split(rest, manifest_len as usize)?;
        let manifest: Manifest = serde_json::from_slice(manifest_bytes)?;

        let (checksum, payload) = split_u32(rest)?;
        if crc32fast::hash(payload) != checksum {
            return Err(ArtifactError::ChecksumMismatch);
        }

        let module: Module = postcard::from_bytes(payload)?;
        Ok(Self { manifest, module })
    }

    /// Read only the manifest, skipping payload validation.
    pub fn peek_manifest(bytes: &[u8]) -> Result<Manifest, ArtifactError> {
        let (magic, rest) = split(bytes, 4)?;
        if magic != FORMAT_MAGIC {
            return Err(ArtifactError::BadMagic);
        }
        let (version, rest) = split_u32(rest)?;
        if version != FORMAT_VERSION {
            return Err(ArtifactError::VersionMismatch {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let (manifest_len, rest) = split_u32(rest)?;
        let (manifest_bytes, _) = split(rest, manifest_len as usize)?;
        Ok(serde_json::from_slice(manifest_bytes)?)
    }
}

fn split(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), ArtifactError> {
    if bytes.len() < n {
        return Err(ArtifactError::Truncated);
    }
    Ok(bytes.split_at(n))
}

fn split_u32(bytes: &[u8]) -> Result<(u32, &[u8]), ArtifactError> {
    let (head, rest) = split(bytes, 4)?;
    Ok((u32::from_le_bytes([head[0], head[1], head[2], head[3]]), rest))
}
