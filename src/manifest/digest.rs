//! SHA-256 hash specifications for manifest rows.
//!
//! A hash specification is written `sha256=<digest>` where the digest is
//! URL-safe base64 without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// The only supported hash algorithm.
pub const HASH_ALGORITHM: &str = "sha256";

const DIGEST_LEN: usize = 32;

/// A parsed `sha256=<digest>` value.
///
/// # Examples
///
/// ```
/// use agentpack::manifest::digest::HashSpec;
///
/// let spec = HashSpec::of(b"hello");
/// assert!(spec.to_string().starts_with("sha256="));
/// assert!(spec.matches(b"hello"));
/// assert!(!spec.matches(b"hello!"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashSpec {
    digest: [u8; DIGEST_LEN],
}

impl HashSpec {
    /// Hash `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            digest: Sha256::digest(bytes).into(),
        }
    }

    /// Return the raw digest bytes.
    #[must_use]
    pub const fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Return whether `bytes` hash to this specification.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        *self == Self::of(bytes)
    }
}

impl fmt::Display for HashSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HASH_ALGORITHM}={}", URL_SAFE_NO_PAD.encode(self.digest))
    }
}

impl FromStr for HashSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, encoded) = s
            .split_once('=')
            .ok_or_else(|| format!("hash \"{s}\" is not <algorithm>=<digest>"))?;
        if algorithm != HASH_ALGORITHM {
            return Err(format!("unsupported hash algorithm \"{algorithm}\""));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| format!("digest \"{encoded}\" is not base64: {e}"))?;
        let digest = <[u8; DIGEST_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
            format!("digest has {} bytes, expected {DIGEST_LEN}", bytes.len())
        })?;
        Ok(Self { digest })
    }
}

/// Hash specification, size, and hex digest of one file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// The `sha256=<digest>` specification.
    pub hash: HashSpec,
    /// Size in bytes.
    pub size: u64,
    /// Lower-case hex form of the digest.
    pub digest: String,
}

/// Compute the manifest entry for `bytes`. Deterministic.
#[must_use]
pub fn compute_entry(bytes: &[u8]) -> ManifestEntry {
    let hash = HashSpec::of(bytes);
    let digest = hex::encode(hash.digest());
    ManifestEntry {
        hash,
        size: bytes.len() as u64,
        digest,
    }
}
