//! Container verification.
//!
//! Verification recomputes every manifest hash from the live archive bytes
//! and then walks the embedded signature chain back to the trusted root.
//! The outcome is a [`Verification`] value: failures are reported as a
//! [`VerificationFailure`] reason rather than an error, so one bad container
//! never aborts a batch.

use crate::container::Container;
use crate::error::PackageError;
use crate::manifest::{self, Manifest};
use crate::sign::SignatureChain;
use crate::trust::certificate::Certificate;
use crate::trust::store::TrustStore;
use log::debug;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::result::ZipError;

/// Policy governing which containers count as valid.
///
/// # Examples
///
/// ```
/// use agentpack::verify::VerificationPolicy;
///
/// let policy = VerificationPolicy::default();
/// assert!(policy.require_signatures());
/// assert!(!VerificationPolicy::allow_unsigned().require_signatures());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    require_signatures: bool,
}

impl VerificationPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(require_signatures: bool) -> Self {
        Self { require_signatures }
    }

    /// A policy under which unsigned containers with intact hashes are
    /// valid.
    #[must_use]
    pub const fn allow_unsigned() -> Self {
        Self::new(false)
    }

    /// Return whether at least one signature is required.
    #[must_use]
    pub const fn require_signatures(&self) -> bool {
        self.require_signatures
    }
}

impl Default for VerificationPolicy {
    /// The default policy requires a signature chain.
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.require_signatures {
            write!(f, "signatures required")
        } else {
            write!(f, "unsigned containers accepted")
        }
    }
}

/// Why a container failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The container has no `RECORD`.
    MissingManifest,
    /// The manifest is empty or cannot be parsed.
    CorruptManifest(String),
    /// A recorded entry is missing or its bytes do not match its row.
    IntegrityMismatch(String),
    /// An archive entry has no manifest row.
    UnrecordedEntry(String),
    /// The signature chain is missing, broken, or not rooted in the store.
    TrustChainBroken(String),
    /// The container could not be opened or read.
    Unreadable(String),
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingManifest => write!(f, "missing manifest"),
            Self::CorruptManifest(reason) => write!(f, "corrupt manifest: {reason}"),
            Self::IntegrityMismatch(path) => write!(f, "hash mismatch for {path}"),
            Self::UnrecordedEntry(path) => write!(f, "{path} is not in the manifest"),
            Self::TrustChainBroken(reason) => write!(f, "trust chain broken: {reason}"),
            Self::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

/// The outcome of verifying one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// The container that was checked.
    pub container: PathBuf,
    /// Number of signatures found.
    pub signatures: usize,
    /// The first failure found, if any.
    pub failure: Option<VerificationFailure>,
}

impl Verification {
    /// Return whether the container passed every check.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

/// Verify the container at `path` against the root in `store`.
#[must_use]
pub fn verify(path: &Path, store: &TrustStore, policy: VerificationPolicy) -> Verification {
    let mut signatures = 0;
    let failure = check(path, store, policy, &mut signatures).err();
    let verdict = failure.as_ref().map_or_else(
        || format!("valid ({signatures} signatures)"),
        |reason| format!("invalid: {reason}"),
    );
    debug!("{}: {verdict}", path.display());
    Verification {
        container: path.to_owned(),
        signatures,
        failure,
    }
}

/// Verify each container in `paths`, in order.
#[must_use]
pub fn verify_all<P: AsRef<Path>>(
    paths: &[P],
    store: &TrustStore,
    policy: VerificationPolicy,
) -> Vec<Verification> {
    paths
        .iter()
        .map(|path| verify(path.as_ref(), store, policy))
        .collect()
}

fn check(
    path: &Path,
    store: &TrustStore,
    policy: VerificationPolicy,
    signatures: &mut usize,
) -> Result<(), VerificationFailure> {
    let container = Container::open(path).map_err(unreadable)?;
    let manifest = manifest::read(&container).map_err(|e| match e {
        PackageError::MissingManifest { .. } => VerificationFailure::MissingManifest,
        PackageError::CorruptManifest { reason } => VerificationFailure::CorruptManifest(reason),
        other => unreadable(other),
    })?;
    check_integrity(&container, &manifest)?;

    let chain = SignatureChain::read(&container).map_err(|e| match e {
        PackageError::TrustChainBroken { reason } => VerificationFailure::TrustChainBroken(reason),
        other => unreadable(other),
    })?;
    *signatures = chain.links().len();
    if chain.is_empty() {
        if policy.require_signatures() {
            return Err(VerificationFailure::TrustChainBroken(
                "container is unsigned".to_owned(),
            ));
        }
        return Ok(());
    }

    let root = match store.root_certificate() {
        Ok(root) => root,
        Err(PackageError::RootNotInitialized) => {
            return Err(VerificationFailure::TrustChainBroken(
                "trust store has no root certificate".to_owned(),
            ));
        }
        Err(e) => return Err(unreadable(e)),
    };
    let record = container
        .read_entry(&container.name().record_path())
        .map_err(unreadable)?
        .unwrap_or_default();
    check_chain(&chain, &root, &manifest::content_hash(&record))
        .map_err(VerificationFailure::TrustChainBroken)
}

fn check_integrity(container: &Container, manifest: &Manifest) -> Result<(), VerificationFailure> {
    let name = container.name();
    let record_path = name.record_path();
    let mut archive = container.archive().map_err(unreadable)?;

    for row in manifest.rows() {
        let mismatch = || VerificationFailure::IntegrityMismatch(row.path.clone());
        let (Some(hash), Some(size)) = (&row.hash, row.size) else {
            if row.path == record_path {
                continue;
            }
            return Err(mismatch());
        };
        let mut entry = match archive.by_name(&row.path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(mismatch()),
            Err(e) => return Err(unreadable(e)),
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(unreadable)?;
        if bytes.len() as u64 != size || !hash.matches(&bytes) {
            return Err(mismatch());
        }
    }

    let recorded: HashSet<&str> = manifest.rows().iter().map(|row| row.path.as_str()).collect();
    for entry in container.entry_names().map_err(unreadable)? {
        if entry == record_path || name.is_signature_path(&entry) {
            continue;
        }
        if !recorded.contains(entry.as_str()) {
            return Err(VerificationFailure::UnrecordedEntry(entry));
        }
    }
    Ok(())
}

/// Walk the chain oldest to newest and check every link.
fn check_chain(chain: &SignatureChain, root: &Certificate, current_hash: &str) -> Result<(), String> {
    let mut previous: Option<&str> = None;
    for (index, link) in chain.links().iter().enumerate() {
        let document = &link.document;
        let expected = u32::try_from(index + 1).map_err(|e| e.to_string())?;
        if document.sequence != expected {
            return Err(format!(
                "{} has sequence {}, expected {expected}",
                link.path, document.sequence
            ));
        }
        if !link.path.ends_with(&format!("/{}", document.file_name())) {
            return Err(format!("{} does not match its contents", link.path));
        }
        if document.previous.as_deref() != previous {
            return Err(format!("{} does not link to the previous signature", link.path));
        }
        if manifest::content_hash(document.manifest.as_bytes()) != document.content_hash {
            return Err(format!("{} has a manifest snapshot that does not match its hash", link.path));
        }
        if document.certificate.role().signer() != Some(document.role) {
            return Err(format!(
                "{} was made as {} with a {} certificate",
                link.path,
                document.role,
                document.certificate.role()
            ));
        }
        document
            .certificate
            .verify_issued_by(root)
            .and_then(|()| document.verify_signature())
            .map_err(|e| match e {
                PackageError::TrustChainBroken { reason } => reason,
                other => format!("{}: {other}", link.path),
            })?;
        previous = Some(link.hash.as_str());
    }

    let newest = chain.latest().map(|link| link.document.content_hash.as_str());
    if newest != Some(current_hash) {
        return Err("container content changed after the newest signature".to_owned());
    }
    Ok(())
}

fn unreadable(e: impl fmt::Display) -> VerificationFailure {
    VerificationFailure::Unreadable(e.to_string())
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
