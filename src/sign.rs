//! Role-scoped container signatures.
//!
//! Each signature is a JSON document stored at
//! `<name>-<version>.meta/signatures/<seq>-<role>.json`. It embeds the
//! signer's certificate and a snapshot of the manifest at signing time, and
//! links to the previous signature document by hash. Signature documents
//! are not recorded in the manifest; the snapshot makes each signature
//! checkable on its own and the links make the sequence tamper-evident.
//!
//! The Ed25519 signature covers, one per line: the role, the hex SHA-256 of
//! the snapshot, the hash of the previous document (empty for the first),
//! and the sequence number.

use crate::container::Container;
use crate::container::scratch::Scratch;
use crate::error::{PackageError, Result, RoleViolation};
use crate::inject::{LoadedSideFiles, SideFiles};
use crate::manifest;
use crate::trust::certificate::{Certificate, decode_signature};
use crate::trust::role::Role;
use crate::trust::store::TrustStore;
use ed25519_dalek::{Signer, Verifier};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;

/// A signature document embedded in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSignature {
    /// Position in the chain, starting at 1.
    pub sequence: u32,
    /// Role the signer acted in.
    pub role: Role,
    /// The signer's certificate.
    pub certificate: Certificate,
    /// Manifest text at signing time.
    pub manifest: String,
    /// Hex SHA-256 of [`Self::manifest`].
    pub content_hash: String,
    /// Hex SHA-256 of the previous signature document, if any.
    pub previous: Option<String>,
    /// Hex Ed25519 signature over [`Self::signed_payload`].
    pub signature: String,
}

impl PackageSignature {
    /// Return the bytes covered by the Ed25519 signature.
    #[must_use]
    pub fn signed_payload(&self) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n{}",
            self.role,
            self.content_hash,
            self.previous.as_deref().unwrap_or_default(),
            self.sequence
        )
        .into_bytes()
    }

    /// Return the document file name, `<seq>-<role>.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{:02}-{}.json", self.sequence, self.role)
    }

    /// Check the Ed25519 signature against the embedded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::TrustChainBroken`] if the signature does not
    /// verify, or [`PackageError::InvalidKey`] if a key or signature is
    /// malformed.
    pub fn verify_signature(&self) -> Result<()> {
        let signature = decode_signature(&self.signature, &self.file_name())?;
        self.certificate
            .verifying_key()?
            .verify(&self.signed_payload(), &signature)
            .map_err(|e| PackageError::TrustChainBroken {
                reason: format!("signature {} does not verify: {e}", self.file_name()),
            })
    }
}

/// One stored signature document with its location and hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// Archive path of the document.
    pub path: String,
    /// Parsed document.
    pub document: PackageSignature,
    /// Hex SHA-256 of the raw document bytes.
    pub hash: String,
}

/// The signature documents of a container, ordered by sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureChain {
    links: Vec<ChainLink>,
}

impl SignatureChain {
    /// Parse `(path, bytes)` pairs of signature documents.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::TrustChainBroken`] if a document cannot be
    /// parsed.
    pub fn from_documents(documents: Vec<(String, Vec<u8>)>) -> Result<Self> {
        let mut links = documents
            .into_iter()
            .map(|(path, bytes)| {
                let document: PackageSignature =
                    serde_json::from_slice(&bytes).map_err(|e| PackageError::TrustChainBroken {
                        reason: format!("signature {path} is unreadable: {e}"),
                    })?;
                Ok(ChainLink {
                    hash: document_hash(&bytes),
                    path,
                    document,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        links.sort_by(|a, b| {
            a.document
                .sequence
                .cmp(&b.document.sequence)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(Self { links })
    }

    /// Read the chain stored in `container`.
    ///
    /// # Errors
    ///
    /// Returns an archive error, or [`PackageError::TrustChainBroken`] for
    /// unparseable documents.
    pub fn read(container: &Container) -> Result<Self> {
        let name = container.name();
        let mut documents = Vec::new();
        for path in container.entry_names()? {
            if !name.is_signature_path(&path) {
                continue;
            }
            if let Some(bytes) = container.read_entry(&path)? {
                documents.push((path, bytes));
            }
        }
        Self::from_documents(documents)
    }

    fn read_scratch(scratch: &Scratch) -> Result<Self> {
        let dir_entry = scratch.name().signatures_dir();
        let dir = scratch.path_of(&dir_entry)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let mut documents = Vec::new();
        for listed in entries {
            let entry = listed?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = format!("{dir_entry}/{}", entry.file_name().to_string_lossy());
            documents.push((path, fs::read(entry.path())?));
        }
        Self::from_documents(documents)
    }

    /// Return the links in sequence order.
    #[must_use]
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Return the newest link.
    #[must_use]
    pub fn latest(&self) -> Option<&ChainLink> {
        self.links.last()
    }

    /// Return whether the container is unsigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Return the hex SHA-256 of a signature document.
#[must_use]
pub fn document_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Sign `container` as `role`, optionally attaching side files first.
///
/// The signing identity is loaded from `store` under `identity`, or under
/// the role name. Side files and the signature are applied in one rewrite.
/// Returns the archive path of the new signature document.
///
/// # Errors
///
/// Returns [`PackageError::RoleViolation`] with
/// [`RoleViolation::NoFilesForSoi`] when an SOI signer supplies side files,
/// before anything is read or written. Side-file failures are reported as
/// [`PackageError::AttachFailed`]. Identity and rewrite errors are passed
/// through; the container is unchanged on every failure.
pub fn sign(
    container: &Container,
    store: &TrustStore,
    role: Role,
    identity: Option<&str>,
    side_files: &SideFiles,
) -> Result<String> {
    if !role.may_attach_files() && !side_files.is_empty() {
        return Err(RoleViolation::NoFilesForSoi.into());
    }
    let signer = store.load_identity(role, identity)?;
    let attach_failed = |source: PackageError| PackageError::AttachFailed {
        container: container.path().to_owned(),
        source: Box::new(source),
    };
    let loaded = LoadedSideFiles::read(side_files).map_err(attach_failed)?;

    let scratch = Scratch::extract(container)?;
    let record_path = scratch.name().record_path();
    let mut manifest = scratch.read_manifest()?;
    if !side_files.is_empty() {
        manifest.pop_tail();
        loaded.apply(&scratch, &mut manifest).map_err(attach_failed)?;
        manifest.regenerate_tail(&record_path);
        scratch.write_manifest(&manifest)?;
    }
    let snapshot = manifest::decode_text(scratch.read(&record_path)?)?;

    let chain = SignatureChain::read_scratch(&scratch)?;
    let (sequence, previous) = chain.latest().map_or((1, None), |link| {
        (link.document.sequence + 1, Some(link.hash.clone()))
    });
    let mut document = PackageSignature {
        sequence,
        role,
        certificate: signer.certificate,
        content_hash: manifest::content_hash(snapshot.as_bytes()),
        manifest: snapshot,
        previous,
        signature: String::new(),
    };
    document.signature = hex::encode(
        signer
            .signing_key
            .sign(&document.signed_payload())
            .to_bytes(),
    );

    let path = format!("{}/{}", scratch.name().signatures_dir(), document.file_name());
    scratch.write(&path, &serde_json::to_vec_pretty(&document)?)?;
    scratch.commit()?;
    debug!("signature {path} covers manifest {}", document.content_hash);
    info!("signed {} as {role}", container.path().display());
    Ok(path)
}

#[cfg(test)]
#[path = "sign_tests.rs"]
mod tests;
