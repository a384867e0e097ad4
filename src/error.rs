//! Error types for agent packaging, signing, and installation.
//!
//! Every fallible operation in the crate returns [`PackageError`]. Variants
//! name the packaging step that failed and carry the path or value that
//! triggered the failure so the front end can print an actionable message.
//! Verification does not use this type for its verdicts; see
//! [`crate::verify::VerificationFailure`].

use crate::trust::role::Role;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, modifying, signing, or extracting
/// agent containers.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The source directory is missing or has no build descriptor.
    #[error("{path} is not an agent package: {reason}")]
    NotAPackage {
        /// Directory that was offered for packaging.
        path: PathBuf,
        /// Why the directory was rejected.
        reason: String,
    },

    /// The build descriptor could not be parsed.
    #[error("invalid build descriptor {path}: {reason}")]
    InvalidDescriptor {
        /// Path to the descriptor.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// No unused temporary workspace name was found.
    #[error("could not allocate a build workspace under {root} after {attempts} attempts")]
    BuildWorkspaceConflict {
        /// Directory in which workspaces are created.
        root: PathBuf,
        /// Number of names tried.
        attempts: usize,
    },

    /// The build toolchain failed or did not yield exactly one artifact.
    #[error("build failed for {package}: {reason}")]
    BuildFailed {
        /// Name of the package being built.
        package: String,
        /// Description of the build failure.
        reason: String,
    },

    /// The repackage command has no implementation.
    #[error("{operation} is not supported")]
    Unsupported {
        /// The operation that was requested.
        operation: &'static str,
    },

    /// A side file could not be attached; the container is unchanged.
    #[error("failed to attach side files to {container}")]
    AttachFailed {
        /// Container that was being modified.
        container: PathBuf,
        /// The underlying failure.
        #[source]
        source: Box<PackageError>,
    },

    /// A caller-supplied side file could not be read.
    #[error("cannot read side file {path}")]
    UnreadableSideFile {
        /// Path of the side file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest row does not match the bytes it describes.
    #[error("hash mismatch for {path}")]
    IntegrityMismatch {
        /// Archive-relative path of the offending entry.
        path: String,
    },

    /// The container has no `RECORD` manifest.
    #[error("container {container} has no manifest")]
    MissingManifest {
        /// Path of the container.
        container: PathBuf,
    },

    /// The manifest is empty or cannot be parsed.
    #[error("corrupt manifest: {reason}")]
    CorruptManifest {
        /// Description of the defect.
        reason: String,
    },

    /// The container is not laid out as an agent container.
    #[error("invalid container {path}: {reason}")]
    InvalidContainer {
        /// Path of the container.
        path: PathBuf,
        /// Description of the defect.
        reason: String,
    },

    /// A certificate or signature link could not be validated.
    #[error("trust chain broken: {reason}")]
    TrustChainBroken {
        /// Description of the broken link.
        reason: String,
    },

    /// No certificate is stored under the requested name.
    #[error("no certificate named \"{name}\" in trust store {store}")]
    MissingCertificate {
        /// Name the certificate was looked up under.
        name: String,
        /// Trust store directory.
        store: PathBuf,
    },

    /// A certificate name cannot be used as a store entry.
    #[error("invalid certificate name \"{name}\": {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Description of the defect.
        reason: String,
    },

    /// A role certificate was requested before the root exists.
    #[error("the root certificate must be created before role certificates")]
    RootNotInitialized,

    /// The root certificate exists and overwrite was not confirmed.
    #[error("a root certificate already exists at {path}; overwrite must be confirmed")]
    AlreadyExists {
        /// Path to the existing root certificate.
        path: PathBuf,
    },

    /// The requested role is not allowed to perform the operation.
    #[error("role violation: {0}")]
    RoleViolation(#[from] RoleViolation),

    /// A role name outside the closed role set was supplied.
    #[error("unknown role \"{0}\"; expected one of: creator, initiator, soi")]
    UnknownRole(String),

    /// A stored key or key string is malformed.
    #[error("invalid key {context}: {reason}")]
    InvalidKey {
        /// What the key belongs to.
        context: String,
        /// Description of the defect.
        reason: String,
    },

    /// An archive entry attempts to escape the destination directory.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending archive entry path.
        path: String,
    },

    /// The configuration file could not be loaded.
    #[error("invalid configuration {path}: {reason}")]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a zip archive failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// JSON serialisation of a certificate or signature failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

/// Ways a signer can exceed the permissions of its role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleViolation {
    /// The SOI role may not add files while signing.
    #[error("soi signers are not allowed to add files")]
    NoFilesForSoi,

    /// The selected certificate was issued for a different role.
    #[error("certificate {name} was issued for {found}, not {expected}")]
    CertificateRoleMismatch {
        /// Name the certificate is stored under.
        name: String,
        /// Role the caller asked to sign as.
        expected: Role,
        /// Role recorded in the certificate.
        found: String,
    },
}

/// Result type alias using [`PackageError`].
pub type Result<T> = std::result::Result<T, PackageError>;
