//! Errors surfaced by the `agentpack` front end.

use agentpack::PackageError;
use std::io;
use thiserror::Error;

/// Failures reported by a CLI run.
#[derive(Debug, Error)]
pub enum CliError {
    /// A library operation failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// One or more containers failed verification.
    #[error("{invalid} of {total} containers failed verification")]
    VerificationFailed {
        /// Number of invalid containers.
        invalid: usize,
        /// Number of containers checked.
        total: usize,
    },

    /// The user declined to replace the root certificate.
    #[error("root certificate left unchanged")]
    Aborted,

    /// No key is known for the remote platform.
    #[error("no key known for {remote_id}; record one with trust-host or pass --fallback")]
    UnknownHost {
        /// Identifier that was looked up.
        remote_id: String,
    },

    /// Writing to the console or reading the confirmation failed.
    #[error("console I/O failed: {0}")]
    Console(#[from] io::Error),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;
