//! Agentpack library.
//!
//! This crate builds agent projects into self-describing `.agent`
//! containers, attaches side files and bundled data after the build, signs
//! containers under a role-based certificate chain, verifies them, and
//! installs them on a target host. It is used by the `agentpack` CLI binary
//! and can be consumed programmatically by deployment tooling.
//!
//! # Modules
//!
//! - [`builder`] - Source project packaging in isolated workspaces
//! - [`command`] - External command execution seam
//! - [`config`] - Packager configuration loading
//! - [`container`] - Container naming, reading, and scratch rewrites
//! - [`error`] - Semantic error types
//! - [`extract`] - Installation into a destination directory
//! - [`inject`] - Side-file and bundled-data attachment
//! - [`manifest`] - The `RECORD` hash manifest
//! - [`sign`] - Role-scoped signature chain
//! - [`trust`] - Certificate store and signer roles
//! - [`verify`] - Integrity and trust-chain verification

pub mod builder;
pub mod command;
pub mod config;
pub mod container;
pub mod error;
pub mod extract;
pub mod inject;
pub mod manifest;
pub mod sign;
pub mod trust;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use container::Container;
pub use error::{PackageError, Result};
