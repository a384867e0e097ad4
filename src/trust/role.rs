//! Signer roles.
//!
//! The role set is closed: every call site matches on [`Role`] explicitly,
//! and free-form role names are parsed once at the boundary.

use crate::error::PackageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A party that may sign an agent container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The author of the agent code.
    Creator,
    /// The party that deploys the agent.
    Initiator,
    /// The scope-of-influence administrator.
    Soi,
}

impl Role {
    /// All signer roles, in signing-privilege order.
    pub const ALL: [Self; 3] = [Self::Creator, Self::Initiator, Self::Soi];

    /// Return the lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Initiator => "initiator",
            Self::Soi => "soi",
        }
    }

    /// Return whether the role may attach side files while signing.
    #[must_use]
    pub const fn may_attach_files(self) -> bool {
        match self {
            Self::Creator | Self::Initiator => true,
            Self::Soi => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creator" => Ok(Self::Creator),
            "initiator" => Ok(Self::Initiator),
            "soi" => Ok(Self::Soi),
            _ => Err(PackageError::UnknownRole(s.to_owned())),
        }
    }
}

/// The role recorded in a certificate.
///
/// Only the root certificate carries [`CertificateRole::Root`]; every other
/// certificate is bound to exactly one signer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateRole {
    /// Self-signed trust anchor.
    Root,
    /// Certificate for [`Role::Creator`].
    Creator,
    /// Certificate for [`Role::Initiator`].
    Initiator,
    /// Certificate for [`Role::Soi`].
    Soi,
}

impl CertificateRole {
    /// Return the signer role, or `None` for the root.
    #[must_use]
    pub const fn signer(self) -> Option<Role> {
        match self {
            Self::Root => None,
            Self::Creator => Some(Role::Creator),
            Self::Initiator => Some(Role::Initiator),
            Self::Soi => Some(Role::Soi),
        }
    }
}

impl From<Role> for CertificateRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Creator => Self::Creator,
            Role::Initiator => Self::Initiator,
            Role::Soi => Self::Soi,
        }
    }
}

impl fmt::Display for CertificateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signer().map_or("root", Role::as_str))
    }
}
