//! Container naming policy.
//!
//! A container is identified by a normalised name and version. Hyphens in
//! either component are replaced with underscores so that the combined
//! `<name>-<version>` form splits unambiguously at its first hyphen. Every
//! archive path that depends on the identity is derived here.

use crate::error::{PackageError, Result};
use std::fmt;
use std::str::FromStr;

/// File extension of agent containers (without the dot).
pub const CONTAINER_EXTENSION: &str = "agent";

/// Name of the manifest file inside the metadata directory.
pub const RECORD_FILE: &str = "RECORD";

/// Name of the package metadata file inside the metadata directory.
pub const METADATA_FILE: &str = "METADATA";

/// Canonical name of the deployment configuration side file.
pub const CONFIG_FILE: &str = "config";

/// Canonical name of the resource contract side file.
pub const CONTRACT_FILE: &str = "execreqs.json";

/// Directory (inside the metadata directory) holding signatures.
pub const SIGNATURES_DIR: &str = "signatures";

/// Name of the bundled-data blob inside the data directory.
pub const BUNDLE_FILE: &str = "bundle.zip";

/// Validated name and version of an agent container.
///
/// # Examples
///
/// ```
/// use agentpack::container::naming::ContainerName;
///
/// let name = ContainerName::new("weather-agent", "1.0").expect("valid name");
/// assert_eq!(name.namever(), "weather_agent-1.0");
/// assert_eq!(name.filename(), "weather_agent-1.0.agent");
/// assert_eq!(name.record_path(), "weather_agent-1.0.meta/RECORD");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName {
    name: String,
    version: String,
}

impl ContainerName {
    /// Create a container name, normalising hyphens to underscores.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidName`] if either component is empty
    /// or contains characters outside `[A-Za-z0-9._+-]`.
    pub fn new(name: &str, version: &str) -> Result<Self> {
        Ok(Self {
            name: normalise(name, "name")?,
            version: normalise(version, "version")?,
        })
    }

    /// Return the normalised package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the normalised version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return `<name>-<version>`.
    #[must_use]
    pub fn namever(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Return the container file name.
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}.{CONTAINER_EXTENSION}", self.namever())
    }

    /// Return the metadata directory (`<name>-<version>.meta`).
    #[must_use]
    pub fn meta_dir(&self) -> String {
        format!("{}.meta", self.namever())
    }

    /// Return the data directory (`<name>-<version>.data`).
    #[must_use]
    pub fn data_dir(&self) -> String {
        format!("{}.data", self.namever())
    }

    /// Return the archive path of the manifest.
    #[must_use]
    pub fn record_path(&self) -> String {
        self.meta_path(RECORD_FILE)
    }

    /// Return the archive path of the package metadata file.
    #[must_use]
    pub fn metadata_path(&self) -> String {
        self.meta_path(METADATA_FILE)
    }

    /// Return the archive path of the configuration side file.
    #[must_use]
    pub fn config_path(&self) -> String {
        self.meta_path(CONFIG_FILE)
    }

    /// Return the archive path of the `index`-th contract (1-based).
    ///
    /// The first contract uses the canonical name; later ones are numbered
    /// `execreqs.<index>.json`.
    #[must_use]
    pub fn contract_path(&self, index: usize) -> String {
        if index <= 1 {
            self.meta_path(CONTRACT_FILE)
        } else {
            self.meta_path(&format!("execreqs.{index}.json"))
        }
    }

    /// Return the archive directory holding signatures.
    #[must_use]
    pub fn signatures_dir(&self) -> String {
        self.meta_path(SIGNATURES_DIR)
    }

    /// Return whether `path` lies inside the signatures directory.
    #[must_use]
    pub fn is_signature_path(&self, path: &str) -> bool {
        path.strip_prefix(&self.signatures_dir())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Return the archive path of the bundled-data blob.
    #[must_use]
    pub fn bundle_path(&self) -> String {
        format!("{}/{BUNDLE_FILE}", self.data_dir())
    }

    fn meta_path(&self, file: &str) -> String {
        format!("{}/{file}", self.meta_dir())
    }
}

impl FromStr for ContainerName {
    type Err = PackageError;

    /// Parse a `<name>-<version>` string.
    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = s.split_once('-').ok_or_else(|| PackageError::InvalidName {
            name: s.to_owned(),
            reason: "expected <name>-<version>".to_owned(),
        })?;
        Self::new(name, version)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

fn normalise(raw: &str, component: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(PackageError::InvalidName {
            name: value.to_owned(),
            reason: format!("{component} is empty"),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-')))
    {
        return Err(PackageError::InvalidName {
            name: value.to_owned(),
            reason: format!("{component} contains '{bad}'"),
        });
    }
    Ok(value.replace('-', "_"))
}
