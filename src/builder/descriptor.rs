//! The `agent.toml` build descriptor.
//!
//! ```toml
//! [package]
//! name = "weather"
//! version = "1.0"
//! description = "Publishes forecasts"
//!
//! [build]
//! command = ["make", "bundle"]
//! ```

use crate::container::naming::ContainerName;
use crate::error::{PackageError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// File name of the build descriptor at the root of a source project.
pub const DESCRIPTOR_FILE: &str = "agent.toml";

/// Parsed build descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Descriptor {
    /// Package identity.
    pub package: PackageSection,
    /// Optional build step.
    #[serde(default)]
    pub build: BuildSection,
}

/// The `[package]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// One-line summary.
    #[serde(default)]
    pub description: Option<String>,
}

/// The `[build]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Program and arguments run in the workspace before packing.
    #[serde(default)]
    pub command: Vec<String>,
}

impl Descriptor {
    /// Load the descriptor of the project at `source_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::NotAPackage`] if `source_dir` is not a
    /// directory or has no descriptor, and
    /// [`PackageError::InvalidDescriptor`] if the descriptor cannot be
    /// parsed or names an invalid package.
    pub fn load(source_dir: &Path) -> Result<Self> {
        if !source_dir.is_dir() {
            return Err(PackageError::NotAPackage {
                path: source_dir.to_owned(),
                reason: "not a directory".to_owned(),
            });
        }
        let path = source_dir.join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Err(PackageError::NotAPackage {
                path: source_dir.to_owned(),
                reason: format!("missing {DESCRIPTOR_FILE}"),
            });
        }
        let contents = fs::read_to_string(&path)?;
        let descriptor: Self =
            toml::from_str(&contents).map_err(|e| PackageError::InvalidDescriptor {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        descriptor
            .container_name()
            .map_err(|e| PackageError::InvalidDescriptor {
                path,
                reason: e.to_string(),
            })?;
        Ok(descriptor)
    }

    /// Return the container identity this descriptor builds.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidName`] for unusable names or
    /// versions.
    pub fn container_name(&self) -> Result<ContainerName> {
        ContainerName::new(&self.package.name, &self.package.version)
    }

    /// Render the `METADATA` file stored in built containers.
    #[must_use]
    pub fn metadata(&self) -> String {
        let mut text = format!(
            "Metadata-Version: 2.1\nName: {}\nVersion: {}\n",
            self.package.name, self.package.version
        );
        if let Some(summary) = &self.package.description {
            text.push_str(&format!("Summary: {}\n", summary.replace('\n', " ")));
        }
        text
    }
}
