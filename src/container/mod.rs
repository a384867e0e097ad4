//! Agent container access.
//!
//! A container is a zip archive holding the agent payload, a
//! `<name>-<version>.meta/` metadata directory with the `RECORD` manifest,
//! and optionally a `<name>-<version>.data/` directory with bundled data.
//! [`Container`] gives read-only access; every mutation goes through
//! [`scratch::Scratch`].

pub mod naming;
pub mod scratch;

use crate::error::{PackageError, Result};
use naming::{CONTAINER_EXTENSION, ContainerName, RECORD_FILE};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

/// Read-only handle to a container file.
#[derive(Debug, Clone)]
pub struct Container {
    path: PathBuf,
    name: ContainerName,
}

impl Container {
    /// Open the container at `path` and determine its identity.
    ///
    /// The identity comes from the metadata directory inside the archive,
    /// falling back to the file name when the archive has none.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Io`] or [`PackageError::Archive`] if the
    /// file cannot be read as a zip archive, or
    /// [`PackageError::InvalidContainer`] if no identity can be derived.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let location = path.into();
        let archive = ZipArchive::new(File::open(&location)?)?;
        let name = name_from_entries(archive.file_names())
            .or_else(|| name_from_filename(&location))
            .ok_or_else(|| PackageError::InvalidContainer {
                path: location.clone(),
                reason: "no metadata directory and no <name>-<version> file name".to_owned(),
            })?;
        Ok(Self {
            path: location,
            name,
        })
    }

    /// Return the container file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the container identity.
    #[must_use]
    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// List the file entries in archive order.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read.
    pub fn entry_names(&self) -> Result<Vec<String>> {
        let mut archive = self.archive()?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            if !entry.is_dir() {
                names.push(entry.name().to_owned());
            }
        }
        Ok(names)
    }

    /// Read the bytes of `entry`, or `None` if the archive lacks it.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read.
    pub fn read_entry(&self, entry: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = self.archive()?;
        let mut file = match archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    pub(crate) fn archive(&self) -> Result<ZipArchive<File>> {
        Ok(ZipArchive::new(File::open(&self.path)?)?)
    }
}

/// Find the identity from a `<name>-<version>.meta/RECORD` entry, or from
/// any top-level metadata directory when the manifest is missing.
fn name_from_entries<'a>(entries: impl Iterator<Item = &'a str>) -> Option<ContainerName> {
    let mut fallback = None;
    for entry in entries {
        let Some((dir, rest)) = entry.split_once('/') else {
            continue;
        };
        let Some(namever) = dir.strip_suffix(".meta") else {
            continue;
        };
        if rest == RECORD_FILE {
            return namever.parse().ok();
        }
        if fallback.is_none() {
            fallback = namever.parse().ok();
        }
    }
    fallback
}

fn name_from_filename(path: &Path) -> Option<ContainerName> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name
        .strip_suffix(CONTAINER_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))?;
    stem.parse().ok()
}

/// Validate that an archive entry path does not escape the destination
/// directory via `..` components or absolute paths.
pub(crate) fn validate_entry_path(path: &Path) -> Result<()> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(PackageError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
