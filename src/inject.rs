//! Attaching deployment side files to built containers.
//!
//! Side files live in the container's metadata directory under canonical
//! names. The deployment configuration has at most one live copy: attaching
//! a new one drops the old file and its manifest rows. Resource contracts
//! accumulate: the first is stored as `execreqs.json`, later ones as
//! `execreqs.<n>.json`.
//!
//! Every operation rewrites a scratch copy and swaps it in whole, so a
//! failure leaves the container exactly as it was.

use crate::container::Container;
use crate::container::naming::{CONFIG_FILE, CONTRACT_FILE, ContainerName};
use crate::container::scratch::{Scratch, collect_files, zip_files};
use crate::error::{PackageError, Result};
use crate::manifest::{Manifest, ManifestRow};
use log::{debug, warn};
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

/// Side files supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideFiles {
    /// Deployment configuration, stored as `config`.
    pub config: Option<PathBuf>,
    /// Resource contract, stored as `execreqs.json` or a numbered variant.
    pub contract: Option<PathBuf>,
}

impl SideFiles {
    /// Return whether no side file was requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.config.is_none() && self.contract.is_none()
    }
}

/// Side file contents read ahead of any container change.
#[derive(Debug, Default)]
pub(crate) struct LoadedSideFiles {
    config: Option<Vec<u8>>,
    contract: Option<Vec<u8>>,
}

impl LoadedSideFiles {
    /// Read every requested side file.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::UnreadableSideFile`] for the first source
    /// that cannot be read.
    pub(crate) fn read(side_files: &SideFiles) -> Result<Self> {
        Ok(Self {
            config: side_files
                .config
                .as_deref()
                .map(|path| read_source(path, CONFIG_FILE))
                .transpose()?,
            contract: side_files
                .contract
                .as_deref()
                .map(|path| read_source(path, CONTRACT_FILE))
                .transpose()?,
        })
    }

    /// Write the side files into `scratch` and record them in `manifest`.
    ///
    /// `manifest` must already have its tail popped.
    pub(crate) fn apply(&self, scratch: &Scratch, manifest: &mut Manifest) -> Result<()> {
        let name = scratch.name().clone();
        if let Some(bytes) = &self.config {
            let path = name.config_path();
            scratch.remove(&path)?;
            manifest.remove_path(&path);
            scratch.write(&path, bytes)?;
            manifest.push(ManifestRow::for_bytes(path.as_str(), bytes));
            debug!("attached {path}");
        }
        if let Some(bytes) = &self.contract {
            let path = next_contract_path(&name, scratch, manifest);
            scratch.write(&path, bytes)?;
            manifest.push(ManifestRow::for_bytes(path.as_str(), bytes));
            debug!("attached {path}");
        }
        Ok(())
    }
}

/// Attach `side_files` to `container`.
///
/// An empty set leaves the container untouched.
///
/// # Errors
///
/// Returns [`PackageError::AttachFailed`] wrapping the cause. When a source
/// cannot be read the cause is [`PackageError::UnreadableSideFile`]; the
/// container is unchanged in every failure case.
pub fn attach(container: &Container, side_files: &SideFiles) -> Result<()> {
    if side_files.is_empty() {
        debug!("no side files for {}", container.path().display());
        return Ok(());
    }
    attach_inner(container, side_files).map_err(|source| PackageError::AttachFailed {
        container: container.path().to_owned(),
        source: Box::new(source),
    })
}

fn attach_inner(container: &Container, side_files: &SideFiles) -> Result<()> {
    let loaded = LoadedSideFiles::read(side_files)?;
    let scratch = Scratch::extract(container)?;
    let mut manifest = scratch.read_manifest()?;
    manifest.pop_tail();
    loaded.apply(&scratch, &mut manifest)?;
    manifest.regenerate_tail(&scratch.name().record_path());
    scratch.write_manifest(&manifest)?;
    scratch.commit()
}

/// Store the contents of `data_dir` as the container's bundled-data blob.
///
/// A previous blob and its manifest row are replaced.
///
/// # Errors
///
/// Returns [`PackageError::UnreadableSideFile`] if `data_dir` is not a
/// readable directory, or an error from the rewrite.
pub fn add_bundled_data(container: &Container, data_dir: &Path) -> Result<()> {
    if !data_dir.is_dir() {
        return Err(PackageError::UnreadableSideFile {
            path: data_dir.to_owned(),
            source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        });
    }
    let mut files = collect_files(data_dir)?;
    files.sort();
    let blob = zip_files(data_dir, &files, Cursor::new(Vec::new()))?.into_inner();

    let scratch = Scratch::extract(container)?;
    let mut manifest = scratch.read_manifest()?;
    manifest.pop_tail();
    let path = scratch.name().bundle_path();
    scratch.write(&path, &blob)?;
    manifest.replace(ManifestRow::for_bytes(path.as_str(), &blob));
    manifest.regenerate_tail(&scratch.name().record_path());
    scratch.write_manifest(&manifest)?;
    scratch.commit()?;
    debug!("bundled {} files from {}", files.len(), data_dir.display());
    Ok(())
}

/// Rewrite `container` without `paths` and their manifest rows.
///
/// The manifest itself cannot be removed and unknown paths are ignored.
/// Returns the number of entries removed.
///
/// # Errors
///
/// Returns an error from the rewrite; the container is then unchanged.
pub fn remove(container: &Container, paths: &[&str]) -> Result<usize> {
    let record_path = container.name().record_path();
    let scratch = Scratch::extract(container)?;
    let mut manifest = scratch.read_manifest()?;
    manifest.pop_tail();

    let mut removed = 0;
    for path in paths {
        if *path == record_path {
            warn!("refusing to remove the manifest {record_path}");
            continue;
        }
        let had_file = scratch.remove(path)?;
        let had_rows = manifest.remove_path(path) > 0;
        if had_file || had_rows {
            removed += 1;
        } else {
            debug!("{path} not present; ignoring");
        }
    }
    if removed == 0 {
        return Ok(0);
    }
    manifest.regenerate_tail(&record_path);
    scratch.write_manifest(&manifest)?;
    scratch.commit()?;
    Ok(removed)
}

fn read_source(path: &Path, canonical: &str) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|source| PackageError::UnreadableSideFile {
        path: path.to_owned(),
        source,
    })?;
    if path.file_name().is_none_or(|name| name != canonical) {
        warn!("{} will be stored as {canonical}", path.display());
    }
    Ok(bytes)
}

fn next_contract_path(name: &ContainerName, scratch: &Scratch, manifest: &Manifest) -> String {
    (1..)
        .map(|index| name.contract_path(index))
        .find(|path| !scratch.contains(path) && !manifest.contains(path))
        .unwrap_or_else(|| name.contract_path(1))
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
