//! Copy-then-swap rewriting of containers.
//!
//! A [`Scratch`] is an extracted copy of a container in a temporary
//! directory. Callers edit the copy, then [`Scratch::commit`] repacks it
//! into a temporary file beside the container and renames that file over the
//! original. Dropping a scratch without committing discards every change, so
//! the live container is only ever replaced as a whole.

use super::naming::ContainerName;
use super::{Container, validate_entry_path};
use crate::error::{PackageError, Result};
use crate::manifest::Manifest;
use log::debug;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use walkdir::WalkDir;
use zip::{ZipArchive, ZipWriter};
use zip::write::SimpleFileOptions;

/// An extracted, editable copy of a container.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
    container: Container,
}

impl Scratch {
    /// Extract `container` into a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PathTraversal`] if an entry would escape the
    /// scratch directory, or an archive or I/O error.
    pub fn extract(container: &Container) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("agentpack-scratch-").tempdir()?;
        unpack_archive(container, dir.path())?;
        debug!(
            "extracted {} to scratch {}",
            container.path().display(),
            dir.path().display()
        );
        Ok(Self {
            dir,
            container: container.clone(),
        })
    }

    /// Return the root of the extracted tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Return the identity of the container being rewritten.
    #[must_use]
    pub fn name(&self) -> &ContainerName {
        self.container.name()
    }

    /// Return the filesystem path of an archive entry in the scratch tree.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PathTraversal`] if `entry` is absolute or
    /// climbs out of the tree.
    pub fn path_of(&self, entry: &str) -> Result<PathBuf> {
        validate_entry_path(Path::new(entry))?;
        Ok(self.root().join(entry))
    }

    /// Return whether the scratch tree holds `entry`.
    ///
    /// Paths that would leave the tree are never held.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.path_of(entry).is_ok_and(|path| path.is_file())
    }

    /// Read an entry from the scratch tree.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PathTraversal`] for an escaping path, or
    /// [`PackageError::Io`] if the entry cannot be read.
    pub fn read(&self, entry: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_of(entry)?)?)
    }

    /// Write an entry, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PathTraversal`] for an escaping path, or
    /// [`PackageError::Io`] if the entry cannot be written.
    pub fn write(&self, entry: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_of(entry)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Delete an entry, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::PathTraversal`] for an escaping path, or
    /// [`PackageError::Io`] if the entry exists but cannot be removed.
    pub fn remove(&self, entry: &str) -> Result<bool> {
        match fs::remove_file(self.path_of(entry)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse the manifest of the scratch copy.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::MissingManifest`] if the copy has no
    /// `RECORD`, or [`PackageError::CorruptManifest`] if it cannot be parsed.
    pub fn read_manifest(&self) -> Result<Manifest> {
        let record = self.name().record_path();
        if !self.contains(&record) {
            return Err(PackageError::MissingManifest {
                container: self.container.path().to_owned(),
            });
        }
        Manifest::from_bytes(self.read(&record)?)
    }

    /// Replace the manifest of the scratch copy.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Io`] if the manifest cannot be written.
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.write(&self.name().record_path(), manifest.render().as_bytes())
    }

    /// Repack the scratch tree and atomically replace the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written or renamed into
    /// place; the original container is then unchanged.
    pub fn commit(self) -> Result<()> {
        let target = self.container.path();
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut staged = NamedTempFile::new_in(parent)?;
        write_archive(self.root(), self.name(), staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged
            .persist(target)
            .map_err(|e| PackageError::Io(e.error))?;
        debug!("committed {}", target.display());
        Ok(())
    }
}

/// Extract every file entry of `container` below `dest`.
///
/// # Errors
///
/// Returns [`PackageError::PathTraversal`] for escaping entries, or an
/// archive or I/O error.
pub(crate) fn unpack_archive(container: &Container, dest: &Path) -> Result<Vec<String>> {
    unpack_zip(&mut container.archive()?, dest)
}

/// Extract every file entry of `archive` below `dest`.
///
/// # Errors
///
/// Returns [`PackageError::PathTraversal`] for escaping entries, or an
/// archive or I/O error.
pub(crate) fn unpack_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest: &Path,
) -> Result<Vec<String>> {
    let mut extracted = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let entry_name = entry.name().to_owned();
        validate_entry_path(Path::new(&entry_name))?;

        let dest_path = dest.join(&entry_name);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest_path)?;
        io::copy(&mut entry, &mut out)?;
        extracted.push(entry_name);
    }
    Ok(extracted)
}

/// Write every file below `root` into a zip archive on `out`.
///
/// # Errors
///
/// Returns an archive or I/O error.
pub(crate) fn write_archive(root: &Path, name: &ContainerName, out: &mut File) -> Result<()> {
    write_entries(root, &collect_files(root)?, name, out)
}

/// Write the listed files below `root` into a zip archive on `out`.
///
/// Entries are ordered payload first, then metadata, with the manifest
/// last, each group sorted by path.
///
/// # Errors
///
/// Returns an archive or I/O error.
pub(crate) fn write_entries(
    root: &Path,
    listed: &[String],
    name: &ContainerName,
    out: &mut File,
) -> Result<()> {
    let record = name.record_path();
    let meta_prefix = format!("{}/", name.meta_dir());

    let mut entries = listed.to_vec();
    entries.sort_by_cached_key(|entry| {
        let group = if *entry == record {
            2
        } else if entry.starts_with(&meta_prefix) {
            1
        } else {
            0
        };
        (group, entry.clone())
    });

    zip_files(root, &entries, out)?;
    Ok(())
}

/// Write the listed files below `root`, in order, into a zip archive.
///
/// # Errors
///
/// Returns an archive or I/O error.
pub(crate) fn zip_files<W: Write + Seek>(root: &Path, entries: &[String], out: W) -> Result<W> {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut writer = ZipWriter::new(out);
    for entry in entries {
        writer.start_file(entry.as_str(), options)?;
        writer.write_all(&fs::read(root.join(entry))?)?;
    }
    Ok(writer.finish()?)
}

/// List files below `root` as `/`-separated relative paths.
pub(crate) fn collect_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for walked in WalkDir::new(root).follow_links(false) {
        let entry = walked.map_err(|e| PackageError::Io(io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| PackageError::Io(io::Error::other(e.to_string())))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    Ok(files)
}
