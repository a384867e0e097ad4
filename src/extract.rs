//! Installing containers into a destination directory.
//!
//! The install path is `<dest>/[<namespace>/]<name>-<version>`. The whole
//! archive is unpacked there with path-traversal protection. A bundled-data
//! blob is unpacked into `<name>-<version>.data/` and then deleted; without
//! one the data directory is still created, empty.

use crate::container::Container;
use crate::container::naming::BUNDLE_FILE;
use crate::container::scratch::{unpack_archive, unpack_zip};
use crate::container::validate_entry_path;
use crate::error::{PackageError, Result};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

/// Optional grouping directory between the destination and the install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Namespace {
    /// Install directly under the destination.
    #[default]
    Flat,
    /// Install under a caller-chosen directory name.
    Named(String),
    /// Install under a freshly generated UUID.
    Generated,
}

impl Namespace {
    fn resolve(&self) -> Result<Option<String>> {
        match self {
            Self::Flat => Ok(None),
            Self::Generated => Ok(Some(uuid::Uuid::new_v4().to_string())),
            Self::Named(id) => {
                let single_component = matches!(
                    Path::new(id).components().collect::<Vec<_>>().as_slice(),
                    [Component::Normal(_)]
                );
                if !single_component {
                    return Err(PackageError::PathTraversal { path: id.clone() });
                }
                Ok(Some(id.clone()))
            }
        }
    }
}

/// Where a container was installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    /// The install directory.
    pub path: PathBuf,
    /// The data directory inside it.
    pub data_dir: PathBuf,
    /// The namespace directory name, if one was used.
    pub namespace: Option<String>,
}

/// Install `container` below `dest_dir`.
///
/// An existing installation at the same path is replaced.
///
/// # Errors
///
/// Returns [`PackageError::PathTraversal`] if an entry or the namespace
/// would escape the destination, or an archive or I/O error.
pub fn extract(container: &Container, dest_dir: &Path, namespace: &Namespace) -> Result<Installation> {
    let name = container.name();
    let chosen = namespace.resolve()?;
    let mut path = dest_dir.to_owned();
    if let Some(ns) = &chosen {
        path.push(ns);
    }
    path.push(name.namever());

    if path.exists() {
        warn!("replacing existing installation at {}", path.display());
        fs::remove_dir_all(&path)?;
    }
    fs::create_dir_all(&path)?;
    let entries = unpack_archive(container, &path)?;
    debug!("extracted {} entries to {}", entries.len(), path.display());

    let data_dir = path.join(name.data_dir());
    fs::create_dir_all(&data_dir)?;
    let bundle = data_dir.join(BUNDLE_FILE);
    if bundle.is_file() {
        unpack_bundle(&bundle, &data_dir)?;
        fs::remove_file(&bundle)?;
    }

    info!("installed {} at {}", name, path.display());
    Ok(Installation {
        path,
        data_dir,
        namespace: chosen,
    })
}

fn unpack_bundle(bundle: &Path, data_dir: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(bundle)?)?;
    for entry in archive.file_names() {
        validate_entry_path(Path::new(entry))?;
    }
    let files = unpack_zip(&mut archive, data_dir)?;
    debug!("unpacked {} bundled files into {}", files.len(), data_dir.display());
    Ok(())
}
