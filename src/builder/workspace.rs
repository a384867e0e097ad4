//! Temporary build workspaces.
//!
//! A workspace is a copy of the source project in a freshly named directory
//! under the build root. Names are `<project>-<suffix>`; creation fails on
//! an existing directory, so a collision is retried with a new suffix up to
//! a fixed number of attempts. The directory is removed when the
//! [`BuildWorkspace`] is dropped.

use crate::error::{PackageError, Result};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default number of workspace names tried before giving up.
pub const DEFAULT_ATTEMPTS: usize = 5;

/// Top-level source directory excluded from the workspace copy.
pub const DIST_DIR: &str = "dist";

/// Source of workspace name suffixes.
pub type NameSource = Box<dyn FnMut() -> String>;

/// Returns a name source producing random UUID suffixes.
#[must_use]
pub fn uuid_names() -> NameSource {
    Box::new(|| uuid::Uuid::new_v4().simple().to_string())
}

/// A temporary directory that is removed on drop.
#[derive(Debug)]
pub struct BuildWorkspace {
    path: PathBuf,
}

impl BuildWorkspace {
    /// Create an unused workspace directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::BuildWorkspaceConflict`] if every one of
    /// `attempts` names already exists, or [`PackageError::Io`] if the
    /// directory cannot be created for another reason.
    pub fn allocate(
        root: &Path,
        project: &str,
        attempts: usize,
        names: &mut dyn FnMut() -> String,
    ) -> Result<Self> {
        fs::create_dir_all(root)?;
        for attempt in 1..=attempts {
            let path = root.join(format!("{project}-{}", names()));
            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!("allocated build workspace {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("workspace {} exists (attempt {attempt})", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PackageError::BuildWorkspaceConflict {
            root: root.to_owned(),
            attempts,
        })
    }

    /// Return the workspace directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy `source` into the workspace, skipping a top-level `dist/`.
    ///
    /// Symbolic links are followed; the workspace holds plain files.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Io`] if any file cannot be copied.
    pub fn populate(&self, source: &Path) -> Result<()> {
        let walker = WalkDir::new(source)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == DIST_DIR));
        for walked in walker {
            let entry = walked.map_err(|e| PackageError::Io(io::Error::other(e.to_string())))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| PackageError::Io(io::Error::other(e.to_string())))?;
            let dest = self.path.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else {
                fs::copy(entry.path(), &dest)?;
            }
        }
        Ok(())
    }
}

impl Drop for BuildWorkspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("failed to remove build workspace {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(names: &'static [&'static str]) -> impl FnMut() -> String {
        let mut iter = names.iter().cycle();
        move || iter.next().map(ToString::to_string).unwrap_or_default()
    }

    #[test]
    fn allocates_named_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let workspace =
            BuildWorkspace::allocate(root.path(), "weather", 5, &mut fixed(&["a"])).expect("allocate");
        assert_eq!(workspace.path(), root.path().join("weather-a"));
        assert!(workspace.path().is_dir());
    }

    #[test]
    fn retries_after_collision() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("weather-taken")).expect("mkdir");
        let workspace = BuildWorkspace::allocate(
            root.path(),
            "weather",
            5,
            &mut fixed(&["taken", "free"]),
        )
        .expect("allocate");
        assert_eq!(workspace.path(), root.path().join("weather-free"));
    }

    #[test]
    fn gives_up_after_attempt_cap() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("weather-taken")).expect("mkdir");
        let mut calls = 0;
        let mut names = || {
            calls += 1;
            "taken".to_owned()
        };
        let err = BuildWorkspace::allocate(root.path(), "weather", 3, &mut names)
            .expect_err("exhausted");
        assert!(matches!(
            err,
            PackageError::BuildWorkspaceConflict { attempts: 3, .. }
        ));
        assert_eq!(calls, 3);
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let workspace =
            BuildWorkspace::allocate(root.path(), "weather", 1, &mut fixed(&["x"])).expect("allocate");
        let path = workspace.path().to_owned();
        fs::write(path.join("file"), b"data").expect("write");
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn populate_skips_top_level_dist() {
        let source = tempfile::tempdir().expect("source");
        fs::create_dir_all(source.path().join("dist")).expect("mkdir");
        fs::create_dir_all(source.path().join("lib/dist")).expect("mkdir");
        fs::write(source.path().join("dist/old.agent"), b"old").expect("write");
        fs::write(source.path().join("lib/dist/keep.py"), b"keep").expect("write");
        fs::write(source.path().join("agent.toml"), b"[package]").expect("write");

        let root = tempfile::tempdir().expect("root");
        let workspace =
            BuildWorkspace::allocate(root.path(), "weather", 1, &mut fixed(&["p"])).expect("allocate");
        workspace.populate(source.path()).expect("populate");

        assert!(workspace.path().join("agent.toml").is_file());
        assert!(workspace.path().join("lib/dist/keep.py").is_file());
        assert!(!workspace.path().join("dist").exists());
    }
}
