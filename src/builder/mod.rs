//! Package builds.
//!
//! [`PackageBuilder::build`] turns a source project into a container:
//!
//! 1. load the `agent.toml` descriptor;
//! 2. copy the project into a fresh workspace under the build root;
//! 3. run the [`BuildToolchain`] in the workspace, which must leave exactly
//!    one container in the workspace's `dist/` directory;
//! 4. move that container into the output directory.
//!
//! The workspace is removed on every exit path and the source project is
//! never modified.
//!
//! # Modules
//!
//! - [`descriptor`] - The `agent.toml` build descriptor
//! - [`workspace`] - Collision-checked temporary workspaces

pub mod descriptor;
pub mod workspace;

use crate::command::CommandExecutor;
use crate::container::naming::CONTAINER_EXTENSION;
use crate::container::scratch::{collect_files, write_entries};
use crate::error::{PackageError, Result};
use crate::manifest::{Manifest, ManifestRow};
use descriptor::Descriptor;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use workspace::{BuildWorkspace, DIST_DIR, NameSource};

/// Produces a container inside a prepared workspace.
#[cfg_attr(test, mockall::automock)]
pub trait BuildToolchain {
    /// Build the project copied into `workspace`, leaving the container in
    /// `workspace/dist/`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::BuildFailed`] when the build does not
    /// succeed.
    fn build(&self, workspace: &Path, descriptor: &Descriptor) -> Result<()>;
}

/// Runs the descriptor's build command, then packs the workspace.
pub struct DefaultToolchain<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> DefaultToolchain<'a> {
    /// Create a toolchain running commands through `executor`.
    #[must_use]
    pub const fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    fn run_command(&self, workspace: &Path, descriptor: &Descriptor) -> Result<()> {
        let Some((program, raw_args)) = descriptor.build.command.split_first() else {
            return Ok(());
        };
        let args: Vec<&str> = raw_args.iter().map(String::as_str).collect();
        debug!("running build command {program} {args:?}");
        let output = self.executor.run(program, &args, workspace)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PackageError::BuildFailed {
                package: descriptor.package.name.clone(),
                reason: format!("{program} exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

impl BuildToolchain for DefaultToolchain<'_> {
    fn build(&self, workspace: &Path, descriptor: &Descriptor) -> Result<()> {
        self.run_command(workspace, descriptor)?;
        pack_workspace(workspace, descriptor)?;
        Ok(())
    }
}

/// Write `METADATA` and a fresh `RECORD` into `workspace`, then pack it
/// into `workspace/dist/<name>-<version>.agent`.
///
/// # Errors
///
/// Returns an I/O or archive error if packing fails.
pub fn pack_workspace(workspace: &Path, descriptor: &Descriptor) -> Result<PathBuf> {
    let name = descriptor.container_name()?;
    let dist = workspace.join(DIST_DIR);
    let record_path = name.record_path();

    let meta_dir = workspace.join(name.meta_dir());
    fs::create_dir_all(&meta_dir)?;
    fs::write(workspace.join(name.metadata_path()), descriptor.metadata())?;
    let stale_record = workspace.join(&record_path);
    if stale_record.exists() {
        fs::remove_file(stale_record)?;
    }

    let mut files: Vec<String> = collect_files(workspace)?
        .into_iter()
        .filter(|path| !path.starts_with(&format!("{DIST_DIR}/")))
        .filter(|path| !name.is_signature_path(path))
        .collect();
    files.sort();
    let mut manifest = Manifest::default();
    for path in &files {
        manifest.push(ManifestRow::for_bytes(path.as_str(), &fs::read(workspace.join(path))?));
    }
    manifest.regenerate_tail(&record_path);
    fs::write(workspace.join(&record_path), manifest.render())?;

    files.push(record_path);
    let mut staged = NamedTempFile::new_in(workspace)?;
    write_entries(workspace, &files, &name, staged.as_file_mut())?;

    fs::create_dir_all(&dist)?;
    let artifact = dist.join(name.filename());
    staged
        .persist(&artifact)
        .map_err(|e| PackageError::Io(e.error))?;
    debug!("packed {}", artifact.display());
    Ok(artifact)
}

/// Builds containers from source projects.
pub struct PackageBuilder<'a> {
    build_root: PathBuf,
    attempts: usize,
    toolchain: &'a dyn BuildToolchain,
    names: NameSource,
}

impl<'a> PackageBuilder<'a> {
    /// Create a builder placing workspaces under `build_root`.
    #[must_use]
    pub fn new(build_root: impl Into<PathBuf>, toolchain: &'a dyn BuildToolchain) -> Self {
        Self {
            build_root: build_root.into(),
            attempts: workspace::DEFAULT_ATTEMPTS,
            toolchain,
            names: workspace::uuid_names(),
        }
    }

    /// Set how many workspace names are tried.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Replace the workspace name source.
    #[must_use]
    pub fn with_names(mut self, names: NameSource) -> Self {
        self.names = names;
        self
    }

    /// Build the project at `source_dir` into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::NotAPackage`] or
    /// [`PackageError::InvalidDescriptor`] for unusable projects,
    /// [`PackageError::BuildWorkspaceConflict`] if no workspace can be
    /// allocated, and [`PackageError::BuildFailed`] if the toolchain fails
    /// or does not produce exactly one container.
    pub fn build(&mut self, source_dir: &Path, output_dir: &Path) -> Result<PathBuf> {
        let descriptor = Descriptor::load(source_dir)?;
        let project = source_dir
            .canonicalize()?
            .file_name()
            .map_or_else(|| descriptor.package.name.clone(), |n| n.to_string_lossy().into_owned());

        let workspace =
            BuildWorkspace::allocate(&self.build_root, &project, self.attempts, &mut *self.names)?;
        workspace.populate(source_dir)?;
        self.toolchain.build(workspace.path(), &descriptor)?;

        let artifact = single_artifact(&workspace.path().join(DIST_DIR), &descriptor)?;
        let dest = move_into(&artifact, output_dir)?;
        info!("built {}", dest.display());
        Ok(dest)
    }
}

/// Rebuilding an installed agent from its name is not supported.
///
/// # Errors
///
/// Always returns [`PackageError::Unsupported`].
pub fn repackage(agent_name: &str) -> Result<PathBuf> {
    debug!("repackage requested for {agent_name}");
    Err(PackageError::Unsupported {
        operation: "repackage",
    })
}

fn single_artifact(dist: &Path, descriptor: &Descriptor) -> Result<PathBuf> {
    let failed = |reason: String| PackageError::BuildFailed {
        package: descriptor.package.name.clone(),
        reason,
    };
    let entries = match fs::read_dir(dist) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(failed(format!("no {DIST_DIR}/ directory was produced")));
        }
        Err(e) => return Err(e.into()),
    };
    let mut artifacts = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CONTAINER_EXTENSION) {
            artifacts.push(path);
        }
    }
    match <[PathBuf; 1]>::try_from(artifacts) {
        Ok([artifact]) => Ok(artifact),
        Err(found) => Err(failed(format!(
            "expected exactly one .{CONTAINER_EXTENSION} in {DIST_DIR}/, found {}",
            found.len()
        ))),
    }
}

fn move_into(artifact: &Path, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let file_name = artifact.file_name().ok_or_else(|| PackageError::InvalidContainer {
        path: artifact.to_owned(),
        reason: "artifact has no file name".to_owned(),
    })?;
    let dest = output_dir.join(file_name);
    if fs::rename(artifact, &dest).is_err() {
        fs::copy(artifact, &dest)?;
        fs::remove_file(artifact)?;
    }
    Ok(dest)
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
