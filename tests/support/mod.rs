//! Test support utilities for agentpack behavioural tests.
//!
//! Builds real containers from throwaway source projects so scenarios
//! exercise the same pipeline as the `package` command.

use agentpack::builder::{DefaultToolchain, PackageBuilder};
use agentpack::command::SystemCommandExecutor;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the project written by [`write_project`].
pub const PROJECT: &str = "weather";

/// Write a source project named [`PROJECT`] at version `1.0` under `dir`.
pub fn write_project(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
    let project = dir.join(PROJECT);
    fs::create_dir_all(&project).expect("create project dir");
    fs::write(
        project.join("agent.toml"),
        format!("[package]\nname = \"{PROJECT}\"\nversion = \"1.0\"\ndescription = \"Publishes forecasts\"\n"),
    )
    .expect("write descriptor");
    for (path, contents) in files {
        let dest = project.join(path);
        fs::create_dir_all(dest.parent().expect("file has a parent")).expect("create parent");
        fs::write(dest, contents).expect("write project file");
    }
    project
}

/// Build `project` with the default toolchain into `dir/dist`.
pub fn build_container(dir: &Path, project: &Path) -> PathBuf {
    let executor = SystemCommandExecutor;
    let toolchain = DefaultToolchain::new(&executor);
    PackageBuilder::new(dir.join("build"), &toolchain)
        .build(project, &dir.join("dist"))
        .expect("build container")
}
