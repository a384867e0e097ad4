//! Behaviour-driven tests for installing containers.

mod support;

use agentpack::PackageError;
use agentpack::container::Container;
use agentpack::container::naming::BUNDLE_FILE;
use agentpack::extract::{Installation, Namespace, extract};
use agentpack::inject::add_bundled_data;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::fs;
use std::path::{Path, PathBuf};
use support::{build_container, write_project};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct InstallWorld {
    temp_dir: TempDir,
    container: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    installation: Option<Installation>,
    error: Option<PackageError>,
}

#[fixture]
fn world() -> InstallWorld {
    InstallWorld {
        temp_dir: TempDir::new().expect("temp dir"),
        container: None,
        data_dir: None,
        installation: None,
        error: None,
    }
}

impl InstallWorld {
    fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn container(&self) -> Container {
        Container::open(self.container.as_deref().expect("container built")).expect("open")
    }

    fn installation(&self) -> &Installation {
        self.installation.as_ref().expect("container installed")
    }

    fn install(&mut self, dest: &str, namespace: &Namespace) {
        match extract(&self.container(), &self.dir().join(dest), namespace) {
            Ok(installation) => self.installation = Some(installation),
            Err(e) => self.error = Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a built container")]
fn given_container(world: &mut InstallWorld) {
    let project = write_project(world.dir(), &[("weather/agent.py", "print('forecast')\n")]);
    world.container = Some(build_container(world.dir(), &project));
}

#[given("a data directory containing \"{path}\"")]
fn given_data_dir(world: &mut InstallWorld, path: String) {
    let data_dir = world.dir().join("data");
    let file = data_dir.join(&path);
    fs::create_dir_all(file.parent().expect("parent")).expect("mkdir");
    fs::write(&file, [0_u8, 1, 2, 3]).expect("write data file");
    world.data_dir = Some(data_dir);
}

#[when("the data directory is bundled")]
fn when_bundled(world: &mut InstallWorld) {
    let data_dir = world.data_dir.clone().expect("data dir set");
    add_bundled_data(&world.container(), &data_dir).expect("bundle data");
}

#[when("the container is extracted to \"{dest}\"")]
fn when_extracted(world: &mut InstallWorld, dest: String) {
    world.install(&dest, &Namespace::Flat);
}

#[when("the container is extracted under namespace \"{namespace}\" to \"{dest}\"")]
fn when_extracted_under(world: &mut InstallWorld, namespace: String, dest: String) {
    world.install(&dest, &Namespace::Named(namespace));
}

#[then("the install path is \"{path}\"")]
fn then_install_path(world: &mut InstallWorld, path: String) {
    assert_eq!(world.installation().path, world.dir().join(path));
}

#[then("the file \"{path}\" is installed")]
fn then_file_installed(world: &mut InstallWorld, path: String) {
    assert!(world.installation().path.join(path).is_file());
}

#[then("the data directory is empty")]
fn then_data_dir_empty(world: &mut InstallWorld) {
    let data_dir = &world.installation().data_dir;
    assert!(data_dir.is_dir(), "data directory missing");
    assert_eq!(fs::read_dir(data_dir).expect("read data dir").count(), 0);
}

#[then("the data directory contains \"{path}\"")]
fn then_data_dir_contains(world: &mut InstallWorld, path: String) {
    let file = world.installation().data_dir.join(path);
    assert_eq!(fs::read(file).expect("read data file"), vec![0_u8, 1, 2, 3]);
}

#[then("no bundle blob remains")]
fn then_no_blob(world: &mut InstallWorld) {
    assert!(!world.installation().data_dir.join(BUNDLE_FILE).exists());
}

#[then("extraction fails with a path traversal error")]
fn then_traversal(world: &mut InstallWorld) {
    assert!(
        matches!(world.error, Some(PackageError::PathTraversal { .. })),
        "expected PathTraversal, got {:?}",
        world.error
    );
    assert!(!world.dir().join("weather-1.0").exists());
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/installation.feature",
    name = "Extraction always creates a data directory"
)]
fn scenario_empty_data_dir(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/installation.feature",
    name = "Bundled data lands in the data directory"
)]
fn scenario_bundled_data(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/installation.feature",
    name = "A named namespace groups installations"
)]
fn scenario_named_namespace(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/installation.feature",
    name = "A namespace cannot escape the destination"
)]
fn scenario_escaping_namespace(world: InstallWorld) {
    let _ = world;
}
