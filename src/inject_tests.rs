//! Tests for side-file attachment and retraction.

use super::*;
use crate::manifest;
use crate::test_utils::sample_container;
use rstest::{fixture, rstest};
use tempfile::TempDir;

const CONFIG: &str = "weather-1.0.meta/config";
const CONTRACT: &str = "weather-1.0.meta/execreqs.json";

struct Fixture {
    dir: TempDir,
    container: Container,
}

impl Fixture {
    fn side_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write side file");
        path
    }

    fn manifest(&self) -> Manifest {
        manifest::read(&self.container).expect("manifest")
    }

    fn rows_for(&self, path: &str) -> usize {
        self.manifest().rows().iter().filter(|row| row.path == path).count()
    }
}

#[fixture]
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = sample_container(dir.path(), &[("weather/agent.py", b"print('hi')")])
        .expect("sample container");
    let container = Container::open(path).expect("open");
    Fixture { dir, container }
}

#[rstest]
fn attaching_config_twice_keeps_one_row(fixture: Fixture) {
    let first = fixture.side_file("config", "interval = 5");
    let second = fixture.side_file("config.new", "interval = 10");

    attach(&fixture.container, &SideFiles { config: Some(first), contract: None }).expect("first");
    attach(&fixture.container, &SideFiles { config: Some(second), contract: None }).expect("second");

    assert_eq!(fixture.rows_for(CONFIG), 1);
    let manifest = fixture.manifest();
    let row = manifest.get(CONFIG).expect("config row");
    assert!(row.hash.as_ref().is_some_and(|h| h.matches(b"interval = 10")));
    let stored = fixture.container.read_entry(CONFIG).expect("read");
    assert_eq!(stored.as_deref(), Some(&b"interval = 10"[..]));
}

#[rstest]
fn contracts_accumulate(fixture: Fixture) {
    let contract = fixture.side_file("execreqs.json", r#"{"cpu": 1}"#);
    let side = SideFiles { config: None, contract: Some(contract) };

    attach(&fixture.container, &side).expect("first");
    attach(&fixture.container, &side).expect("second");

    let manifest = fixture.manifest();
    assert!(manifest.contains(CONTRACT));
    assert!(manifest.contains("weather-1.0.meta/execreqs.2.json"));
}

#[rstest]
fn tail_stays_last_after_attach(fixture: Fixture) {
    let config = fixture.side_file("config", "a = 1");
    attach(&fixture.container, &SideFiles { config: Some(config), contract: None }).expect("attach");

    let manifest = fixture.manifest();
    let last = manifest.rows().last().expect("rows");
    assert!(last.is_tail());
    assert_eq!(last.path, "weather-1.0.meta/RECORD");
    assert_eq!(fixture.rows_for("weather-1.0.meta/RECORD"), 1);
}

#[rstest]
fn unreadable_source_leaves_container_byte_identical(fixture: Fixture) {
    let before = fs::read(fixture.container.path()).expect("read");
    let config = fixture.side_file("config", "a = 1");
    let side = SideFiles {
        config: Some(config),
        contract: Some(fixture.dir.path().join("missing.json")),
    };

    let err = attach(&fixture.container, &side).expect_err("unreadable");

    match err {
        PackageError::AttachFailed { source, .. } => {
            assert!(matches!(*source, PackageError::UnreadableSideFile { .. }));
        }
        other => panic!("expected AttachFailed, got {other:?}"),
    }
    assert_eq!(fs::read(fixture.container.path()).expect("read"), before);
}

#[rstest]
fn empty_side_files_are_a_no_op(fixture: Fixture) {
    let before = fs::read(fixture.container.path()).expect("read");
    attach(&fixture.container, &SideFiles::default()).expect("no-op");
    assert_eq!(fs::read(fixture.container.path()).expect("read"), before);
}

#[rstest]
fn bundled_data_replaces_previous_blob(fixture: Fixture) {
    let data = fixture.dir.path().join("data");
    fs::create_dir_all(data.join("nested")).expect("mkdir");
    fs::write(data.join("nested/readings.csv"), "t,v\n1,2\n").expect("write");

    add_bundled_data(&fixture.container, &data).expect("first");
    fs::write(data.join("extra.txt"), "more").expect("write");
    add_bundled_data(&fixture.container, &data).expect("second");

    let bundle = "weather-1.0.data/bundle.zip";
    assert_eq!(fixture.rows_for(bundle), 1);
    let blob = fixture
        .container
        .read_entry(bundle)
        .expect("read")
        .expect("bundle present");
    let archive = zip::ZipArchive::new(Cursor::new(blob)).expect("nested zip");
    let mut names: Vec<_> = archive.file_names().map(str::to_owned).collect();
    names.sort();
    assert_eq!(names, vec!["extra.txt", "nested/readings.csv"]);
}

#[rstest]
fn bundled_data_requires_directory(fixture: Fixture) {
    let err = add_bundled_data(&fixture.container, &fixture.dir.path().join("absent"))
        .expect_err("missing dir");
    assert!(matches!(err, PackageError::UnreadableSideFile { .. }));
}

#[rstest]
fn remove_drops_files_and_rows_but_not_manifest(fixture: Fixture) {
    let config = fixture.side_file("config", "a = 1");
    attach(&fixture.container, &SideFiles { config: Some(config), contract: None }).expect("attach");

    let removed = remove(
        &fixture.container,
        &[CONFIG, "weather-1.0.meta/RECORD", "no/such/file"],
    )
    .expect("remove");

    assert_eq!(removed, 1);
    assert!(!fixture.manifest().contains(CONFIG));
    assert!(fixture.container.read_entry(CONFIG).expect("read").is_none());
    assert!(
        fixture
            .container
            .read_entry("weather-1.0.meta/RECORD")
            .expect("read")
            .is_some()
    );
}

#[rstest]
fn remove_rejects_paths_outside_the_container(fixture: Fixture) {
    let bystander = tempfile::Builder::new()
        .prefix("agentpack-bystander-")
        .tempfile()
        .expect("bystander file");
    let file_name = bystander
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name");
    let before = fs::read(fixture.container.path()).expect("read");

    let err = remove(&fixture.container, &[&format!("../{file_name}")])
        .expect_err("escaping path");

    assert!(matches!(err, PackageError::PathTraversal { .. }), "{err:?}");
    assert!(bystander.path().exists());
    assert_eq!(fs::read(fixture.container.path()).expect("read"), before);
}
