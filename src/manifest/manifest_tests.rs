//! Tests for manifest parsing, editing, and container round trips.

use super::*;
use crate::container::naming::ContainerName;
use crate::container::scratch::write_archive;
use rstest::{fixture, rstest};
use std::fs::{self, File};
use tempfile::TempDir;

const RECORD: &str = "weather-1.0.meta/RECORD";

#[fixture]
fn sample_manifest() -> Manifest {
    Manifest::new(vec![
        ManifestRow::for_bytes("agent.py", b"print('hi')"),
        ManifestRow::for_bytes("weather-1.0.meta/METADATA", b"name = weather"),
        ManifestRow::tail(RECORD),
    ])
}

struct ContainerFixture {
    _dir: TempDir,
    container: Container,
}

#[fixture]
fn packed_container(sample_manifest: Manifest) -> ContainerFixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let name = ContainerName::new("weather", "1.0").expect("name");
    let tree = dir.path().join("tree");
    fs::create_dir_all(tree.join("weather-1.0.meta")).expect("mkdir");
    fs::write(tree.join("agent.py"), b"print('hi')").expect("payload");
    fs::write(tree.join("weather-1.0.meta/METADATA"), b"name = weather").expect("metadata");
    fs::write(tree.join(RECORD), sample_manifest.render()).expect("record");

    let path = dir.path().join(name.filename());
    let mut file = File::create(&path).expect("create");
    write_archive(&tree, &name, &mut file).expect("archive");
    let container = Container::open(path).expect("open");
    ContainerFixture { _dir: dir, container }
}

#[rstest]
fn render_ends_with_empty_tail(sample_manifest: Manifest) {
    let text = sample_manifest.render();
    assert!(text.ends_with("weather-1.0.meta/RECORD,,\n"), "{text}");
    assert_eq!(text.lines().count(), 3);
}

#[rstest]
fn parse_reads_what_render_wrote(sample_manifest: Manifest) {
    let parsed = Manifest::parse(&sample_manifest.render()).expect("parse");
    assert_eq!(parsed, sample_manifest);
}

#[rstest]
#[case::empty("")]
#[case::blank("\n\n")]
#[case::two_fields("agent.py,sha256=x\n")]
#[case::bad_hash("agent.py,sha256=x,3\n")]
#[case::bad_size("agent.py,sha256=47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU,big\n")]
#[case::hash_without_size("agent.py,sha256=47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU,\n")]
fn parse_rejects_corrupt_text(#[case] text: &str) {
    assert!(matches!(
        Manifest::parse(text),
        Err(PackageError::CorruptManifest { .. })
    ));
}

#[rstest]
fn pop_tail_only_removes_hashless_row(mut sample_manifest: Manifest) {
    let tail = sample_manifest.pop_tail().expect("tail");
    assert_eq!(tail.path, RECORD);
    assert!(sample_manifest.pop_tail().is_none());
    assert_eq!(sample_manifest.rows().len(), 2);
}

#[rstest]
fn replace_keeps_single_row_per_path(mut sample_manifest: Manifest) {
    sample_manifest.pop_tail();
    sample_manifest.push(ManifestRow::for_bytes("config", b"one"));
    sample_manifest.replace(ManifestRow::for_bytes("config", b"two"));
    sample_manifest.regenerate_tail(RECORD);

    let config_rows: Vec<_> = sample_manifest
        .rows()
        .iter()
        .filter(|row| row.path == "config")
        .collect();
    assert_eq!(config_rows.len(), 1);
    assert!(config_rows[0].hash.as_ref().is_some_and(|h| h.matches(b"two")));
    assert!(sample_manifest.rows().last().is_some_and(ManifestRow::is_tail));
}

#[rstest]
fn regenerate_tail_discards_stale_manifest_rows(mut sample_manifest: Manifest) {
    sample_manifest.push(ManifestRow::for_bytes(RECORD, b"stale"));
    sample_manifest.regenerate_tail(RECORD);

    let record_rows = sample_manifest
        .rows()
        .iter()
        .filter(|row| row.path == RECORD)
        .count();
    assert_eq!(record_rows, 1);
    assert!(sample_manifest.rows().last().is_some_and(ManifestRow::is_tail));
}

#[rstest]
fn content_hash_is_hex_sha256(sample_manifest: Manifest) {
    let hash = content_hash(sample_manifest.render().as_bytes());
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn non_utf8_manifest_is_corrupt_not_rewritten() {
    let mut bytes = b"agent.py,".to_vec();
    bytes.push(0xff);
    bytes.extend_from_slice(b",3\r\n");

    let err = Manifest::from_bytes(bytes).expect_err("invalid UTF-8");
    assert!(
        matches!(&err, PackageError::CorruptManifest { reason } if reason.contains("UTF-8")),
        "{err:?}"
    );
}

#[rstest]
fn read_returns_packed_manifest(packed_container: ContainerFixture, sample_manifest: Manifest) {
    let manifest = read(&packed_container.container).expect("read");
    assert_eq!(manifest, sample_manifest);
}

#[rstest]
fn write_replaces_manifest_and_regenerates_tail(packed_container: ContainerFixture) {
    let container = &packed_container.container;
    let mut manifest = read(container).expect("read");
    manifest.pop_tail();
    manifest.remove_path("weather-1.0.meta/METADATA");

    write(container, &manifest).expect("write");

    let reread = read(container).expect("reread");
    assert!(!reread.contains("weather-1.0.meta/METADATA"));
    assert!(reread.rows().last().is_some_and(|row| row.is_tail() && row.path == RECORD));
}

#[test]
fn read_rejects_non_utf8_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let name = ContainerName::new("weather", "1.0").expect("name");
    let tree = dir.path().join("tree");
    fs::create_dir_all(tree.join("weather-1.0.meta")).expect("mkdir");
    fs::write(tree.join(RECORD), b"agent.py,sha256=\xfe\xff,1\r\n").expect("record");
    let path = dir.path().join(name.filename());
    let mut file = File::create(&path).expect("create");
    write_archive(&tree, &name, &mut file).expect("archive");

    let container = Container::open(path).expect("open");
    assert!(matches!(
        read(&container),
        Err(PackageError::CorruptManifest { .. })
    ));
}

#[rstest]
fn read_reports_missing_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let name = ContainerName::new("weather", "1.0").expect("name");
    let tree = dir.path().join("tree");
    fs::create_dir_all(tree.join("weather-1.0.meta")).expect("mkdir");
    fs::write(tree.join("weather-1.0.meta/METADATA"), b"name").expect("metadata");
    let path = dir.path().join(name.filename());
    let mut file = File::create(&path).expect("create");
    write_archive(&tree, &name, &mut file).expect("archive");

    let container = Container::open(path).expect("open");
    assert!(matches!(
        read(&container),
        Err(PackageError::MissingManifest { .. })
    ));
}
