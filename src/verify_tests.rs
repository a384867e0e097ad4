//! Tests for container verification.

use super::*;
use crate::container::scratch::Scratch;
use crate::inject::{self, SideFiles};
use crate::sign::sign;
use crate::test_utils::sample_container;
use crate::trust::SubjectFields;
use crate::trust::role::Role;
use crate::trust::store::Overwrite;
use rstest::{fixture, rstest};
use std::fs;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    container: PathBuf,
    store: TrustStore,
}

impl Fixture {
    fn open(&self) -> Container {
        Container::open(&self.container).expect("open")
    }

    fn sign_as(&self, role: Role) {
        sign(&self.open(), &self.store, role, None, &SideFiles::default()).expect("sign");
    }

    fn verify(&self) -> Verification {
        verify(&self.container, &self.store, VerificationPolicy::default())
    }

    fn rewrite(&self, edit: impl FnOnce(&Scratch)) {
        let scratch = Scratch::extract(&self.open()).expect("extract");
        edit(&scratch);
        scratch.commit().expect("commit");
    }
}

#[fixture]
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TrustStore::open(dir.path().join("certificates")).expect("store");
    store
        .create_root(SubjectFields::with_common_name("Test Root"), Overwrite::Refuse)
        .expect("root");
    for role in Role::ALL {
        store
            .issue_role_cert(role, None, SubjectFields::with_common_name(role.as_str()))
            .expect("issue");
    }
    let container = sample_container(
        dir.path(),
        &[
            ("weather/agent.py", b"print('hi')"),
            ("weather/util.py", b"def f(): pass"),
        ],
    )
    .expect("sample container");
    Fixture {
        dir,
        container,
        store,
    }
}

#[rstest]
fn unsigned_container_depends_on_policy(fixture: Fixture) {
    let strict = fixture.verify();
    assert!(matches!(
        strict.failure,
        Some(VerificationFailure::TrustChainBroken(_))
    ));

    let relaxed = verify(&fixture.container, &fixture.store, VerificationPolicy::allow_unsigned());
    assert!(relaxed.is_valid(), "{:?}", relaxed.failure);
    assert_eq!(relaxed.signatures, 0);
}

#[rstest]
fn signed_chain_is_valid(fixture: Fixture) {
    fixture.sign_as(Role::Creator);
    fixture.sign_as(Role::Initiator);
    fixture.sign_as(Role::Soi);

    let result = fixture.verify();
    assert!(result.is_valid(), "{:?}", result.failure);
    assert_eq!(result.signatures, 3);
}

#[rstest]
fn flipped_byte_names_the_damaged_entry(fixture: Fixture) {
    fixture.rewrite(|scratch| {
        let mut bytes = scratch.read("weather/util.py").expect("read");
        bytes[0] ^= 0x01;
        scratch.write("weather/util.py", &bytes).expect("write");
    });

    let result = verify(&fixture.container, &fixture.store, VerificationPolicy::allow_unsigned());
    assert_eq!(
        result.failure,
        Some(VerificationFailure::IntegrityMismatch("weather/util.py".to_owned()))
    );
}

#[rstest]
fn missing_recorded_entry_is_a_mismatch(fixture: Fixture) {
    fixture.rewrite(|scratch| {
        scratch.remove("weather/agent.py").expect("remove");
    });

    let result = fixture.verify();
    assert_eq!(
        result.failure,
        Some(VerificationFailure::IntegrityMismatch("weather/agent.py".to_owned()))
    );
}

#[rstest]
fn unrecorded_entry_is_reported(fixture: Fixture) {
    fixture.rewrite(|scratch| {
        scratch.write("weather/extra.py", b"x = 1").expect("write");
    });

    let result = fixture.verify();
    assert_eq!(
        result.failure,
        Some(VerificationFailure::UnrecordedEntry("weather/extra.py".to_owned()))
    );
}

#[rstest]
fn missing_manifest_is_reported(fixture: Fixture) {
    fixture.rewrite(|scratch| {
        scratch.remove("weather-1.0.meta/RECORD").expect("remove");
    });

    assert_eq!(fixture.verify().failure, Some(VerificationFailure::MissingManifest));
}

#[rstest]
fn empty_manifest_is_corrupt(fixture: Fixture) {
    fixture.rewrite(|scratch| {
        scratch.write("weather-1.0.meta/RECORD", b"").expect("write");
    });

    assert!(matches!(
        fixture.verify().failure,
        Some(VerificationFailure::CorruptManifest(_))
    ));
}

#[rstest]
fn change_after_signing_breaks_chain(fixture: Fixture) {
    fixture.sign_as(Role::Creator);
    let config = fixture.dir.path().join("config");
    fs::write(&config, "interval = 5").expect("write");
    inject::attach(
        &fixture.open(),
        &SideFiles {
            config: Some(config),
            contract: None,
        },
    )
    .expect("attach");

    let result = fixture.verify();
    assert!(
        matches!(&result.failure, Some(VerificationFailure::TrustChainBroken(reason)) if reason.contains("changed")),
        "{:?}",
        result.failure
    );
}

#[rstest]
fn gap_in_sequence_breaks_chain(fixture: Fixture) {
    fixture.sign_as(Role::Creator);
    fixture.sign_as(Role::Soi);
    fixture.rewrite(|scratch| {
        scratch
            .remove("weather-1.0.meta/signatures/01-creator.json")
            .expect("remove");
    });

    assert!(matches!(
        fixture.verify().failure,
        Some(VerificationFailure::TrustChainBroken(_))
    ));
}

#[rstest]
fn root_regeneration_invalidates_earlier_certificates(fixture: Fixture) {
    fixture.sign_as(Role::Creator);
    assert!(fixture.verify().is_valid());

    fixture
        .store
        .create_root(SubjectFields::with_common_name("New Root"), Overwrite::Confirmed)
        .expect("regenerate root");
    assert!(matches!(
        fixture.verify().failure,
        Some(VerificationFailure::TrustChainBroken(_))
    ));

    fixture
        .store
        .issue_role_cert(Role::Creator, None, SubjectFields::with_common_name("creator"))
        .expect("reissue");
    let fresh = sample_container(&fixture.dir.path().join("fresh"), &[("weather/agent.py", b"x")])
        .expect("fresh container");
    sign(
        &Container::open(&fresh).expect("open"),
        &fixture.store,
        Role::Creator,
        None,
        &SideFiles::default(),
    )
    .expect("sign");
    let result = verify(&fresh, &fixture.store, VerificationPolicy::default());
    assert!(result.is_valid(), "{:?}", result.failure);
}

/// Build a stored single-entry archive whose central directory declares an
/// uncompressed size just short of 2^64 bytes.
#[expect(clippy::little_endian_bytes, reason = "zip headers are little-endian")]
fn oversized_entry_archive(entry: &str, data: &[u8]) -> Vec<u8> {
    const DECLARED_SIZE: u64 = 0xFFFF_FFFF_FFFF_FFF0;
    let name = entry.as_bytes();
    let name_len = u16::try_from(name.len()).expect("short entry name");
    let data_len = u32::try_from(data.len()).expect("small entry");

    let mut out = Vec::new();
    out.extend_from_slice(&0x0403_4b50_u32.to_le_bytes());
    for field in [20_u16, 0, 0, 0, 0x21] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    for field in [0_u32, data_len, data_len] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&name_len.to_le_bytes());
    out.extend_from_slice(&0_u16.to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(data);

    let directory_start = u32::try_from(out.len()).expect("small archive");
    out.extend_from_slice(&0x0201_4b50_u32.to_le_bytes());
    for field in [45_u16, 45, 0, 0, 0, 0x21] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    for field in [0_u32, data_len, u32::MAX] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    for field in [name_len, 12, 0, 0, 0] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    for field in [0_u32, 0] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(name);
    for field in [0x0001_u16, 8] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&DECLARED_SIZE.to_le_bytes());
    let directory_len = u32::try_from(out.len()).expect("small archive") - directory_start;

    out.extend_from_slice(&0x0605_4b50_u32.to_le_bytes());
    for field in [0_u16, 0, 1, 1] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&directory_len.to_le_bytes());
    out.extend_from_slice(&directory_start.to_le_bytes());
    out.extend_from_slice(&0_u16.to_le_bytes());
    out
}

#[rstest]
fn oversized_declared_entry_is_reported(fixture: Fixture) {
    let hostile = fixture.dir.path().join("hostile.agent");
    fs::write(
        &hostile,
        oversized_entry_archive("weather-1.0.meta/RECORD", b"not,a\nmanifest\n"),
    )
    .expect("write");

    let result = verify(&hostile, &fixture.store, VerificationPolicy::allow_unsigned());
    assert!(
        matches!(
            result.failure,
            Some(VerificationFailure::Unreadable(_) | VerificationFailure::CorruptManifest(_))
        ),
        "{:?}",
        result.failure
    );
}

#[rstest]
fn verify_all_reports_each_container(fixture: Fixture) {
    let dir = fixture.dir.path();
    let garbage = dir.join("garbage.agent");
    fs::write(&garbage, b"not a zip").expect("write");
    let missing = dir.join("missing.agent");
    let truncated = dir.join("truncated.agent");
    let intact = fs::read(&fixture.container).expect("read");
    fs::write(&truncated, intact.get(..intact.len().saturating_sub(64)).expect("prefix")).expect("write");
    let hostile = dir.join("hostile.agent");
    fs::write(
        &hostile,
        oversized_entry_archive("weather-1.0.meta/RECORD", b"not,a\nmanifest\n"),
    )
    .expect("write");

    let paths = [fixture.container.clone(), garbage, missing, truncated, hostile];
    let results = verify_all(&paths, &fixture.store, VerificationPolicy::allow_unsigned());

    let checked: Vec<&Path> = results.iter().map(|r| r.container.as_path()).collect();
    let expected: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    assert_eq!(checked, expected);
    let (first, rest) = results.split_first().expect("results");
    assert!(first.is_valid(), "{:?}", first.failure);
    for result in rest {
        assert!(
            matches!(
                result.failure,
                Some(VerificationFailure::Unreadable(_) | VerificationFailure::CorruptManifest(_))
            ),
            "{}: {:?}",
            result.container.display(),
            result.failure
        );
    }
}
