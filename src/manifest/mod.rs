//! The `RECORD` manifest: an ordered hash and size index of a container.
//!
//! Every payload and metadata file except the manifest itself and the
//! signature documents has a row. The final row is the tail entry: the
//! manifest's own path with an empty hash and size. The tail is never
//! carried over between rewrites; callers pop it, edit, and regenerate it.
//!
//! # Modules
//!
//! - [`digest`] - `sha256=<digest>` hash specifications.

pub mod digest;

mod csv;

use crate::container::Container;
use crate::container::scratch::Scratch;
use crate::error::{PackageError, Result};
use digest::HashSpec;
use log::debug;
use sha2::{Digest, Sha256};

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    /// Archive-relative path with `/` separators.
    pub path: String,
    /// Hash specification, absent for the tail row.
    pub hash: Option<HashSpec>,
    /// Size in bytes, absent for the tail row.
    pub size: Option<u64>,
}

impl ManifestRow {
    /// Build a row describing `bytes` stored at `path`.
    #[must_use]
    pub fn for_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        let entry = digest::compute_entry(bytes);
        Self {
            path: path.into(),
            hash: Some(entry.hash),
            size: Some(entry.size),
        }
    }

    /// Build the tail row for a manifest stored at `record_path`.
    #[must_use]
    pub fn tail(record_path: impl Into<String>) -> Self {
        Self {
            path: record_path.into(),
            hash: None,
            size: None,
        }
    }

    /// Return whether this row carries no hash.
    #[must_use]
    pub fn is_tail(&self) -> bool {
        self.hash.is_none()
    }
}

/// An ordered list of manifest rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

impl Manifest {
    /// Wrap `rows` in the order given.
    #[must_use]
    pub const fn new(rows: Vec<ManifestRow>) -> Self {
        Self { rows }
    }

    /// Parse manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::CorruptManifest`] if the text holds no rows,
    /// a row does not have exactly three fields, or a hash or size is
    /// malformed.
    pub fn parse(text: &str) -> Result<Self> {
        let corrupt = |reason: String| PackageError::CorruptManifest { reason };
        let records = csv::parse_records(text).map_err(corrupt)?;
        if records.is_empty() {
            return Err(corrupt("manifest has no rows".to_owned()));
        }

        let rows = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| parse_row(index + 1, record).map_err(corrupt))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    /// Parse raw manifest bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::CorruptManifest`] if the bytes are not UTF-8
    /// or do not parse.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::parse(&decode_text(bytes)?)
    }

    /// Render the manifest as CSV text.
    #[must_use]
    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                let hash = row.hash.as_ref().map(ToString::to_string).unwrap_or_default();
                let size = row.size.map(|s| s.to_string()).unwrap_or_default();
                csv::render_record(&[&row.path, &hash, &size])
            })
            .collect()
    }

    /// Return the rows in order.
    #[must_use]
    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    /// Return whether no rows exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return the last row recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ManifestRow> {
        self.rows.iter().rev().find(|row| row.path == path)
    }

    /// Return whether any row names `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Remove and return the trailing hashless row, if any.
    pub fn pop_tail(&mut self) -> Option<ManifestRow> {
        if self.rows.last().is_some_and(ManifestRow::is_tail) {
            self.rows.pop()
        } else {
            None
        }
    }

    /// Append `row`.
    pub fn push(&mut self, row: ManifestRow) {
        self.rows.push(row);
    }

    /// Drop every row for `path`, returning how many were removed.
    pub fn remove_path(&mut self, path: &str) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| row.path != path);
        before - self.rows.len()
    }

    /// Drop every row for the row's path, then append it.
    pub fn replace(&mut self, row: ManifestRow) {
        self.remove_path(&row.path);
        self.push(row);
    }

    /// Discard any tail and append a fresh one for `record_path`.
    ///
    /// Rows for the manifest path are dropped wherever they occur so the
    /// tail stays the only one.
    pub fn regenerate_tail(&mut self, record_path: &str) {
        self.remove_path(record_path);
        self.push(ManifestRow::tail(record_path));
    }
}

/// Return the hex SHA-256 of raw manifest bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read the manifest of `container`.
///
/// # Errors
///
/// Returns [`PackageError::MissingManifest`] when the container has no
/// `RECORD`, or [`PackageError::CorruptManifest`] when it is empty or
/// cannot be parsed.
pub fn read(container: &Container) -> Result<Manifest> {
    let bytes = container
        .read_entry(&container.name().record_path())?
        .ok_or_else(|| PackageError::MissingManifest {
            container: container.path().to_owned(),
        })?;
    Manifest::from_bytes(bytes)
}

/// Decode manifest bytes as UTF-8 without altering them.
///
/// # Errors
///
/// Returns [`PackageError::CorruptManifest`] for invalid UTF-8.
pub(crate) fn decode_text(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| PackageError::CorruptManifest {
        reason: format!("manifest is not valid UTF-8: {}", e.utf8_error()),
    })
}

/// Replace the manifest of `container` with `manifest`.
///
/// The tail is regenerated before writing. The live container is replaced
/// atomically.
///
/// # Errors
///
/// Returns an error if the container cannot be extracted or repacked; the
/// original is then unchanged.
pub fn write(container: &Container, manifest: &Manifest) -> Result<()> {
    let scratch = Scratch::extract(container)?;
    let mut updated = manifest.clone();
    updated.regenerate_tail(&container.name().record_path());
    scratch.write_manifest(&updated)?;
    scratch.commit()?;
    debug!(
        "rewrote manifest of {} with {} rows",
        container.path().display(),
        updated.rows().len()
    );
    Ok(())
}

fn parse_row(line: usize, record: Vec<String>) -> std::result::Result<ManifestRow, String> {
    let [path, raw_hash, raw_size]: [String; 3] = record
        .try_into()
        .map_err(|fields: Vec<String>| format!("row {line} has {} fields, expected 3", fields.len()))?;
    if path.is_empty() {
        return Err(format!("row {line} has an empty path"));
    }
    let hash = if raw_hash.is_empty() {
        None
    } else {
        Some(raw_hash.parse::<HashSpec>().map_err(|e| format!("row {line}: {e}"))?)
    };
    let size = if raw_size.is_empty() {
        None
    } else {
        Some(
            raw_size
                .parse::<u64>()
                .map_err(|e| format!("row {line}: invalid size \"{raw_size}\": {e}"))?,
        )
    };
    if hash.is_some() != size.is_some() {
        return Err(format!("row {line} for {path} must have both hash and size or neither"));
    }
    Ok(ManifestRow { path, hash, size })
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
