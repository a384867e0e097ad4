//! Known-hosts record mapping remote peers to trusted public keys.
//!
//! Each non-empty line holds `<remote-id> <hex-ed25519-key>`; lines starting
//! with `#` are comments. A missing file behaves like an empty record.

use super::certificate::decode_verifying_key;
use crate::error::{PackageError, Result};
use ed25519_dalek::VerifyingKey;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Reads and updates a known-hosts file.
#[derive(Debug, Clone)]
pub struct KnownHosts {
    path: PathBuf,
}

impl KnownHosts {
    /// Create a record backed by `path`.
    #[must_use]
    pub const fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Return the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the key recorded for `remote_id`.
    ///
    /// Returns `Ok(None)` when the file or the entry is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Io`] if the file exists but cannot be read,
    /// or [`PackageError::InvalidKey`] if the matching entry is malformed.
    pub fn lookup(&self, remote_id: &str) -> Result<Option<VerifyingKey>> {
        let Some(contents) = self.read()? else {
            return Ok(None);
        };
        parse_entries(&contents)
            .find(|(id, _)| *id == remote_id)
            .map(|(id, key)| decode_verifying_key(key, id))
            .transpose()
    }

    /// Record `key` for `remote_id`, replacing an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidKey`] if `remote_id` is empty or
    /// contains whitespace, or [`PackageError::Io`] on write failure.
    pub fn insert(&self, remote_id: &str, key: &VerifyingKey) -> Result<()> {
        if remote_id.is_empty() || remote_id.chars().any(char::is_whitespace) {
            return Err(PackageError::InvalidKey {
                context: remote_id.to_owned(),
                reason: "remote identifiers must be non-empty and contain no whitespace"
                    .to_owned(),
            });
        }
        let existing = self.read()?.unwrap_or_default();
        let mut lines: Vec<String> = existing
            .lines()
            .filter(|line| entry_id(line) != Some(remote_id))
            .map(str::to_owned)
            .collect();
        lines.push(format!("{remote_id} {}", hex::encode(key.to_bytes())));

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all((lines.join("\n") + "\n").as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|e| PackageError::Io(e.error))?;
        Ok(())
    }

    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_entries(contents: &str) -> impl Iterator<Item = (&str, &str)> {
    contents.lines().filter_map(|raw| {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.split_whitespace();
        Some((parts.next()?, parts.next()?))
    })
}

fn entry_id(line: &str) -> Option<&str> {
    parse_entries(line).next().map(|(id, _)| id)
}
