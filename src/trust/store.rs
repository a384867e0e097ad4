//! On-disk certificate store.
//!
//! Layout under the store directory:
//!
//! ```text
//! certs/<name>.json     certificates (JSON)
//! private/<name>.key    hex-encoded Ed25519 secret keys
//! known_hosts           remote peer keys
//! ```
//!
//! The root lives under [`ROOT_NAME`]. Role certificates default to the
//! name of their role.

use super::certificate::{Certificate, SubjectFields, decode_signing_key};
use super::known_hosts::KnownHosts;
use super::role::Role;
use crate::error::{PackageError, Result, RoleViolation};
use ed25519_dalek::{SigningKey, VerifyingKey};
use log::{debug, warn};
use rand::rngs::OsRng;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Store entry name of the root certificate.
pub const ROOT_NAME: &str = "root";

/// Whether the store holds a root certificate yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No root certificate exists.
    Uninitialized,
    /// A root certificate exists and role certificates may be issued.
    RootReady,
}

/// Caller decision on replacing an existing root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    /// Fail if a root already exists.
    #[default]
    Refuse,
    /// Replace the existing root, invalidating everything it signed.
    Confirmed,
}

/// A certificate together with its secret key.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Name the identity is stored under.
    pub name: String,
    /// The identity's certificate.
    pub certificate: Certificate,
    /// The matching secret key.
    pub signing_key: SigningKey,
}

/// A directory of certificates and keys anchored at one root.
#[derive(Debug, Clone)]
pub struct TrustStore {
    dir: PathBuf,
}

impl TrustStore {
    /// Open the store at `dir`, creating the directory layout if absent.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Io`] if the directories cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { dir: dir.into() };
        fs::create_dir_all(store.certs_dir())?;
        fs::create_dir_all(store.private_dir())?;
        set_permissions(&store.private_dir(), 0o700)?;
        Ok(store)
    }

    /// Return the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Report whether a root certificate exists.
    #[must_use]
    pub fn state(&self) -> StoreState {
        if self.certificate_path(ROOT_NAME).is_file() && self.key_path(ROOT_NAME).is_file() {
            StoreState::RootReady
        } else {
            StoreState::Uninitialized
        }
    }

    /// Create the self-signed root certificate.
    ///
    /// Replacing an existing root invalidates every signature made with
    /// certificates it issued, so it requires [`Overwrite::Confirmed`].
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::AlreadyExists`] if a root exists and
    /// `overwrite` is [`Overwrite::Refuse`]; the store is left untouched.
    pub fn create_root(&self, subject: SubjectFields, overwrite: Overwrite) -> Result<Certificate> {
        if self.state() == StoreState::RootReady {
            match overwrite {
                Overwrite::Refuse => {
                    return Err(PackageError::AlreadyExists {
                        path: self.certificate_path(ROOT_NAME),
                    });
                }
                Overwrite::Confirmed => warn!(
                    "replacing root certificate in {}; signatures issued under the previous root are no longer trusted",
                    self.dir.display()
                ),
            }
        }

        let key = SigningKey::generate(&mut OsRng);
        let certificate = Certificate::self_signed(subject, &key)?;
        self.store(ROOT_NAME, &certificate, &key)?;
        debug!("created root certificate {}", certificate.body.serial);
        Ok(certificate)
    }

    /// Issue a certificate for `role`, signed by the root.
    ///
    /// The certificate is stored under `name`, or under the role name when
    /// `name` is `None`. An existing entry with the same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::RootNotInitialized`] if no root exists, or
    /// [`PackageError::InvalidName`] if `name` cannot be used as an entry.
    pub fn issue_role_cert(
        &self,
        role: Role,
        name: Option<&str>,
        subject: SubjectFields,
    ) -> Result<Identity> {
        let entry = entry_name(role, name)?;
        if self.state() == StoreState::Uninitialized {
            return Err(PackageError::RootNotInitialized);
        }
        let root = self.load_entry(ROOT_NAME)?;

        let key = SigningKey::generate(&mut OsRng);
        let certificate = Certificate::issue(
            role,
            subject,
            &key.verifying_key(),
            &root.certificate,
            &root.signing_key,
        )?;
        self.store(&entry, &certificate, &key)?;
        debug!("issued {role} certificate {entry}");

        Ok(Identity {
            name: entry,
            certificate,
            signing_key: key,
        })
    }

    /// Load the root certificate.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::RootNotInitialized`] if no root exists.
    pub fn root_certificate(&self) -> Result<Certificate> {
        if self.state() == StoreState::Uninitialized {
            return Err(PackageError::RootNotInitialized);
        }
        self.read_certificate(ROOT_NAME)
    }

    /// Load the signing identity for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::MissingCertificate`] if nothing is stored
    /// under the name, or [`PackageError::RoleViolation`] if the stored
    /// certificate belongs to another role.
    pub fn load_identity(&self, role: Role, name: Option<&str>) -> Result<Identity> {
        let entry = entry_name(role, name)?;
        let identity = self.load_entry(&entry)?;
        if identity.certificate.role().signer() != Some(role) {
            return Err(RoleViolation::CertificateRoleMismatch {
                name: entry,
                expected: role,
                found: identity.certificate.role().to_string(),
            }
            .into());
        }
        Ok(identity)
    }

    /// Return the store's known-hosts record.
    #[must_use]
    pub fn known_hosts(&self) -> KnownHosts {
        KnownHosts::with_path(self.dir.join("known_hosts"))
    }

    /// Resolve a trusted remote peer's key from the known-hosts record.
    ///
    /// Absence is not an error; callers fall back to a configured key.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or the entry is
    /// malformed.
    pub fn lookup_server_key(&self, remote_id: &str) -> Result<Option<VerifyingKey>> {
        self.known_hosts().lookup(remote_id)
    }

    /// Resolve a peer key from known hosts, then from `fallback`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or either key is
    /// malformed.
    pub fn resolve_server_key(
        &self,
        remote_id: &str,
        fallback: Option<&str>,
    ) -> Result<Option<VerifyingKey>> {
        if let Some(key) = self.lookup_server_key(remote_id)? {
            return Ok(Some(key));
        }
        debug!("{remote_id} not in known hosts; using configured key");
        fallback
            .map(|value| super::certificate::decode_verifying_key(value, remote_id))
            .transpose()
    }

    /// Record a trusted peer key.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is invalid or the record cannot be
    /// written.
    pub fn add_known_host(&self, remote_id: &str, key: &VerifyingKey) -> Result<()> {
        self.known_hosts().insert(remote_id, key)
    }

    fn certs_dir(&self) -> PathBuf {
        self.dir.join("certs")
    }

    fn private_dir(&self) -> PathBuf {
        self.dir.join("private")
    }

    /// Return where the certificate stored under `name` lives.
    #[must_use]
    pub fn certificate_path(&self, name: &str) -> PathBuf {
        self.certs_dir().join(format!("{name}.json"))
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.private_dir().join(format!("{name}.key"))
    }

    fn read_certificate(&self, name: &str) -> Result<Certificate> {
        let path = self.certificate_path(name);
        let contents = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PackageError::MissingCertificate {
                name: name.to_owned(),
                store: self.dir.clone(),
            },
            _ => e.into(),
        })?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn load_entry(&self, name: &str) -> Result<Identity> {
        let certificate = self.read_certificate(name)?;
        let key_hex = fs::read_to_string(self.key_path(name)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PackageError::MissingCertificate {
                name: name.to_owned(),
                store: self.dir.clone(),
            },
            _ => e.into(),
        })?;
        let signing_key = decode_signing_key(&key_hex, name)?;
        if signing_key.verifying_key() != certificate.verifying_key()? {
            return Err(PackageError::InvalidKey {
                context: name.to_owned(),
                reason: "private key does not match certificate".to_owned(),
            });
        }
        Ok(Identity {
            name: name.to_owned(),
            certificate,
            signing_key,
        })
    }

    /// Write both halves to temporary files before renaming either, so a
    /// failure leaves the previous entry in place.
    fn store(&self, name: &str, certificate: &Certificate, key: &SigningKey) -> Result<()> {
        let mut cert_file = NamedTempFile::new_in(self.certs_dir())?;
        cert_file.write_all(&serde_json::to_vec_pretty(certificate)?)?;
        cert_file.as_file().sync_all()?;

        let mut key_file = NamedTempFile::new_in(self.private_dir())?;
        key_file.write_all(hex::encode(key.to_bytes()).as_bytes())?;
        key_file.as_file().sync_all()?;
        set_permissions(key_file.path(), 0o600)?;

        key_file
            .persist(self.key_path(name))
            .map_err(|e| PackageError::Io(e.error))?;
        cert_file
            .persist(self.certificate_path(name))
            .map_err(|e| PackageError::Io(e.error))?;
        Ok(())
    }
}

fn entry_name(role: Role, requested: Option<&str>) -> Result<String> {
    let name = requested.unwrap_or(role.as_str());
    let invalid = |reason: &str| PackageError::InvalidName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == ROOT_NAME {
        return Err(invalid("reserved for the root certificate"));
    }
    if name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(invalid("names must be plain file names"));
    }
    Ok(name.to_owned())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
