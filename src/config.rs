//! Packager configuration.
//!
//! Settings are read from `<home>/config.toml`, where the home directory is
//! `$AGENTPACK_HOME` or `~/.agentpack`. A missing file yields the defaults.
//! Relative paths in the file are resolved against the home directory.
//!
//! ```toml
//! trust_store = "certificates"
//! build_root = "/var/tmp/agentpack"
//! output_dir = "packaged"
//! build_attempts = 5
//! require_signatures = true
//! server_key = "5c1f...e9"
//! ```

use crate::builder::workspace::DEFAULT_ATTEMPTS;
use crate::error::{PackageError, Result};
use crate::verify::VerificationPolicy;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "AGENTPACK_HOME";

/// Name of the configuration file inside the home directory.
pub const CONFIG_FILE: &str = "config.toml";

const DEFAULT_HOME_DIR: &str = ".agentpack";

/// Settings loaded from `config.toml`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PackagerConfig {
    #[serde(skip)]
    home: PathBuf,
    /// Certificate store directory. Defaults to `<home>/certificates`.
    pub trust_store: Option<PathBuf>,
    /// Directory for temporary build workspaces. Defaults to
    /// `<home>/build`.
    pub build_root: Option<PathBuf>,
    /// Directory receiving built containers. Defaults to `<home>/packaged`.
    pub output_dir: Option<PathBuf>,
    /// Workspace names tried before a build gives up.
    pub build_attempts: Option<usize>,
    /// Whether verification requires a signature chain. Defaults to true.
    pub require_signatures: Option<bool>,
    /// Hex public key of the platform, used when it is not in known hosts.
    pub server_key: Option<String>,
}

impl PackagerConfig {
    /// Load the configuration from the resolved home directory.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Config`] if the home directory cannot be
    /// determined or the file cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&home_dir()?)
    }

    /// Load the configuration from `home/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Config`] if the file exists but cannot be
    /// read or parsed.
    pub fn load_from(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        let config_error = |reason: String| PackageError::Config {
            path: path.clone(),
            reason,
        };
        let mut config: Self = match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| config_error(e.to_string()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(config_error(e.to_string())),
        };
        config.home = home.to_owned();
        Ok(config)
    }

    /// Return the home directory the configuration was loaded from.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Return the certificate store directory.
    #[must_use]
    pub fn trust_store_dir(&self) -> PathBuf {
        self.resolve(self.trust_store.as_deref(), "certificates")
    }

    /// Return the build workspace root.
    #[must_use]
    pub fn build_root(&self) -> PathBuf {
        self.resolve(self.build_root.as_deref(), "build")
    }

    /// Return the default output directory for built containers.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(self.output_dir.as_deref(), "packaged")
    }

    /// Return the workspace attempt cap.
    #[must_use]
    pub fn build_attempts(&self) -> usize {
        self.build_attempts.unwrap_or(DEFAULT_ATTEMPTS).max(1)
    }

    /// Return the verification policy.
    #[must_use]
    pub fn verification_policy(&self) -> VerificationPolicy {
        VerificationPolicy::new(self.require_signatures.unwrap_or(true))
    }

    fn resolve(&self, configured: Option<&Path>, default: &str) -> PathBuf {
        configured.map_or_else(|| self.home.join(default), |path| self.home.join(path))
    }
}

/// Resolve the home directory: `$AGENTPACK_HOME`, else `~/.agentpack`.
///
/// # Errors
///
/// Returns [`PackageError::Config`] if neither source is available.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    directories_next::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_HOME_DIR))
        .ok_or_else(|| PackageError::Config {
            path: PathBuf::from(DEFAULT_HOME_DIR),
            reason: format!("cannot determine the home directory; set {HOME_ENV}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn missing_file_yields_defaults() {
        let home = tempfile::tempdir().expect("tempdir");
        let config = PackagerConfig::load_from(home.path()).expect("load");

        assert_eq!(config.trust_store_dir(), home.path().join("certificates"));
        assert_eq!(config.build_root(), home.path().join("build"));
        assert_eq!(config.output_dir(), home.path().join("packaged"));
        assert_eq!(config.build_attempts(), DEFAULT_ATTEMPTS);
        assert!(config.verification_policy().require_signatures());
        assert!(config.server_key.is_none());
    }

    #[rstest]
    fn reads_overrides() {
        let home = tempfile::tempdir().expect("tempdir");
        fs::write(
            home.path().join(CONFIG_FILE),
            "trust_store = \"/etc/agentpack/certs\"\noutput_dir = \"out\"\nbuild_attempts = 2\nrequire_signatures = false\nserver_key = \"abc\"\n",
        )
        .expect("write");

        let config = PackagerConfig::load_from(home.path()).expect("load");

        assert_eq!(config.trust_store_dir(), PathBuf::from("/etc/agentpack/certs"));
        assert_eq!(config.output_dir(), home.path().join("out"));
        assert_eq!(config.build_attempts(), 2);
        assert!(!config.verification_policy().require_signatures());
        assert_eq!(config.server_key.as_deref(), Some("abc"));
    }

    #[rstest]
    #[case::unknown_key("colour = \"blue\"\n")]
    #[case::wrong_type("build_attempts = \"many\"\n")]
    fn rejects_invalid_files(#[case] contents: &str) {
        let home = tempfile::tempdir().expect("tempdir");
        fs::write(home.path().join(CONFIG_FILE), contents).expect("write");

        let err = PackagerConfig::load_from(home.path()).expect_err("invalid");
        assert!(matches!(err, PackageError::Config { .. }));
    }

    #[rstest]
    fn home_env_overrides_default() {
        let home = tempfile::tempdir().expect("tempdir");
        temp_env::with_var(HOME_ENV, Some(home.path()), || {
            assert_eq!(home_dir().expect("home"), home.path());
        });
    }

    #[rstest]
    fn empty_home_env_is_ignored() {
        temp_env::with_var(HOME_ENV, Some(""), || {
            let home = home_dir().expect("home");
            assert!(home.ends_with(DEFAULT_HOME_DIR));
        });
    }
}
