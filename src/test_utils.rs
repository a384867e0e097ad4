//! Shared test utilities for the packaging crate.

use crate::builder::descriptor::{DESCRIPTOR_FILE, Descriptor};
use crate::builder::pack_workspace;
use crate::command::CommandExecutor;
use crate::error::{PackageError, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.cast_unsigned())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program to execute (e.g., "make").
    pub cmd: &'static str,
    /// The arguments to pass to the program.
    pub args: Vec<&'static str>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results.
/// Unexpected or mismatched calls yield [`PackageError::StubMismatch`].
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    directories: RefCell<Vec<PathBuf>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            directories: RefCell::new(Vec::new()),
        }
    }

    /// Returns the working directories of every invocation so far.
    #[must_use]
    pub fn directories(&self) -> Vec<PathBuf> {
        self.directories.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str], cwd: &Path) -> Result<Output> {
        self.directories.borrow_mut().push(cwd.to_owned());
        let call = self
            .expected
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| PackageError::StubMismatch {
                message: format!("unexpected invocation: {cmd} {args:?}"),
            })?;

        if call.cmd != cmd || call.args.as_slice() != args {
            return Err(PackageError::StubMismatch {
                message: format!(
                    "expected {} {:?}, got {cmd} {args:?}",
                    call.cmd, call.args
                ),
            });
        }
        call.result
    }
}

/// Packs a `weather-1.0` container holding `files` into `dir`.
///
/// The container is built the same way as a real build, so its manifest
/// covers every file plus `METADATA`.
///
/// # Errors
///
/// Returns an error if the temporary source tree cannot be written or
/// packed.
pub fn sample_container(dir: &Path, files: &[(&str, &[u8])]) -> Result<PathBuf> {
    let tree = dir.join("sample-source");
    fs::create_dir_all(&tree)?;
    fs::write(
        tree.join(DESCRIPTOR_FILE),
        "[package]\nname = \"weather\"\nversion = \"1.0\"\n",
    )?;
    for (path, bytes) in files {
        let target = tree.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, bytes)?;
    }

    let descriptor = Descriptor::load(&tree)?;
    let artifact = pack_workspace(&tree, &descriptor)?;
    let dest = dir.join(descriptor.container_name()?.filename());
    fs::rename(&artifact, &dest)?;
    fs::remove_dir_all(&tree)?;
    Ok(dest)
}
