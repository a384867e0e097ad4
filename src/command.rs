//! External command execution.
//!
//! Package builds run the descriptor's build command through
//! [`CommandExecutor`] so tests can substitute a stub for the host shell.

use crate::error::Result;
use std::path::Path;
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs `cmd` with `args` in `cwd` and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use agentpack::command::{CommandExecutor, SystemCommandExecutor};
    /// use std::path::Path;
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("make", &["bundle"], Path::new("."))?;
    /// assert!(output.status.success());
    /// # Ok::<(), agentpack::error::PackageError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str], cwd: &Path) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str], cwd: &Path) -> Result<Output> {
        Ok(Command::new(cmd).args(args).current_dir(cwd).output()?)
    }
}
