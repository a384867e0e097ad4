//! Subcommand handlers.
//!
//! Each handler writes the path it produced (or the key it resolved) to the
//! console's output stream. Prompts go to the error stream.

use crate::cli::{
    AddDataArgs, Cli, Command, ConfigureArgs, CreateCaArgs, CreateCertArgs, ExtractArgs,
    LookupKeyArgs, PackageArgs, SignArgs, TrustHostArgs, VerifyArgs,
};
use crate::error::{CliError, Result};
use agentpack::builder::{self, DefaultToolchain, PackageBuilder};
use agentpack::command::SystemCommandExecutor;
use agentpack::config::{self, PackagerConfig};
use agentpack::container::Container;
use agentpack::extract::extract;
use agentpack::inject::{self, SideFiles};
use agentpack::sign::sign;
use agentpack::trust::certificate::decode_verifying_key;
use agentpack::trust::store::ROOT_NAME;
use agentpack::trust::{Overwrite, StoreState, TrustStore};
use agentpack::verify::{VerificationPolicy, verify_all};
use camino::Utf8PathBuf;
use log::debug;
use std::io::{BufRead, Write};
use std::path::Path;

/// Common name given to a root created without `--common-name`.
pub const DEFAULT_ROOT_COMMON_NAME: &str = "agentpack root";

/// The streams a command talks to.
pub struct Console<'a> {
    /// Results.
    pub out: &'a mut dyn Write,
    /// Prompts.
    pub err: &'a mut dyn Write,
    /// Confirmation answers.
    pub input: &'a mut dyn BufRead,
}

/// Dispatch `cli` to its handler.
///
/// # Errors
///
/// Returns the handler's error, or [`CliError::Package`] if the
/// configuration cannot be loaded.
pub fn run(cli: &Cli, console: &mut Console<'_>) -> Result<()> {
    let config = load_config(cli.home.as_ref())?;
    match &cli.command {
        Command::Package(args) => package(&config, args, console),
        Command::Repackage(args) => {
            let path = builder::repackage(&args.name)?;
            print_path(console, &path)
        }
        Command::Configure(args) => configure(args, console),
        Command::AddData(args) => add_data(args, console),
        Command::Sign(args) => sign_container(&config, args, console),
        Command::Verify(args) => verify_containers(&config, args, console),
        Command::Extract(args) => extract_container(args, console),
        Command::CreateCa(args) => create_ca(&config, args, console),
        Command::CreateCert(args) => create_cert(&config, args, console),
        Command::LookupKey(args) => lookup_key(&config, args, console),
        Command::TrustHost(args) => trust_host(&config, args, console),
    }
}

fn load_config(requested: Option<&Utf8PathBuf>) -> Result<PackagerConfig> {
    let home = match requested {
        Some(dir) => dir.clone().into_std_path_buf(),
        None => config::home_dir()?,
    };
    let config = PackagerConfig::load_from(&home)?;
    debug!("using home directory {}", config.home().display());
    Ok(config)
}

fn open_store(config: &PackagerConfig) -> Result<TrustStore> {
    Ok(TrustStore::open(config.trust_store_dir())?)
}

fn package(config: &PackagerConfig, args: &PackageArgs, console: &mut Console<'_>) -> Result<()> {
    let executor = SystemCommandExecutor;
    let toolchain = DefaultToolchain::new(&executor);
    let output = args
        .output
        .as_ref()
        .map_or_else(|| config.output_dir(), |dir| dir.clone().into_std_path_buf());
    let path = PackageBuilder::new(config.build_root(), &toolchain)
        .with_attempts(config.build_attempts())
        .build(args.source.as_std_path(), &output)?;
    print_path(console, &path)
}

fn configure(args: &ConfigureArgs, console: &mut Console<'_>) -> Result<()> {
    let container = Container::open(args.container.as_std_path())?;
    inject::attach(
        &container,
        &SideFiles {
            config: Some(args.config.clone().into_std_path_buf()),
            contract: None,
        },
    )?;
    print_path(console, container.path())
}

fn add_data(args: &AddDataArgs, console: &mut Console<'_>) -> Result<()> {
    let container = Container::open(args.container.as_std_path())?;
    inject::add_bundled_data(&container, args.data_dir.as_std_path())?;
    print_path(console, container.path())
}

fn sign_container(config: &PackagerConfig, args: &SignArgs, console: &mut Console<'_>) -> Result<()> {
    let store = open_store(config)?;
    let container = Container::open(args.container.as_std_path())?;
    let side_files = SideFiles {
        config: args.config_file.clone().map(Utf8PathBuf::into_std_path_buf),
        contract: args.contract.clone().map(Utf8PathBuf::into_std_path_buf),
    };
    let entry = sign(
        &container,
        &store,
        args.role.role(),
        args.name.as_deref(),
        &side_files,
    )?;
    debug!("embedded {entry}");
    print_path(console, container.path())
}

fn verify_containers(
    config: &PackagerConfig,
    args: &VerifyArgs,
    console: &mut Console<'_>,
) -> Result<()> {
    let store = open_store(config)?;
    let policy = if args.allow_unsigned {
        VerificationPolicy::allow_unsigned()
    } else {
        config.verification_policy()
    };
    debug!("verifying with policy: {policy}");

    let results = verify_all(&args.containers, &store, policy);
    let mut invalid = 0;
    for result in &results {
        let path = result.container.display();
        match &result.failure {
            None => writeln!(
                console.out,
                "{path}: valid ({} signatures)",
                result.signatures
            )?,
            Some(reason) => {
                invalid += 1;
                writeln!(console.out, "{path}: invalid: {reason}")?;
            }
        }
    }
    if invalid > 0 {
        return Err(CliError::VerificationFailed {
            invalid,
            total: results.len(),
        });
    }
    Ok(())
}

fn extract_container(args: &ExtractArgs, console: &mut Console<'_>) -> Result<()> {
    let container = Container::open(args.container.as_std_path())?;
    let installation = extract(&container, args.dest.as_std_path(), &args.namespace())?;
    print_path(console, &installation.path)
}

fn create_ca(config: &PackagerConfig, args: &CreateCaArgs, console: &mut Console<'_>) -> Result<()> {
    let store = open_store(config)?;
    let overwrite = match store.state() {
        StoreState::Uninitialized => Overwrite::Refuse,
        StoreState::RootReady => {
            if !args.yes && !confirm_root_replacement(console)? {
                return Err(CliError::Aborted);
            }
            Overwrite::Confirmed
        }
    };
    store.create_root(args.subject.subject(DEFAULT_ROOT_COMMON_NAME), overwrite)?;
    print_path(console, &store.certificate_path(ROOT_NAME))
}

fn confirm_root_replacement(console: &mut Console<'_>) -> Result<bool> {
    write!(
        console.err,
        "A root certificate already exists. Replacing it invalidates every signature it issued.\nType 'yes' to replace it: "
    )?;
    console.err.flush()?;
    let mut answer = String::new();
    console.input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn create_cert(
    config: &PackagerConfig,
    args: &CreateCertArgs,
    console: &mut Console<'_>,
) -> Result<()> {
    let store = open_store(config)?;
    let role = args.role.role();
    let common_name = args.name.as_deref().unwrap_or(role.as_str());
    let identity = store.issue_role_cert(role, args.name.as_deref(), args.subject.subject(common_name))?;
    print_path(console, &store.certificate_path(&identity.name))
}

fn lookup_key(config: &PackagerConfig, args: &LookupKeyArgs, console: &mut Console<'_>) -> Result<()> {
    let store = open_store(config)?;
    let fallback = args.fallback.as_deref().or(config.server_key.as_deref());
    let key = store
        .resolve_server_key(&args.remote_id, fallback)?
        .ok_or_else(|| CliError::UnknownHost {
            remote_id: args.remote_id.clone(),
        })?;
    writeln!(console.out, "{}", hex::encode(key.as_bytes()))?;
    Ok(())
}

fn trust_host(config: &PackagerConfig, args: &TrustHostArgs, console: &mut Console<'_>) -> Result<()> {
    let store = open_store(config)?;
    let key = decode_verifying_key(&args.key, &args.remote_id)?;
    store.add_known_host(&args.remote_id, &key)?;
    print_path(console, store.known_hosts().path())
}

fn print_path(console: &mut Console<'_>, path: &Path) -> Result<()> {
    writeln!(console.out, "{}", path.display())?;
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
