//! CLI argument definitions for `agentpack`.
//!
//! This module defines the command-line interface using clap. It is kept
//! apart from the entrypoint so the binary only orchestrates.

use agentpack::extract::Namespace;
use agentpack::trust::{Role, SubjectFields};
use camino::Utf8PathBuf;
use clap::{ArgGroup, Args, Parser, Subcommand};

/// Build, sign, verify, and install agent containers.
#[derive(Parser, Debug)]
#[command(name = "agentpack")]
#[command(version, about)]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Build a project into the configured output directory:\n",
    "    $ agentpack package ./weather\n\n",
    "  Sign as creator, attaching an execution contract:\n",
    "    $ agentpack sign --creator --contract execreqs.json weather-1.0.agent\n\n",
    "  Verify a batch of containers:\n",
    "    $ agentpack verify dist/*.agent\n\n",
    "Set AGENTPACK_HOME to relocate config.toml and the certificate store.",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Home directory holding config.toml [default: $AGENTPACK_HOME or ~/.agentpack].
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(short, long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build a source project into a container.
    Package(PackageArgs),

    /// Rebuild an installed agent from its name (not supported).
    Repackage(RepackageArgs),

    /// Attach or replace a container's config file.
    Configure(ConfigureArgs),

    /// Bundle a data directory into a container.
    AddData(AddDataArgs),

    /// Sign a container in one of the signer roles.
    Sign(SignArgs),

    /// Verify container integrity and signatures.
    Verify(VerifyArgs),

    /// Install a container into a destination directory.
    Extract(ExtractArgs),

    /// Create the root certificate of the trust store.
    CreateCa(CreateCaArgs),

    /// Issue a role certificate signed by the root.
    CreateCert(CreateCertArgs),

    /// Print the trusted public key of a remote platform.
    LookupKey(LookupKeyArgs),

    /// Record the public key of a remote platform.
    TrustHost(TrustHostArgs),
}

/// Arguments for the package command.
#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    /// Source project containing agent.toml.
    #[arg(value_name = "DIR")]
    pub source: Utf8PathBuf,

    /// Directory receiving the container [default: from config].
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<Utf8PathBuf>,
}

/// Arguments for the repackage command.
#[derive(Args, Debug, Clone)]
pub struct RepackageArgs {
    /// Name of the installed agent.
    #[arg(value_name = "NAME")]
    pub name: String,
}

/// Arguments for the configure command.
#[derive(Args, Debug, Clone)]
pub struct ConfigureArgs {
    /// Container to modify.
    #[arg(value_name = "CONTAINER")]
    pub container: Utf8PathBuf,

    /// Config file to attach.
    #[arg(value_name = "FILE")]
    pub config: Utf8PathBuf,
}

/// Arguments for the add-data command.
#[derive(Args, Debug, Clone)]
pub struct AddDataArgs {
    /// Container to modify.
    #[arg(value_name = "CONTAINER")]
    pub container: Utf8PathBuf,

    /// Directory to bundle.
    #[arg(value_name = "DIR")]
    pub data_dir: Utf8PathBuf,
}

/// Mutually exclusive signer role flags.
#[derive(Args, Debug, Clone, Default)]
#[command(group(ArgGroup::new("role").required(true).args(["creator", "initiator", "soi"])))]
pub struct RoleArgs {
    /// Act as the creator of the agent.
    #[arg(long)]
    pub creator: bool,

    /// Act as the initiator deploying the agent.
    #[arg(long)]
    pub initiator: bool,

    /// Act as the platform security officer.
    #[arg(long)]
    pub soi: bool,
}

impl RoleArgs {
    /// Return the selected role.
    #[must_use]
    pub const fn role(&self) -> Role {
        if self.creator {
            Role::Creator
        } else if self.initiator {
            Role::Initiator
        } else {
            Role::Soi
        }
    }
}

/// Arguments for the sign command.
#[derive(Args, Debug, Clone)]
pub struct SignArgs {
    /// Signer role.
    #[command(flatten)]
    pub role: RoleArgs,

    /// Certificate name in the store [default: the role name].
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Config file to attach before signing.
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<Utf8PathBuf>,

    /// Execution contract to attach before signing.
    #[arg(long, value_name = "FILE")]
    pub contract: Option<Utf8PathBuf>,

    /// Container to sign.
    #[arg(value_name = "CONTAINER")]
    pub container: Utf8PathBuf,
}

/// Arguments for the verify command.
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Accept containers that carry no signatures.
    #[arg(long)]
    pub allow_unsigned: bool,

    /// Containers to verify.
    #[arg(value_name = "CONTAINER", required = true)]
    pub containers: Vec<Utf8PathBuf>,
}

/// Arguments for the extract command.
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Container to install.
    #[arg(value_name = "CONTAINER")]
    pub container: Utf8PathBuf,

    /// Destination directory.
    #[arg(value_name = "DEST")]
    pub dest: Utf8PathBuf,

    /// Install under a namespace directory; a UUID is generated when no ID
    /// is given.
    #[arg(long, value_name = "ID", num_args = 0..=1)]
    pub namespace: Option<Option<String>>,
}

impl ExtractArgs {
    /// Return the namespace selected by `--namespace`.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        match &self.namespace {
            None => Namespace::Flat,
            Some(None) => Namespace::Generated,
            Some(Some(id)) => Namespace::Named(id.clone()),
        }
    }
}

/// Certificate subject flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SubjectArgs {
    /// Country (C).
    #[arg(long, value_name = "CODE")]
    pub country: Option<String>,

    /// State or province (ST).
    #[arg(long, value_name = "NAME")]
    pub state: Option<String>,

    /// Locality (L).
    #[arg(long, value_name = "NAME")]
    pub locality: Option<String>,

    /// Organization (O).
    #[arg(long, value_name = "NAME")]
    pub organization: Option<String>,

    /// Organizational unit (OU).
    #[arg(long, value_name = "NAME")]
    pub unit: Option<String>,

    /// Common name (CN).
    #[arg(long, value_name = "NAME")]
    pub common_name: Option<String>,
}

impl SubjectArgs {
    /// Build subject fields, filling gaps from the defaults and
    /// `default_common_name`.
    #[must_use]
    pub fn subject(&self, default_common_name: &str) -> SubjectFields {
        let defaults = SubjectFields::with_common_name(default_common_name);
        let pick = |value: Option<&String>, fallback: String| value.cloned().unwrap_or(fallback);
        SubjectFields {
            country: pick(self.country.as_ref(), defaults.country),
            state: pick(self.state.as_ref(), defaults.state),
            locality: pick(self.locality.as_ref(), defaults.locality),
            organization: pick(self.organization.as_ref(), defaults.organization),
            organizational_unit: pick(self.unit.as_ref(), defaults.organizational_unit),
            common_name: pick(self.common_name.as_ref(), defaults.common_name),
        }
    }
}

/// Arguments for the create-ca command.
#[derive(Args, Debug, Clone)]
pub struct CreateCaArgs {
    /// Replace an existing root without prompting.
    #[arg(long)]
    pub yes: bool,

    /// Root subject.
    #[command(flatten)]
    pub subject: SubjectArgs,
}

/// Arguments for the create-cert command.
#[derive(Args, Debug, Clone)]
pub struct CreateCertArgs {
    /// Certificate role.
    #[command(flatten)]
    pub role: RoleArgs,

    /// Store name [default: the role name].
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Certificate subject.
    #[command(flatten)]
    pub subject: SubjectArgs,
}

/// Arguments for the lookup-key command.
#[derive(Args, Debug, Clone)]
pub struct LookupKeyArgs {
    /// Identifier of the remote platform.
    #[arg(value_name = "REMOTE_ID")]
    pub remote_id: String,

    /// Hex key used when the platform is not in known hosts [default: from config].
    #[arg(long, value_name = "KEY")]
    pub fallback: Option<String>,
}

/// Arguments for the trust-host command.
#[derive(Args, Debug, Clone)]
pub struct TrustHostArgs {
    /// Identifier of the remote platform.
    #[arg(value_name = "REMOTE_ID")]
    pub remote_id: String,

    /// Hex-encoded Ed25519 public key.
    #[arg(value_name = "KEY")]
    pub key: String,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
