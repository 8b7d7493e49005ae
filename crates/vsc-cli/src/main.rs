//! `vsc` - command line front end for the VSC Core HTTP API

use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vsc_api_client::{CredentialMode, JobStopOptions, ListFormat, VscApiClient, VscClientConfig};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "vsc", version, about = "VSC Core HTTP API client")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

/// Connection flags. Each flag given on the command line overrides the
/// matching `VSC_*` environment variable.
#[derive(Debug, Args)]
struct ConnectionArgs {
    /// API hostname, IP address or SRV service name [env: VSC_HOSTNAME]
    #[arg(long = "host", global = true)]
    hostname: Option<String>,

    /// Explicit TCP port [env: VSC_PORT]
    #[arg(long, global = true)]
    port: Option<u16>,

    /// [env: VSC_USERNAME]
    #[arg(short, long = "user", global = true)]
    username: Option<String>,

    /// [env: VSC_PASSWORD]
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Use plain HTTP instead of HTTPS [env: VSC_USE_TLS=false]
    #[arg(long, global = true)]
    insecure: bool,

    /// Request timeout in seconds [env: VSC_TIMEOUT_SECS]
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Send credentials as X-VSC-Username/X-VSC-Password headers
    /// [env: VSC_CREDENTIAL_MODE=plain_headers]
    #[arg(long, global = true)]
    plain_auth_headers: bool,
}

impl ConnectionArgs {
    fn to_config(&self) -> anyhow::Result<VscClientConfig> {
        let config = VscClientConfig::from_env().context("invalid VSC_* environment")?;
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: VscClientConfig) -> VscClientConfig {
        if let Some(hostname) = &self.hostname {
            config.hostname = hostname.clone();
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if self.username.is_some() {
            config.username = self.username.clone();
        }
        if self.password.is_some() {
            config.password = self.password.clone();
        }
        if self.insecure {
            config = config.with_tls(false);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        if self.plain_auth_headers {
            config = config.with_credential_mode(CredentialMode::PlainHeaders);
        }
        config
    }
}

/// Output format of `vsc jobs`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum JobsFormat {
    Basic,
    Full,
    #[value(name = "ids_only")]
    IdsOnly,
}

impl From<JobsFormat> for ListFormat {
    fn from(format: JobsFormat) -> Self {
        match format {
            JobsFormat::Basic => ListFormat::Basic,
            JobsFormat::Full => ListFormat::Full,
            JobsFormat::IdsOnly => ListFormat::IdsOnly,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the UUID of the authenticated user
    Whoami,
    /// List users
    Users {
        #[arg(long)]
        full: bool,
    },
    /// Show one user
    User { user_id: String },
    /// List roles
    Roles {
        #[arg(long)]
        full: bool,
    },
    /// Show one role
    Role { role_id: String },
    /// List jobs
    Jobs {
        #[arg(long, value_enum, default_value_t = JobsFormat::Basic)]
        format: JobsFormat,
        /// List stopped jobs instead of active ones
        #[arg(long)]
        historic: bool,
        /// List jobs of all users
        #[arg(long)]
        all: bool,
        /// Restrict --all to jobs of this user
        #[arg(long, requires = "all")]
        owner: Option<String>,
    },
    /// Show one job
    Job {
        job_id: String,
        #[arg(long)]
        full: bool,
    },
    /// Stop a job
    JobStop {
        job_id: String,
        /// Save the cluster
        #[arg(long)]
        save: bool,
        /// Description of the saved cluster
        #[arg(long)]
        description: Option<String>,
        /// Save the cluster's home FS
        #[arg(long)]
        save_homefs: bool,
        /// Force stop a stalled job
        #[arg(long)]
        force: bool,
    },
    /// Show the connection forwarding map of a job
    Forwards { job_id: String },
    /// List packages of the current user
    Packages {
        #[arg(long)]
        ids_only: bool,
    },
    /// List images of the current user
    Images {
        #[arg(long)]
        ids_only: bool,
    },
    /// Generate a download URL for an image
    ImageUrl { image_id: String },
    /// List image receiver base URLs
    ImageReceivers,
}

fn full_or(full: bool, otherwise: ListFormat) -> ListFormat {
    if full { ListFormat::Full } else { otherwise }
}

fn run(client: &VscApiClient, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::Whoami => Value::String(client.whoami()?),
        Command::Users { full } => client.aaa_list_users(full_or(full, ListFormat::IdsOnly))?,
        Command::User { user_id } => client.aaa_get_user_data(&user_id)?,
        Command::Roles { full } => client.aaa_list_roles(full_or(full, ListFormat::IdsOnly))?,
        Command::Role { role_id } => client.aaa_get_role_data(&role_id)?,
        Command::Jobs {
            format,
            historic,
            all,
            owner,
        } => {
            let format = ListFormat::from(format);
            if all {
                client.job_list_all(format, historic, owner.as_deref())?
            } else {
                client.job_list(format, historic)?
            }
        }
        Command::Job { job_id, full } => {
            client.job_get_data(&job_id, full_or(full, ListFormat::Basic))?
        }
        Command::JobStop {
            job_id,
            save,
            description,
            save_homefs,
            force,
        } => {
            let options = JobStopOptions {
                save,
                saved_description: description,
                save_homefs,
                force,
            };
            client.job_stop(&job_id, &options)?;
            Value::Null
        }
        Command::Forwards { job_id } => serde_json::to_value(client.job_get_forward_map(&job_id)?)?,
        Command::Packages { ids_only } => {
            client.package_list(if ids_only { ListFormat::IdsOnly } else { ListFormat::Full })?
        }
        Command::Images { ids_only } => {
            client.image_list(if ids_only { ListFormat::IdsOnly } else { ListFormat::Full })?
        }
        Command::ImageUrl { image_id } => Value::String(client.image_generate_url(&image_id)?),
        Command::ImageReceivers => serde_json::to_value(client.image_receiver_base_urls()?)?,
    };
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.connection.to_config()?;
    let hostname = config.hostname.clone();
    debug!("Connecting to {}", hostname);

    let client = VscApiClient::new(config)
        .with_context(|| format!("cannot reach VSC API at {hostname}"))?;
    let value = run(&client, cli.command)?;
    if !value.is_null() {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
