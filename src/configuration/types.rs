use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line and environment surface of the server.
///
/// Every field is optional so that unset values fall through to the TOML
/// file given with `--config`, then to the built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "daas")]
#[command(version)]
#[command(about = "Session-scoped Docker host dashboard backend")]
pub struct CliArgs {
    /// TOML file supplying any of the options below
    #[arg(long, env = "DAAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[arg(long, env = "DAAS_BIND_ADDRESS")]
    pub bind_address: Option<IpAddr>,

    /// Port the HTTP server listens on
    #[arg(long, env = "DAAS_PORT")]
    pub port: Option<u16>,

    /// Working directory holding per-session certificate bundles
    #[arg(long, env = "DAAS_CERTS_DIR")]
    pub certs_dir: Option<PathBuf>,

    /// Port of the remote Docker engine API
    #[arg(long, env = "DAAS_ENGINE_PORT")]
    pub engine_port: Option<u16>,

    /// I/O timeout applied to every remote engine connection
    #[arg(long, env = "DAAS_ENGINE_TIMEOUT_SECS")]
    pub engine_timeout_secs: Option<u64>,

    /// How long a terminal socket may stay silent before sending its parameters
    #[arg(long, env = "DAAS_TERMINAL_INIT_TIMEOUT_SECS")]
    pub terminal_init_timeout_secs: Option<u64>,

    /// Inactivity threshold after which a terminal is closed
    #[arg(long, env = "DAAS_TERMINAL_IDLE_TIMEOUT_SECS")]
    pub terminal_idle_timeout_secs: Option<u64>,

    /// Number of historical log lines sent before following
    #[arg(long, env = "DAAS_LOG_TAIL")]
    pub log_tail: Option<u32>,

    /// Origins allowed by CORS, comma separated; any origin when unset
    #[arg(long, env = "DAAS_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Option<Vec<String>>,

    #[arg(long, env = "DAAS_SSH_HOST")]
    pub ssh_host: Option<String>,

    #[arg(long, env = "DAAS_SSH_PORT")]
    pub ssh_port: Option<u16>,

    #[arg(long, env = "DAAS_SSH_USER")]
    pub ssh_user: Option<String>,

    #[arg(long, env = "DAAS_SSH_PASSWORD", hide_env_values = true)]
    pub ssh_password: Option<String>,
}

/// Same keys as [`CliArgs`], read from a TOML file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_address: Option<IpAddr>,
    pub port: Option<u16>,
    pub certs_dir: Option<PathBuf>,
    pub engine_port: Option<u16>,
    pub engine_timeout_secs: Option<u64>,
    pub terminal_init_timeout_secs: Option<u64>,
    pub terminal_idle_timeout_secs: Option<u64>,
    pub log_tail: Option<u32>,
    pub allowed_origins: Option<Vec<String>>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_user: Option<String>,
    pub ssh_password: Option<String>,
}

/// Credentials for the standalone SSH terminal mode. Only present when host,
/// user and password are all configured.
#[derive(Clone, PartialEq)]
pub struct SshDefaults {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for SshDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshDefaults")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
