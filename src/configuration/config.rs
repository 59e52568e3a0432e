use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::{debug, info};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_ENGINE_PORT: u16 = 2376;
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TERMINAL_INIT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TERMINAL_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LOG_TAIL: u32 = 250;
pub const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_CERTS_DIR: &str = "temp_certs";

/// Runtime configuration of the server.
///
/// Built from three layers: explicit command-line flags or `DAAS_*`
/// environment variables, then the optional TOML file named by `--config`,
/// then the defaults below.
///
/// # Fields Overview
///
/// - `bind_address` / `port`: where the HTTP and WebSocket server listens
/// - `certs_dir`: parent of every per-session certificate bundle directory
/// - `engine_port`: port appended to a bare host address when deriving the engine endpoint
/// - `engine_timeout`: uniform I/O timeout of every remote engine connection
/// - `terminal_init_timeout`: wait for the terminal initiation message
/// - `terminal_idle_timeout`: inactivity threshold of a proxied terminal
/// - `log_tail`: historical lines sent at the start of a log stream
/// - `allowed_origins`: CORS origins, empty meaning any
/// - `ssh`: credentials of the standalone SSH terminal mode
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    pub certs_dir: PathBuf,
    pub engine_port: u16,
    pub engine_timeout: Duration,
    pub terminal_init_timeout: Duration,
    pub terminal_idle_timeout: Duration,
    pub log_tail: u32,
    pub allowed_origins: Vec<String>,
    pub ssh: Option<SshDefaults>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            certs_dir: PathBuf::from(DEFAULT_CERTS_DIR),
            engine_port: DEFAULT_ENGINE_PORT,
            engine_timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            terminal_init_timeout: Duration::from_secs(DEFAULT_TERMINAL_INIT_TIMEOUT_SECS),
            terminal_idle_timeout: Duration::from_secs(DEFAULT_TERMINAL_IDLE_TIMEOUT_SECS),
            log_tail: DEFAULT_LOG_TAIL,
            allowed_origins: Vec::new(),
            ssh: None,
        }
    }
}

impl Config {
    /// Parses the process arguments and environment, then resolves them.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolves already parsed arguments against the optional file and defaults.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        let certs_dir = match args.certs_dir.or(file.certs_dir) {
            Some(dir) => dir,
            None => std::env::current_dir()?.join(DEFAULT_CERTS_DIR),
        };

        let ssh = match (
            args.ssh_host.or(file.ssh_host),
            args.ssh_user.or(file.ssh_user),
            args.ssh_password.or(file.ssh_password),
        ) {
            (Some(host), Some(user), Some(password)) => Some(SshDefaults {
                host,
                port: args.ssh_port.or(file.ssh_port).unwrap_or(DEFAULT_SSH_PORT),
                user,
                password,
            }),
            _ => None,
        };

        let config = Config {
            bind_address: args
                .bind_address
                .or(file.bind_address)
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            certs_dir,
            engine_port: args
                .engine_port
                .or(file.engine_port)
                .unwrap_or(DEFAULT_ENGINE_PORT),
            engine_timeout: Duration::from_secs(
                args.engine_timeout_secs
                    .or(file.engine_timeout_secs)
                    .unwrap_or(DEFAULT_ENGINE_TIMEOUT_SECS),
            ),
            terminal_init_timeout: Duration::from_secs(
                args.terminal_init_timeout_secs
                    .or(file.terminal_init_timeout_secs)
                    .unwrap_or(DEFAULT_TERMINAL_INIT_TIMEOUT_SECS),
            ),
            terminal_idle_timeout: Duration::from_secs(
                args.terminal_idle_timeout_secs
                    .or(file.terminal_idle_timeout_secs)
                    .unwrap_or(DEFAULT_TERMINAL_IDLE_TIMEOUT_SECS),
            ),
            log_tail: args.log_tail.or(file.log_tail).unwrap_or(DEFAULT_LOG_TAIL),
            allowed_origins: args
                .allowed_origins
                .or(file.allowed_origins)
                .unwrap_or_default(),
            ssh,
        };

        config.validate()?;
        info!(
            "Configuration resolved: listening on {}:{}, bundles under {}",
            config.bind_address,
            config.port,
            config.certs_dir.display()
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero".to_string()));
        }
        if self.engine_port == 0 {
            return Err(ConfigError::InvalidValue(
                "engine_port must be non-zero".to_string(),
            ));
        }
        for (name, value) in [
            ("engine_timeout_secs", self.engine_timeout),
            ("terminal_init_timeout_secs", self.terminal_init_timeout),
            ("terminal_idle_timeout_secs", self.terminal_idle_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{} must be non-zero", name)));
            }
        }
        if let Some(origin) = self.allowed_origins.iter().find(|o| !is_origin(o)) {
            return Err(ConfigError::InvalidValue(format!(
                "allowed origin {} is not scheme://host[:port]",
                origin
            )));
        }
        fs::create_dir_all(&self.certs_dir).map_err(|e| {
            ConfigError::DirectoryUnavailable(format!("{}: {}", self.certs_dir.display(), e))
        })?;
        Ok(())
    }
}

fn is_origin(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(authority) => {
            !authority.is_empty() && !authority.contains(['/', '?', '#', ' ', '@'])
        }
        None => false,
    }
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration file {}", path.display());
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn args_with(dir: &TempDir, extra: &[&str]) -> CliArgs {
        let certs = dir.path().join("certs");
        let mut argv = vec![
            "daas".to_string(),
            "--certs-dir".to_string(),
            certs.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        CliArgs::try_parse_from(argv).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    #[serial]
    fn test_defaults_apply_when_nothing_is_set() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_args(args_with(&dir, &[])).unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.engine_port, 2376);
        assert_eq!(config.engine_timeout, Duration::from_secs(10));
        assert_eq!(config.terminal_idle_timeout, Duration::from_secs(300));
        assert_eq!(config.log_tail, 250);
        assert!(config.allowed_origins.is_empty());
        assert!(config.ssh.is_none());
        assert!(dir.path().join("certs").is_dir());
    }

    #[test]
    #[serial]
    fn test_cli_wins_over_file() {
        let dir = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port = 7000").unwrap();
        writeln!(file, "log_tail = 10").unwrap();
        writeln!(file, "allowed_origins = [\"http://localhost:3000\"]").unwrap();

        let path = file.path().display().to_string();
        let config =
            Config::from_args(args_with(&dir, &["--config", &path, "--port", "8080"])).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_tail, 10);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    #[serial]
    fn test_ssh_defaults_need_host_user_and_password() {
        let dir = TempDir::new().unwrap();
        let partial =
            Config::from_args(args_with(&dir, &["--ssh-host", "10.0.0.5", "--ssh-user", "ops"]))
                .unwrap();
        assert!(partial.ssh.is_none());

        let full = Config::from_args(args_with(
            &dir,
            &[
                "--ssh-host",
                "10.0.0.5",
                "--ssh-user",
                "ops",
                "--ssh-password",
                "secret",
            ],
        ))
        .unwrap();
        let ssh = full.ssh.unwrap();
        assert_eq!(ssh.port, 22);
        assert!(!format!("{:?}", ssh).contains("secret"));
    }

    #[test]
    #[serial]
    fn test_zero_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_args(args_with(&dir, &["--terminal-idle-timeout-secs", "0"]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    #[serial]
    fn test_origin_with_path_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ok = Config::from_args(args_with(
            &dir,
            &["--allowed-origins", "http://localhost:3000,https://ops.example.com"],
        ))
        .unwrap();
        assert_eq!(ok.allowed_origins.len(), 2);

        let bad = Config::from_args(args_with(
            &dir,
            &["--allowed-origins", "http://localhost:3000/app"],
        ));
        assert!(matches!(bad, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    #[serial]
    fn test_unknown_file_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "web_ui_port = 1").unwrap();
        let path = file.path().display().to_string();

        let result = Config::from_args(args_with(&dir, &["--config", &path]));
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    #[serial]
    fn test_environment_variable_is_read() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("DAAS_ENGINE_PORT", "2375");
        let parsed = args_with(&dir, &[]);
        std::env::remove_var("DAAS_ENGINE_PORT");

        assert_eq!(parsed.engine_port, Some(2375));
    }
}
