use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use super::types::{ListenerConfig, RemoteSinkConfig};
use crate::error_handling::types::ConfigError;

/// Command-line surface of the decoy.
///
/// Mirrors the flags of the original deployment tooling: one or more
/// listening ports, a local log path, an optional remote append target, and
/// a server header override. `--config` loads the same settings from a TOML
/// file instead (the file then takes precedence over the other flags).
#[derive(Parser, Debug, Clone)]
#[command(name = "dpot")]
#[command(version)]
#[command(about = "A decoy HTTP endpoint that records and flags injection probes")]
pub struct Cli {
    /// Listening port(s); one independent listener per port.
    #[arg(short = 'p', long = "port", num_args = 1.., default_values_t = [8080u16])]
    pub ports: Vec<u16>,

    /// Local event log file (newline-delimited JSON, append-only).
    #[arg(short = 'l', long, default_value = "dpot.log")]
    pub log: PathBuf,

    /// Base URL of the remote append-blob service. Remote mirroring is
    /// enabled only when this is set.
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Container for the remote log blob.
    #[arg(long, default_value = "logs")]
    pub remote_container: String,

    /// Remote blob name. Defaults to `<hostname>.log`.
    #[arg(long)]
    pub remote_blob: Option<String>,

    /// Pre-signed credential query string for the remote target.
    #[arg(long)]
    pub remote_credential: Option<String>,

    /// Value advertised in the `Server:` response header.
    #[arg(long, default_value = "Apache/2.4.1")]
    pub server_header: String,

    /// Socket read timeout in seconds, applied to the request head and body.
    #[arg(long, default_value_t = 10)]
    pub read_timeout_secs: u64,

    /// Load configuration from a TOML file instead of the flags above.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// TOML shape of the configuration file.
#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default = "FileConfig::default_ports")]
    ports: Vec<u16>,
    #[serde(default = "FileConfig::default_log")]
    log: PathBuf,
    #[serde(default = "FileConfig::default_server_header")]
    server_header: String,
    #[serde(default = "FileConfig::default_read_timeout_secs")]
    read_timeout_secs: u64,
    remote: Option<RemoteSinkConfig>,
}

impl FileConfig {
    fn default_ports() -> Vec<u16> {
        vec![8080]
    }
    fn default_log() -> PathBuf {
        PathBuf::from("dpot.log")
    }
    fn default_server_header() -> String {
        String::from("Apache/2.4.1")
    }
    fn default_read_timeout_secs() -> u64 {
        10
    }
}

/// Resolved runtime configuration, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listeners: Vec<ListenerConfig>,
    pub log_path: PathBuf,
    pub remote: Option<RemoteSinkConfig>,
    pub read_timeout: Duration,
}

impl Config {
    /// Build the configuration from parsed command-line flags, or from the
    /// TOML file when `--config` was given.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        match &cli.config {
            Some(path) => Self::from_file(path),
            None => Self::resolve(cli),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))?;

        if file.ports.is_empty() {
            return Err(ConfigError::PortsEmpty);
        }
        Ok(Self {
            listeners: Self::listeners_for(&file.ports, &file.server_header),
            log_path: file.log,
            remote: file.remote,
            read_timeout: Duration::from_secs(file.read_timeout_secs),
        })
    }

    fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        if cli.ports.is_empty() {
            return Err(ConfigError::PortsEmpty);
        }

        let remote = match cli.remote_url {
            Some(url) => Some(RemoteSinkConfig {
                url,
                container: cli.remote_container,
                blob: cli.remote_blob.unwrap_or_else(default_blob_name),
                credential: cli.remote_credential,
            }),
            None => {
                if cli.remote_blob.is_some() || cli.remote_credential.is_some() {
                    return Err(ConfigError::RemoteIncomplete(String::from(
                        "remote blob/credential given without --remote-url",
                    )));
                }
                None
            }
        };

        Ok(Self {
            listeners: Self::listeners_for(&cli.ports, &cli.server_header),
            log_path: cli.log,
            remote,
            read_timeout: Duration::from_secs(cli.read_timeout_secs),
        })
    }

    fn listeners_for(ports: &[u16], server_header: &str) -> Vec<ListenerConfig> {
        ports
            .iter()
            .map(|&port| ListenerConfig {
                port,
                server_header: server_header.to_string(),
            })
            .collect()
    }
}

/// `<hostname>.log`, so parallel deployments mirror into distinct blobs.
fn default_blob_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("dpot"));
    format!("{}.log", host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_under_test(args: &[&str]) -> Cli {
        let mut argv = vec!["dpot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    fn defaults_match_the_deployed_tool() {
        let config = Config::from_cli(cli_under_test(&[])).unwrap();
        assert_eq!(config.listeners.len(), 1);
        assert_eq!(config.listeners[0].port, 8080);
        assert_eq!(config.listeners[0].server_header, "Apache/2.4.1");
        assert_eq!(config.log_path, PathBuf::from("dpot.log"));
        assert_eq!(config.remote, None);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn multiple_ports_yield_multiple_listeners() {
        let config =
            Config::from_cli(cli_under_test(&["-p", "8080", "8888", "9999"])).unwrap();
        let ports: Vec<_> = config.listeners.iter().map(|l| l.port).collect();
        assert_eq!(ports, [8080, 8888, 9999]);
    }

    #[test]
    fn remote_requires_url() {
        let result = Config::from_cli(cli_under_test(&["--remote-blob", "x.log"]));
        match result {
            Err(ConfigError::RemoteIncomplete(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn remote_blob_defaults_from_hostname() {
        let config = Config::from_cli(cli_under_test(&[
            "--remote-url",
            "https://logs.example.net",
        ]))
        .unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.container, "logs");
        assert!(remote.blob.ends_with(".log"));
        assert_eq!(remote.credential, None);
    }

    #[test]
    fn config_file_overrides_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dpot.toml");
        std::fs::write(
            &path,
            r#"
ports = [8081]
log = "/var/log/dpot.log"
server_header = "nginx/1.18.0"

[remote]
url = "https://logs.example.net"
container = "honeypot"
blob = "edge-1.log"
"#,
        )
        .unwrap();

        let mut cli = cli_under_test(&["-p", "1234"]);
        cli.config = Some(path);
        let config = Config::from_cli(cli).unwrap();

        assert_eq!(config.listeners.len(), 1);
        assert_eq!(config.listeners[0].port, 8081);
        assert_eq!(config.listeners[0].server_header, "nginx/1.18.0");
        assert_eq!(config.log_path, PathBuf::from("/var/log/dpot.log"));
        let remote = config.remote.unwrap();
        assert_eq!(remote.container, "honeypot");
        assert_eq!(remote.blob, "edge-1.log");
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn empty_port_list_in_file_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dpot.toml");
        std::fs::write(&path, "ports = []\n").unwrap();
        match Config::from_file(&path) {
            Err(ConfigError::PortsEmpty) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
