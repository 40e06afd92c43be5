use std::path::PathBuf;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "platform.toml";
const ENV_PREFIX: &str = "PLATFORM_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Figment(#[from] figment::Error),
    #[error("invalid byte size {0:?}")]
    InvalidByteSize(String),
    #[error("invalid rpc endpoint list entry {0:?}")]
    InvalidRpcEndpoint(String),
}

/// One chain RPC candidate; higher `priority` is tried first, ties broken by
/// measured latency at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcEndpointConfig {
    pub url: String,
    pub priority: u32,
}

impl std::str::FromStr for RpcEndpointConfig {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        match entry.split_once('@') {
            Some((url, priority)) => {
                let priority = priority
                    .parse()
                    .map_err(|_| ConfigError::InvalidRpcEndpoint(entry.to_string()))?;
                Ok(Self {
                    url: url.to_string(),
                    priority,
                })
            }
            None => Ok(Self {
                url: entry.to_string(),
                priority: 0,
            }),
        }
    }
}

fn parse_rpc_endpoints(csv: &str) -> Result<Vec<RpcEndpointConfig>, ConfigError> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Parses a byte size with an optional `k`/`m`/`g` suffix (case-insensitive,
/// base 1024), e.g. "64k", "2m", "1g", or a bare integer.
pub fn parse_byte_size(raw: &str) -> Result<u64, ConfigError> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last() {
        Some(c) if c.eq_ignore_ascii_case(&'k') => (&raw[..raw.len() - 1], 1024),
        Some(c) if c.eq_ignore_ascii_case(&'m') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some(c) if c.eq_ignore_ascii_case(&'g') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    digits
        .trim()
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| ConfigError::InvalidByteSize(raw.to_string()))
}

/// Expands a leading `~` in `DATA_DIR` against the resolved home directory,
/// so config files and env vars can use shell-style paths even though
/// `figment` never invokes a shell.
fn expand_data_dir(path: PathBuf) -> PathBuf {
    let raw = path.to_string_lossy().into_owned();
    PathBuf::from(
        shellexpand::tilde_with_context(&raw, || dirs::home_dir().map(|p| p.to_string_lossy().into_owned()))
            .into_owned(),
    )
}

/// CLI flags and environment variables, merged over `platform.toml` and
/// built-in defaults by [`Config::load`]. Every field overrides its
/// corresponding config-file key when set.
#[derive(Parser, Clone, Debug, Serialize, Deserialize, Default)]
#[command(name = "platform", version, about = "Multi-tenant service platform")]
pub struct CliArgs {
    #[arg(long, env = "PLATFORM_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(long, env = "HOST")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[arg(long, env = "PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[arg(long, env = "DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "LOG_LEVEL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[arg(long, env = "BUS_MAX_BYTES")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_max_bytes: Option<u64>,

    #[arg(long, env = "CONFIRMATION_DEPTH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_depth: Option<u64>,

    #[arg(long, env = "POLL_INTERVAL_MS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, env = "RPC_ENDPOINTS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_endpoints: Option<String>,

    #[arg(long, env = "TXPROXY_TIMEOUT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txproxy_timeout_ms: Option<u64>,

    #[arg(long, env = "ORACLE_HTTP_ALLOWLIST")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_http_allowlist: Option<String>,

    #[arg(long, env = "ORACLE_MAX_SIZE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_max_size: Option<String>,

    #[arg(long, env = "STRICT_IDENTITY")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_identity: Option<bool>,

    #[arg(long, env = "CORS_ALLOWED_ORIGINS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_allowed_origins: Option<String>,

    #[arg(long, env = "ADMIN_BEARER_TOKEN")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_bearer_token: Option<String>,

    #[arg(long, env = "ORACLE_RUNNER_TOKENS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_token_allowlist: Option<String>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub bus_max_bytes: u64,
    pub confirmation_depth: u64,
    pub poll_interval_ms: u64,
    pub rpc_endpoints: Vec<RpcEndpointConfig>,
    pub txproxy_timeout_ms: u64,
    pub oracle_http_allowlist: Vec<String>,
    pub oracle_max_size: u64,
    pub strict_identity: bool,
    pub cors_allowed_origins: Vec<String>,
    /// `None` leaves `/admin/*` ungated, which is only appropriate for local
    /// development; production deployments must set this.
    pub admin_bearer_token: Option<String>,
    /// Tokens authorized to call the oracle's fulfillment endpoint via
    /// `X-Oracle-Runner-Token`/`Authorization: Bearer`. Empty means open,
    /// matching every other runner-token allowlist in this repo.
    pub runner_token_allowlist: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            bus_max_bytes: 1024 * 1024,
            confirmation_depth: 3,
            poll_interval_ms: 5_000,
            rpc_endpoints: Vec::new(),
            txproxy_timeout_ms: 30_000,
            oracle_http_allowlist: Vec::new(),
            oracle_max_size: 1024 * 1024,
            strict_identity: false,
            cors_allowed_origins: vec!["*".to_string()],
            admin_bearer_token: None,
            runner_token_allowlist: Vec::new(),
        }
    }
}

/// Intermediate, string-only view matching `CliArgs`' shape, used so figment
/// can merge raw strings (rpc_endpoints CSV, byte-size suffixes) before this
/// module parses them into the typed [`Config`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RawConfig {
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    log_level: Option<String>,
    bus_max_bytes: Option<u64>,
    confirmation_depth: Option<u64>,
    poll_interval_ms: Option<u64>,
    rpc_endpoints: Option<String>,
    txproxy_timeout_ms: Option<u64>,
    oracle_http_allowlist: Option<String>,
    oracle_max_size: Option<String>,
    strict_identity: Option<bool>,
    cors_allowed_origins: Option<String>,
    admin_bearer_token: Option<String>,
    runner_token_allowlist: Option<String>,
}

impl Config {
    /// Loads configuration with precedence CLI args > environment > config
    /// file > built-in defaults, mirroring the teacher's `ConfigBuilder`.
    pub fn load(cli: CliArgs) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config_path = cli
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let defaults = Config::default();
        let default_raw = RawConfig {
            host: Some(defaults.host.clone()),
            port: Some(defaults.port),
            data_dir: Some(defaults.data_dir.clone()),
            log_level: Some(defaults.log_level.clone()),
            bus_max_bytes: Some(defaults.bus_max_bytes),
            confirmation_depth: Some(defaults.confirmation_depth),
            poll_interval_ms: Some(defaults.poll_interval_ms),
            rpc_endpoints: Some(String::new()),
            txproxy_timeout_ms: Some(defaults.txproxy_timeout_ms),
            oracle_http_allowlist: Some(String::new()),
            oracle_max_size: Some(defaults.oracle_max_size.to_string()),
            strict_identity: Some(defaults.strict_identity),
            cors_allowed_origins: Some("*".to_string()),
            admin_bearer_token: None,
            runner_token_allowlist: Some(String::new()),
        };

        let raw: RawConfig = Figment::new()
            .merge(Serialized::defaults(default_raw))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(&cli))
            .extract()?;

        Ok(Config {
            host: raw.host.unwrap_or(defaults.host),
            port: raw.port.unwrap_or(defaults.port),
            data_dir: expand_data_dir(raw.data_dir.unwrap_or(defaults.data_dir)),
            log_level: raw.log_level.unwrap_or(defaults.log_level),
            bus_max_bytes: raw.bus_max_bytes.unwrap_or(defaults.bus_max_bytes),
            confirmation_depth: raw
                .confirmation_depth
                .unwrap_or(defaults.confirmation_depth),
            poll_interval_ms: raw.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            rpc_endpoints: match raw.rpc_endpoints {
                Some(ref csv) if !csv.trim().is_empty() => parse_rpc_endpoints(csv)?,
                _ => defaults.rpc_endpoints,
            },
            txproxy_timeout_ms: raw.txproxy_timeout_ms.unwrap_or(defaults.txproxy_timeout_ms),
            oracle_http_allowlist: match raw.oracle_http_allowlist {
                Some(ref csv) if !csv.trim().is_empty() => csv
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                _ => defaults.oracle_http_allowlist,
            },
            oracle_max_size: match raw.oracle_max_size {
                Some(size) => parse_byte_size(&size)?,
                None => defaults.oracle_max_size,
            },
            strict_identity: raw.strict_identity.unwrap_or(defaults.strict_identity),
            cors_allowed_origins: match raw.cors_allowed_origins {
                Some(ref csv) if !csv.trim().is_empty() => {
                    csv.split(',').map(|s| s.trim().to_string()).collect()
                }
                _ => defaults.cors_allowed_origins,
            },
            admin_bearer_token: raw.admin_bearer_token.or(defaults.admin_bearer_token),
            runner_token_allowlist: match raw.runner_token_allowlist {
                Some(ref csv) if !csv.trim().is_empty() => csv
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                _ => defaults.runner_token_allowlist,
            },
        })
    }

    /// Builds config entirely from defaults, bypassing CLI parsing. Used by
    /// tests that construct a [`Config`] without a process `argv`.
    pub fn load_from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        Self::load(cli)
    }

    /// Returns `EnvFilter` directives, falling back to `log_level` alone.
    pub fn tracing_env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.log_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let defaults = Config::default();
        assert_eq!(defaults.bus_max_bytes, 1024 * 1024);
        assert_eq!(defaults.confirmation_depth, 3);
    }

    #[test]
    fn byte_size_parses_suffixes() {
        assert_eq!(parse_byte_size("64").unwrap(), 64);
        assert_eq!(parse_byte_size("2k").unwrap(), 2048);
        assert_eq!(parse_byte_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_byte_size("1G").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn byte_size_rejects_garbage() {
        assert!(parse_byte_size("abc").is_err());
    }

    #[test]
    fn rpc_endpoints_parse_optional_priority() {
        let endpoints = parse_rpc_endpoints("https://a,https://b@5").unwrap();
        assert_eq!(endpoints[0].priority, 0);
        assert_eq!(endpoints[1].priority, 5);
    }

    #[test]
    fn data_dir_expands_leading_tilde() {
        let expanded = expand_data_dir(PathBuf::from("~/platform-data"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn data_dir_without_tilde_is_unchanged() {
        let expanded = expand_data_dir(PathBuf::from("./data"));
        assert_eq!(expanded, PathBuf::from("./data"));
    }

    #[test]
    fn runner_token_allowlist_parses_csv() {
        let cli = CliArgs {
            runner_token_allowlist: Some("tok-a, tok-b".to_string()),
            ..Default::default()
        };
        let config = Config::load(cli).unwrap();
        assert_eq!(config.runner_token_allowlist, vec!["tok-a", "tok-b"]);
    }

    #[test]
    fn cli_overrides_defaults() {
        let cli = CliArgs {
            port: Some(9999),
            strict_identity: Some(true),
            ..Default::default()
        };
        let config = Config::load(cli).unwrap();
        assert_eq!(config.port, 9999);
        assert!(config.strict_identity);
    }
}
