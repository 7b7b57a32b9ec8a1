//! Daemon settings read from `PORTABILITY_*` environment variables

use anyhow::{Context, Result};
use portability_core::application::RetryStrategyLibrary;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.portability/jobs.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;
const DEFAULT_GATEWAY_PORT: u16 = 8080;
const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite file path or `sqlite::memory:`
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub gateway_host: String,
    pub gateway_port: u16,
    /// Public URL of the web front-end (next/copy/error pages)
    pub base_url: String,
    /// Public URL of the gateway, used to build provider callback URLs
    pub base_api_url: String,
    pub workers: usize,
    pub poll_interval: Duration,
    pub log_format: LogFormat,
    /// Directory for a daily rolling log file in addition to stdout
    pub log_dir: Option<PathBuf>,
    pub retry_config: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: shellexpand::tilde(DEFAULT_DB_PATH).into_owned(),
            rpc_host: DEFAULT_RPC_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            gateway_host: DEFAULT_RPC_HOST.to_string(),
            gateway_port: DEFAULT_GATEWAY_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
            base_api_url: format!("http://{}:{}", DEFAULT_RPC_HOST, DEFAULT_GATEWAY_PORT),
            workers: DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            log_format: LogFormat::Pretty,
            log_dir: None,
            retry_config: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source (environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let gateway_port = parse_or(var("PORTABILITY_GATEWAY_PORT"), defaults.gateway_port)
            .context("PORTABILITY_GATEWAY_PORT")?;
        let gateway_host = var("PORTABILITY_GATEWAY_HOST").unwrap_or(defaults.gateway_host);
        let base_api_url = var("PORTABILITY_BASE_API_URL")
            .unwrap_or_else(|| format!("http://{}:{}", gateway_host, gateway_port));

        let log_format = match var("PORTABILITY_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("PORTABILITY_LOG_FORMAT must be pretty or json, got {}", other),
        };

        let workers = parse_or(var("PORTABILITY_WORKERS"), defaults.workers)
            .context("PORTABILITY_WORKERS")?;
        if workers == 0 {
            anyhow::bail!("PORTABILITY_WORKERS must be at least 1");
        }

        Ok(Self {
            db_path: var("PORTABILITY_DB_PATH")
                .map(|p| shellexpand::tilde(&p).into_owned())
                .unwrap_or(defaults.db_path),
            rpc_host: var("PORTABILITY_RPC_HOST").unwrap_or(defaults.rpc_host),
            rpc_port: parse_or(var("PORTABILITY_RPC_PORT"), defaults.rpc_port)
                .context("PORTABILITY_RPC_PORT")?,
            gateway_host,
            gateway_port,
            base_url: var("PORTABILITY_BASE_URL").unwrap_or(defaults.base_url),
            base_api_url,
            workers,
            poll_interval: Duration::from_millis(
                parse_or(var("PORTABILITY_POLL_INTERVAL_MS"), DEFAULT_POLL_INTERVAL_MS)
                    .context("PORTABILITY_POLL_INTERVAL_MS")?,
            ),
            log_format,
            log_dir: var("PORTABILITY_LOG_DIR").map(|p| expand_path(&p)),
            retry_config: var("PORTABILITY_RETRY_CONFIG").map(|p| expand_path(&p)),
        })
    }

    /// Retry library from `retry_config`, or the built-in default
    pub fn retry_library(&self) -> Result<RetryStrategyLibrary> {
        match &self.retry_config {
            None => Ok(RetryStrategyLibrary::default()),
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading retry config {}", path.display()))?;
                RetryStrategyLibrary::from_json(&json)
                    .with_context(|| format!("parsing retry config {}", path.display()))
            }
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        None => Ok(default),
        Some(v) => Ok(v.trim().parse()?),
    }
}
