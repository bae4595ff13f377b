//! Configuration module - command line and environment parsing

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Application configuration. Every flag can also come from the environment.
#[derive(Clone, Debug, Parser)]
#[command(name = "space_shooter_server", version, about)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Static entry page served at `/`
    #[arg(long, env = "STATIC_PAGE", default_value = "public/index.html")]
    pub static_page: PathBuf,

    /// Allowed client origins for CORS, comma separated (any origin if unset)
    #[arg(long, env = "CLIENT_ORIGIN")]
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from the process arguments and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::args_os())
    }

    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Self::try_parse_from(args).map_err(ConfigError::Arguments)?;

        if config.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        Ok(config)
    }

    /// Server binding address
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Parsed CORS origins; empty means any origin
    pub fn allowed_origins(&self) -> Vec<String> {
        self.client_origin
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Arguments(#[from] clap::Error),

    #[error("Port 0 is not a valid listening port")]
    InvalidPort,
}
