use std::{env, net::SocketAddr};

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub mount_path: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RPC_BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("RPC_MOUNT_PATH must start with '/'")]
    InvalidMountPath,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("RPC_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("RPC_BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(3000);
        let mount_path = env::var("RPC_MOUNT_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(normalize_mount_path)
            .transpose()?
            .unwrap_or_else(|| "/v1".to_string());

        let config = Self {
            bind_addr,
            bind_port,
            mount_path,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

/// Trailing slashes are dropped, so `/` becomes the empty root prefix.
fn normalize_mount_path(value: String) -> Result<String, ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidMountPath);
    }
    Ok(value.trim_end_matches('/').to_string())
}
