//! Daemon configuration

use crate::handler::undeliverable_reply;
use anyhow::Result;
use serde::Deserialize;
use simrelay_protocol::{ConnectParams, DatagramCodec, MAX_DATAGRAM_SIZE, Proto, StatusWordPolicy};
use std::net::SocketAddr;
use std::path::Path;

/// Daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    /// UDP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Hardware channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl DaemonConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the serving loop cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.server.max_datagram < 64 {
            anyhow::bail!(
                "server.max_datagram must be at least 64 bytes (got {})",
                self.server.max_datagram
            );
        }
        if self.server.max_datagram > 65_507 {
            anyhow::bail!(
                "server.max_datagram exceeds the UDP payload limit (got {})",
                self.server.max_datagram
            );
        }
        if let Err(e) = DatagramCodec::new(self.server.max_datagram).encode(&undeliverable_reply()) {
            anyhow::bail!(
                "server.max_datagram cannot carry the oversized-reply error ({})",
                e
            );
        }
        Ok(())
    }
}

/// UDP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Receive buffer size; larger datagrams are dropped
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,

    /// Stop serving on the first undecodable datagram
    #[serde(default)]
    pub exit_on_decode_error: bool,

    /// Honor `Exit` commands from clients
    #[serde(default)]
    pub allow_remote_exit: bool,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_datagram() -> usize {
    MAX_DATAGRAM_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_datagram: default_max_datagram(),
            exit_on_decode_error: false,
            allow_remote_exit: false,
        }
    }
}

/// Hardware channel configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Shaping of successful transmit responses
    #[serde(default)]
    pub status_word: StatusWordPolicy,

    /// Force this transport regardless of what clients ask for
    #[serde(default)]
    pub proto: Option<Proto>,

    /// Force this SIM slot
    #[serde(default)]
    pub slot: Option<u8>,

    /// Force this device node
    #[serde(default)]
    pub device: Option<String>,

    /// Maximum segment size handed to drivers (0 = driver default)
    #[serde(default)]
    pub mss: usize,
}

impl ChannelConfig {
    /// Apply the pinned values on top of a client's `Connect`
    pub fn resolve(&self, mut params: ConnectParams) -> ConnectParams {
        if let Some(proto) = self.proto {
            params.proto = proto;
        }
        if let Some(slot) = self.slot {
            params.slot = slot;
        }
        if self.device.is_some() {
            params.device = self.device.clone();
        }
        params
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Prometheus metrics bind address
    #[serde(default = "default_prometheus_bind")]
    pub prometheus_bind: SocketAddr,

    /// Enable Prometheus
    #[serde(default)]
    pub prometheus_enabled: bool,
}

fn default_prometheus_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9108))
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_bind: default_prometheus_bind(),
            prometheus_enabled: false,
        }
    }
}
