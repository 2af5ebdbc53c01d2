//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zonecontrol_session::RegistryConfig;

/// Everything [`ZoneControlServer`](crate::ZoneControlServer) needs to
/// start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to. Default: `127.0.0.1:8080`.
    pub bind_addr: String,

    /// Session sweep timing.
    pub registry: RegistryConfig,

    /// How long a new connection has to send its first frame before it is
    /// dropped. Default: 10 seconds.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            registry: RegistryConfig::default(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}
