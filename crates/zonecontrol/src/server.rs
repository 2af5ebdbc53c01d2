//! `ZoneControlServer` builder and accept loop.
//!
//! This is the entry point for running a ZoneControl server. It ties the
//! layers together: transport → handler → game manager → matchmaker and
//! session registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use zonecontrol_session::RegistryConfig;
use zonecontrol_transport::{Transport, WebSocketConnection, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{GameManager, ServerConfig, ZoneControlError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) manager: Arc<GameManager<WebSocketConnection>>,
    pub(crate) handshake_timeout: Duration,
}

/// Builder for configuring and starting a ZoneControl server.
///
/// # Example
///
/// ```rust,no_run
/// use zonecontrol::prelude::*;
///
/// # async fn demo() -> Result<(), ZoneControlError> {
/// let server = ZoneControlServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
pub struct ZoneControlServerBuilder {
    config: ServerConfig,
}

impl ZoneControlServerBuilder {
    /// Creates a builder with [`ServerConfig::default`].
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_owned();
        self
    }

    /// Sets the session sweep timing.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.config.registry = config;
        self
    }

    /// Sets how long a new connection may take to send its hello.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server. Nothing is accepted until
    /// [`ZoneControlServer::run`].
    pub async fn build(self) -> Result<ZoneControlServer, ZoneControlError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            manager: Arc::new(GameManager::new(self.config.registry)),
            handshake_timeout: self.config.handshake_timeout,
        });

        Ok(ZoneControlServer { transport, state })
    }
}

impl Default for ZoneControlServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound ZoneControl server.
pub struct ZoneControlServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl ZoneControlServer {
    /// Creates a new builder.
    pub fn builder() -> ZoneControlServerBuilder {
        ZoneControlServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The game manager, for inspecting sessions and the queue.
    pub fn manager(&self) -> Arc<GameManager<WebSocketConnection>> {
        Arc::clone(&self.state.manager)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ZoneControlError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then notifies
    /// every connected player and stops the session sweep.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ZoneControlError>
    where
        F: Future<Output = ()>,
    {
        self.state.manager.start_sessions().await;
        tracing::info!("ZoneControl server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("ZoneControl server shutting down");
        self.state.manager.stop_sessions().await;
        self.transport.shutdown().await?;
        Ok(())
    }
}
