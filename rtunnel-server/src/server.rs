use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use rtunnel_core::tcp::{ISocketListener, SocketListener, TcpListener};
use rtunnel_core::Result;

use crate::tunnel::{serve_control_connection, ExposedPort};
use crate::ServerConfig;

#[derive(Debug)]
pub struct Server {
    config: Arc<ServerConfig>,
    server_listener: ISocketListener,
    exposed_port: Arc<ExposedPort>,
}

impl Server {
    /// binds the control listener. failing here is fatal for the process.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.control_addr()).await?;
        Ok(Self::new(config, Box::new(listener)))
    }

    pub fn new(config: ServerConfig, listener: ISocketListener) -> Self {
        let exposed_port = ExposedPort::new(config.exposed_addr(), config.grace_period());

        Self {
            config: Arc::new(config),
            server_listener: listener,
            exposed_port,
        }
    }

    pub async fn run(&mut self, shutdown_signal: impl Future) -> Result<()> {
        let cancellation_token = CancellationToken::new();
        let result = tokio::select! {
            result = self.start(cancellation_token.child_token()) => result,
            _ = shutdown_signal => {
                info!("server is being shut down.");
                Ok(())
            }
        };

        cancellation_token.cancel();
        self.exposed_port.shutdown().await;

        result
    }

    pub fn listen_ip(&self) -> Result<SocketAddr> {
        self.server_listener.listen_ip()
    }

    pub fn exposed_port(&self) -> &Arc<ExposedPort> {
        &self.exposed_port
    }

    async fn start(&self, cancellation_token: CancellationToken) -> Result<()> {
        info!(
            "listening for control connections on {}, exposing {}",
            self.listen_ip()?,
            self.config.exposed_addr()
        );

        while !cancellation_token.is_cancelled() {
            let (socket, addr) = self.server_listener.accept().await?;
            debug!("control connection from {}", addr);

            tokio::spawn(serve_control_connection(
                socket,
                addr,
                self.config.control_options(),
                self.exposed_port.clone(),
                cancellation_token.child_token(),
            ));
        }

        Ok(())
    }
}
