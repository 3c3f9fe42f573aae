use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use rtunnel_core::Result;

use crate::{ClientConfig, LocalConnector, Supervisor, TcpDialer};

/// represents main app logic.
pub struct App {
    config: Arc<ClientConfig>,
}

impl App {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// keeps the tunnel up until `shutdown_signal` resolves or the client
    /// runs out of connection attempts.
    pub async fn run(&self, shutdown_signal: impl Future) -> Result<()> {
        let connector = LocalConnector::new(&self.config.local_addr(), self.config.connect_timeout());
        let dialer = TcpDialer::new(&self.config.server_addr(), self.config.control_options(), connector);
        let supervisor = Supervisor::new(dialer, self.config.retry_policy());
        let cancellation_token = CancellationToken::new();

        info!(
            "tunneling {} through {}",
            self.config.local_addr(),
            self.config.server_addr()
        );

        tokio::select! {
            result = supervisor.run(cancellation_token.child_token()) => result?,
            _ = shutdown_signal => {
                info!("client is being shut down.");
                cancellation_token.cancel();
            }
        };

        Ok(())
    }
}
