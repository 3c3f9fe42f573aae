use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rtunnel_core::control::{ControlChannel, ControlOptions};
use rtunnel_core::mux::CloseReason;

use crate::tunnel::ExposedPort;

/// runs one control connection from handshake to close, keeping it attached
/// to the exposed port while it is alive.
pub async fn serve_control_connection(
    socket: TcpStream,
    addr: SocketAddr,
    options: ControlOptions,
    exposed_port: Arc<ExposedPort>,
    cancellation_token: CancellationToken,
) {
    let channel = match ControlChannel::accept(socket, &options).await {
        Ok(channel) => channel,
        Err(err) => {
            warn!("control connection from {} rejected: {}", addr, err);
            return;
        }
    };

    let session_id = channel.session_id();
    let generation = match exposed_port.attach(channel.multiplexer().clone()).await {
        Ok(generation) => generation,
        Err(err) => {
            error!("failed to open exposed port for session {}: {}", session_id, err);
            channel.close();
            return;
        }
    };

    let reason = tokio::select! {
        reason = channel.closed() => reason,
        _ = cancellation_token.cancelled() => {
            channel.close();
            CloseReason::ConnectionClosed
        }
    };

    info!("session {} with {} ended: {}", session_id, addr, reason);
    exposed_port.detach(generation).await;
}
