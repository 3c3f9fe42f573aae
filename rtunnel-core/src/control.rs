use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::auth::{self, HandshakeError};
use crate::mux::{CloseReason, IncomingStreams, LogicalStream, Multiplexer, MuxConfig, MuxError, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub secret: Option<String>,
    pub auth_timeout: Duration,
    pub connect_timeout: Duration,
    pub mux: MuxConfig,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            secret: None,
            auth_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            mux: MuxConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// one authenticated control connection and the multiplexer running on it.
pub struct ControlChannel {
    session_id: Uuid,
    peer_addr: SocketAddr,
    multiplexer: Arc<Multiplexer>,
    incoming: Option<IncomingStreams>,
}

impl ControlChannel {
    /// server side: authenticates an accepted connection and activates it.
    /// a rejected peer has already been told so when this returns.
    pub async fn accept(mut stream: TcpStream, options: &ControlOptions) -> Result<Self, ControlError> {
        let session_id = Uuid::new_v4();
        let peer_addr = configure_socket(&stream)?;

        let initial = match &options.secret {
            Some(secret) => {
                log_state(session_id, ChannelState::Authenticating);
                auth::authenticate(&mut stream, secret, options.auth_timeout)
                    .await
                    .map_err(|err| {
                        log_state(session_id, ChannelState::Closed);
                        err
                    })?
            }
            None => BytesMut::new(),
        };

        Ok(Self::activate(session_id, peer_addr, stream, initial, Side::Server, &options.mux))
    }

    /// client side: dials the server, sends the secret and activates the
    /// connection without waiting for an answer.
    pub async fn connect<A>(addr: A, options: &ControlOptions) -> Result<Self, ControlError>
    where
        A: ToSocketAddrs + ToString,
    {
        let session_id = Uuid::new_v4();
        log_state(session_id, ChannelState::Connecting);

        let mut stream = match tokio::time::timeout(options.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ControlError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => return Err(ControlError::ConnectTimeout(addr.to_string())),
        };

        let peer_addr = configure_socket(&stream)?;

        if let Some(secret) = &options.secret {
            log_state(session_id, ChannelState::Authenticating);
            auth::write_auth_line(&mut stream, secret).await?;
        }

        Ok(Self::activate(session_id, peer_addr, stream, BytesMut::new(), Side::Client, &options.mux))
    }

    fn activate(
        session_id: Uuid,
        peer_addr: SocketAddr,
        stream: TcpStream,
        initial: BytesMut,
        side: Side,
        config: &MuxConfig,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        let (multiplexer, incoming) = Multiplexer::start(reader, writer, initial, side, config.clone());

        info!("session {} with {} is active", session_id, peer_addr);
        Self {
            session_id,
            peer_addr,
            multiplexer,
            incoming: Some(incoming),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn side(&self) -> Side {
        self.multiplexer.side()
    }

    pub fn state(&self) -> ChannelState {
        match self.multiplexer.is_closed() {
            true => ChannelState::Closed,
            false => ChannelState::Active,
        }
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.multiplexer
    }

    /// streams opened by the peer. can be taken once.
    pub fn take_incoming(&mut self) -> Option<IncomingStreams> {
        self.incoming.take()
    }

    pub async fn open_stream(&self) -> Result<LogicalStream, MuxError> {
        self.multiplexer.open_stream().await
    }

    /// resolves once the connection is closed, with the reason.
    pub async fn closed(&self) -> CloseReason {
        let reason = self.multiplexer.closed().await;
        log_state(self.session_id, ChannelState::Closed);
        reason
    }

    pub fn close(&self) {
        debug!("closing session {}", self.session_id);
        self.multiplexer.close();
    }
}

/// disables Nagle on a control socket and returns the peer address.
fn configure_socket(stream: &TcpStream) -> io::Result<SocketAddr> {
    stream.set_nodelay(true)?;
    stream.peer_addr()
}

fn log_state(session_id: Uuid, state: ChannelState) {
    trace!("session {} is {:?}", session_id, state);
}
