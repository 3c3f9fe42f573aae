use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rtunnel_core::bridge::bridge;
use rtunnel_core::mux::{Multiplexer, MuxError};
use rtunnel_core::tcp::{SocketListener, TcpListener};
use rtunnel_core::Result;

type CurrentSession = Option<Arc<Multiplexer>>;

#[derive(Debug)]
struct ListenerHandle {
    local_addr: SocketAddr,
    cancellation_token: CancellationToken,
}

#[derive(Debug, Default)]
struct PortState {
    generation: u64,
    listener: Option<ListenerHandle>,
}

/// public listener forwarding every accepted connection to the session that
/// is currently attached.
///
/// The listener is bound when the first session attaches and stays bound
/// while sessions come and go, as long as a new one attaches within the
/// grace period after the previous one was lost. Every attach bumps the
/// generation, so a grace timer only tears the listener down if nothing was
/// attached since it started.
#[derive(Debug)]
pub struct ExposedPort {
    addr: SocketAddr,
    grace_period: Duration,
    state: Mutex<PortState>,
    session: watch::Sender<CurrentSession>,
}

impl ExposedPort {
    pub fn new(addr: SocketAddr, grace_period: Duration) -> Arc<Self> {
        let (session, _) = watch::channel(None);

        Arc::new(Self {
            addr,
            grace_period,
            state: Mutex::new(PortState::default()),
            session,
        })
    }

    /// makes `multiplexer` the session new connections are forwarded to,
    /// binding the listener if it is not open. returns the generation to
    /// hand back to [`ExposedPort::detach`].
    pub async fn attach(&self, multiplexer: Arc<Multiplexer>) -> Result<u64> {
        let mut state = self.state.lock().await;

        let listening = state
            .listener
            .as_ref()
            .map(|handle| !handle.cancellation_token.is_cancelled())
            .unwrap_or(false);

        if !listening {
            let listener = TcpListener::bind(self.addr).await?;
            let local_addr = listener.listen_ip()?;
            let cancellation_token = CancellationToken::new();

            tokio::spawn(accept_connections(
                listener,
                self.session.subscribe(),
                cancellation_token.clone(),
            ));

            info!("exposed port listening on {}", local_addr);
            state.listener = Some(ListenerHandle {
                local_addr,
                cancellation_token,
            });
        } else {
            info!("session reattached to exposed port {}", self.addr);
        }

        state.generation += 1;
        self.session.send_replace(Some(multiplexer));

        Ok(state.generation)
    }

    /// the session of `generation` is gone. starts the grace timer unless
    /// another session has replaced it already.
    pub async fn detach(self: &Arc<Self>, generation: u64) {
        let state = self.state.lock().await;
        if state.generation != generation {
            debug!("ignoring detach of replaced session generation {}", generation);
            return;
        }

        self.session.send_replace(None);
        if state.listener.is_none() {
            return;
        }

        info!(
            "client disconnected, exposed port closes in {:?} unless it reconnects",
            self.grace_period
        );

        let exposed_port = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(exposed_port.grace_period).await;
            exposed_port.expire(generation).await;
        });
    }

    /// closes the listener if no session attached after `generation`.
    pub async fn expire(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return false;
        }

        match state.listener.take() {
            Some(handle) => {
                handle.cancellation_token.cancel();
                info!("grace period elapsed, exposed port {} closed", handle.local_addr);
                true
            }
            None => false,
        }
    }

    pub async fn is_listening(&self) -> bool {
        self.local_addr().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .await
            .listener
            .as_ref()
            .filter(|handle| !handle.cancellation_token.is_cancelled())
            .map(|handle| handle.local_addr)
    }

    /// closes the listener and drops the current session right away.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        self.session.send_replace(None);

        if let Some(handle) = state.listener.take() {
            handle.cancellation_token.cancel();
            debug!("exposed port {} closed", handle.local_addr);
        }
    }
}

async fn accept_connections(
    listener: TcpListener,
    session: watch::Receiver<CurrentSession>,
    cancellation_token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = cancellation_token.cancelled() => break,
        };

        let (stream, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("exposed port stopped accepting connections: {}", err);
                cancellation_token.cancel();
                break;
            }
        };

        debug!("external connection from {}", addr);
        tokio::spawn(forward_external(
            stream,
            addr,
            session.clone(),
            cancellation_token.clone(),
        ));
    }
}

/// waits for a live session, opens a stream on it and bridges the external
/// connection to it.
async fn forward_external(
    mut external: TcpStream,
    addr: SocketAddr,
    mut session: watch::Receiver<CurrentSession>,
    cancellation_token: CancellationToken,
) {
    let mut stream = loop {
        let multiplexer = tokio::select! {
            multiplexer = wait_for_session(&mut session) => multiplexer,
            _ = cancellation_token.cancelled() => None,
        };

        let Some(multiplexer) = multiplexer else {
            debug!("dropping external connection {}, exposed port closed", addr);
            return;
        };

        match multiplexer.open_stream().await {
            Ok(stream) => break stream,
            Err(MuxError::Closed(reason)) => {
                debug!("session closed ({}) before stream for {} was opened", reason, addr);
            }
            Err(err) => {
                warn!("failed to open stream for {}: {}", addr, err);
                return;
            }
        }
    };

    debug!("external connection {} mapped to stream {}", addr, stream.id());
    match bridge(&mut external, &mut stream).await {
        Ok(stats) => debug!(
            "external connection {} closed, {} bytes in, {} bytes out",
            addr, stats.left_to_right, stats.right_to_left
        ),
        Err(err) => debug!("external connection {} closed with error: {}", addr, err),
    }
}

/// resolves with the current session once there is a live one, or `None`
/// once the exposed port is gone.
async fn wait_for_session(session: &mut watch::Receiver<CurrentSession>) -> Option<Arc<Multiplexer>> {
    loop {
        let current = session
            .borrow_and_update()
            .as_ref()
            .filter(|multiplexer| !multiplexer.is_closed())
            .cloned();

        if current.is_some() {
            return current;
        }

        if session.changed().await.is_err() {
            return None;
        }
    }
}
