use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use rtunnel_core::bridge::bridge;
use rtunnel_core::mux::{CloseReason, IncomingStreams, LogicalStream};

/// connects every stream the server opens to the local service.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    target: String,
    connect_timeout: Duration,
}

impl LocalConnector {
    pub fn new(target: &str, connect_timeout: Duration) -> Self {
        Self {
            target: target.to_owned(),
            connect_timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// accepts streams until the control connection closes.
    pub async fn serve(&self, mut incoming: IncomingStreams) {
        while let Some(stream) = incoming.accept().await {
            let connector = self.clone();
            tokio::spawn(async move { connector.handle(stream).await });
        }

        debug!("no more streams to forward to {}", self.target);
    }

    /// bridges one stream to a fresh connection to the local service. if the
    /// service cannot be reached only this stream is closed.
    pub async fn handle(&self, mut stream: LogicalStream) {
        let mut local = match self.connect().await {
            Ok(local) => local,
            Err(err) => {
                warn!("local target {} unreachable: {}", self.target, err);
                let _ = stream.close_with(CloseReason::LocalTargetUnreachable).await;
                return;
            }
        };

        debug!("stream {} connected to {}", stream.id(), self.target);
        match bridge(&mut stream, &mut local).await {
            Ok(stats) => debug!(
                "stream {} finished, {} bytes forwarded, {} bytes returned",
                stream.id(),
                stats.left_to_right,
                stats.right_to_left
            ),
            Err(err) => debug!("stream {} closed with error: {}", stream.id(), err),
        }
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.target.as_str())).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use rtunnel_core::mux::{Multiplexer, MuxConfig, Side};

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn connected_pair() -> (Arc<Multiplexer>, Arc<Multiplexer>, IncomingStreams) {
        let (left, right) = tokio::io::duplex(64 * 1024);
        let (left_reader, left_writer) = tokio::io::split(left);
        let (right_reader, right_writer) = tokio::io::split(right);

        let (server, _) = Multiplexer::start(
            left_reader,
            left_writer,
            BytesMut::new(),
            Side::Server,
            MuxConfig::default(),
        );
        let (client, incoming) = Multiplexer::start(
            right_reader,
            right_writer,
            BytesMut::new(),
            Side::Client,
            MuxConfig::default(),
        );

        (server, client, incoming)
    }

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let (mut reader, mut writer) = socket.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        });

        addr.to_string()
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[tokio::test]
    async fn should_bridge_stream_to_local_target() {
        // Arrange
        let target = echo_server().await;
        let (server, _client, incoming) = connected_pair();
        let connector = LocalConnector::new(&target, WAIT);
        tokio::spawn(async move { connector.serve(incoming).await });

        // Act
        let mut stream = server.open_stream().await.unwrap();
        stream.write_all(b"PING").await.unwrap();
        stream.close().await.unwrap();

        let mut reply = Vec::new();
        timeout(WAIT, stream.read_to_end(&mut reply)).await.unwrap().unwrap();

        // Assert
        assert_eq!(&reply, b"PING");
    }

    #[tokio::test]
    async fn unreachable_target_should_close_only_that_stream() {
        // Arrange
        let target = closed_port().await;
        let (server, client, incoming) = connected_pair();
        let connector = LocalConnector::new(&target, WAIT);
        tokio::spawn(async move { connector.serve(incoming).await });

        // Act
        let mut first = server.open_stream().await.unwrap();
        let mut second = server.open_stream().await.unwrap();

        let mut first_reply = Vec::new();
        timeout(WAIT, first.read_to_end(&mut first_reply)).await.unwrap().unwrap();
        let mut second_reply = Vec::new();
        timeout(WAIT, second.read_to_end(&mut second_reply)).await.unwrap().unwrap();

        // Assert
        assert!(first_reply.is_empty());
        assert!(second_reply.is_empty());
        assert_eq!(first.close_reason(), Some(CloseReason::Remote));
        assert!(!server.is_closed());
        assert!(!client.is_closed());
        assert!(server.open_stream().await.is_ok());
    }
}
