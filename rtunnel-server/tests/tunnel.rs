use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use rtunnel_core::auth::AUTH_FAILED_MESSAGE;
use rtunnel_core::control::{ControlChannel, ControlOptions};
use rtunnel_core::mux::IncomingStreams;
use rtunnel_core::tcp::{SocketListener, TcpListener};
use rtunnel_server::tunnel::ExposedPort;
use rtunnel_server::{Server, ServerConfig};

const WAIT: Duration = Duration::from_secs(2);
const SECRET: &str = "S";

struct TestServer {
    control_addr: SocketAddr,
    exposed_port: Arc<ExposedPort>,
}

#[tokio::test]
async fn should_reject_wrong_secret() {
    // Arrange
    let server = create_server(Duration::from_secs(30)).await;
    let mut stream = TcpStream::connect(server.control_addr).await.unwrap();

    // Act
    stream.write_all(b"WRONG\n").await.unwrap();
    let mut answer = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut answer)).await.unwrap().unwrap();

    // Assert
    assert_eq!(&answer, AUTH_FAILED_MESSAGE);
    assert!(!server.exposed_port.is_listening().await);
}

#[tokio::test]
async fn should_forward_external_connection_to_client() {
    // Arrange
    let server = create_server(Duration::from_secs(30)).await;
    let (_client, mut incoming) = connect_client(&server).await;
    let exposed = wait_for_listener(&server).await;

    // Act
    let mut external = TcpStream::connect(exposed).await.unwrap();
    external.write_all(b"PING").await.unwrap();

    let mut stream = timeout(WAIT, incoming.accept()).await.unwrap().unwrap();
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await.unwrap();
    stream.write_all(b"PONG").await.unwrap();
    stream.close().await.unwrap();

    let mut reply = Vec::new();
    timeout(WAIT, external.read_to_end(&mut reply)).await.unwrap().unwrap();

    // Assert
    assert_eq!(&request, b"PING");
    assert_eq!(&reply, b"PONG");
}

#[tokio::test]
async fn should_close_exposed_port_after_grace_period() {
    // Arrange
    let server = create_server(Duration::from_millis(300)).await;
    let (client, _incoming) = connect_client(&server).await;
    let exposed = wait_for_listener(&server).await;

    // Act
    client.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let during_grace = TcpStream::connect(exposed).await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    let after_grace = TcpStream::connect(exposed).await;

    // Assert
    assert!(during_grace.is_ok());
    assert!(after_grace.is_err());
    assert!(!server.exposed_port.is_listening().await);
}

#[tokio::test]
async fn reconnecting_client_should_take_over_exposed_port() {
    // Arrange
    let server = create_server(Duration::from_millis(300)).await;
    let (first, _first_incoming) = connect_client(&server).await;
    let exposed = wait_for_listener(&server).await;

    // Act
    first.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut waiting = TcpStream::connect(exposed).await.unwrap();
    waiting.write_all(b"PING").await.unwrap();

    let (_second, mut incoming) = connect_client(&server).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut stream = timeout(WAIT, incoming.accept()).await.unwrap().unwrap();
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await.unwrap();

    // Assert
    assert_eq!(&request, b"PING");
    assert_eq!(server.exposed_port.local_addr().await, Some(exposed));
    assert!(TcpStream::connect(exposed).await.is_ok());
}

async fn create_server(grace_period: Duration) -> TestServer {
    let listener = TcpListener::bind(localhost(0)).await.unwrap();
    let config = ServerConfig::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        listener.listen_ip().unwrap().port(),
        free_port().await,
        Some(SECRET),
        grace_period,
    );

    let mut server = Server::new(config, Box::new(listener));
    let test_server = TestServer {
        control_addr: server.listen_ip().unwrap(),
        exposed_port: server.exposed_port().clone(),
    };

    tokio::spawn(async move { server.run(std::future::pending::<()>()).await });
    test_server
}

async fn connect_client(server: &TestServer) -> (ControlChannel, IncomingStreams) {
    let options = ControlOptions {
        secret: Some(SECRET.to_owned()),
        ..Default::default()
    };

    let mut channel = ControlChannel::connect(server.control_addr, &options).await.unwrap();
    let incoming = channel.take_incoming().unwrap();
    (channel, incoming)
}

/// the exposed port is bound once the server has attached the session.
async fn wait_for_listener(server: &TestServer) -> SocketAddr {
    timeout(WAIT, async {
        loop {
            if let Some(addr) = server.exposed_port.local_addr().await {
                return addr;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind(localhost(0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}
